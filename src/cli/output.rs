//! JSON output for CLI commands
//!
//! Only the one-shot commands print through here. `serve` owns stdout for
//! protocol packets.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Value, json};

#[derive(Debug, Clone)]
pub struct OutputContext {
    root: PathBuf,
}

impl OutputContext {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Path relative to the workspace root, or unchanged when outside it.
    pub fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| path.display().to_string())
    }

    /// `{"success": true, "data": ...}`
    pub fn print_success<T: Serialize>(&self, data: T) {
        print_json(&json!({ "success": true, "data": data }));
    }

    /// Object fields at top level, with `"success": true` added.
    pub fn print_success_flat<T: Serialize>(&self, data: T) {
        print_json(&flatten_success(data));
    }

    pub fn print_error(&self, message: impl Display) {
        print_json(&error_value(message));
    }
}

pub fn error_value(message: impl Display) -> Value {
    json!({ "success": false, "error": message.to_string() })
}

fn flatten_success<T: Serialize>(data: T) -> Value {
    let mut response = serde_json::to_value(data).unwrap_or_else(|_| json!({}));
    if let Some(obj) = response.as_object_mut() {
        obj.insert("success".to_string(), Value::Bool(true));
    }
    response
}

pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to serialize output: {e}"),
    }
}
