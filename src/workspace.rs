//! Live document set
//!
//! The dispatch core only needs two things from a workspace: reading the
//! current text of a document, and applying unsaved buffer content to it.
//! [`InMemoryWorkspace`] is the reference implementation used by the host.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::WorkspaceError;
use crate::models::request::LinePositionSpanTextChange;

/// An edit to one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferEdit {
    /// Replace the whole text.
    Replace(String),
    /// Apply span edits. With `together`, every span refers to the original
    /// text; otherwise each span refers to the text left by the previous one.
    Changes {
        changes: Vec<LinePositionSpanTextChange>,
        together: bool,
    },
}

#[async_trait]
pub trait Workspace: Send + Sync {
    async fn document(&self, path: &str) -> Option<String>;

    /// Returns whether any document was changed or created.
    async fn apply(&self, path: &str, edit: BufferEdit) -> Result<bool, WorkspaceError>;

    fn is_initialized(&self) -> bool;
}

#[derive(Debug, Clone)]
struct Document {
    text: String,
    version: u32,
}

pub struct InMemoryWorkspace {
    documents: RwLock<HashMap<String, Document>>,
    initialized: AtomicBool,
}

impl Default for InMemoryWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWorkspace {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    pub async fn version(&self, path: &str) -> Option<u32> {
        self.documents.read().await.get(path).map(|d| d.version)
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl Workspace for InMemoryWorkspace {
    async fn document(&self, path: &str) -> Option<String> {
        self.documents.read().await.get(path).map(|d| d.text.clone())
    }

    async fn apply(&self, path: &str, edit: BufferEdit) -> Result<bool, WorkspaceError> {
        let mut documents = self.documents.write().await;

        if let Some(doc) = documents.get_mut(path) {
            doc.text = match edit {
                BufferEdit::Replace(text) => text,
                BufferEdit::Changes { changes, together } => {
                    apply_changes(path, &doc.text, &changes, together)?
                }
            };
            doc.version += 1;
            return Ok(true);
        }

        match edit {
            BufferEdit::Replace(text) => {
                tracing::debug!("Adding transient document {}", path);
                documents.insert(path.to_string(), Document { text, version: 1 });
                Ok(true)
            }
            BufferEdit::Changes { .. } => {
                tracing::debug!("Ignoring edits for unknown document {}", path);
                Ok(false)
            }
        }
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}

/// Byte offset of a zero-based line/column position. The column may point
/// one past the last character of the line.
fn offset_of(path: &str, text: &str, line: u32, column: u32) -> Result<usize, WorkspaceError> {
    let invalid = || WorkspaceError::InvalidPosition {
        path: path.to_string(),
        line,
        column,
    };

    let mut line_start = 0;
    for _ in 0..line {
        let newline = text[line_start..].find('\n').ok_or_else(invalid)?;
        line_start += newline + 1;
    }

    let line_text = text[line_start..]
        .split('\n')
        .next()
        .unwrap_or_default()
        .trim_end_matches('\r');

    let column = column as usize;
    let char_count = line_text.chars().count();
    if column > char_count {
        return Err(invalid());
    }

    let byte_in_line = line_text
        .char_indices()
        .nth(column)
        .map(|(i, _)| i)
        .unwrap_or(line_text.len());

    Ok(line_start + byte_in_line)
}

fn span_of(
    path: &str,
    text: &str,
    change: &LinePositionSpanTextChange,
) -> Result<(usize, usize), WorkspaceError> {
    let start = offset_of(path, text, change.start_line, change.start_column)?;
    let end = offset_of(path, text, change.end_line, change.end_column)?;
    if end < start {
        return Err(WorkspaceError::InvalidPosition {
            path: path.to_string(),
            line: change.end_line,
            column: change.end_column,
        });
    }
    Ok((start, end))
}

fn apply_changes(
    path: &str,
    text: &str,
    changes: &[LinePositionSpanTextChange],
    together: bool,
) -> Result<String, WorkspaceError> {
    if !together {
        let mut current = text.to_string();
        for change in changes {
            let (start, end) = span_of(path, &current, change)?;
            current.replace_range(start..end, &change.new_text);
        }
        return Ok(current);
    }

    let mut spans = changes
        .iter()
        .enumerate()
        .map(|(index, change)| span_of(path, text, change).map(|span| (span, index, change)))
        .collect::<Result<Vec<_>, _>>()?;

    // Same-offset changes keep request order.
    spans.sort_by_key(|&((start, _), index, _)| (start, index));

    let mut result = String::with_capacity(text.len());
    let mut cursor = 0;
    for ((start, end), _, change) in spans {
        if start < cursor {
            return Err(WorkspaceError::InvalidPosition {
                path: path.to_string(),
                line: change.start_line,
                column: change.start_column,
            });
        }
        result.push_str(&text[cursor..start]);
        result.push_str(&change.new_text);
        cursor = end;
    }
    result.push_str(&text[cursor..]);
    Ok(result)
}
