//! Request models and routing hints

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request payload shape known at compile time.
///
/// The two `HAS_*` constants record which routing fields the payload type
/// declares. They decide how the endpoint resolves its language, independent
/// of whether a particular inbound payload actually fills them in.
pub trait RequestModel:
    Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
    const HAS_LANGUAGE: bool = false;
    const HAS_FILE_NAME: bool = false;

    /// The document portion of the request, for requests that can carry
    /// unsaved buffer content.
    fn document(&self) -> Option<&DocumentRequest> {
        None
    }
}

/// Routing hints pulled out of the raw payload by light inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingHints {
    pub language: Option<String>,
    pub file_name: Option<String>,
}

impl RoutingHints {
    /// Case-insensitive lookup of the `Language` and `FileName` members.
    /// Non-object payloads yield no hints.
    pub fn inspect(payload: &Value) -> Self {
        let Some(object) = payload.as_object() else {
            return Self::default();
        };

        let lookup = |name: &str| {
            object
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .and_then(|(_, value)| match value {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
        };

        Self {
            language: lookup("Language"),
            file_name: lookup("FileName"),
        }
    }

    pub fn language(&self) -> Option<&str> {
        self.language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }
}

/// One span edit, in zero-based line and column coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LinePositionSpanTextChange {
    pub new_text: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl LinePositionSpanTextChange {
    pub fn new(start: (u32, u32), end: (u32, u32), new_text: impl Into<String>) -> Self {
        Self {
            new_text: new_text.into(),
            start_line: start.0,
            start_column: start.1,
            end_line: end.0,
            end_column: end.1,
        }
    }
}

/// Fields shared by every document-scoped request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DocumentRequest {
    #[serde(alias = "fileName", skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub line: u32,
    pub column: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<LinePositionSpanTextChange>>,
    pub apply_changes_together: bool,
}

impl DocumentRequest {
    pub fn for_file(file_name: impl Into<String>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            ..Default::default()
        }
    }

    pub fn with_buffer(mut self, buffer: impl Into<String>) -> Self {
        self.buffer = Some(buffer.into());
        self
    }

    pub fn with_changes(mut self, changes: Vec<LinePositionSpanTextChange>) -> Self {
        self.changes = Some(changes);
        self
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    /// True when the request names a file and carries buffer text or edits.
    pub fn touches_buffer(&self) -> bool {
        let has_file = self
            .file_name
            .as_deref()
            .is_some_and(|f| !f.trim().is_empty());
        has_file && (self.buffer.is_some() || self.changes.is_some())
    }
}

impl RequestModel for DocumentRequest {
    const HAS_FILE_NAME: bool = true;

    fn document(&self) -> Option<&DocumentRequest> {
        Some(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UpdateBufferRequest {
    #[serde(flatten)]
    pub document: DocumentRequest,
    pub from_disk: bool,
}

impl RequestModel for UpdateBufferRequest {
    const HAS_FILE_NAME: bool = true;

    fn document(&self) -> Option<&DocumentRequest> {
        Some(&self.document)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FindSymbolsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items_to_return: Option<usize>,
}

impl RequestModel for FindSymbolsRequest {
    const HAS_LANGUAGE: bool = true;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MetadataRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assembly_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

impl RequestModel for MetadataRequest {
    const HAS_LANGUAGE: bool = true;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct WorkspaceInformationRequest {
    pub exclude_source_files: bool,
}

impl RequestModel for WorkspaceInformationRequest {}
