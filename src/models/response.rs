//! Response models and the merge contract

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Combines two responses of the same type.
///
/// `merge` must be total and treat `None` as identity, so a left fold from
/// an empty accumulator reproduces its single input.
pub trait Aggregate: Sized {
    fn merge(self, other: Option<Self>) -> Self;
}

/// How an endpoint combines results from several handlers.
pub enum MergePolicy<R> {
    /// Fold every handler's result with the response's merge function.
    Aggregate(fn(R, Option<R>) -> R),
    /// Keep the first non-null, non-empty result in registration order.
    FirstUseful,
}

impl<R> Clone for MergePolicy<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for MergePolicy<R> {}

impl<R: Aggregate> MergePolicy<R> {
    pub fn aggregate() -> Self {
        Self::Aggregate(R::merge)
    }
}

impl<R> MergePolicy<R> {
    pub fn is_mergeable(&self) -> bool {
        matches!(self, Self::Aggregate(_))
    }
}

/// A response payload shape known at compile time.
pub trait ResponseModel: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn merge_policy() -> MergePolicy<Self> {
        MergePolicy::FirstUseful
    }

    /// Emptiness-aware responses override this to report "no real content".
    fn is_empty(&self) -> bool {
        false
    }

    /// Whether the type overrides `is_empty`. Only informational.
    const CAN_BE_EMPTY: bool = false;
}

impl ResponseModel for bool {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct QuickFix {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub text: String,
}

impl QuickFix {
    pub fn new(file_name: impl Into<String>, line: u32, column: u32, text: impl Into<String>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            line,
            column,
            end_line: line,
            end_column: column,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct QuickFixResponse {
    pub quick_fixes: Vec<QuickFix>,
}

impl QuickFixResponse {
    pub fn new(quick_fixes: Vec<QuickFix>) -> Self {
        Self { quick_fixes }
    }

    pub fn texts(&self) -> Vec<&str> {
        self.quick_fixes.iter().map(|q| q.text.as_str()).collect()
    }
}

impl Aggregate for QuickFixResponse {
    fn merge(mut self, other: Option<Self>) -> Self {
        if let Some(other) = other {
            self.quick_fixes.extend(other.quick_fixes);
        }
        self
    }
}

impl ResponseModel for QuickFixResponse {
    fn merge_policy() -> MergePolicy<Self> {
        MergePolicy::aggregate()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GotoDefinitionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub line: u32,
    pub column: u32,
}

impl GotoDefinitionResponse {
    pub fn at(file_name: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file_name: Some(file_name.into()),
            line,
            column,
        }
    }
}

impl ResponseModel for GotoDefinitionResponse {
    const CAN_BE_EMPTY: bool = true;

    fn is_empty(&self) -> bool {
        self.file_name.as_deref().is_none_or(str::is_empty)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MetadataResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ResponseModel for MetadataResponse {}

/// Per-project-system workspace description, keyed by project system name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceInformationResponse(pub BTreeMap<String, Value>);

impl WorkspaceInformationResponse {
    pub fn single(key: impl Into<String>, value: Value) -> Self {
        Self(BTreeMap::from([(key.into(), value)]))
    }
}

impl Aggregate for WorkspaceInformationResponse {
    fn merge(mut self, other: Option<Self>) -> Self {
        for (key, value) in other.map(|o| o.0).unwrap_or_default() {
            let slot = self.0.entry(key).or_insert(Value::Null);
            if slot.is_null() {
                *slot = value;
            }
        }
        self
    }
}

impl ResponseModel for WorkspaceInformationResponse {
    fn merge_policy() -> MergePolicy<Self> {
        MergePolicy::aggregate()
    }
}
