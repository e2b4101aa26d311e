//! Applies unsaved buffer content before a document-scoped request runs

use std::sync::Arc;

use crate::error::{DispatchResult, WorkspaceError};
use crate::models::request::{DocumentRequest, UpdateBufferRequest};
use crate::workspace::{BufferEdit, Workspace};

pub struct UpdateBufferInterceptor {
    workspace: Arc<dyn Workspace>,
}

impl UpdateBufferInterceptor {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self { workspace }
    }

    pub fn workspace(&self) -> &Arc<dyn Workspace> {
        &self.workspace
    }

    /// Push the request's buffer text or edits into the workspace. Returns
    /// false when the request carries neither, or names an unknown document
    /// with edits only.
    pub async fn apply(&self, document: &DocumentRequest) -> DispatchResult<bool> {
        let Some(path) = document.file_name.as_deref().filter(|f| !f.trim().is_empty()) else {
            return Ok(false);
        };

        let edit = match (&document.buffer, &document.changes) {
            (Some(buffer), _) => BufferEdit::Replace(buffer.clone()),
            (None, Some(changes)) => BufferEdit::Changes {
                changes: changes.clone(),
                together: document.apply_changes_together,
            },
            (None, None) => return Ok(false),
        };

        tracing::debug!("Updating buffer for {}", path);
        Ok(self.workspace.apply(path, edit).await?)
    }

    /// The `/updatebuffer` operation itself. `FromDisk` reloads the file
    /// and ignores any inline content.
    pub async fn update(&self, request: &UpdateBufferRequest) -> DispatchResult<bool> {
        if !request.from_disk {
            return self.apply(&request.document).await;
        }

        let Some(path) = request.document.file_name.as_deref() else {
            return Ok(false);
        };
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| WorkspaceError::Read {
                path: path.to_string(),
                source,
            })?;
        Ok(self.workspace.apply(path, BufferEdit::Replace(text)).await?)
    }
}
