//! Built-in `/updatebuffer` handler

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::dispatch::{RequestHandler, UpdateBufferInterceptor};
use crate::models::endpoint::UpdateBuffer;
use crate::models::request::UpdateBufferRequest;

/// Serves `/updatebuffer` for every language, straight against the workspace.
pub struct UpdateBufferService {
    buffer: Arc<UpdateBufferInterceptor>,
}

impl UpdateBufferService {
    pub fn new(buffer: Arc<UpdateBufferInterceptor>) -> Self {
        Self { buffer }
    }
}

#[async_trait]
impl RequestHandler<UpdateBuffer> for UpdateBufferService {
    async fn handle(
        &self,
        request: &UpdateBufferRequest,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Option<bool>> {
        Ok(Some(self.buffer.update(request).await?))
    }
}
