//! Request/response channel to one plugin process

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::PluginError;
use crate::models::config::PluginDescriptor;
use crate::protocol::{RequestPacket, ResponsePacket};

type PendingRequest = oneshot::Sender<ResponsePacket>;
type PacketWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[async_trait]
pub trait PluginChannel: Send + Sync {
    /// Send one request and wait for its response body.
    async fn request(
        &self,
        command: &str,
        arguments: Value,
        wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<Value, PluginError>;

    async fn shutdown(&self);
}

/// Line-delimited packets over a pair of byte streams, usually the stdio
/// pipes of a child process.
pub struct StdioChannel {
    name: String,
    writer: Mutex<Option<PacketWriter>>,
    process: Mutex<Option<Child>>,
    next_seq: AtomicU64,
    pending: RwLock<HashMap<u64, PendingRequest>>,
    terminated: AtomicBool,
}

impl StdioChannel {
    /// Start the plugin process and attach to its stdio.
    pub async fn spawn(
        descriptor: &PluginDescriptor,
        root: Option<&Path>,
    ) -> Result<Arc<Self>, PluginError> {
        tracing::info!(
            "Starting plugin {}: {} {:?}",
            descriptor.name,
            descriptor.command,
            descriptor.args
        );

        let mut command = Command::new(&descriptor.command);
        command
            .args(&descriptor.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(root) = root {
            command.current_dir(root);
        }

        let mut child = command
            .spawn()
            .map_err(|e| PluginError::Spawn(format!("{}: {}", descriptor.command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PluginError::Spawn("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PluginError::Spawn("Failed to get stdout".to_string()))?;

        let channel = Self::from_io(&descriptor.name, stdout, stdin);
        *channel.process.lock().await = Some(child);
        Ok(channel)
    }

    /// Attach to already-open streams and start the response reader.
    pub fn from_io<R, W>(name: &str, reader: R, writer: W) -> Arc<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let channel = Arc::new(Self {
            name: name.to_string(),
            writer: Mutex::new(Some(Box::new(writer))),
            process: Mutex::new(None),
            next_seq: AtomicU64::new(1),
            pending: RwLock::new(HashMap::new()),
            terminated: AtomicBool::new(false),
        });

        let reader_channel = Arc::clone(&channel);
        tokio::spawn(async move {
            reader_channel.read_responses(reader).await;
        });

        channel
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    async fn write_packet(&self, packet: &RequestPacket) -> Result<(), PluginError> {
        let mut line =
            serde_json::to_string(packet).map_err(|e| PluginError::Malformed(e.to_string()))?;
        line.push('\n');

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(PluginError::Closed)?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// The terminated flag is re-read under the lock `terminate` clears.
    async fn register(&self, seq: u64) -> Result<oneshot::Receiver<ResponsePacket>, PluginError> {
        let mut pending = self.pending.write().await;
        if self.is_terminated() {
            return Err(PluginError::Closed);
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(seq, tx);
        Ok(rx)
    }

    async fn forget(&self, seq: u64) {
        self.pending.write().await.remove(&seq);
    }

    async fn read_responses<R>(self: Arc<Self>, reader: R)
    where
        R: AsyncRead + Send + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => self.handle_line(&line).await,
                Ok(None) => {
                    tracing::debug!("Plugin {} closed its output", self.name);
                    break;
                }
                Err(e) => {
                    tracing::error!("Plugin {} read error: {}", self.name, e);
                    break;
                }
            }
        }
        self.terminate().await;
    }

    async fn handle_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => {
                tracing::debug!("Plugin {}: {}", self.name, line);
                return;
            }
        };

        match value.get("Type").and_then(Value::as_str) {
            Some("response") => match serde_json::from_value::<ResponsePacket>(value) {
                Ok(response) => {
                    let sender = self.pending.write().await.remove(&response.request_seq);
                    match sender {
                        Some(tx) => {
                            let _ = tx.send(response);
                        }
                        None => {
                            tracing::debug!(
                                "Plugin {} answered unknown request {} (may have timed out)",
                                self.name,
                                response.request_seq
                            );
                        }
                    }
                }
                Err(e) => tracing::warn!("Plugin {} sent a bad response: {}", self.name, e),
            },
            Some("event") => {
                tracing::debug!("Plugin {} event: {}", self.name, line);
            }
            _ => {
                tracing::debug!("Plugin {} sent an unknown packet: {}", self.name, line);
            }
        }
    }

    /// Mark the channel dead and fail every waiter.
    async fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
        let mut pending = self.pending.write().await;
        if !pending.is_empty() {
            tracing::debug!(
                "Dropping {} pending requests: plugin {} terminated",
                pending.len(),
                self.name
            );
        }
        // Dropping the senders wakes each receiver with an error.
        pending.clear();
    }
}

#[async_trait]
impl PluginChannel for StdioChannel {
    async fn request(
        &self,
        command: &str,
        arguments: Value,
        wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<Value, PluginError> {
        if self.is_terminated() {
            return Err(PluginError::Closed);
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let rx = self.register(seq).await?;

        let packet = RequestPacket::new(seq, command, Some(arguments));
        tracing::trace!("Plugin {} request {}: {}", self.name, seq, command);

        if let Err(e) = self.write_packet(&packet).await {
            self.forget(seq).await;
            return Err(e);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                self.forget(seq).await;
                return Err(PluginError::Cancelled);
            }
            result = timeout(wait, rx) => result,
        };

        match response {
            Ok(Ok(packet)) if packet.success => Ok(packet.body),
            Ok(Ok(packet)) => Err(PluginError::Remote(
                packet
                    .message
                    .unwrap_or_else(|| format!("{} failed", command)),
            )),
            Ok(Err(_)) => Err(PluginError::Closed),
            Err(_) => {
                self.forget(seq).await;
                Err(PluginError::Timeout(wait))
            }
        }
    }

    async fn shutdown(&self) {
        // Closing stdin is the plugin's signal to exit.
        self.writer.lock().await.take();

        if let Some(mut child) = self.process.lock().await.take() {
            match timeout(Duration::from_secs(5), child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!("Plugin {} exited: {:?}", self.name, status);
                }
                Ok(Err(e)) => {
                    tracing::warn!("Plugin {} wait error: {}", self.name, e);
                }
                Err(_) => {
                    tracing::warn!("Plugin {} did not exit, forcing kill", self.name);
                    let _ = child.kill().await;
                }
            }
        }

        self.terminate().await;
    }
}

impl Drop for StdioChannel {
    fn drop(&mut self) {
        if let Ok(mut process) = self.process.try_lock()
            && let Some(child) = process.as_mut()
        {
            let _ = child.start_kill();
        }
    }
}
