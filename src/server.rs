//! Stdio host
//!
//! Reads one request packet per line, dispatches requests concurrently and
//! writes one response packet per request. Responses arrive in completion
//! order; callers match them by `Request_seq`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::HostLimits;
use crate::dispatch::EndpointRouter;
use crate::models::endpoint::names;
use crate::protocol::{EventPacket, RequestPacket};
use crate::workspace::Workspace;

pub mod events {
    pub const STARTED: &str = "started";
    pub const ERROR: &str = "error";
}

pub struct StdioHost {
    router: Arc<EndpointRouter>,
    workspace: Arc<dyn Workspace>,
    limits: HostLimits,
    shutdown: CancellationToken,
    next_seq: Arc<AtomicU64>,
}

/// What each request task needs.
#[derive(Clone)]
struct HostContext {
    router: Arc<EndpointRouter>,
    workspace: Arc<dyn Workspace>,
    limits: HostLimits,
    shutdown: CancellationToken,
    next_seq: Arc<AtomicU64>,
    out: mpsc::UnboundedSender<String>,
}

impl StdioHost {
    pub fn new(router: Arc<EndpointRouter>, workspace: Arc<dyn Workspace>, limits: HostLimits) -> Self {
        Self {
            router,
            workspace,
            limits,
            shutdown: CancellationToken::new(),
            next_seq: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Cancelling this token stops the host and cancels in-flight requests.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve until end of input or `/stopserver`. Returns the writer once
    /// every response has been flushed.
    pub async fn run<R, W>(&self, reader: R, writer: W) -> std::io::Result<W>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (out, rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_lines(writer, rx));

        let semaphore = Arc::new(Semaphore::new(self.limits.max_concurrent));
        let mut tasks = JoinSet::new();
        let ctx = HostContext {
            router: Arc::clone(&self.router),
            workspace: Arc::clone(&self.workspace),
            limits: self.limits,
            shutdown: self.shutdown.clone(),
            next_seq: Arc::clone(&self.next_seq),
            out,
        };

        ctx.emit(&EventPacket::new(ctx.seq(), events::STARTED, Value::Null));
        tracing::info!("Host started");

        let mut lines = BufReader::new(reader).lines();
        let read_result = loop {
            let line = tokio::select! {
                _ = self.shutdown.cancelled() => break Ok(()),
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };
            if line.trim().is_empty() {
                continue;
            }

            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => break Ok(()),
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
            };

            let ctx = ctx.clone();
            tasks.spawn(async move {
                let _permit = permit;
                ctx.process(&line).await;
            });
        };

        while tasks.join_next().await.is_some() {}
        drop(ctx);

        let writer = writer_task.await.map_err(std::io::Error::other)??;
        tracing::info!("Host stopped");
        read_result.map(|_| writer)
    }
}

impl HostContext {
    fn seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn emit<T: Serialize>(&self, packet: &T) {
        let json = serde_json::to_string(packet).unwrap_or_else(|e| {
            format!(
                r#"{{"Type":"event","Event":"error","Body":"Serialization error: {}"}}"#,
                e
            )
        });
        // The writer only goes away after every task has finished.
        let _ = self.out.send(json);
    }

    async fn process(&self, line: &str) {
        let request = match RequestPacket::parse(line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Unreadable request: {}", e);
                self.emit(&EventPacket::new(
                    self.seq(),
                    events::ERROR,
                    Value::String(e.to_string()),
                ));
                return;
            }
        };

        tracing::debug!("Request {}: {}", request.seq, request.command);
        let reply = request.reply(self.seq());

        let response = match request.command.to_ascii_lowercase().as_str() {
            names::CHECK_ALIVE_STATUS => reply.with_body(Value::Bool(true)),
            names::CHECK_READY_STATUS => {
                reply.with_body(Value::Bool(self.workspace.is_initialized()))
            }
            names::STOP_SERVER => {
                self.emit(&reply.with_body(Value::Bool(true)));
                tracing::info!("Stop requested");
                self.shutdown.cancel();
                return;
            }
            _ => {
                let cancel = self.shutdown.child_token();
                let arguments = request.arguments.unwrap_or(Value::Null);
                let result = tokio::time::timeout(
                    self.limits.request_timeout,
                    self.router.dispatch(&request.command, arguments, &cancel),
                )
                .await;

                match result {
                    Ok(Ok(body)) => reply.with_body(body),
                    // Cancelled work completes without a result.
                    Ok(Err(e)) if e.is_cancelled() => reply,
                    Ok(Err(e)) => {
                        tracing::debug!("{} failed: {}", request.command, e);
                        reply.failed(e.to_string())
                    }
                    Err(_) => {
                        cancel.cancel();
                        reply.failed("Request timed out")
                    }
                }
            }
        };

        self.emit(&response);
    }
}

async fn write_lines<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>) -> std::io::Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(writer)
}
