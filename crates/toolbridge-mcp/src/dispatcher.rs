//! Request/response correlation.
//!
//! Every outbound request gets the next id from a monotonically increasing
//! counter and an entry in the in-flight table. The entry is settled exactly
//! once by whichever path removes it first: a matching response, its timer,
//! a failed write, or a teardown via [`Dispatcher::fail_all`].
//!
//! Each [`Dispatcher::fail_all`] starts a new epoch. A request registered
//! against an epoch that has already ended is refused instead of tracked, so
//! a teardown racing a caller cannot strand an entry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::codec::{self, FrameWriter};
use crate::error::{McpError, Result};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type Responder = oneshot::Sender<Result<JsonRpcResponse>>;

struct PendingRequest {
    method: String,
    responder: Responder,
    timer: AbortHandle,
}

impl PendingRequest {
    fn settle(self, outcome: Result<JsonRpcResponse>) {
        self.timer.abort();
        // The caller may have stopped waiting; nothing to do then.
        let _ = self.responder.send(outcome);
    }
}

/// Tracks in-flight requests for one connection.
pub struct Dispatcher {
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
    epoch: AtomicU64,
    timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher whose requests expire after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            epoch: AtomicU64::new(0),
            timeout,
        }
    }

    /// The per-request deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Current epoch; advanced by every [`Dispatcher::fail_all`].
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Send a request and wait for its correlated response.
    ///
    /// A JSON-RPC error response is returned as [`McpError::ServerError`].
    pub async fn request(
        &self,
        writer: &FrameWriter,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse> {
        self.request_in(self.epoch(), writer, method, params).await
    }

    /// Like [`Dispatcher::request`], but only if no teardown happened since
    /// `epoch` was read. Otherwise fails with [`McpError::Disconnected`]
    /// without writing anything.
    pub async fn request_in(
        &self,
        epoch: u64,
        writer: &FrameWriter,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse> {
        let id = self.next_request_id();
        let frame = codec::encode(&JsonRpcRequest::new(id, method, params))?;
        let receiver = self.register(epoch, id, method)?;

        tracing::debug!(id, method, "sending MCP request");

        if let Err(e) = writer.write_frame(&frame).await {
            let entry = self.pending.lock().remove(&id);
            match entry {
                Some(entry) => {
                    entry.timer.abort();
                    tracing::warn!(id, method, error = %e, "failed to write MCP request");
                    return Err(McpError::Write(e));
                }
                // Already settled by a teardown racing the write.
                None => return receiver.await.unwrap_or(Err(McpError::Disconnected)),
            }
        }

        receiver.await.unwrap_or(Err(McpError::Disconnected))
    }

    /// Send a notification; no entry is tracked.
    pub async fn notify(
        &self,
        writer: &FrameWriter,
        method: &str,
        params: Option<Value>,
    ) -> Result<()> {
        let frame = codec::encode(&JsonRpcNotification::new(method, params))?;
        writer.write_frame(&frame).await.map_err(McpError::Write)
    }

    fn register(
        &self,
        epoch: u64,
        id: u64,
        method: &str,
    ) -> Result<oneshot::Receiver<Result<JsonRpcResponse>>> {
        let (responder, receiver) = oneshot::channel();
        let mut pending = self.pending.lock();
        // fail_all advances the epoch under this lock.
        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!(id, method, "refusing MCP request after teardown");
            return Err(McpError::Disconnected);
        }
        let timer = self.spawn_timer(id);
        pending.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                responder,
                timer,
            },
        );
        Ok(receiver)
    }

    fn spawn_timer(&self, id: u64) -> AbortHandle {
        let pending = Arc::clone(&self.pending);
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let expired = pending.lock().remove(&id);
            if let Some(entry) = expired {
                tracing::warn!(
                    id,
                    method = %entry.method,
                    timeout_ms = timeout.as_millis() as u64,
                    "MCP request timed out"
                );
                let _ = entry.responder.send(Err(McpError::Timeout {
                    id,
                    elapsed: timeout,
                }));
            }
        })
        .abort_handle()
    }

    /// Settle the pending request matching `response.id`.
    ///
    /// Returns `false` when no request with that id is in flight, e.g. it
    /// already timed out.
    pub fn complete(&self, response: JsonRpcResponse) -> bool {
        let id = response.id;
        let entry = self.pending.lock().remove(&id);
        let Some(entry) = entry else {
            tracing::warn!(id, "dropping MCP response with no pending request");
            return false;
        };

        tracing::debug!(id, method = %entry.method, error = response.is_error(), "MCP response received");

        let outcome = match response.error.clone() {
            Some(error) => Err(error.into()),
            None => Ok(response),
        };
        entry.settle(outcome);
        true
    }

    /// Settle the pending request `id` with `error`.
    ///
    /// Used when a reply carries the id but cannot be decoded. Returns `false`
    /// when nothing with that id is in flight.
    pub fn fail(&self, id: u64, error: McpError) -> bool {
        let entry = self.pending.lock().remove(&id);
        let Some(entry) = entry else {
            return false;
        };
        tracing::debug!(id, method = %entry.method, error = %error, "failing MCP request");
        entry.settle(Err(error));
        true
    }

    /// Reject every in-flight request, empty the table and end the epoch.
    pub fn fail_all(&self, reason: impl Fn() -> McpError) -> usize {
        let drained: Vec<(u64, PendingRequest)> = {
            let mut pending = self.pending.lock();
            self.epoch.fetch_add(1, Ordering::SeqCst);
            pending.drain().collect()
        };
        let count = drained.len();
        for (id, entry) in drained {
            tracing::debug!(id, method = %entry.method, "rejecting pending MCP request");
            entry.settle(Err(reason()));
        }
        count
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("next_id", &self.next_id.load(Ordering::SeqCst))
            .field("pending", &self.pending_count())
            .field("epoch", &self.epoch())
            .field("timeout", &self.timeout)
            .finish()
    }
}
