//! RPC relay - correlated request/response over a broadcast channel
//!
//! Flow:
//! 1. Elect the delegate; no delegate means `NoAuthority` and nothing is sent
//! 2. Register the pending entry under a fresh correlation id
//! 3. Broadcast the request
//! 4. Settle on the first of: matching response, timeout
//!
//! Every settlement path removes the pending entry before settling, so a
//! request settles exactly once and late or duplicate responses are no-ops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use surrogate_authority::elect_authority_owned;
use surrogate_core::{RequestId, SessionContext, SurrogateError, SurrogateResult};
use surrogate_time::Timer;
use surrogate_transport::BroadcastChannel;
use surrogate_wire::{Envelope, Operation, OperationPayload, RequestMessage, ResponseMessage};

use crate::DeputyConfig;

/// A request waiting for its response
struct PendingRequest {
    /// Operation name (for logging)
    op: Operation,
    /// Timer reading when the request was sent
    sent_at: Duration,
    /// Settles the waiting caller
    sender: oneshot::Sender<SurrogateResult<Value>>,
}

/// Relay counters
#[derive(Debug, Default)]
pub struct RelayStats {
    /// Requests broadcast
    pub sent: AtomicU64,
    /// Requests settled by a response (either outcome)
    pub answered: AtomicU64,
    /// Requests settled by timeout
    pub timeouts: AtomicU64,
    /// Responses dropped: misaddressed, unknown or already settled
    pub ignored: AtomicU64,
}

/// Requester side of the delegation protocol
pub struct RpcRelay {
    session: Arc<dyn SessionContext>,
    channel: Arc<dyn BroadcastChannel>,
    timer: Arc<dyn Timer>,
    event: String,
    timeout: Duration,
    pending: Mutex<HashMap<RequestId, PendingRequest>>,
    stats: RelayStats,
}

/// Removes the pending entry if the waiting future is dropped early
struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<RequestId, PendingRequest>>,
    request_id: &'a RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(self.request_id);
    }
}

impl RpcRelay {
    /// Create a relay emitting on `channel` with the configured timeout
    pub fn new(
        session: Arc<dyn SessionContext>,
        channel: Arc<dyn BroadcastChannel>,
        timer: Arc<dyn Timer>,
        config: &DeputyConfig,
    ) -> Self {
        RpcRelay {
            session,
            channel,
            timer,
            event: config.event_name.clone(),
            timeout: config.rpc_timeout,
            pending: Mutex::new(HashMap::new()),
            stats: RelayStats::default(),
        }
    }

    /// Send a typed operation payload
    pub async fn request_payload(&self, payload: &OperationPayload) -> SurrogateResult<Value> {
        self.request(payload.operation(), payload.to_value()?).await
    }

    /// Delegate `op` to the elected authority and wait for its outcome.
    ///
    /// Errors: `NoAuthority` (nothing sent), `RemoteOperation` (delegate
    /// reported failure), `RpcTimeout` (no response in time).
    pub async fn request(&self, op: Operation, payload: Value) -> SurrogateResult<Value> {
        let target = elect_authority_owned(self.session.participants())
            .ok_or(SurrogateError::NoAuthority)?;
        let local = self.session.local();

        let request_id = RequestId::generate();
        let message = Envelope::from(RequestMessage::new(
            request_id.clone(),
            local.id,
            target.id.clone(),
            op.as_str(),
            payload,
        ))
        .encode()?;

        let (tx, mut rx) = oneshot::channel();
        self.pending.lock().insert(
            request_id.clone(),
            PendingRequest {
                op,
                sent_at: self.timer.elapsed(),
                sender: tx,
            },
        );
        let _guard = PendingGuard {
            pending: &self.pending,
            request_id: &request_id,
        };

        self.channel.emit(&self.event, message)?;
        self.stats.sent.fetch_add(1, Ordering::Relaxed);
        debug!(
            request_id = %request_id,
            op = %op,
            target = %target.id,
            "Sent delegated request"
        );

        tokio::select! {
            biased;
            settled = &mut rx => settled.unwrap_or_else(|_| Err(SurrogateError::RelayClosed(request_id.clone()))),
            _ = self.timer.sleep(self.timeout) => {
                let expired = self.pending.lock().remove(&request_id);
                match expired {
                    Some(pending) => {
                        self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            request_id = %request_id,
                            op = %pending.op,
                            timeout_ms = self.timeout.as_millis() as u64,
                            "Delegated request timed out"
                        );
                        Err(SurrogateError::RpcTimeout {
                            request_id: request_id.clone(),
                            waited: self.timeout,
                        })
                    }
                    // A response won the race and already settled the channel
                    None => rx
                        .await
                        .unwrap_or_else(|_| Err(SurrogateError::RelayClosed(request_id.clone()))),
                }
            }
        }
    }

    /// Settle the pending request a response belongs to.
    ///
    /// Returns true if a waiting caller was settled. Misaddressed, unknown
    /// and already-settled responses are dropped.
    pub fn handle_response(&self, response: ResponseMessage) -> bool {
        let local = self.session.local();
        if response.recipient_id != local.id {
            self.stats.ignored.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let Some(pending) = self.pending.lock().remove(&response.request_id) else {
            self.stats.ignored.fetch_add(1, Ordering::Relaxed);
            debug!(
                request_id = %response.request_id,
                "Response for unknown or settled request"
            );
            return false;
        };

        let request_id = response.request_id.clone();
        let ok = response.ok;
        let elapsed = self.timer.elapsed().saturating_sub(pending.sent_at);
        self.stats.answered.fetch_add(1, Ordering::Relaxed);
        debug!(
            request_id = %request_id,
            op = %pending.op,
            ok,
            response_time_ms = elapsed.as_millis() as u64,
            "Delegated request answered"
        );
        // Receiver gone means the caller was cancelled
        pending.sender.send(response.into_outcome()).is_ok()
    }

    /// Number of requests awaiting a response
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether `request_id` still awaits a response
    pub fn is_pending(&self, request_id: &RequestId) -> bool {
        self.pending.lock().contains_key(request_id)
    }

    /// Get statistics
    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Per-request response timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
