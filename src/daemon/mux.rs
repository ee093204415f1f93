use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use super::error::DaemonError;
use super::protocol::{encode_request, DaemonRequest, DaemonResponse, Method, RequestId};

type Completion = oneshot::Sender<Result<DaemonResponse, DaemonError>>;

/// Correlates concurrently issued calls with asynchronous worker responses
///
/// The worker is a single shared resource, so dispatch is exclusive: only
/// one request may be on the wire until its response or timeout is observed.
/// Concurrent callers queue for the dispatch slot in arrival order. Callers
/// still correlate by id, never by arrival order, so a future pipelined
/// dispatch would not change the contract.
pub struct RequestMultiplexer {
    next_id: AtomicU64,
    pending: Mutex<HashMap<RequestId, Completion>>,
    dispatch: Mutex<()>,
}

impl RequestMultiplexer {
    /// Create an empty multiplexer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            dispatch: Mutex::new(()),
        }
    }

    /// Issue one call and suspend until its response, its deadline, or a
    /// worker crash - whichever comes first.
    ///
    /// A timeout is a purely local decision: the id is forgotten and a
    /// response arriving later is discarded as an orphan. The computation
    /// already running inside the worker is not interrupted.
    ///
    /// # Errors
    /// [`DaemonError::TimedOut`] when the deadline elapses,
    /// [`DaemonError::Unavailable`] when the worker exits before answering,
    /// or the failure routed to this id by the supervisor.
    pub async fn call(
        &self,
        outbound: &mpsc::Sender<String>,
        method: Method,
        params: Map<String, Value>,
        timeout: Duration,
    ) -> Result<DaemonResponse, DaemonError> {
        let _slot = self.dispatch.lock().await;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = encode_request(&DaemonRequest { id, method, params });

        let (completion, resumed) = oneshot::channel();
        self.pending.lock().await.insert(id, completion);

        debug!(id, method = %method, "dispatching daemon call");

        if outbound.send(line).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(DaemonError::Unavailable(
                "daemon exited unexpectedly".to_owned(),
            ));
        }

        match tokio::time::timeout(timeout, resumed).await {
            Ok(Ok(outcome)) => outcome,
            // Completion dropped without a verdict: the pending table was
            // torn down while we were suspended.
            Ok(Err(_)) => Err(DaemonError::Unavailable(
                "daemon exited unexpectedly".to_owned(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                warn!(id, method = %method, "daemon call timed out");
                Err(DaemonError::TimedOut(timeout))
            }
        }
    }

    /// Route a decoded response to its pending caller.
    ///
    /// A response whose id has no pending call (late after timeout, or a
    /// duplicate) is dropped.
    pub async fn resolve(&self, response: DaemonResponse) {
        let completion = self.pending.lock().await.remove(&response.id);
        match completion {
            Some(completion) => {
                let _ = completion.send(Ok(response));
            }
            None => debug!(id = response.id, "dropping orphan daemon response"),
        }
    }

    /// Fail one pending call with the given error.
    pub async fn fail(&self, id: RequestId, error: DaemonError) {
        if let Some(completion) = self.pending.lock().await.remove(&id) {
            let _ = completion.send(Err(error));
        }
    }

    /// Fail every pending call at once (worker crash or shutdown).
    pub async fn fail_all(&self, reason: &str) {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return;
        }
        warn!(
            count = pending.len(),
            reason, "failing all pending daemon calls"
        );
        for (_, completion) in pending.drain() {
            let _ = completion.send(Err(DaemonError::Unavailable(reason.to_owned())));
        }
    }

    /// Number of calls currently awaiting a response.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

impl Default for RequestMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}
