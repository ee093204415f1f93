use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::error::DaemonError;
use super::protocol::{decode_response, DaemonRequest, DaemonResponse, RequestId};

/// Events produced by a live worker connection
#[derive(Debug)]
pub enum WireEvent {
    /// A decoded response envelope
    Response(DaemonResponse),
    /// A line that could not be decoded; id present when extractable
    Malformed {
        /// Correlation id recovered from the payload, if any
        id: Option<RequestId>,
        /// The offending line, verbatim
        raw: String,
    },
    /// The output stream reached end-of-file or the worker exited
    Closed,
}

/// A live bidirectional connection to the worker
///
/// `outbound` carries encoded request lines (one envelope per line, no
/// trailing newline); `events` carries decoded output and lifecycle events.
pub struct WireHandle {
    /// Sink for encoded request lines
    pub outbound: mpsc::Sender<String>,
    /// Decoded worker output and lifecycle events
    pub events: mpsc::Receiver<WireEvent>,
    /// Hard-kill trigger, present for process-backed connections
    pub kill: Option<oneshot::Sender<()>>,
    /// OS process id, when backed by a real process
    pub pid: Option<u32>,
}

/// Transport seam between the supervisor and the worker
///
/// Two implementations exist: [`super::process::ProcessTransport`] spawns the
/// real Python worker, and [`ScriptedTransport`] answers from an in-memory
/// responder so the supervisor, multiplexer, and manager can be exercised
/// deterministically in tests.
pub trait DaemonTransport: Send + Sync {
    /// Establish a fresh connection to the worker.
    ///
    /// # Errors
    /// Returns [`DaemonError::PythonNotFound`] or [`DaemonError::ScriptNotFound`]
    /// when the worker cannot be launched, or [`DaemonError::Unavailable`] for
    /// other launch failures.
    fn connect(&self) -> Result<WireHandle, DaemonError>;
}

/// Deterministic reply produced by a scripted responder
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Successful envelope with the given result payload
    Success(Value),
    /// Failed envelope carrying the given error message
    Failure(String),
    /// Successful envelope emitted only after the given delay
    Delayed(Duration, Value),
    /// A verbatim line emitted in place of a well-formed envelope
    Raw(String),
    /// No reply at all; the caller is left to time out
    Silent,
    /// Simulate the worker exiting before replying
    Disconnect,
}

/// In-memory transport driven by a responder function
///
/// The responder receives each decoded request and decides the reply, keyed
/// by whatever it likes - typically the method name.
pub struct ScriptedTransport {
    responder: Arc<dyn Fn(&DaemonRequest) -> ScriptedReply + Send + Sync>,
}

impl ScriptedTransport {
    /// Build a scripted transport around the given responder.
    pub fn new(
        responder: impl Fn(&DaemonRequest) -> ScriptedReply + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Arc::new(responder),
        }
    }
}

impl DaemonTransport for ScriptedTransport {
    fn connect(&self) -> Result<WireHandle, DaemonError> {
        let (out_tx, mut out_rx) = mpsc::channel::<String>(32);
        let (event_tx, event_rx) = mpsc::channel::<WireEvent>(32);
        let responder = Arc::clone(&self.responder);

        tokio::spawn(async move {
            while let Some(line) = out_rx.recv().await {
                let Ok(request) = serde_json::from_str::<DaemonRequest>(&line) else {
                    debug!(line = %line, "scripted worker ignoring unparseable request");
                    continue;
                };

                let event = match responder(&request) {
                    ScriptedReply::Success(result) => WireEvent::Response(DaemonResponse {
                        id: request.id,
                        success: true,
                        result: Some(result),
                        error: None,
                    }),
                    ScriptedReply::Failure(message) => WireEvent::Response(DaemonResponse {
                        id: request.id,
                        success: false,
                        result: None,
                        error: Some(message),
                    }),
                    ScriptedReply::Delayed(after, result) => {
                        tokio::time::sleep(after).await;
                        WireEvent::Response(DaemonResponse {
                            id: request.id,
                            success: true,
                            result: Some(result),
                            error: None,
                        })
                    }
                    ScriptedReply::Raw(raw) => match decode_response(&raw) {
                        Ok(response) => WireEvent::Response(response),
                        Err(failure) => WireEvent::Malformed {
                            id: failure.id,
                            raw: failure.raw,
                        },
                    },
                    ScriptedReply::Silent => continue,
                    ScriptedReply::Disconnect => {
                        let _ = event_tx.send(WireEvent::Closed).await;
                        return;
                    }
                };

                if event_tx.send(event).await.is_err() {
                    return;
                }
            }
            // All request senders dropped: the connection is over
            let _ = event_tx.send(WireEvent::Closed).await;
        });

        Ok(WireHandle {
            outbound: out_tx,
            events: event_rx,
            kill: None,
            pid: None,
        })
    }
}
