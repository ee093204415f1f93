//! Bridge to the out-of-process ML worker
//!
//! The worker is a long-lived Python process hosting the heavy models
//! (Parakeet ASR, mlx-lm correction) so they survive across requests.
//! Communication is newline-delimited JSON over stdin/stdout.
//!
//! The worker is a single shared resource: the multiplexer keeps at most one
//! request on the wire at a time, and concurrent callers queue in arrival
//! order. A call timeout is a purely local decision - the worker cannot be
//! interrupted mid-computation, so a late response is discarded as an orphan.

/// Error taxonomy for daemon calls
pub mod error;
/// Manager facade: transcribe / correct / warmup / ping
pub mod manager;
/// Request correlation and serialized dispatch
pub mod mux;
/// Real subprocess transport
pub mod process;
/// Request/response envelopes and the line codec
pub mod protocol;
/// Worker lifecycle state machine
pub mod supervisor;
/// Transport seam between supervisor and worker
pub mod transport;

pub use error::DaemonError;
pub use manager::{DaemonManager, WarmupKind};
pub use process::ProcessTransport;
pub use protocol::{DaemonRequest, DaemonResponse, Method, RequestId};
pub use supervisor::WorkerState;
pub use transport::{DaemonTransport, ScriptedReply, ScriptedTransport, WireEvent, WireHandle};
