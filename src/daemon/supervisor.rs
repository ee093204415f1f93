use std::sync::Arc;
use std::time::Duration;

use serde_json::Map;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{info, warn};

use super::error::DaemonError;
use super::mux::RequestMultiplexer;
use super::protocol::Method;
use super::transport::{DaemonTransport, WireEvent};

/// Lifecycle states of the worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No worker has been spawned yet
    NotStarted,
    /// Spawned, awaiting the initial health check
    Starting,
    /// Health-checked and serving calls
    Ready,
    /// Exited unexpectedly; the next call respawns it
    Crashed,
    /// Shut down explicitly; terminal
    Stopped,
}

struct ActiveLink {
    outbound: mpsc::Sender<String>,
    kill: Option<oneshot::Sender<()>>,
    pid: Option<u32>,
}

struct SupervisorInner {
    state: WorkerState,
    link: Option<ActiveLink>,
    /// Bumped per connection so a stale reader cannot poison a respawn.
    generation: u64,
}

/// Owns the single worker connection and its state machine
///
/// `NotStarted -> Starting -> Ready <-> Crashed -> Starting (respawn)`;
/// any state moves to `Stopped` on explicit termination, and `Stopped` is
/// terminal. Respawn is lazy: a crash only marks the state, and the next
/// call pays for the restart.
pub struct WorkerSupervisor {
    transport: Box<dyn DaemonTransport>,
    mux: Arc<RequestMultiplexer>,
    ping_timeout: Duration,
    /// Serializes spawn attempts so concurrent callers share one worker.
    startup: Mutex<()>,
    inner: Arc<Mutex<SupervisorInner>>,
}

impl WorkerSupervisor {
    /// Create a supervisor over the given transport. No process is spawned
    /// until the first call.
    pub fn new(
        transport: Box<dyn DaemonTransport>,
        mux: Arc<RequestMultiplexer>,
        ping_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            mux,
            ping_timeout,
            startup: Mutex::new(()),
            inner: Arc::new(Mutex::new(SupervisorInner {
                state: WorkerState::NotStarted,
                link: None,
                generation: 0,
            })),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> WorkerState {
        self.inner.lock().await.state
    }

    /// OS process id of the live worker, if any.
    pub async fn pid(&self) -> Option<u32> {
        self.inner.lock().await.link.as_ref().and_then(|link| link.pid)
    }

    /// Return a sender for the live worker's wire, spawning and
    /// health-checking a fresh worker first when necessary.
    ///
    /// # Errors
    /// Propagates transport launch failures ([`DaemonError::PythonNotFound`],
    /// [`DaemonError::ScriptNotFound`]) and reports a failed health check or
    /// an explicit shutdown as [`DaemonError::Unavailable`].
    pub async fn ensure_ready(&self) -> Result<mpsc::Sender<String>, DaemonError> {
        let _startup = self.startup.lock().await;

        {
            let inner = self.inner.lock().await;
            match inner.state {
                WorkerState::Ready => {
                    if let Some(link) = &inner.link {
                        return Ok(link.outbound.clone());
                    }
                }
                WorkerState::Stopped => {
                    return Err(DaemonError::Unavailable(
                        "daemon has been shut down".to_owned(),
                    ));
                }
                WorkerState::NotStarted | WorkerState::Starting | WorkerState::Crashed => {}
            }
        }

        let handle = match self.transport.connect() {
            Ok(handle) => handle,
            Err(error) => {
                self.inner.lock().await.state = WorkerState::Crashed;
                return Err(error);
            }
        };

        let outbound = handle.outbound.clone();
        let pid = handle.pid;
        let generation = {
            let mut inner = self.inner.lock().await;
            inner.generation += 1;
            inner.state = WorkerState::Starting;
            inner.link = Some(ActiveLink {
                outbound: handle.outbound,
                kill: handle.kill,
                pid,
            });
            inner.generation
        };
        self.spawn_router(handle.events, generation);

        match self
            .mux
            .call(&outbound, Method::Ping, Map::new(), self.ping_timeout)
            .await
        {
            Ok(response) if response.success => {
                let mut inner = self.inner.lock().await;
                if inner.generation == generation && inner.state == WorkerState::Starting {
                    inner.state = WorkerState::Ready;
                    info!(pid = ?pid, "ml daemon ready");
                }
                Ok(outbound)
            }
            outcome => {
                let detail = match outcome {
                    Ok(response) => format!("unexpected ping response for id {}", response.id),
                    Err(error) => error.to_string(),
                };
                let mut inner = self.inner.lock().await;
                if inner.generation == generation && inner.state != WorkerState::Stopped {
                    inner.state = WorkerState::Crashed;
                    if let Some(link) = inner.link.take() {
                        if let Some(kill) = link.kill {
                            let _ = kill.send(());
                        }
                    }
                }
                drop(inner);
                Err(DaemonError::Unavailable(format!(
                    "daemon failed health check: {detail}"
                )))
            }
        }
    }

    /// Shut the worker down. Terminal: later calls fail until a new
    /// supervisor is constructed.
    pub async fn terminate(&self) {
        let _startup = self.startup.lock().await;
        {
            let mut inner = self.inner.lock().await;
            if inner.state == WorkerState::Stopped {
                return;
            }
            info!("stopping ml daemon");
            inner.state = WorkerState::Stopped;
            if let Some(link) = inner.link.take() {
                // Dropping the outbound sender closes the worker's stdin;
                // the kill covers a worker that ignores it.
                drop(link.outbound);
                if let Some(kill) = link.kill {
                    let _ = kill.send(());
                }
            }
        }
        self.mux.fail_all("daemon has been shut down").await;
    }

    /// Forward connection events into the multiplexer and watch for EOF.
    fn spawn_router(&self, mut events: mpsc::Receiver<WireEvent>, generation: u64) {
        let mux = Arc::clone(&self.mux);
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    WireEvent::Response(response) => mux.resolve(response).await,
                    WireEvent::Malformed { id, raw } => {
                        warn!(raw = %raw, "undecodable daemon output");
                        if let Some(id) = id {
                            mux.fail(id, DaemonError::InvalidResponse(raw)).await;
                        }
                    }
                    WireEvent::Closed => break,
                }
            }

            let was_current = {
                let mut inner = inner.lock().await;
                let current = inner.generation == generation
                    && matches!(inner.state, WorkerState::Starting | WorkerState::Ready);
                if current {
                    warn!("ml daemon exited unexpectedly");
                    inner.state = WorkerState::Crashed;
                    inner.link = None;
                }
                current
            };

            // Crashes fail every pending call at once rather than leaving
            // them to time out individually.
            if was_current {
                mux.fail_all("daemon exited unexpectedly").await;
            }
        });
    }
}
