use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::error::DaemonError;
use super::protocol::decode_response;
use super::transport::{DaemonTransport, WireEvent, WireHandle};

/// Filename of the worker entrypoint script.
const WORKER_SCRIPT_NAME: &str = "ml_daemon.py";

/// Spawns the real Python worker and wires its pipes into the bridge
///
/// The worker reads one JSON request per stdin line and writes one JSON
/// response per stdout line; closing its stdin ends its read loop, so a
/// graceful shutdown is just dropping the outbound channel.
pub struct ProcessTransport {
    python_path: PathBuf,
    script_path: Option<PathBuf>,
}

impl ProcessTransport {
    /// Create a transport for the given interpreter and optional explicit
    /// worker script location.
    #[must_use]
    pub const fn new(python_path: PathBuf, script_path: Option<PathBuf>) -> Self {
        Self {
            python_path,
            script_path,
        }
    }

    /// Locate the worker script: explicit config path first, then the
    /// `resources` directory next to the executable (packaged layout), then
    /// the development tree.
    fn locate_script(&self) -> Result<PathBuf, DaemonError> {
        if let Some(path) = &self.script_path {
            return if path.exists() {
                Ok(path.clone())
            } else {
                Err(DaemonError::ScriptNotFound)
            };
        }

        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let bundled = dir.join("resources").join(WORKER_SCRIPT_NAME);
                if bundled.exists() {
                    return Ok(bundled);
                }
            }
        }

        let dev = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("python")
            .join(WORKER_SCRIPT_NAME);
        if dev.exists() {
            return Ok(dev);
        }

        Err(DaemonError::ScriptNotFound)
    }
}

impl DaemonTransport for ProcessTransport {
    fn connect(&self) -> Result<WireHandle, DaemonError> {
        if !self.python_path.exists() {
            return Err(DaemonError::PythonNotFound(self.python_path.clone()));
        }
        let script = self.locate_script()?;

        info!(
            python = %self.python_path.display(),
            script = %script.display(),
            "spawning ml daemon"
        );

        let mut child = Command::new(&self.python_path)
            .arg("-u")
            .arg(&script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|_| DaemonError::PythonNotFound(self.python_path.clone()))?;

        let pid = child.id();

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DaemonError::Unavailable("worker stdin unavailable".to_owned()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DaemonError::Unavailable("worker stdout unavailable".to_owned()))?;

        // Stdin writer: one envelope per line. Ending this task drops stdin,
        // which ends the worker's read loop.
        let (out_tx, mut out_rx) = mpsc::channel::<String>(32);
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = out_rx.recv().await {
                debug!(line = %line, "daemon <-");
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.write_all(b"\n").await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        // Stdout reader: decode each line and forward it as an event. EOF
        // means the worker is gone.
        let (event_tx, event_rx) = mpsc::channel::<WireEvent>(32);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(line = %line, "daemon ->");
                let event = match decode_response(&line) {
                    Ok(response) => WireEvent::Response(response),
                    Err(failure) => WireEvent::Malformed {
                        id: failure.id,
                        raw: failure.raw,
                    },
                };
                if event_tx.send(event).await.is_err() {
                    return;
                }
            }
            let _ = event_tx.send(WireEvent::Closed).await;
        });

        // Model libraries chatter on stderr (download progress, warnings);
        // forward it to the log instead of losing it.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(line = %line, "daemon stderr");
                }
            });
        }

        // Reaper: wait for natural exit, or hard-kill on request.
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => log_exit(status),
                request = kill_rx => {
                    if request.is_ok() {
                        info!("terminating ml daemon process");
                        if let Err(error) = child.kill().await {
                            warn!("failed to kill ml daemon: {error}");
                        }
                    }
                    log_exit(child.wait().await);
                }
            }
        });

        Ok(WireHandle {
            outbound: out_tx,
            events: event_rx,
            kill: Some(kill_tx),
            pid,
        })
    }
}

fn log_exit(status: std::io::Result<ExitStatus>) {
    match status {
        Ok(status) => info!(%status, "ml daemon exited"),
        Err(error) => warn!("failed to reap ml daemon: {error}"),
    }
}
