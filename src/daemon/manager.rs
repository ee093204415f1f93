use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::warn;

use super::error::DaemonError;
use super::mux::RequestMultiplexer;
use super::protocol::{DaemonResponse, Method};
use super::supervisor::{WorkerState, WorkerSupervisor};
use super::transport::DaemonTransport;

/// Model families the worker can preload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupKind {
    /// Parakeet ASR model
    Parakeet,
    /// mlx-lm correction model
    Correction,
}

impl WarmupKind {
    /// Wire value of the warmup `type` parameter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parakeet => "parakeet",
            Self::Correction => "mlx",
        }
    }
}

/// Facade over the daemon bridge
///
/// One instance owns the single worker process. Construct it once at the
/// application's composition root and pass the handle to whoever needs it;
/// tests construct their own instance over a [`super::ScriptedTransport`].
pub struct DaemonManager {
    supervisor: Arc<WorkerSupervisor>,
    mux: Arc<RequestMultiplexer>,
    request_timeout: Duration,
    ping_timeout: Duration,
}

impl DaemonManager {
    /// Build a manager over the given transport.
    #[must_use]
    pub fn new(
        transport: Box<dyn DaemonTransport>,
        request_timeout: Duration,
        ping_timeout: Duration,
    ) -> Self {
        let mux = Arc::new(RequestMultiplexer::new());
        let supervisor = Arc::new(WorkerSupervisor::new(
            transport,
            Arc::clone(&mux),
            ping_timeout,
        ));
        Self {
            supervisor,
            mux,
            request_timeout,
            ping_timeout,
        }
    }

    /// Transcribe a raw PCM file with the Parakeet model hosted by the worker.
    ///
    /// # Errors
    /// Any [`DaemonError`]; worker-reported failures arrive verbatim as
    /// [`DaemonError::Remote`] for the transcription service to interpret.
    pub async fn transcribe(&self, repo: &str, pcm_path: &Path) -> Result<String, DaemonError> {
        let mut params = Map::new();
        params.insert("repo".to_owned(), Value::from(repo));
        params.insert(
            "pcm_path".to_owned(),
            Value::from(pcm_path.to_string_lossy().into_owned()),
        );
        let response = self
            .call(Method::Transcribe, params, self.request_timeout)
            .await?;
        extract_text(&response)
    }

    /// Semantically correct `text` with the mlx-lm model hosted by the worker.
    ///
    /// The optional `prompt` overrides the worker's default system prompt for
    /// this call only.
    ///
    /// # Errors
    /// Any [`DaemonError`]; worker-reported failures arrive verbatim as
    /// [`DaemonError::Remote`] for the correction service to interpret.
    pub async fn correct(
        &self,
        repo: &str,
        text: &str,
        prompt: Option<&str>,
    ) -> Result<String, DaemonError> {
        let mut params = Map::new();
        params.insert("repo".to_owned(), Value::from(repo));
        params.insert("text".to_owned(), Value::from(text));
        if let Some(prompt) = prompt {
            params.insert("prompt".to_owned(), Value::from(prompt));
        }
        let response = self
            .call(Method::Correct, params, self.request_timeout)
            .await?;
        extract_text(&response)
    }

    /// Preload a model into the worker so the first real call does not pay
    /// its load time. Only success or failure matters; the payload is ignored.
    ///
    /// # Errors
    /// Any [`DaemonError`].
    pub async fn warmup(&self, kind: WarmupKind, repo: &str) -> Result<(), DaemonError> {
        let mut params = Map::new();
        params.insert("type".to_owned(), Value::from(kind.as_str()));
        params.insert("repo".to_owned(), Value::from(repo));
        self.call(Method::Warmup, params, self.request_timeout)
            .await?;
        Ok(())
    }

    /// Health probe. Returns `false` rather than failing when the worker
    /// cannot be confirmed ready within the short ping timeout.
    pub async fn ping(&self) -> bool {
        match self.call(Method::Ping, Map::new(), self.ping_timeout).await {
            Ok(_) => true,
            Err(error) => {
                warn!("daemon ping failed: {error}");
                false
            }
        }
    }

    /// Current lifecycle state of the worker.
    pub async fn state(&self) -> WorkerState {
        self.supervisor.state().await
    }

    /// OS process id of the live worker, if any.
    pub async fn pid(&self) -> Option<u32> {
        self.supervisor.pid().await
    }

    /// Stop the worker process. Terminal for this manager instance.
    pub async fn shutdown(&self) {
        self.supervisor.terminate().await;
    }

    async fn call(
        &self,
        method: Method,
        params: Map<String, Value>,
        timeout: Duration,
    ) -> Result<DaemonResponse, DaemonError> {
        let outbound = self.supervisor.ensure_ready().await?;
        let response = self.mux.call(&outbound, method, params, timeout).await?;

        if response.success {
            Ok(response)
        } else {
            match response.error {
                Some(message) => Err(DaemonError::Remote(message)),
                // A failure envelope without a message is not interpretable
                None => Err(DaemonError::InvalidResponse(format!(
                    "failure response without error message (id {})",
                    response.id
                ))),
            }
        }
    }
}

/// Pull the text payload out of a successful envelope. The worker returns
/// either a bare string or an object with a `text` field.
fn extract_text(response: &DaemonResponse) -> Result<String, DaemonError> {
    let text = response.result.as_ref().and_then(|value| match value {
        Value::String(text) => Some(text.clone()),
        Value::Object(fields) => fields
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_owned),
        _ => None,
    });

    text.ok_or_else(|| {
        DaemonError::InvalidResponse(
            response
                .result
                .clone()
                .unwrap_or(Value::Null)
                .to_string(),
        )
    })
}
