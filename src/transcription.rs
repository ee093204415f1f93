use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::daemon::{DaemonError, DaemonManager, WarmupKind};
use crate::model_cache::ModelStore;

/// Errors surfaced by the transcription service
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// The configured Python interpreter does not exist.
    #[error("python interpreter not found at {}", .0.display())]
    PythonNotFound(PathBuf),

    /// The ASR model has no local snapshot.
    #[error("transcription model {0} is not downloaded")]
    ModelNotDownloaded(String),

    /// A Python package the worker needs is not installed.
    #[error("python package {package} is missing (install with `{install}`)")]
    DependencyMissing {
        /// Distribution name of the missing package
        package: String,
        /// Shell command that installs it
        install: String,
    },

    /// The worker failed for a reason we have no better name for.
    #[error("transcription failed: {0}")]
    Failed(String),

    /// Daemon-level failure, passed through unchanged.
    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

/// Packages the worker imports for Parakeet transcription, with the error
/// signatures their absence produces (module name and loader wrapper text).
const KNOWN_DEPENDENCIES: &[(&str, &str, &str)] = &[
    ("parakeet-mlx", "parakeet_mlx", "parakeet-mlx import failed"),
    ("numpy", "numpy", "numpy import failed"),
    ("mlx", "mlx", "mlx.core import failed"),
];

/// Alternate ASR backed by the daemon's Parakeet model
///
/// The audio pipeline hands this service a filesystem path to raw PCM; the
/// worker loads and transcribes it so the samples never cross the wire.
pub struct TranscriptionService {
    manager: Arc<DaemonManager>,
    store: Box<dyn ModelStore>,
    python_path: PathBuf,
    repo: String,
}

impl TranscriptionService {
    /// Build the service for the given model repo.
    pub fn new(
        manager: Arc<DaemonManager>,
        store: Box<dyn ModelStore>,
        python_path: PathBuf,
        repo: String,
    ) -> Self {
        Self {
            manager,
            store,
            python_path,
            repo,
        }
    }

    /// Pre-flight checks: interpreter present, model snapshot on disk.
    ///
    /// # Errors
    /// [`TranscriptionError::PythonNotFound`] or
    /// [`TranscriptionError::ModelNotDownloaded`].
    pub fn validate_setup(&self) -> Result<(), TranscriptionError> {
        if !self.python_path.exists() {
            return Err(TranscriptionError::PythonNotFound(self.python_path.clone()));
        }
        if !self.store.contains(&self.repo) {
            return Err(TranscriptionError::ModelNotDownloaded(self.repo.clone()));
        }
        Ok(())
    }

    /// Transcribe the PCM file at `pcm_path`.
    ///
    /// # Errors
    /// Pre-flight failures, translated worker failures
    /// ([`TranscriptionError::DependencyMissing`],
    /// [`TranscriptionError::Failed`]), or a passed-through [`DaemonError`].
    pub async fn transcribe(&self, pcm_path: &Path) -> Result<String, TranscriptionError> {
        self.validate_setup()?;

        let text = self
            .manager
            .transcribe(&self.repo, pcm_path)
            .await
            .map_err(|error| self.translate(error))?;

        info!(text_len = text.len(), "daemon transcription completed");
        Ok(text)
    }

    /// Preload the ASR model into the worker.
    ///
    /// # Errors
    /// Translated worker failures or a passed-through [`DaemonError`].
    pub async fn warmup(&self) -> Result<(), TranscriptionError> {
        info!(repo = %self.repo, "warming up transcription model");
        self.manager
            .warmup(WarmupKind::Parakeet, &self.repo)
            .await
            .map_err(|error| self.translate(error))
    }

    /// Map raw daemon failures into actionable transcription errors. Only
    /// the text of `Remote` is interpreted; the rest of the taxonomy passes
    /// through unchanged.
    fn translate(&self, error: DaemonError) -> TranscriptionError {
        match error {
            DaemonError::Remote(message) => self.translate_remote(message),
            other => TranscriptionError::Daemon(other),
        }
    }

    fn translate_remote(&self, message: String) -> TranscriptionError {
        for (package, module, wrapper) in KNOWN_DEPENDENCIES {
            if message.contains(&format!("No module named '{module}'"))
                || message.contains(wrapper)
            {
                return TranscriptionError::DependencyMissing {
                    package: (*package).to_owned(),
                    install: format!("pip install {package}"),
                };
            }
        }
        if message.contains("not available offline") {
            return TranscriptionError::ModelNotDownloaded(self.repo.clone());
        }
        TranscriptionError::Failed(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::{Method, ScriptedReply, ScriptedTransport};
    use crate::model_cache::MockModelStore;
    use serde_json::json;
    use std::time::Duration;

    fn scripted_manager(
        responder: impl Fn(&crate::daemon::DaemonRequest) -> ScriptedReply + Send + Sync + 'static,
    ) -> Arc<DaemonManager> {
        Arc::new(DaemonManager::new(
            Box::new(ScriptedTransport::new(move |request| match request.method {
                Method::Ping => ScriptedReply::Success(json!({"pong": true})),
                _ => responder(request),
            })),
            Duration::from_millis(500),
            Duration::from_millis(200),
        ))
    }

    fn cached_store() -> Box<MockModelStore> {
        let mut store = MockModelStore::new();
        store.expect_contains().return_const(true);
        Box::new(store)
    }

    fn temp_python() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let python = dir.path().join("python3");
        std::fs::write(&python, "").unwrap();
        (dir, python)
    }

    fn service_with(
        manager: Arc<DaemonManager>,
        store: Box<dyn ModelStore>,
        python: PathBuf,
    ) -> TranscriptionService {
        TranscriptionService::new(manager, store, python, "mlx-community/test-asr".to_owned())
    }

    #[test]
    fn test_validate_setup_missing_python() {
        let manager = scripted_manager(|_| ScriptedReply::Silent);
        let service = service_with(
            manager,
            cached_store(),
            PathBuf::from("/nonexistent/python3"),
        );

        assert!(matches!(
            service.validate_setup(),
            Err(TranscriptionError::PythonNotFound(_))
        ));
    }

    #[test]
    fn test_validate_setup_missing_model() {
        let (_dir, python) = temp_python();
        let mut store = MockModelStore::new();
        store.expect_contains().return_const(false);

        let manager = scripted_manager(|_| ScriptedReply::Silent);
        let service = service_with(manager, Box::new(store), python);

        assert!(matches!(
            service.validate_setup(),
            Err(TranscriptionError::ModelNotDownloaded(_))
        ));
    }

    #[tokio::test]
    async fn test_transcribe_happy_path() {
        let (_dir, python) = temp_python();
        let manager = scripted_manager(|request| {
            assert_eq!(request.params["repo"], "mlx-community/test-asr");
            ScriptedReply::Success(json!({"text": "hello from parakeet"}))
        });
        let service = service_with(manager, cached_store(), python);

        let text = service.transcribe(Path::new("/tmp/audio.pcm")).await.unwrap();
        assert_eq!(text, "hello from parakeet");
    }

    #[tokio::test]
    async fn test_missing_parakeet_translates_to_dependency_missing() {
        let (_dir, python) = temp_python();
        let manager = scripted_manager(|_| {
            ScriptedReply::Failure(
                "parakeet-mlx import failed: No module named 'parakeet_mlx'".to_owned(),
            )
        });
        let service = service_with(manager, cached_store(), python);

        match service.transcribe(Path::new("/tmp/audio.pcm")).await {
            Err(TranscriptionError::DependencyMissing { package, install }) => {
                assert_eq!(package, "parakeet-mlx");
                assert_eq!(install, "pip install parakeet-mlx");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_numpy_translates_to_dependency_missing() {
        let (_dir, python) = temp_python();
        let manager =
            scripted_manager(|_| ScriptedReply::Failure("No module named 'numpy'".to_owned()));
        let service = service_with(manager, cached_store(), python);

        match service.transcribe(Path::new("/tmp/audio.pcm")).await {
            Err(TranscriptionError::DependencyMissing { package, .. }) => {
                assert_eq!(package, "numpy");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_pcm_file_translates_to_failed() {
        let (_dir, python) = temp_python();
        let manager = scripted_manager(|_| {
            ScriptedReply::Failure("PCM file not found: /tmp/gone.pcm".to_owned())
        });
        let service = service_with(manager, cached_store(), python);

        match service.transcribe(Path::new("/tmp/gone.pcm")).await {
            Err(TranscriptionError::Failed(message)) => {
                assert!(message.contains("/tmp/gone.pcm"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_offline_model_translates_to_not_downloaded() {
        let (_dir, python) = temp_python();
        let manager = scripted_manager(|_| {
            ScriptedReply::Failure("Model not available offline: snapshot missing".to_owned())
        });
        let service = service_with(manager, cached_store(), python);

        assert!(matches!(
            service.transcribe(Path::new("/tmp/audio.pcm")).await,
            Err(TranscriptionError::ModelNotDownloaded(_))
        ));
    }

    #[tokio::test]
    async fn test_warmup_uses_parakeet_kind() {
        let (_dir, python) = temp_python();
        let manager = scripted_manager(|request| {
            assert_eq!(request.params["type"], "parakeet");
            ScriptedReply::Success(json!({"success": true}))
        });
        let service = service_with(manager, cached_store(), python);

        service.warmup().await.unwrap();
    }
}
