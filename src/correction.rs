use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::daemon::{DaemonError, DaemonManager, WarmupKind};
use crate::merge;
use crate::model_cache::ModelStore;

/// System prompt sent to the correction model when no prompt file is
/// configured and the caller does not override it.
pub const DEFAULT_CORRECTION_PROMPT: &str = "Clean up this speech transcription: fix typos, \
    grammar, punctuation, and remove filler words (um, uh, like, you know). Keep the original \
    language. Output only the corrected text.";

/// Errors surfaced by the correction service
#[derive(Debug, Error)]
pub enum CorrectionError {
    /// The configured Python interpreter does not exist.
    #[error("python interpreter not found at {}", .0.display())]
    PythonNotFound(PathBuf),

    /// The correction model has no local snapshot; it must be downloaded
    /// from Settings before correction can run.
    #[error("correction model {0} is not downloaded")]
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
    #[error("correction failed: {0}")]
    Failed(String),

    /// Daemon-level failure, passed through unchanged.
    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

/// Text correction backed by the daemon's mlx-lm model
///
/// Wraps the manager with pre-flight checks and error translation, and runs
/// every accepted correction through the safe-merge guard: the guard's
/// decision, not the model's, determines what text callers receive.
pub struct CorrectionService {
    manager: Arc<DaemonManager>,
    store: Box<dyn ModelStore>,
    python_path: PathBuf,
    repo: String,
    prompt_path: Option<PathBuf>,
    max_change_ratio: f64,
}

impl CorrectionService {
    /// Build the service.
    ///
    /// `prompt_path` points at an optional system-prompt file read per call,
    /// so edits apply without restarting; `max_change_ratio` bounds how far
    /// an accepted correction may diverge from the original text.
    pub fn new(
        manager: Arc<DaemonManager>,
        store: Box<dyn ModelStore>,
        python_path: PathBuf,
        repo: String,
        prompt_path: Option<PathBuf>,
        max_change_ratio: f64,
    ) -> Self {
        Self {
            manager,
            store,
            python_path,
            repo,
            prompt_path,
            max_change_ratio,
        }
    }

    /// Pre-flight checks: interpreter present, model snapshot on disk.
    ///
    /// Run before any daemon call so a guaranteed failure does not cost a
    /// round trip.
    ///
    /// # Errors
    /// [`CorrectionError::PythonNotFound`] or
    /// [`CorrectionError::ModelNotDownloaded`].
    pub fn validate_setup(&self) -> Result<(), CorrectionError> {
        if !self.python_path.exists() {
            return Err(CorrectionError::PythonNotFound(self.python_path.clone()));
        }
        if !self.store.contains(&self.repo) {
            return Err(CorrectionError::ModelNotDownloaded(self.repo.clone()));
        }
        Ok(())
    }

    /// Correct `text` with the default system prompt.
    ///
    /// # Errors
    /// See [`Self::correct_with_prompt`].
    pub async fn correct(&self, text: &str) -> Result<String, CorrectionError> {
        self.correct_with_prompt(text, None).await
    }

    /// Correct `text`, optionally overriding the system prompt for this call.
    ///
    /// The corrected text is only returned when the safe-merge guard accepts
    /// it; otherwise the original comes back unchanged.
    ///
    /// # Errors
    /// Pre-flight failures, translated worker failures
    /// ([`CorrectionError::DependencyMissing`], [`CorrectionError::Failed`]),
    /// or a passed-through [`DaemonError`].
    pub async fn correct_with_prompt(
        &self,
        text: &str,
        prompt_override: Option<&str>,
    ) -> Result<String, CorrectionError> {
        self.validate_setup()?;

        let prompt = self.system_prompt(prompt_override);
        let corrected = self
            .manager
            .correct(&self.repo, text, Some(&prompt))
            .await
            .map_err(|error| self.translate(error))?;

        debug!(
            original_len = text.len(),
            corrected_len = corrected.len(),
            "daemon returned correction"
        );

        Ok(merge::safe_merge(text, &corrected, self.max_change_ratio))
    }

    /// Preload the correction model into the worker.
    ///
    /// # Errors
    /// Translated worker failures or a passed-through [`DaemonError`].
    pub async fn warmup(&self) -> Result<(), CorrectionError> {
        info!(repo = %self.repo, "warming up correction model");
        self.manager
            .warmup(WarmupKind::Correction, &self.repo)
            .await
            .map_err(|error| self.translate(error))
    }

    /// Resolve the system prompt: per-call override, then prompt file, then
    /// the built-in default.
    fn system_prompt(&self, prompt_override: Option<&str>) -> String {
        if let Some(prompt) = prompt_override {
            if !prompt.trim().is_empty() {
                return prompt.to_owned();
            }
        }

        if let Some(path) = &self.prompt_path {
            match fs::read_to_string(path) {
                Ok(contents) if !contents.trim().is_empty() => {
                    return contents.trim().to_owned();
                }
                Ok(_) => debug!(path = %path.display(), "prompt file is empty, using default"),
                Err(error) => {
                    warn!(path = %path.display(), "failed to read prompt file: {error}");
                }
            }
        }

        DEFAULT_CORRECTION_PROMPT.to_owned()
    }

    /// Map raw daemon failures into actionable correction errors. Only the
    /// text of `Remote` is interpreted; the rest of the taxonomy passes
    /// through unchanged.
    fn translate(&self, error: DaemonError) -> CorrectionError {
        match error {
            DaemonError::Remote(message) => self.translate_remote(message),
            other => CorrectionError::Daemon(other),
        }
    }

    fn translate_remote(&self, message: String) -> CorrectionError {
        if message.contains("No module named 'mlx_lm'")
            || message.contains("mlx-lm import failed")
        {
            return CorrectionError::DependencyMissing {
                package: "mlx-lm".to_owned(),
                install: "pip install mlx-lm".to_owned(),
            };
        }
        if message.contains("not available offline") {
            return CorrectionError::ModelNotDownloaded(self.repo.clone());
        }
        CorrectionError::Failed(message)
    }
}
