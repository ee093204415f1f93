use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub daemon: DaemonConfig,
    pub correction: CorrectionConfig,
    pub transcription: TranscriptionConfig,
    pub models: ModelsConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DaemonConfig {
    pub python_path: String,
    pub script_path: Option<String>,
    pub request_timeout_secs: u64,
    pub ping_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorrectionConfig {
    pub repo: String,
    pub prompt_path: Option<String>,
    pub max_change_ratio: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptionConfig {
    pub repo: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    pub hub_cache_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub log_path: String,
}

impl Config {
    /// Load config from ~/.mlx-bridge.toml
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default(&config_path).context("failed to create default config")?;
        }

        let contents = fs::read_to_string(&config_path).context("failed to read config file")?;

        let config: Config = toml::from_str(&contents).context("failed to parse config TOML")?;

        Ok(config)
    }

    fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".mlx-bridge.toml"))
    }

    fn create_default(path: &PathBuf) -> Result<()> {
        let default_config = r#"[daemon]
python_path = "~/.mlx-bridge/venv/bin/python3"
request_timeout_secs = 120
ping_timeout_secs = 5

[correction]
repo = "mlx-community/Qwen2.5-1.5B-Instruct-4bit"
max_change_ratio = 0.5

[transcription]
repo = "mlx-community/parakeet-tdt-0.6b-v3"

[models]
hub_cache_dir = "~/.cache/huggingface/hub"

[telemetry]
enabled = true
log_path = "~/.mlx-bridge/bridge.log"
"#;
        fs::write(path, default_config).context("failed to write default config")?;
        Ok(())
    }

    /// Expand ~ in paths to home directory
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if path.starts_with("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(&path[2..]))
        } else {
            Ok(PathBuf::from(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[daemon]
python_path = "/opt/venv/bin/python3"
script_path = "/opt/app/ml_daemon.py"
request_timeout_secs = 90
ping_timeout_secs = 3

[correction]
repo = "mlx-community/Qwen2.5-1.5B-Instruct-4bit"
prompt_path = "~/.mlx-bridge/prompt.txt"
max_change_ratio = 0.4

[transcription]
repo = "mlx-community/parakeet-tdt-0.6b-v3"

[models]
hub_cache_dir = "~/.cache/huggingface/hub"

[telemetry]
enabled = false
log_path = "~/.mlx-bridge/bridge.log"
"#;

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.daemon.python_path, "/opt/venv/bin/python3");
        assert_eq!(
            config.daemon.script_path.as_deref(),
            Some("/opt/app/ml_daemon.py")
        );
        assert_eq!(config.daemon.request_timeout_secs, 90);
        assert_eq!(config.correction.max_change_ratio, 0.4);
        assert_eq!(config.transcription.repo, "mlx-community/parakeet-tdt-0.6b-v3");
        assert!(!config.telemetry.enabled);
    }

    #[test]
    fn test_script_path_is_optional() {
        let trimmed = SAMPLE.replace("script_path = \"/opt/app/ml_daemon.py\"\n", "");
        let config: Config = toml::from_str(&trimmed).unwrap();
        assert_eq!(config.daemon.script_path, None);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let home = std::env::var("HOME").unwrap();
        let result = Config::expand_path("~/models/cache").unwrap();
        assert_eq!(result, PathBuf::from(home).join("models/cache"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let result = Config::expand_path("/opt/venv/bin/python3").unwrap();
        assert_eq!(result, PathBuf::from("/opt/venv/bin/python3"));
    }
}
