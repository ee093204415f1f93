use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};

use mlx_bridge::config::Config;
use mlx_bridge::correction::CorrectionService;
use mlx_bridge::daemon::{DaemonManager, ProcessTransport};
use mlx_bridge::model_cache::HubCache;
use mlx_bridge::telemetry;
use mlx_bridge::transcription::TranscriptionService;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    println!("✓ Config loaded from ~/.mlx-bridge.toml");

    telemetry::init(config.telemetry.enabled, &config.telemetry.log_path)?;
    tracing::info!("mlx-bridge starting");

    let python_path = Config::expand_path(&config.daemon.python_path)?;
    let script_path = config
        .daemon
        .script_path
        .as_deref()
        .map(Config::expand_path)
        .transpose()?;
    let hub_cache = Config::expand_path(&config.models.hub_cache_dir)?;
    let prompt_path = config
        .correction
        .prompt_path
        .as_deref()
        .map(Config::expand_path)
        .transpose()?;

    let manager = Arc::new(DaemonManager::new(
        Box::new(ProcessTransport::new(python_path.clone(), script_path)),
        Duration::from_secs(config.daemon.request_timeout_secs),
        Duration::from_secs(config.daemon.ping_timeout_secs),
    ));

    let correction = CorrectionService::new(
        Arc::clone(&manager),
        Box::new(HubCache::new(hub_cache.clone())),
        python_path.clone(),
        config.correction.repo.clone(),
        prompt_path,
        config.correction.max_change_ratio,
    );
    let transcription = TranscriptionService::new(
        Arc::clone(&manager),
        Box::new(HubCache::new(hub_cache)),
        python_path,
        config.transcription.repo.clone(),
    );

    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_else(|| "check".to_owned());

    let outcome = match command.as_str() {
        "check" => check(&manager, &correction, &transcription).await,
        "transcribe" => {
            let Some(pcm_path) = args.next() else {
                bail!("usage: mlx-bridge transcribe <pcm-file>");
            };
            transcribe(&transcription, Path::new(&pcm_path)).await
        }
        "correct" => {
            let text: Vec<String> = args.collect();
            if text.is_empty() {
                bail!("usage: mlx-bridge correct <text...>");
            }
            correct(&correction, &text.join(" ")).await
        }
        other => bail!("unknown command: {other} (expected check, transcribe, or correct)"),
    };

    manager.shutdown().await;
    outcome
}

/// Validate the full setup and report daemon health.
async fn check(
    manager: &DaemonManager,
    correction: &CorrectionService,
    transcription: &TranscriptionService,
) -> Result<()> {
    match transcription.validate_setup() {
        Ok(()) => println!("✓ Transcription setup OK"),
        Err(error) => println!("✗ Transcription: {error}"),
    }
    match correction.validate_setup() {
        Ok(()) => println!("✓ Correction setup OK"),
        Err(error) => println!("✗ Correction: {error}"),
    }

    if manager.ping().await {
        if let Some(pid) = manager.pid().await {
            println!("✓ Daemon is up (pid {pid})");
        } else {
            println!("✓ Daemon is up");
        }
    } else {
        println!("✗ Daemon did not answer ping");
    }

    Ok(())
}

async fn transcribe(transcription: &TranscriptionService, pcm_path: &Path) -> Result<()> {
    transcription.warmup().await?;
    let text = transcription.transcribe(pcm_path).await?;
    println!("{text}");
    Ok(())
}

async fn correct(correction: &CorrectionService, text: &str) -> Result<()> {
    correction.warmup().await?;
    let corrected = correction.correct(text).await?;
    println!("{corrected}");
    Ok(())
}
