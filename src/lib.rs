//! MLX Bridge - client for a long-lived Python ML daemon
//!
//! Hosts the app-side half of the dictation pipeline: a supervised worker
//! process that keeps heavy ML models (Parakeet ASR, mlx-lm correction)
//! loaded across requests, plus the services that talk to it.

/// Configuration management
pub mod config;
/// Semantic correction service with the safe-merge guard
pub mod correction;
/// Daemon bridge: wire codec, process supervisor, request multiplexer, manager
pub mod daemon;
/// Edit-distance guard for model-proposed corrections
pub mod merge;
/// Local model cache probing
pub mod model_cache;
/// Telemetry and crash logging
pub mod telemetry;
/// Parakeet transcription service
pub mod transcription;
