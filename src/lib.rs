// lib.rs
// Description: Transformer models for EEG/EMG sleep-stage epoch classification and the
//              metrics used to evaluate them.
// History:
// - 2026-10-12: Split library from the binary.

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod freq;
pub mod layer;
pub mod math;
pub mod meter;
pub mod metrics;
pub mod models;
pub mod plot;
pub mod transformer;

pub use config::ModelConfig;
pub use error::{MetricsError, ModelError};
pub use models::{build_model, EpochModel, ModelKind, ModelOutput};
