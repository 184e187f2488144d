// error.rs
// Description: Error types for model construction, forward passes, checkpoints and metrics.
// History:
// - 2026-10-12: Replace string error codes with typed enums.

use thiserror::Error;

/// Errors raised while building, running or persisting a model.
#[derive(Error, Debug)]
pub enum ModelError {
    /// A configuration value is out of range or inconsistent.
    #[error("invalid_config: {0}")]
    InvalidConfig(String),

    /// A tensor does not have the shape a layer expects.
    #[error("shape_mismatch in {context}: expected {expected}, got {got}")]
    ShapeMismatch {
        context: &'static str,
        expected: String,
        got: String,
    },

    /// A checkpoint failed validation.
    #[error("checkpoint_invalid: {0}")]
    Checkpoint(String),

    #[error("io_error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json_error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    pub fn shape(context: &'static str, expected: impl ToString, got: impl ToString) -> Self {
        ModelError::ShapeMismatch {
            context,
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }
}

/// Errors raised by the evaluation metrics and meters.
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("class index {index} out of range for {n_classes} classes")]
    ClassOutOfRange { index: usize, n_classes: usize },

    #[error("length mismatch: {predictions} predictions vs {labels} labels")]
    LengthMismatch { predictions: usize, labels: usize },

    #[error("n_classes must be positive")]
    NoClasses,

    /// Raised for an unknown summary type selection.
    #[error("invalid summary type {0:?}")]
    InvalidSummaryType(String),

    #[error("invalid meter format {0:?}")]
    InvalidFormat(String),

    #[error("plot_error: {0}")]
    Plot(#[from] image::ImageError),

    /// The chart backend failed while drawing.
    #[error("render_error: {0}")]
    Render(String),

    #[error("io_error: {0}")]
    Io(#[from] std::io::Error),
}
