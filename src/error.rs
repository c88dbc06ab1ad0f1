use thiserror::Error;

use crate::ai_client::RewriteError;
use crate::config::ConfigError;

/// Failures a single pipeline run can end with.
///
/// None of these are fatal: the pipeline turns each one into a user
/// notification and returns to idle.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("no clipboard method produced usable content")]
    ClipboardUnavailable,
    #[error("rewrite service failed: {0}")]
    RewriteServiceFailure(#[from] RewriteError),
    #[error("configuration could not be read or written: {0}")]
    ConfigIoFailure(#[from] ConfigError),
}
