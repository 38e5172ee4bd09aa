//! Layer construction errors.

use thiserror::Error;

use crate::cache::WatermarkError;
use crate::grid::LevelSetError;

/// Errors that can occur while building a [`TileLayer`](super::TileLayer).
#[derive(Debug, Error)]
pub enum LayerError {
    #[error("invalid level set: {0}")]
    Levels(#[from] LevelSetError),

    #[error("invalid cache watermarks: {0}")]
    Watermarks(#[from] WatermarkError),

    /// A required collaborator was not supplied to the builder.
    #[error("tile layer needs a {0}")]
    Missing(&'static str),
}
