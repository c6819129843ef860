//! Rendering error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// Template parse or render failure, with its cause chain
    #[error("Template error: {0}")]
    Template(String),

    #[error("Template '{0}' is not valid UTF-8")]
    Encoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
