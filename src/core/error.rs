//! Error types for the chunklod terrain core

use thiserror::Error;

/// Main error type for the terrain core
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Chunk label {label} out of range (chunk count {count})")]
    Range { label: i32, count: u32 },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Streaming error: {0}")]
    Streaming(String),
}
