//! Error taxonomy for the indexing pipeline (spec §7): configuration
//! failures fail fast, subprocess/parse/resolution issues degrade
//! gracefully and are counted, store errors abort and roll back.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("subprocess failure in stage {stage}: {detail}")]
    Subprocess { stage: &'static str, detail: String },

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;
