// crates/fitload-core/src/error.rs

use std::path::PathBuf;

use thiserror::Error;

use crate::loader::LoadError;
use crate::transform::TransformError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid path {}: {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    #[error("malformed file {}: {reason}", path.display())]
    MalformedFile { path: PathBuf, reason: String },

    #[error("{files} file(s) matched but none yielded records")]
    NoRecords { files: usize },

    #[error("no dataset named `{0}` is configured")]
    UnknownDataset(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid file pattern: {0}")]
    Glob(#[from] glob::PatternError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PipelineError {
    pub fn invalid_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PipelineError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PipelineError::MalformedFile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
