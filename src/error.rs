use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum TabmetaError {
    #[error("invalid hierarchy level: {0}")]
    InvalidLevel(String),

    #[error("structurally invalid resolution request: {0}")]
    StructuralMismatch(String),

    #[error("platform request failed: {0}")]
    PlatformHttp(String),

    #[error("platform returned status {status}: {message}")]
    PlatformStatus { status: u16, message: String },

    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("missing config file tabmeta.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("required column not found in table: {0}")]
    MissingColumn(String),

    #[error("failed to read table at {0}")]
    TableRead(PathBuf),

    #[error("failed to parse table: {0}")]
    TableParse(String),

    #[error("failed to parse key map: {0}")]
    KeyMapParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
