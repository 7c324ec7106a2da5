use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum EraError {
    #[error("invalid county link: {0}")]
    Validation(String),

    #[error("download failed: {0}")]
    Fetch(String),

    #[error("source returned status {status}: {message}")]
    FetchStatus { status: u16, message: String },

    #[error("failed to read table headers: {0}")]
    HeaderRead(String),

    #[error("failed to read table row: {0}")]
    RowRead(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("failed to persist result: {0}")]
    Persistence(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("parse error at {stage} stage: {source}")]
    Stage {
        stage: ParseStage,
        #[source]
        source: Box<EraError>,
    },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl EraError {
    pub fn at_stage(stage: ParseStage, err: EraError) -> Self {
        match err {
            EraError::Cancelled => EraError::Cancelled,
            other => EraError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Innermost error once stage wrappers are peeled off.
    pub fn root(&self) -> &EraError {
        match self {
            EraError::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    Download,
    Process,
}

impl fmt::Display for ParseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseStage::Download => write!(f, "download"),
            ParseStage::Process => write!(f, "process"),
        }
    }
}
