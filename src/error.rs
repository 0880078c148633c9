use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Main application error type for failures that stop a whole run
#[derive(Error, Debug)]
pub enum SubstError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system traversal error: {path} - {reason}")]
    FileSystemTraversal { path: PathBuf, reason: String },

    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },
}

/// Strict parsing failed; the document is not well-formed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("XML parse failed: {reason}")]
pub struct ParseFailure {
    pub reason: String,
}

impl ParseFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Every repair strategy in the chain was tried and none produced a well-formed document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("XML repair failed after {} attempt(s): {}", .attempts.len(), summarize_attempts(.attempts))]
pub struct RepairFailure {
    /// (strategy name, reason) in the order the strategies ran
    pub attempts: Vec<(&'static str, String)>,
}

fn summarize_attempts(attempts: &[(&'static str, String)]) -> String {
    if attempts.is_empty() {
        return "no repair strategy configured".to_string();
    }
    attempts
        .iter()
        .map(|(name, reason)| format!("{}: {}", name, reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// File-scoped failures raised while backing up, rewriting or relocating a file
#[derive(Error, Debug)]
pub enum OrganizeError {
    #[error("Backup failed for {file}: {source}")]
    BackupWriteFailure {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Destination already exists: {destination}")]
    DestinationCollision { destination: PathBuf },

    #[error("Failed to write new content to {file}: {source}")]
    WriteBack {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {file} to {destination}: {source}")]
    Relocation {
        file: PathBuf,
        destination: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OrganizeError {
    /// Collisions are warnings; everything else aborts the file
    pub fn is_collision(&self) -> bool {
        matches!(self, OrganizeError::DestinationCollision { .. })
    }
}

/// LibXML2-specific error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibXml2Error {
    #[error("Input too large for libxml2: {size} bytes")]
    InputTooLarge { size: usize },

    #[error("Recovery parse produced no document{}", .details.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
    NoDocument { details: Option<String> },

    #[error("Recovered document has no root element")]
    NoRootElement,

    #[error("Memory allocation failed in libxml2")]
    MemoryAllocation,

    #[error("Serialization failed with code {code}")]
    SerializationFailed { code: i32 },
}

impl From<ConfigError> for SubstError {
    fn from(err: ConfigError) -> Self {
        SubstError::Config(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, SubstError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;
