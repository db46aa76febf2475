//! Error types for JBOF operations

use thiserror::Error;

/// Main error type for dataset operations
#[derive(Error, Debug)]
pub enum JbofError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dataset not found: {0}")]
    DataSetNotFound(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Array not found: {0}")]
    ArrayNotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Dataset is opened read-only, refusing to {0}")]
    ReadOnly(String),

    #[error("Corrupt dataset: {0}")]
    Corrupt(String),

    #[error("Not an array file: {0}")]
    NotAnArrayFile(String),

    #[error("Unsupported array file version: {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("Unsupported dtype: {0}")]
    UnsupportedDType(String),

    #[error("Unsupported array format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid array data: {0}")]
    InvalidFormat(String),

    #[error("Metadata key {0:?} uses the reserved prefix")]
    ReservedKey(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Checksum is undefined for this dataset: {0}")]
    NondeterministicDataset(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl JbofError {
    /// True for any of the "does not exist" failures.
    ///
    /// A reader racing a concurrent delete may see one of these and should
    /// treat it as absence rather than corruption.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            JbofError::DataSetNotFound(_) | JbofError::ItemNotFound(_) | JbofError::ArrayNotFound(_)
        )
    }
}

/// Specialized Result type for dataset operations
pub type Result<T> = std::result::Result<T, JbofError>;

impl From<serde_json::Error> for JbofError {
    fn from(err: serde_json::Error) -> Self {
        JbofError::Serialization(err.to_string())
    }
}
