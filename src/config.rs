//! Configuration for dataset handles

use crate::codec::NPY_EXTENSION;
use crate::error::{JbofError, Result};
use serde::{Deserialize, Serialize};

/// Options for opening or creating a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSetOptions {
    /// Refuse every mutating operation
    pub readonly: bool,
    /// Let `add_array` replace an existing array of the same name
    pub allow_overwrite: bool,
    /// Codec extension used when no format is given
    pub default_format: String,
    /// Indent metadata files for human readers
    pub pretty_metadata: bool,
}

impl Default for DataSetOptions {
    fn default() -> Self {
        Self {
            readonly: false,
            allow_overwrite: false,
            default_format: NPY_EXTENSION.to_string(),
            pretty_metadata: true,
        }
    }
}

impl DataSetOptions {
    /// Options for a read-only handle
    pub fn readonly() -> Self {
        Self::default().with_readonly(true)
    }

    /// Parse options from a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| JbofError::Configuration(e.to_string()))
    }

    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn with_allow_overwrite(mut self, allow_overwrite: bool) -> Self {
        self.allow_overwrite = allow_overwrite;
        self
    }

    pub fn with_default_format(mut self, format: impl Into<String>) -> Self {
        self.default_format = format.into();
        self
    }

    pub fn with_pretty_metadata(mut self, pretty: bool) -> Self {
        self.pretty_metadata = pretty;
        self
    }
}
