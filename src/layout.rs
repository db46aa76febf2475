//! On-disk layout of a dataset
//!
//! ```text
//! <dataset-root>/
//!   _metadata.json          dataset metadata
//!   <item-name>/
//!     _metadata.json        item metadata
//!     <array-name>.json     array metadata
//!     <array-name>.<ext>    array payload, codec selected by <ext>
//! ```

use crate::error::{JbofError, Result};
use crate::io::TEMP_PREFIX;
use std::path::{Path, PathBuf};

/// Name of the metadata file of datasets and items
pub const METADATA_FILE: &str = "_metadata.json";

/// Stem of [`METADATA_FILE`], unavailable as an array name
const METADATA_STEM: &str = "_metadata";

/// Extension of array metadata files
pub const ARRAY_METADATA_EXTENSION: &str = "json";

/// Path of the metadata file inside a dataset or item directory
pub fn metadata_path(dir: &Path) -> PathBuf {
    dir.join(METADATA_FILE)
}

/// Path of an array's metadata file
pub fn array_metadata_path(item_dir: &Path, name: &str) -> PathBuf {
    item_dir.join(format!("{name}.{ARRAY_METADATA_EXTENSION}"))
}

/// File name of an array's payload for a given codec extension
pub fn array_data_filename(name: &str, extension: &str) -> String {
    format!("{name}.{extension}")
}

/// Codec extension encoded in an array's data file name
pub fn extension_of<'a>(array_name: &str, data_filename: &'a str) -> Option<&'a str> {
    data_filename
        .strip_prefix(array_name)
        .and_then(|rest| rest.strip_prefix('.'))
        .filter(|ext| !ext.is_empty())
}

/// Array name of a metadata file name, if it is an array metadata file
pub fn array_name_of(filename: &str) -> Option<&str> {
    if filename == METADATA_FILE || filename.starts_with(TEMP_PREFIX) {
        return None;
    }
    filename
        .strip_suffix(ARRAY_METADATA_EXTENSION)
        .and_then(|stem| stem.strip_suffix('.'))
        .filter(|stem| !stem.is_empty())
}

/// Check that a name can be used as a single path component
fn validate_component(kind: &str, name: &str) -> Result<()> {
    let invalid = |reason: &str| -> Result<()> {
        Err(JbofError::InvalidName(format!("{kind} {name:?} {reason}")))
    };
    if name.is_empty() {
        return invalid("is empty");
    }
    if name == "." || name == ".." || name.starts_with('.') {
        return invalid("must not start with '.'");
    }
    if name.contains(['/', '\\', '\0']) {
        return invalid("must not contain path separators");
    }
    Ok(())
}

/// Validate an item name
pub fn validate_item_name(name: &str) -> Result<()> {
    validate_component("item name", name)
}

/// Validate an array name
pub fn validate_array_name(name: &str) -> Result<()> {
    validate_component("array name", name)?;
    if name == METADATA_STEM {
        return Err(JbofError::InvalidName(format!(
            "array name {name:?} collides with the item metadata file"
        )));
    }
    Ok(())
}
