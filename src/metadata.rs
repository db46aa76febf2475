//! JSON metadata files and reserved keys
//!
//! Every dataset, item and array owns exactly one JSON object on disk.
//! Internal bookkeeping lives next to user metadata under keys starting with
//! [`RESERVED_PREFIX`]; such keys are rejected when supplied by callers and
//! stripped before metadata is handed back.

use crate::error::{JbofError, Result};
use crate::io;
use serde_json::Value;
use std::path::Path;

/// A metadata object
pub type Metadata = serde_json::Map<String, Value>;

/// Prefix of keys reserved for internal use
pub const RESERVED_PREFIX: &str = "_";

/// Array metadata: name of the sibling data file, which carries the codec extension
pub const FILENAME_KEY: &str = "_filename";

/// Dataset metadata: template used to derive item names from item metadata
pub const ENTRY_FORMAT_KEY: &str = "_entryformat";

/// Reject user metadata that uses the reserved prefix
pub fn validate_user_metadata(metadata: &Metadata) -> Result<()> {
    match metadata.keys().find(|key| key.starts_with(RESERVED_PREFIX)) {
        Some(key) => Err(JbofError::ReservedKey(key.clone())),
        None => Ok(()),
    }
}

/// Remove all reserved keys, returning what remains
pub fn strip_reserved(mut metadata: Metadata) -> Metadata {
    metadata.retain(|key, _| !key.starts_with(RESERVED_PREFIX));
    metadata
}

/// Read a metadata file
///
/// A missing file is reported as [`std::io::ErrorKind::NotFound`] so callers
/// can map it to the right kind of absence; anything that is not a JSON
/// object is [`JbofError::Corrupt`].
pub fn read_metadata(path: &Path) -> Result<Metadata> {
    let bytes = io::read(path)?;
    parse_metadata(path, &bytes)
}

/// Parse the contents of a metadata file
pub fn parse_metadata(path: &Path, bytes: &[u8]) -> Result<Metadata> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| JbofError::Corrupt(format!("{}: {}", path.display(), e)))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(JbofError::Corrupt(format!(
            "{}: expected a JSON object, found {}",
            path.display(),
            json_kind(&other)
        ))),
    }
}

/// Serialize a metadata object
pub fn to_bytes(metadata: &Metadata, pretty: bool) -> Result<Vec<u8>> {
    let bytes = if pretty {
        serde_json::to_vec_pretty(metadata)?
    } else {
        serde_json::to_vec(metadata)?
    };
    Ok(bytes)
}

/// Atomically write a metadata file, replacing any existing one
pub fn write_metadata(path: &Path, metadata: &Metadata, pretty: bool) -> Result<()> {
    io::write_atomic(path, &to_bytes(metadata, pretty)?)
}

/// Atomically write a metadata file, failing if one already exists
pub fn create_metadata(path: &Path, metadata: &Metadata, pretty: bool) -> Result<()> {
    io::create_atomic(path, &to_bytes(metadata, pretty)?)
}

/// Canonical bytes of a metadata object: compact, keys sorted
pub fn canonical_bytes(metadata: &Metadata) -> Result<Vec<u8>> {
    // serde_json's Map is ordered by key unless `preserve_order` is enabled.
    let sorted: std::collections::BTreeMap<&String, &Value> = metadata.iter().collect();
    Ok(serde_json::to_vec(&sorted)?)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
