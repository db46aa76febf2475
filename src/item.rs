//! Items: one directory holding item metadata and a set of arrays

use crate::dataset::StoreContext;
use crate::error::{JbofError, Result};
use crate::io;
use crate::layout;
use crate::metadata::{self, Metadata, FILENAME_KEY};
use crate::types::Tensor;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// A decoded array together with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    pub name: String,
    pub tensor: Tensor,
    /// Metadata supplied when the array was added
    pub metadata: Metadata,
    /// Information reported by the codec while decoding, e.g. a sample rate
    pub codec_metadata: Metadata,
}

/// Handle to one item of a dataset
///
/// Cloning is cheap; clones share the metadata and listing caches.
#[derive(Debug, Clone)]
pub struct Item {
    inner: Arc<ItemInner>,
}

#[derive(Debug)]
struct ItemInner {
    name: String,
    dir: PathBuf,
    context: Arc<StoreContext>,
    /// Item metadata as stored
    metadata: RwLock<Option<Arc<Metadata>>>,
    /// Array metadata as stored, including the reserved filename field
    arrays: RwLock<HashMap<String, Arc<Metadata>>>,
    /// Sorted array names from the first listing
    array_names: RwLock<Option<Vec<String>>>,
}

impl Item {
    pub(crate) fn new(name: String, dir: PathBuf, context: Arc<StoreContext>) -> Self {
        Self {
            inner: Arc::new(ItemInner {
                name,
                dir,
                context,
                metadata: RwLock::new(None),
                arrays: RwLock::new(HashMap::new()),
                array_names: RwLock::new(None),
            }),
        }
    }

    /// Name of the item, unique within its dataset
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Directory of the item
    pub fn path(&self) -> &Path {
        &self.inner.dir
    }

    pub(crate) fn stored_metadata(&self) -> Result<Arc<Metadata>> {
        if let Some(metadata) = self.inner.metadata.read().as_ref() {
            return Ok(Arc::clone(metadata));
        }
        let path = layout::metadata_path(&self.inner.dir);
        let metadata = match metadata::read_metadata(&path) {
            Ok(metadata) => Arc::new(metadata),
            Err(e) if io::is_not_found(&e) => {
                return Err(JbofError::ItemNotFound(self.inner.name.clone()))
            }
            Err(e) => return Err(e),
        };
        *self.inner.metadata.write() = Some(Arc::clone(&metadata));
        Ok(metadata)
    }

    /// Item metadata
    pub fn metadata(&self) -> Result<Metadata> {
        Ok(metadata::strip_reserved((*self.stored_metadata()?).clone()))
    }

    /// A single metadata value
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        if key.starts_with(metadata::RESERVED_PREFIX) {
            return Ok(None);
        }
        Ok(self.stored_metadata()?.get(key).cloned())
    }

    /// Whether an array of that name exists, judged by its metadata file
    pub fn has_array(&self, name: &str) -> bool {
        layout::validate_array_name(name).is_ok()
            && layout::array_metadata_path(&self.inner.dir, name).is_file()
    }

    /// Names of all arrays, sorted
    pub fn array_names(&self) -> Result<Vec<String>> {
        if let Some(names) = self.inner.array_names.read().as_ref() {
            return Ok(names.clone());
        }
        let entries = match io::list(&self.inner.dir) {
            Ok(entries) => entries,
            Err(e) if io::is_not_found(&e) => {
                return Err(JbofError::ItemNotFound(self.inner.name.clone()))
            }
            Err(e) => return Err(e),
        };
        let names: Vec<String> = entries
            .iter()
            .filter(|entry| !entry.is_dir)
            .filter_map(|entry| layout::array_name_of(&entry.name))
            .map(str::to_string)
            .collect();
        *self.inner.array_names.write() = Some(names.clone());
        Ok(names)
    }

    /// Stored metadata of an array, including reserved keys
    pub(crate) fn array_record(&self, name: &str) -> Result<Arc<Metadata>> {
        if let Some(record) = self.inner.arrays.read().get(name) {
            return Ok(Arc::clone(record));
        }
        layout::validate_array_name(name)?;
        let path = layout::array_metadata_path(&self.inner.dir, name);
        let record = match metadata::read_metadata(&path) {
            Ok(record) => Arc::new(record),
            Err(e) if io::is_not_found(&e) => return Err(self.array_not_found(name)),
            Err(e) => return Err(e),
        };
        self.inner
            .arrays
            .write()
            .insert(name.to_string(), Arc::clone(&record));
        Ok(record)
    }

    /// Data file name and codec extension recorded for an array
    pub(crate) fn data_file(&self, name: &str, record: &Metadata) -> Result<(String, String)> {
        let stored = match record.get(FILENAME_KEY) {
            Some(Value::String(s)) => s,
            _ => {
                return Err(JbofError::Corrupt(format!(
                    "metadata of array {:?} in item {:?} has no {FILENAME_KEY} field",
                    name, self.inner.name
                )))
            }
        };
        // Older writers recorded a path rather than a bare file name.
        let filename = Path::new(stored)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or(stored)
            .to_string();
        let extension = layout::extension_of(name, &filename)
            .ok_or_else(|| {
                JbofError::Corrupt(format!(
                    "data file {filename:?} does not belong to array {name:?}"
                ))
            })?
            .to_string();
        Ok((filename, extension))
    }

    /// Metadata of an array, without decoding its data
    pub fn array_metadata(&self, name: &str) -> Result<Metadata> {
        Ok(metadata::strip_reserved((*self.array_record(name)?).clone()))
    }

    /// Read and decode an array
    pub fn array(&self, name: &str) -> Result<Array> {
        let record = self.array_record(name)?;
        let (filename, extension) = self.data_file(name, &record)?;
        let bytes = match io::read(&self.inner.dir.join(&filename)) {
            Ok(bytes) => bytes,
            Err(e) if io::is_not_found(&e) => {
                // Metadata gone as well means the array was deleted under us.
                if !layout::array_metadata_path(&self.inner.dir, name).exists() {
                    self.forget_array(name);
                    return Err(self.array_not_found(name));
                }
                return Err(JbofError::Corrupt(format!(
                    "array {:?} in item {:?} references missing data file {:?}",
                    name, self.inner.name, filename
                )));
            }
            Err(e) => return Err(e),
        };
        let decoded = self.inner.context.registry.decode(&bytes, &extension)?;
        Ok(Array {
            name: name.to_string(),
            tensor: decoded.tensor,
            metadata: metadata::strip_reserved((*record).clone()),
            codec_metadata: decoded.metadata,
        })
    }

    /// All arrays, decoded one at a time as the iterator advances
    pub fn all_arrays(&self) -> Result<impl Iterator<Item = Result<Array>> + '_> {
        let names = self.array_names()?;
        Ok(names.into_iter().map(move |name| self.array(&name)))
    }

    /// Add an array using the dataset's default format
    pub fn add_array(&self, name: &str, tensor: &Tensor, metadata: Metadata) -> Result<()> {
        let format = self.inner.context.options.default_format.clone();
        self.add_array_with_format(name, tensor, metadata, &format)
    }

    /// Add an array, encoding it with the codec registered for `format`
    ///
    /// The data file is written before the metadata file, so an array is
    /// never visible without its data. Unless overwriting is allowed, both
    /// files are created without replacing existing ones: of several writers
    /// racing for one name, exactly one succeeds and the others leave no
    /// trace. A data file left behind by an interrupted write blocks the name
    /// until it is removed; [`DataSet::scan`](crate::DataSet::scan) reports it.
    pub fn add_array_with_format(
        &self,
        name: &str,
        tensor: &Tensor,
        metadata: Metadata,
        format: &str,
    ) -> Result<()> {
        let context = &self.inner.context;
        context.ensure_writable("add an array")?;
        layout::validate_array_name(name)?;
        metadata::validate_user_metadata(&metadata)?;
        if !layout::metadata_path(&self.inner.dir).is_file() {
            return Err(JbofError::ItemNotFound(self.inner.name.clone()));
        }

        let metadata_path = layout::array_metadata_path(&self.inner.dir, name);
        let previous = if metadata_path.exists() {
            if !context.options.allow_overwrite {
                return Err(JbofError::AlreadyExists(format!(
                    "array {:?} in item {:?}",
                    name, self.inner.name
                )));
            }
            metadata::read_metadata(&metadata_path)
                .ok()
                .and_then(|record| self.data_file(name, &record).ok())
                .map(|(filename, _)| filename)
        } else {
            None
        };

        let codec = context.registry.encoder(format)?;
        let bytes = codec.encode(tensor)?;
        let filename = layout::array_data_filename(name, codec.extension());
        let data_path = self.inner.dir.join(&filename);
        let already_exists = || {
            JbofError::AlreadyExists(format!("array {:?} in item {:?}", name, self.inner.name))
        };

        let mut record = metadata;
        record.insert(FILENAME_KEY.to_string(), Value::String(filename.clone()));
        if context.options.allow_overwrite {
            io::write_atomic(&data_path, &bytes)?;
            metadata::write_metadata(&metadata_path, &record, context.options.pretty_metadata)?;
        } else {
            // The data file is the claim on the name; a loser never touches it.
            io::create_atomic(&data_path, &bytes).map_err(|e| match e {
                JbofError::AlreadyExists(_) => already_exists(),
                other => other,
            })?;
            if let Err(e) =
                metadata::create_metadata(&metadata_path, &record, context.options.pretty_metadata)
            {
                // Our claimed data file is unreferenced; another codec won the name.
                if let Err(cleanup) = io::remove_file(&data_path) {
                    warn!(item = %self.inner.name, array = name, error = %cleanup, "failed to remove unclaimed data file");
                }
                return Err(match e {
                    JbofError::AlreadyExists(_) => already_exists(),
                    other => other,
                });
            }
        }

        // A replaced array stored under another codec leaves its old payload behind.
        if let Some(old) = previous.filter(|old| *old != filename) {
            io::remove_file(&self.inner.dir.join(old))?;
        }

        self.inner
            .arrays
            .write()
            .insert(name.to_string(), Arc::new(record));
        if let Some(names) = self.inner.array_names.write().as_mut() {
            if let Err(pos) = names.binary_search_by(|n| n.as_str().cmp(name)) {
                names.insert(pos, name.to_string());
            }
        }

        debug!(
            item = %self.inner.name,
            array = name,
            format = codec.extension(),
            bytes = bytes.len(),
            "added array"
        );
        Ok(())
    }

    /// Delete an array
    ///
    /// The metadata file goes first, so readers stop seeing the array before
    /// its data disappears.
    pub fn delete_array(&self, name: &str) -> Result<()> {
        self.inner.context.ensure_writable("delete an array")?;
        layout::validate_array_name(name)?;

        let metadata_path = layout::array_metadata_path(&self.inner.dir, name);
        let filename = match metadata::read_metadata(&metadata_path) {
            Ok(record) => match self.data_file(name, &record) {
                Ok((filename, _)) => Some(filename),
                Err(e) => {
                    warn!(item = %self.inner.name, array = name, error = %e, "deleting array without a known data file");
                    None
                }
            },
            Err(e) if io::is_not_found(&e) => return Err(self.array_not_found(name)),
            Err(JbofError::Corrupt(msg)) => {
                warn!(item = %self.inner.name, array = name, "deleting array with unreadable metadata: {msg}");
                None
            }
            Err(e) => return Err(e),
        };

        io::remove_file(&metadata_path)?;
        match filename {
            Some(filename) => {
                io::remove_file(&self.inner.dir.join(filename))?;
            }
            // Without a readable record, any payload named for a known codec is this array's.
            None => {
                for extension in self.inner.context.registry.extensions() {
                    let candidate = layout::array_data_filename(name, extension);
                    if io::remove_file(&self.inner.dir.join(&candidate))? {
                        debug!(item = %self.inner.name, array = name, file = %candidate, "removed data file");
                    }
                }
            }
        }
        self.forget_array(name);

        debug!(item = %self.inner.name, array = name, "deleted array");
        Ok(())
    }

    /// Drop cached metadata and listings; later reads go to disk again
    pub fn clear_cache(&self) {
        *self.inner.metadata.write() = None;
        self.inner.arrays.write().clear();
        *self.inner.array_names.write() = None;
    }

    fn forget_array(&self, name: &str) {
        self.inner.arrays.write().remove(name);
        if let Some(names) = self.inner.array_names.write().as_mut() {
            names.retain(|n| n != name);
        }
    }

    fn array_not_found(&self, name: &str) -> JbofError {
        JbofError::ArrayNotFound(format!("{}/{}", self.inner.name, name))
    }
}

#[cfg(test)]
mod tests {
    use crate::dataset::DataSet;
    use crate::error::JbofError;
    use crate::metadata::Metadata;
    use crate::types::Tensor;
    use ndarray::{arr1, arr2};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn object(value: Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    fn dataset(temp_dir: &TempDir) -> DataSet {
        DataSet::create(temp_dir.path().join("ds"), Metadata::new(), None).unwrap()
    }

    #[test]
    fn test_add_and_read_array() {
        let temp_dir = TempDir::new().unwrap();
        let ds = dataset(&temp_dir);
        let item = ds.add_item(Some("a"), Metadata::new()).unwrap();

        let tensor = Tensor::from(arr2(&[[1i64, 2, 3], [4, 5, 6]]).into_dyn());
        item.add_array("arr", &tensor, object(json!({"unit": "m"})))
            .unwrap();

        let array = item.array("arr").unwrap();
        assert_eq!(array.name, "arr");
        assert_eq!(array.tensor, tensor);
        assert_eq!(array.metadata, object(json!({"unit": "m"})));
        assert!(array.codec_metadata.is_empty());

        // The reserved field is on disk but never handed out.
        let stored: Value =
            serde_json::from_slice(&std::fs::read(item.path().join("arr.json")).unwrap()).unwrap();
        assert_eq!(stored["_filename"], json!("arr.npy"));
        assert!(item.path().join("arr.npy").is_file());
    }

    #[test]
    fn test_array_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let ds = dataset(&temp_dir);
        let item = ds.add_item(Some("a"), Metadata::new()).unwrap();
        assert!(matches!(item.array("nope"), Err(JbofError::ArrayNotFound(_))));
        assert!(matches!(
            item.array_metadata("nope"),
            Err(JbofError::ArrayNotFound(_))
        ));
        assert!(!item.has_array("nope"));
    }

    #[test]
    fn test_add_existing_array() {
        let temp_dir = TempDir::new().unwrap();
        let ds = dataset(&temp_dir);
        let item = ds.add_item(Some("a"), Metadata::new()).unwrap();
        let first = Tensor::from(arr1(&[1u8, 2]).into_dyn());
        let second = Tensor::from(arr1(&[3u8]).into_dyn());

        item.add_array("x", &first, Metadata::new()).unwrap();
        assert!(matches!(
            item.add_array("x", &second, Metadata::new()),
            Err(JbofError::AlreadyExists(_))
        ));
        assert_eq!(item.array("x").unwrap().tensor, first);
    }

    #[test]
    fn test_reserved_array_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let ds = dataset(&temp_dir);
        let item = ds.add_item(Some("a"), Metadata::new()).unwrap();
        let tensor = Tensor::from(arr1(&[1u8]).into_dyn());
        assert!(matches!(
            item.add_array("x", &tensor, object(json!({"_filename": "evil"}))),
            Err(JbofError::ReservedKey(_))
        ));
        assert!(!item.has_array("x"));
        assert!(!item.path().join("x.npy").exists());
    }

    #[test]
    fn test_delete_array() {
        let temp_dir = TempDir::new().unwrap();
        let ds = dataset(&temp_dir);
        let item = ds.add_item(Some("a"), Metadata::new()).unwrap();
        let tensor = Tensor::from(arr1(&[1.0f32, 2.0]).into_dyn());
        item.add_array("x", &tensor, Metadata::new()).unwrap();
        item.add_array("y", &tensor, Metadata::new()).unwrap();
        assert_eq!(item.array_names().unwrap(), vec!["x", "y"]);

        item.delete_array("x").unwrap();
        assert!(matches!(item.array("x"), Err(JbofError::ArrayNotFound(_))));
        assert_eq!(item.array_names().unwrap(), vec!["y"]);
        assert!(!item.path().join("x.npy").exists());
        assert!(!item.path().join("x.json").exists());

        assert!(matches!(
            item.delete_array("x"),
            Err(JbofError::ArrayNotFound(_))
        ));
    }

    #[test]
    fn test_delete_tolerates_missing_data() {
        let temp_dir = TempDir::new().unwrap();
        let ds = dataset(&temp_dir);
        let item = ds.add_item(Some("a"), Metadata::new()).unwrap();
        let tensor = Tensor::from(arr1(&[1i32]).into_dyn());
        item.add_array("x", &tensor, Metadata::new()).unwrap();
        std::fs::remove_file(item.path().join("x.npy")).unwrap();

        assert!(matches!(item.array("x"), Err(JbofError::Corrupt(_))));
        item.delete_array("x").unwrap();
        assert!(!item.has_array("x"));
    }

    #[test]
    fn test_cached_metadata_after_external_delete() {
        let temp_dir = TempDir::new().unwrap();
        let ds = dataset(&temp_dir);
        let item = ds.add_item(Some("a"), Metadata::new()).unwrap();
        let tensor = Tensor::from(arr1(&[1i32]).into_dyn());
        item.add_array("x", &tensor, Metadata::new()).unwrap();
        item.array_metadata("x").unwrap();

        // Another process removes the array behind this handle's back.
        std::fs::remove_file(item.path().join("x.json")).unwrap();
        std::fs::remove_file(item.path().join("x.npy")).unwrap();

        let err = item.array("x").unwrap_err();
        assert!(err.is_not_found(), "{err:?}");
    }

    #[test]
    fn test_all_arrays() {
        let temp_dir = TempDir::new().unwrap();
        let ds = dataset(&temp_dir);
        let item = ds.add_item(Some("a"), Metadata::new()).unwrap();
        for (i, name) in ["c", "a", "b"].iter().enumerate() {
            let tensor = Tensor::from(arr1(&[i as u16]).into_dyn());
            item.add_array_with_format(name, &tensor, object(json!({"i": i})), "npy.gz")
                .unwrap();
        }

        let arrays: Vec<_> = item.all_arrays().unwrap().map(|a| a.unwrap()).collect();
        let names: Vec<&str> = arrays.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(arrays[0].metadata, object(json!({"i": 1})));
        assert!(item.path().join("a.npy.gz").is_file());

        // Restartable
        assert_eq!(item.all_arrays().unwrap().count(), 3);
    }

    #[test]
    fn test_overwrite_switches_codec() {
        let temp_dir = TempDir::new().unwrap();
        let ds = DataSet::create_with_options(
            temp_dir.path().join("ds"),
            Metadata::new(),
            None,
            crate::DataSetOptions::default().with_allow_overwrite(true),
        )
        .unwrap();
        let item = ds.add_item(Some("a"), Metadata::new()).unwrap();
        let first = Tensor::from(arr1(&[1i32]).into_dyn());
        let second = Tensor::from(arr1(&[2i32, 3]).into_dyn());

        item.add_array("x", &first, Metadata::new()).unwrap();
        item.add_array_with_format("x", &second, Metadata::new(), "npy.zst")
            .unwrap();

        assert_eq!(item.array("x").unwrap().tensor, second);
        assert!(!item.path().join("x.npy").exists());
        assert!(item.path().join("x.npy.zst").exists());
    }

    #[test]
    fn test_invalid_array_names() {
        let temp_dir = TempDir::new().unwrap();
        let ds = dataset(&temp_dir);
        let item = ds.add_item(Some("a"), Metadata::new()).unwrap();
        let tensor = Tensor::from(arr1(&[1i32]).into_dyn());
        for name in ["", "_metadata", "../escape", ".hidden"] {
            assert!(matches!(
                item.add_array(name, &tensor, Metadata::new()),
                Err(JbofError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn test_legacy_path_filename() {
        let temp_dir = TempDir::new().unwrap();
        let ds = dataset(&temp_dir);
        let item = ds.add_item(Some("a"), Metadata::new()).unwrap();
        let tensor = Tensor::from(arr1(&[7i16, 8]).into_dyn());
        item.add_array("x", &tensor, Metadata::new()).unwrap();

        // Older datasets record the data file as a path.
        std::fs::write(
            item.path().join("x.json"),
            br#"{"_filename": "ds/a/x.npy", "note": "legacy"}"#,
        )
        .unwrap();
        item.clear_cache();

        let array = item.array("x").unwrap();
        assert_eq!(array.tensor, tensor);
        assert_eq!(array.metadata, object(json!({"note": "legacy"})));
    }

    #[test]
    fn test_missing_filename_field_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let ds = dataset(&temp_dir);
        let item = ds.add_item(Some("a"), Metadata::new()).unwrap();
        std::fs::write(item.path().join("x.json"), br#"{"note": 1}"#).unwrap();
        assert!(matches!(item.array("x"), Err(JbofError::Corrupt(_))));
    }

    #[test]
    fn test_delete_with_unreadable_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let ds = dataset(&temp_dir);
        let item = ds.add_item(Some("a"), Metadata::new()).unwrap();
        let tensor = Tensor::from(arr1(&[1i32]).into_dyn());
        item.add_array("x", &tensor, Metadata::new()).unwrap();
        item.add_array_with_format("y", &tensor, Metadata::new(), "npy.zst")
            .unwrap();
        std::fs::write(item.path().join("x.json"), b"not json").unwrap();
        std::fs::write(item.path().join("y.json"), br#"{"note": 1}"#).unwrap();
        item.clear_cache();

        item.delete_array("x").unwrap();
        item.delete_array("y").unwrap();
        assert!(!item.path().join("x.json").exists());
        assert!(!item.path().join("x.npy").exists());
        assert!(!item.path().join("y.json").exists());
        assert!(!item.path().join("y.npy.zst").exists());
        assert!(item.array_names().unwrap().is_empty());
    }

    #[test]
    fn test_leftover_data_file_is_not_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let ds = dataset(&temp_dir);
        let item = ds.add_item(Some("a"), Metadata::new()).unwrap();
        // Payload of an interrupted write, never published.
        std::fs::write(item.path().join("x.npy"), b"leftover").unwrap();

        let tensor = Tensor::from(arr1(&[5u8]).into_dyn());
        assert!(matches!(
            item.add_array("x", &tensor, Metadata::new()),
            Err(JbofError::AlreadyExists(_))
        ));
        assert_eq!(std::fs::read(item.path().join("x.npy")).unwrap(), b"leftover");
        assert!(!item.has_array("x"));

        // Another codec's file name is free.
        item.add_array_with_format("x", &tensor, Metadata::new(), "npy.gz")
            .unwrap();
        assert_eq!(item.array("x").unwrap().tensor, tensor);
    }
}
