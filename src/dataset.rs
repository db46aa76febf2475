//! Datasets: a root directory of items plus dataset metadata
//!
//! A directory is a dataset exactly when it holds a `_metadata.json` at its
//! root. Items are the subdirectories that hold their own metadata file;
//! anything else is a remnant of an interrupted write and is ignored.

use crate::codec::CodecRegistry;
use crate::config::DataSetOptions;
use crate::error::{JbofError, Result};
use crate::io;
use crate::item::Item;
use crate::layout;
use crate::metadata::{self, Metadata, ENTRY_FORMAT_KEY};
use crate::utils;
use parking_lot::RwLock;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// State shared by a dataset handle and the item handles it hands out
#[derive(Debug)]
pub(crate) struct StoreContext {
    pub(crate) options: DataSetOptions,
    pub(crate) registry: Arc<CodecRegistry>,
}

impl StoreContext {
    pub(crate) fn ensure_writable(&self, action: &str) -> Result<()> {
        if self.options.readonly {
            return Err(JbofError::ReadOnly(action.to_string()));
        }
        Ok(())
    }
}

/// Handle to a dataset directory
///
/// Metadata and item listings are cached after the first read. Changes made
/// through this handle keep the caches current; changes made by other
/// processes become visible after [`DataSet::clear_cache`].
#[derive(Debug)]
pub struct DataSet {
    root: PathBuf,
    context: Arc<StoreContext>,
    metadata: RwLock<Option<Arc<Metadata>>>,
    items: RwLock<Option<Vec<Item>>>,
}

impl DataSet {
    fn new(root: PathBuf, options: DataSetOptions) -> Self {
        Self {
            root,
            context: Arc::new(StoreContext {
                options,
                registry: Arc::new(CodecRegistry::default()),
            }),
            metadata: RwLock::new(None),
            items: RwLock::new(None),
        }
    }

    /// Create a new dataset at `path`
    ///
    /// `item_name_format` is an optional template such as `"{speaker}_{take}"`
    /// used to name items added without an explicit name.
    ///
    /// `path` must not exist yet, not even as an empty directory; missing
    /// parent directories are created.
    pub fn create(
        path: impl AsRef<Path>,
        metadata: Metadata,
        item_name_format: Option<&str>,
    ) -> Result<Self> {
        Self::create_with_options(path, metadata, item_name_format, DataSetOptions::default())
    }

    pub fn create_with_options(
        path: impl AsRef<Path>,
        metadata: Metadata,
        item_name_format: Option<&str>,
        options: DataSetOptions,
    ) -> Result<Self> {
        let dataset = Self::new(path.as_ref().to_path_buf(), options);
        dataset.context.ensure_writable("create a dataset")?;
        metadata::validate_user_metadata(&metadata)?;

        // Parents are created as needed; the root itself must be new.
        if let Some(parent) = dataset.root.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        io::create_dir(&dataset.root)?;
        let metadata_path = layout::metadata_path(&dataset.root);

        let mut record = metadata;
        record.insert(
            ENTRY_FORMAT_KEY.to_string(),
            item_name_format.map_or(Value::Null, |f| Value::String(f.to_string())),
        );
        metadata::create_metadata(
            &metadata_path,
            &record,
            dataset.context.options.pretty_metadata,
        )
        .map_err(|e| match e {
            JbofError::AlreadyExists(_) => {
                JbofError::AlreadyExists(dataset.root.display().to_string())
            }
            other => other,
        })?;
        *dataset.metadata.write() = Some(Arc::new(record));
        *dataset.items.write() = Some(Vec::new());

        info!("Created dataset at {}", dataset.root.display());
        Ok(dataset)
    }

    /// Open an existing dataset for reading and writing
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, DataSetOptions::default())
    }

    /// Open an existing dataset; every mutation fails with `ReadOnly`
    pub fn open_readonly(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, DataSetOptions::readonly())
    }

    pub fn open_with_options(path: impl AsRef<Path>, options: DataSetOptions) -> Result<Self> {
        let dataset = Self::new(path.as_ref().to_path_buf(), options);
        if !layout::metadata_path(&dataset.root).is_file() {
            return Err(JbofError::DataSetNotFound(
                dataset.root.display().to_string(),
            ));
        }
        debug!(root = %dataset.root.display(), readonly = dataset.is_readonly(), "opened dataset");
        Ok(dataset)
    }

    /// Replace the codec registry, e.g. to add decode-only adapters
    pub fn with_registry(mut self, registry: CodecRegistry) -> Self {
        self.context = Arc::new(StoreContext {
            options: self.context.options.clone(),
            registry: Arc::new(registry),
        });
        // Cached item handles still point at the old registry.
        *self.items.write() = None;
        self
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &DataSetOptions {
        &self.context.options
    }

    pub fn registry(&self) -> &CodecRegistry {
        &self.context.registry
    }

    pub fn is_readonly(&self) -> bool {
        self.context.options.readonly
    }

    pub(crate) fn stored_metadata(&self) -> Result<Arc<Metadata>> {
        if let Some(metadata) = self.metadata.read().as_ref() {
            return Ok(Arc::clone(metadata));
        }
        let metadata = match metadata::read_metadata(&layout::metadata_path(&self.root)) {
            Ok(metadata) => Arc::new(metadata),
            Err(e) if io::is_not_found(&e) => {
                return Err(JbofError::DataSetNotFound(self.root.display().to_string()))
            }
            Err(e) => return Err(e),
        };
        *self.metadata.write() = Some(Arc::clone(&metadata));
        Ok(metadata)
    }

    /// Dataset metadata
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

    /// Template used to name items added without a name
    pub fn item_name_format(&self) -> Result<Option<String>> {
        match self.stored_metadata()?.get(ENTRY_FORMAT_KEY) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(JbofError::Corrupt(format!(
                "{}: {ENTRY_FORMAT_KEY} must be a string, found {other}",
                self.root.display()
            ))),
        }
    }

    fn item_handle(&self, name: &str) -> Item {
        Item::new(
            name.to_string(),
            self.root.join(name),
            Arc::clone(&self.context),
        )
    }

    /// Whether an item of that name exists, judged by its metadata file
    pub fn has_item(&self, name: &str) -> bool {
        layout::validate_item_name(name).is_ok()
            && layout::metadata_path(&self.root.join(name)).is_file()
    }

    /// Handle to an existing item
    pub fn item(&self, name: &str) -> Result<Item> {
        if let Some(items) = self.items.read().as_ref() {
            if let Ok(pos) = items.binary_search_by(|i| i.name().cmp(name)) {
                return Ok(items[pos].clone());
            }
        }
        if !self.has_item(name) {
            return Err(JbofError::ItemNotFound(name.to_string()));
        }
        let item = self.item_handle(name);
        if let Some(items) = self.items.write().as_mut() {
            if let Err(pos) = items.binary_search_by(|i| i.name().cmp(name)) {
                items.insert(pos, item.clone());
            }
        }
        Ok(item)
    }

    fn list_items(&self) -> Result<Vec<Item>> {
        let entries = match io::list(&self.root) {
            Ok(entries) => entries,
            Err(e) if io::is_not_found(&e) => {
                return Err(JbofError::DataSetNotFound(self.root.display().to_string()))
            }
            Err(e) => return Err(e),
        };
        let mut items = Vec::new();
        for entry in entries.into_iter().filter(|e| e.is_dir) {
            if !self.has_item(&entry.name) {
                warn!(entry = %entry.name, "skipping directory without item metadata");
                continue;
            }
            items.push(self.item_handle(&entry.name));
        }
        Ok(items)
    }

    /// All items, sorted by name
    ///
    /// The listing is read once and cached; the returned handles are cheap
    /// clones that share their own metadata caches.
    pub fn all_items(&self) -> Result<impl Iterator<Item = Item>> {
        if let Some(items) = self.items.read().as_ref() {
            return Ok(items.clone().into_iter());
        }
        let items = self.list_items()?;
        *self.items.write() = Some(items.clone());
        Ok(items.into_iter())
    }

    /// Items whose metadata satisfies `predicate`
    ///
    /// Items deleted while the search runs are skipped.
    pub fn find_items_where<F>(&self, predicate: F) -> Result<Vec<Item>>
    where
        F: Fn(&Metadata) -> bool,
    {
        let mut found = Vec::new();
        for item in self.all_items()? {
            match item.stored_metadata() {
                Ok(metadata) if predicate(&metadata) => found.push(item),
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    debug!(item = item.name(), "item vanished during search");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }

    /// Items whose metadata contains every key of `query` with an equal value
    pub fn find_items(&self, query: &Metadata) -> Result<Vec<Item>> {
        self.find_items_where(|metadata| matches_query(query, metadata))
    }

    /// The first item matching `query`, if any
    ///
    /// Stops reading item metadata at the first match.
    pub fn find_item(&self, query: &Metadata) -> Result<Option<Item>> {
        for item in self.all_items()? {
            match item.stored_metadata() {
                Ok(metadata) if matches_query(query, &metadata) => return Ok(Some(item)),
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    debug!(item = item.name(), "item vanished during search");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Add an item
    ///
    /// Without a name, the item is named from the dataset's name template, or
    /// gets a random unique name when the dataset has none.
    ///
    /// Names shaped like a UUID are reserved for generated names, so an
    /// explicit or templated name of that shape fails with `InvalidName`.
    pub fn add_item(&self, name: Option<&str>, metadata: Metadata) -> Result<Item> {
        self.context.ensure_writable("add an item")?;
        metadata::validate_user_metadata(&metadata)?;

        let name = match name {
            Some(name) => chosen_item_name(name.to_string())?,
            None => match self.item_name_format()? {
                Some(template) => {
                    chosen_item_name(utils::format_item_name(&template, &metadata)?)?
                }
                None => utils::synthesize_item_name(),
            },
        };
        layout::validate_item_name(&name)?;

        let dir = self.root.join(&name);
        io::create_dir(&dir).map_err(|e| match e {
            JbofError::AlreadyExists(_) => JbofError::AlreadyExists(format!("item {name:?}")),
            other => other,
        })?;
        if let Err(e) = metadata::create_metadata(
            &layout::metadata_path(&dir),
            &metadata,
            self.context.options.pretty_metadata,
        ) {
            // Without its metadata file the directory is not an item; clear it.
            if let Err(cleanup) = io::remove_dir_all(&dir) {
                warn!(item = %name, error = %cleanup, "failed to remove partial item");
            }
            return Err(e);
        }

        let item = self.item_handle(&name);
        if let Some(items) = self.items.write().as_mut() {
            if let Err(pos) = items.binary_search_by(|i| i.name().cmp(&name)) {
                items.insert(pos, item.clone());
            }
        }
        debug!(item = %name, "added item");
        Ok(item)
    }

    /// Delete an item and all of its arrays
    ///
    /// The item's metadata file is removed first so that concurrent readers
    /// stop listing it before its arrays disappear.
    pub fn delete_item(&self, name: &str) -> Result<()> {
        self.context.ensure_writable("delete an item")?;
        layout::validate_item_name(name)?;
        let dir = self.root.join(name);
        if !io::remove_file(&layout::metadata_path(&dir))? {
            return Err(JbofError::ItemNotFound(name.to_string()));
        }
        io::remove_dir_all(&dir)?;

        if let Some(items) = self.items.write().as_mut() {
            items.retain(|i| i.name() != name);
        }
        debug!(item = name, "deleted item");
        Ok(())
    }

    /// Delete the whole dataset
    ///
    /// The dataset metadata goes first; once it is gone the directory no
    /// longer opens as a dataset.
    pub fn delete(self) -> Result<()> {
        self.context.ensure_writable("delete the dataset")?;
        if !io::remove_file(&layout::metadata_path(&self.root))? {
            return Err(JbofError::DataSetNotFound(self.root.display().to_string()));
        }
        io::remove_dir_all(&self.root)?;
        info!("Deleted dataset at {}", self.root.display());
        Ok(())
    }

    /// Drop cached metadata and listings, including those of cached items
    pub fn clear_cache(&self) {
        *self.metadata.write() = None;
        if let Some(items) = self.items.write().take() {
            for item in items {
                item.clear_cache();
            }
        }
    }
}

fn matches_query(query: &Metadata, metadata: &Metadata) -> bool {
    query
        .iter()
        .all(|(key, value)| metadata.get(key) == Some(value))
}

/// A caller-chosen item name; UUID-shaped names mark generated items
fn chosen_item_name(name: String) -> Result<String> {
    if utils::is_synthesized_name(&name) {
        return Err(JbofError::InvalidName(format!(
            "{name:?} is shaped like a generated item name"
        )));
    }
    Ok(name)
}
