//! Content checksum of a dataset

use crate::dataset::DataSet;
use crate::error::{JbofError, Result};
use crate::io;
use crate::item::Item;
use crate::metadata;
use crate::utils::is_synthesized_name;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Feed one length-prefixed field into the hash
fn update_framed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

impl DataSet {
    /// SHA-256 over the dataset's content, as lowercase hex
    ///
    /// Covers dataset metadata, then every item in name order with its
    /// metadata and its arrays in name order. Each array contributes its
    /// metadata and the raw bytes of its data file. Two datasets with the
    /// same logical content hash equal regardless of creation order or
    /// metadata formatting.
    ///
    /// Fails with [`JbofError::NondeterministicDataset`] when an item has a
    /// synthesized name or an array is stored by a codec whose output is not
    /// reproducible. A name counts as synthesized when it is shaped like a
    /// UUID; [`DataSet::add_item`] refuses such names unless it generates them.
    pub fn checksum(&self) -> Result<String> {
        let items: Vec<Item> = self.all_items()?.collect();
        if let Some(item) = items.iter().find(|i| is_synthesized_name(i.name())) {
            return Err(JbofError::NondeterministicDataset(format!(
                "item {:?} has a generated name",
                item.name()
            )));
        }

        let mut hasher = Sha256::new();
        update_framed(&mut hasher, &metadata::canonical_bytes(&*self.stored_metadata()?)?);

        for item in &items {
            update_framed(&mut hasher, item.name().as_bytes());
            update_framed(&mut hasher, &metadata::canonical_bytes(&*item.stored_metadata()?)?);

            let names = item.array_names()?;
            update_framed(&mut hasher, &(names.len() as u64).to_le_bytes());
            for name in &names {
                let record = item.array_record(name)?;
                let (filename, extension) = item.data_file(name, &record)?;
                if !self.registry().get(&extension)?.is_deterministic() {
                    return Err(JbofError::NondeterministicDataset(format!(
                        "array {:?} in item {:?} uses codec {:?}",
                        name,
                        item.name(),
                        extension
                    )));
                }
                let data = match io::read(&item.path().join(&filename)) {
                    Ok(data) => data,
                    Err(e) if io::is_not_found(&e) => {
                        return Err(JbofError::Corrupt(format!(
                            "array {:?} in item {:?} references missing data file {:?}",
                            name,
                            item.name(),
                            filename
                        )))
                    }
                    Err(e) => return Err(e),
                };
                update_framed(&mut hasher, name.as_bytes());
                update_framed(&mut hasher, &metadata::canonical_bytes(&record)?);
                update_framed(&mut hasher, &data);
            }
        }

        let digest = hex::encode(hasher.finalize());
        debug!(root = %self.path().display(), items = items.len(), %digest, "computed checksum");
        Ok(digest)
    }
}
