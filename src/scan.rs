//! Read-only consistency scan of a dataset directory
//!
//! Interrupted writes leave files that readers ignore: item directories
//! without metadata, data files without metadata, orphaned temporaries.
//! A scan reports them without touching anything.

use crate::dataset::DataSet;
use crate::error::{JbofError, Result};
use crate::io::{self, TEMP_PREFIX};
use crate::layout::{self, METADATA_FILE};
use crate::metadata::{self, FILENAME_KEY};
use crate::utils::format_bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Kind of inconsistency found by a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemnantKind {
    /// Directory under the root without an item metadata file
    ItemWithoutMetadata,
    /// Array metadata whose data file is missing
    ArrayWithoutData,
    /// File in an item directory that no array metadata references
    DataWithoutMetadata,
    /// Metadata file that cannot be parsed
    UnreadableMetadata,
    /// Leftover temporary file from an interrupted write
    TemporaryFile,
}

/// One inconsistency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Remnant {
    pub kind: RemnantKind,
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub detail: Option<String>,
}

/// Result of [`DataSet::scan`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub root: PathBuf,
    pub scanned_at: DateTime<Utc>,
    pub items: usize,
    pub arrays: usize,
    /// Total size of readable array data
    pub data_bytes: u64,
    pub remnants: Vec<Remnant>,
}

impl ScanReport {
    /// True when nothing but well-formed items and arrays was found
    pub fn is_clean(&self) -> bool {
        self.remnants.is_empty()
    }

    pub fn count(&self, kind: RemnantKind) -> usize {
        self.remnants.iter().filter(|r| r.kind == kind).count()
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "{} items, {} arrays, {} of data, {} remnants",
            self.items,
            self.arrays,
            format_bytes(self.data_bytes),
            self.remnants.len()
        )
    }
}

fn remnant(kind: RemnantKind, path: PathBuf, detail: Option<String>) -> Remnant {
    let (size, modified) = match fs::metadata(&path) {
        Ok(meta) => (
            if meta.is_file() { meta.len() } else { 0 },
            meta.modified().ok().map(DateTime::<Utc>::from),
        ),
        Err(_) => (0, None),
    };
    Remnant {
        kind,
        path,
        size,
        modified,
        detail,
    }
}

impl DataSet {
    /// Walk the dataset directory and report leftovers of interrupted writes
    ///
    /// Reads the directory directly, bypassing every cache.
    pub fn scan(&self) -> Result<ScanReport> {
        let root = self.path();
        if !layout::metadata_path(root).is_file() {
            return Err(JbofError::DataSetNotFound(root.display().to_string()));
        }
        let mut report = ScanReport {
            root: root.to_path_buf(),
            scanned_at: Utc::now(),
            items: 0,
            arrays: 0,
            data_bytes: 0,
            remnants: Vec::new(),
        };

        for entry in io::list(root)? {
            let path = root.join(&entry.name);
            if entry.name.starts_with(TEMP_PREFIX) {
                report
                    .remnants
                    .push(remnant(RemnantKind::TemporaryFile, path, None));
                continue;
            }
            if !entry.is_dir {
                continue;
            }
            let metadata_path = layout::metadata_path(&path);
            if !metadata_path.is_file() {
                report
                    .remnants
                    .push(remnant(RemnantKind::ItemWithoutMetadata, path, None));
                continue;
            }
            if let Err(e) = metadata::read_metadata(&metadata_path) {
                report.remnants.push(remnant(
                    RemnantKind::UnreadableMetadata,
                    metadata_path,
                    Some(e.to_string()),
                ));
            }
            report.items += 1;
            scan_item(&path, &mut report)?;
        }

        if report.is_clean() {
            debug!(root = %root.display(), "scan clean: {}", report.summary());
        } else {
            warn!(root = %root.display(), "scan found problems: {}", report.summary());
        }
        Ok(report)
    }
}

fn scan_item(dir: &Path, report: &mut ScanReport) -> Result<()> {
    let entries = io::list(dir)?;
    let mut referenced = BTreeSet::new();

    for entry in entries.iter().filter(|e| !e.is_dir) {
        let Some(name) = layout::array_name_of(&entry.name) else {
            continue;
        };
        let path = dir.join(&entry.name);
        let record = match metadata::read_metadata(&path) {
            Ok(record) => record,
            Err(e) => {
                report.remnants.push(remnant(
                    RemnantKind::UnreadableMetadata,
                    path,
                    Some(e.to_string()),
                ));
                continue;
            }
        };
        let filename = match record.get(FILENAME_KEY) {
            Some(Value::String(stored)) => Path::new(stored)
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or(stored)
                .to_string(),
            _ => {
                report.remnants.push(remnant(
                    RemnantKind::UnreadableMetadata,
                    path,
                    Some(format!("no {FILENAME_KEY} field")),
                ));
                continue;
            }
        };
        let data_path = dir.join(&filename);
        match io::size(&data_path) {
            Ok(size) => {
                report.arrays += 1;
                report.data_bytes += size;
            }
            Err(_) => report.remnants.push(remnant(
                RemnantKind::ArrayWithoutData,
                path,
                Some(format!("missing {filename} for array {name}")),
            )),
        }
        referenced.insert(filename);
    }

    for entry in entries.iter().filter(|e| !e.is_dir) {
        let path = dir.join(&entry.name);
        if entry.name.starts_with(TEMP_PREFIX) {
            report
                .remnants
                .push(remnant(RemnantKind::TemporaryFile, path, None));
        } else if entry.name != METADATA_FILE
            && layout::array_name_of(&entry.name).is_none()
            && !referenced.contains(&entry.name)
        {
            report
                .remnants
                .push(remnant(RemnantKind::DataWithoutMetadata, path, None));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use crate::types::Tensor;
    use ndarray::arr1;
    use tempfile::TempDir;

    #[test]
    fn test_clean_scan() {
        let temp_dir = TempDir::new().unwrap();
        let ds = DataSet::create(temp_dir.path().join("ds"), Metadata::new(), None).unwrap();
        let item = ds.add_item(Some("a"), Metadata::new()).unwrap();
        item.add_array("x", &Tensor::from(arr1(&[1u8, 2, 3]).into_dyn()), Metadata::new())
            .unwrap();

        let report = ds.scan().unwrap();
        assert!(report.is_clean(), "{:?}", report.remnants);
        assert_eq!(report.items, 1);
        assert_eq!(report.arrays, 1);
        assert!(report.data_bytes > 3);
        assert!(report.summary().starts_with("1 items, 1 arrays"));
    }

    #[test]
    fn test_scan_reports_remnants() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("ds");
        let ds = DataSet::create(&root, Metadata::new(), None).unwrap();
        let item = ds.add_item(Some("a"), Metadata::new()).unwrap();
        let tensor = Tensor::from(arr1(&[1u8]).into_dyn());
        item.add_array("x", &tensor, Metadata::new()).unwrap();
        item.add_array("y", &tensor, Metadata::new()).unwrap();

        fs::create_dir(root.join("partial")).unwrap();
        fs::write(root.join("a").join("orphan.npy"), b"data").unwrap();
        fs::write(root.join("a").join(".tmp-abc"), b"").unwrap();
        fs::remove_file(root.join("a").join("y.npy")).unwrap();
        fs::write(root.join("a").join("z.json"), b"not json").unwrap();

        let report = ds.scan().unwrap();
        assert!(!report.is_clean());
        assert_eq!(report.items, 1);
        assert_eq!(report.arrays, 1);
        assert_eq!(report.count(RemnantKind::ItemWithoutMetadata), 1);
        assert_eq!(report.count(RemnantKind::DataWithoutMetadata), 1);
        assert_eq!(report.count(RemnantKind::TemporaryFile), 1);
        assert_eq!(report.count(RemnantKind::ArrayWithoutData), 1);
        assert_eq!(report.count(RemnantKind::UnreadableMetadata), 1);

        let orphan = report
            .remnants
            .iter()
            .find(|r| r.kind == RemnantKind::DataWithoutMetadata)
            .unwrap();
        assert_eq!(orphan.size, 4);
        assert!(orphan.modified.is_some());

        // Nothing was repaired.
        assert!(root.join("partial").is_dir());
        assert!(root.join("a").join("orphan.npy").is_file());
    }

    #[test]
    fn test_report_serializes() {
        let temp_dir = TempDir::new().unwrap();
        let ds = DataSet::create(temp_dir.path().join("ds"), Metadata::new(), None).unwrap();
        let report = ds.scan().unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["items"], serde_json::json!(0));
        let back: ScanReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }
}
