//! JBOF - Just a Bunch Of Files
//!
//! A structured store for scientific datasets built from plain files and
//! directories, readable without this library.
//!
//! # Features
//!
//! - Dataset → item → array hierarchy with JSON metadata at every level
//! - Bit-exact `.npy` array files, optionally gzip or zstd compressed
//! - Extension-keyed codec registry with room for decode-only adapters
//! - Crash-safe mutations: every visible state is a consistent one
//! - Deterministic content checksums for reproducibility checks
//!
//! # Layout
//!
//! ```text
//! dataset/
//!   _metadata.json
//!   item-1/
//!     _metadata.json
//!     signal.json
//!     signal.npy
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use jbof::{DataSet, Metadata, Tensor};
//! use ndarray::arr1;
//! use serde_json::json;
//!
//! # fn example() -> jbof::Result<()> {
//! let mut meta = Metadata::new();
//! meta.insert("samplerate".into(), json!(16000));
//! let ds = DataSet::create("/tmp/recordings", meta, Some("{speaker}"))?;
//!
//! let mut item_meta = Metadata::new();
//! item_meta.insert("speaker".into(), json!("anna"));
//! let item = ds.add_item(None, item_meta)?;
//!
//! let signal = Tensor::from(arr1(&[0.0f32, 0.5, -0.5]).into_dyn());
//! item.add_array("signal", &signal, Metadata::new())?;
//!
//! assert_eq!(item.array("signal")?.tensor, signal);
//! # Ok(())
//! # }
//! ```

mod checksum;
pub mod codec;
pub mod compression;
pub mod config;
pub mod dataset;
pub mod error;
pub mod io;
pub mod item;
pub mod layout;
pub mod metadata;
pub mod npy;
pub mod scan;
pub mod types;
pub mod utils;

// Re-exports
pub use codec::{ArrayCodec, CodecRegistry, CompressedNpyCodec, Decoded, NpyCodec};
pub use compression::{CompressionLevel, CompressionMethod, Compressor};
pub use config::DataSetOptions;
pub use dataset::DataSet;
pub use error::{JbofError, Result};
pub use item::{Array, Item};
pub use metadata::Metadata;
pub use scan::{Remnant, RemnantKind, ScanReport};
pub use types::{DataType, Element, Endianness, Tensor};

/// Version of the JBOF implementation
pub const JBOF_VERSION: &str = env!("CARGO_PKG_VERSION");
