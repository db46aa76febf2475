//! Array codecs and the extension-keyed codec registry

use crate::compression::{get_compressor, CompressionLevel, CompressionMethod, Compressor};
use crate::error::{JbofError, Result};
use crate::metadata::Metadata;
use crate::npy::{read_npy, write_npy, NpyWriteOptions};
use crate::types::{Endianness, Tensor};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Extension of the binary array format
pub const NPY_EXTENSION: &str = "npy";

/// Result of decoding an array payload
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub tensor: Tensor,
    /// Codec-specific information recovered from the payload, e.g. a sample rate
    pub metadata: Metadata,
}

impl Decoded {
    pub fn new(tensor: Tensor) -> Self {
        Self {
            tensor,
            metadata: Metadata::new(),
        }
    }
}

/// Encoder/decoder bound to one file extension
///
/// Decode-only adapters for container formats (audio, matrix files) implement
/// this trait with `can_encode` returning false.
pub trait ArrayCodec: Send + Sync {
    /// File extension without the leading dot, e.g. `npy` or `npy.zst`
    fn extension(&self) -> &str;

    /// Decode a payload
    fn decode(&self, bytes: &[u8]) -> Result<Decoded>;

    /// Encode a tensor
    fn encode(&self, tensor: &Tensor) -> Result<Bytes>;

    /// Whether `encode` is available
    fn can_encode(&self) -> bool {
        true
    }

    /// Whether identical tensors always encode to identical bytes
    fn is_deterministic(&self) -> bool {
        false
    }
}

/// The binary array format
#[derive(Debug, Clone, Copy, Default)]
pub struct NpyCodec {
    options: NpyWriteOptions,
}

impl NpyCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store elements in column-major order
    pub fn with_fortran_order(mut self, fortran_order: bool) -> Self {
        self.options.fortran_order = fortran_order;
        self
    }

    /// Byte order of multi-byte elements
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.options.endianness = endianness;
        self
    }

    pub fn options(&self) -> &NpyWriteOptions {
        &self.options
    }
}

impl ArrayCodec for NpyCodec {
    fn extension(&self) -> &str {
        NPY_EXTENSION
    }

    fn decode(&self, bytes: &[u8]) -> Result<Decoded> {
        Ok(Decoded::new(read_npy(bytes)?))
    }

    fn encode(&self, tensor: &Tensor) -> Result<Bytes> {
        Ok(Bytes::from(write_npy(tensor, &self.options)))
    }

    fn is_deterministic(&self) -> bool {
        true
    }
}

/// The binary array format wrapped in a compressed stream (`npy.gz`, `npy.zst`)
pub struct CompressedNpyCodec {
    inner: NpyCodec,
    compressor: Box<dyn Compressor>,
    level: CompressionLevel,
    extension: String,
}

impl CompressedNpyCodec {
    pub fn new(method: CompressionMethod) -> Self {
        Self {
            inner: NpyCodec::new(),
            compressor: get_compressor(method),
            level: CompressionLevel::default(),
            extension: format!("{}.{}", NPY_EXTENSION, method.extension()),
        }
    }

    pub fn with_level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_npy(mut self, inner: NpyCodec) -> Self {
        self.inner = inner;
        self
    }
}

impl fmt::Debug for CompressedNpyCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressedNpyCodec")
            .field("extension", &self.extension)
            .field("level", &self.level)
            .field("npy", &self.inner)
            .finish()
    }
}

impl ArrayCodec for CompressedNpyCodec {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn decode(&self, bytes: &[u8]) -> Result<Decoded> {
        let raw = self.compressor.decompress(bytes)?;
        self.inner.decode(&raw)
    }

    fn encode(&self, tensor: &Tensor) -> Result<Bytes> {
        let raw = self.inner.encode(tensor)?;
        Ok(Bytes::from(self.compressor.compress(&raw, self.level)?))
    }

    fn is_deterministic(&self) -> bool {
        true
    }
}

/// Maps file extensions to codecs
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: BTreeMap<String, Arc<dyn ArrayCodec>>,
}

impl CodecRegistry {
    /// An empty registry
    pub fn empty() -> Self {
        Self {
            codecs: BTreeMap::new(),
        }
    }

    /// Register a codec, replacing any codec with the same extension
    pub fn register(&mut self, codec: impl ArrayCodec + 'static) -> &mut Self {
        self.codecs
            .insert(codec.extension().to_string(), Arc::new(codec));
        self
    }

    /// Look up the codec for an extension
    pub fn get(&self, extension: &str) -> Result<&Arc<dyn ArrayCodec>> {
        self.codecs
            .get(extension)
            .ok_or_else(|| JbofError::UnsupportedFormat(extension.to_string()))
    }

    /// Look up a codec that can write
    pub fn encoder(&self, extension: &str) -> Result<&Arc<dyn ArrayCodec>> {
        let codec = self.get(extension)?;
        if !codec.can_encode() {
            return Err(JbofError::UnsupportedFormat(format!(
                "{extension} is decode-only"
            )));
        }
        Ok(codec)
    }

    /// Encode a tensor with the codec registered for `extension`
    pub fn encode(&self, tensor: &Tensor, extension: &str) -> Result<Bytes> {
        self.encoder(extension)?.encode(tensor)
    }

    /// Decode a payload with the codec registered for `extension`
    pub fn decode(&self, bytes: &[u8], extension: &str) -> Result<Decoded> {
        self.get(extension)?.decode(bytes)
    }

    /// Registered extensions in lexicographic order
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.codecs.keys().map(String::as_str)
    }
}

impl Default for CodecRegistry {
    /// `npy`, `npy.gz` and `npy.zst`
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(NpyCodec::new())
            .register(CompressedNpyCodec::new(CompressionMethod::Gzip))
            .register(CompressedNpyCodec::new(CompressionMethod::Zstd));
        registry
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.codecs.keys()).finish()
    }
}
