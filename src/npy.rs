//! The binary array format (`.npy`)
//!
//! A file is laid out as:
//!
//! ```text
//! \x93NUMPY | major u8 | minor u8 | header length (u16 LE for 1.x, u32 LE for 2.x) | header | payload
//! ```
//!
//! The header is an ASCII dictionary literal with the keys `descr`,
//! `fortran_order` and `shape`, padded with spaces and terminated by a
//! newline. The payload holds the raw elements in row-major order, or in
//! column-major order when `fortran_order` is true.
//!
//! # Dtype descriptors
//!
//! A descriptor is an optional byte order marker (`<`, `>`, `=`, or `|` for
//! "not applicable"), a kind character and an optional byte width:
//!
//! | kind | meaning | widths |
//! |------|---------|--------|
//! | `?`  | boolean | 1 |
//! | `b`  | signed 8-bit integer; boolean when written as `b1` | 1 |
//! | `B`  | unsigned 8-bit integer | 1 |
//! | `i`  | signed integer | 1, 2, 4 (default), 8 |
//! | `u`  | unsigned integer | 1, 2, 4 (default), 8 |
//! | `f`  | float | 2, 4 (default), 8 |
//! | `c`  | complex, two interleaved floats | 8 (default), 16 |
//!
//! `b`/`B` follow the conventional signed/unsigned assignment. The explicit
//! `b1` form is the array-protocol spelling of a boolean and is what the
//! writer emits for boolean tensors, so files round-trip with other tools.

use crate::error::{JbofError, Result};
use crate::types::{with_tensor, DataType, Element, Endianness, Tensor, NATIVE_ENDIAN};
use half::f16;
use ndarray::{ArrayD, IxDyn};
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Magic marker at the start of every binary array file
pub const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Payload alignment used by the writer
const ARRAY_ALIGN: usize = 64;

/// Dtype kinds that exist in the format but cannot be represented as a tensor
const UNSUPPORTED_KINDS: &[char] = &['m', 'M', 'O', 'S', 'a', 'U', 'V'];

/// Element type plus byte order, as recorded in the `descr` header field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DTypeDescriptor {
    pub data_type: DataType,
    pub endianness: Endianness,
}

impl DTypeDescriptor {
    pub fn new(data_type: DataType, endianness: Endianness) -> Self {
        Self {
            data_type,
            endianness,
        }
    }

    /// Parse a descriptor such as `<f8`, `|u1` or `i`
    pub fn parse(descr: &str) -> Result<Self> {
        let mut chars = descr.chars().peekable();
        let endianness = match chars.peek() {
            Some('<') => Some(Endianness::Little),
            Some('>') => Some(Endianness::Big),
            Some('=') | Some('|') => Some(NATIVE_ENDIAN),
            _ => None,
        };
        if endianness.is_some() {
            chars.next();
        }
        let endianness = endianness.unwrap_or(NATIVE_ENDIAN);

        let kind = chars
            .next()
            .ok_or_else(|| JbofError::UnsupportedDType(format!("empty descriptor {descr:?}")))?;
        if UNSUPPORTED_KINDS.contains(&kind) {
            return Err(JbofError::UnsupportedDType(format!(
                "kind '{kind}' in descriptor {descr:?}"
            )));
        }

        let width: String = chars.collect();
        let width = if width.is_empty() {
            None
        } else {
            Some(width.parse::<usize>().map_err(|_| {
                JbofError::UnsupportedDType(format!("invalid width in descriptor {descr:?}"))
            })?)
        };

        let data_type = match (kind, width) {
            ('?', None | Some(1)) => DataType::Bool,
            ('b', Some(1)) => DataType::Bool,
            ('b', None) => DataType::I8,
            ('B', None | Some(1)) => DataType::U8,
            ('i', Some(1)) => DataType::I8,
            ('i', Some(2)) => DataType::I16,
            ('i', None | Some(4)) => DataType::I32,
            ('i', Some(8)) => DataType::I64,
            ('u', Some(1)) => DataType::U8,
            ('u', Some(2)) => DataType::U16,
            ('u', None | Some(4)) => DataType::U32,
            ('u', Some(8)) => DataType::U64,
            ('f', Some(2)) => DataType::F16,
            ('f', None | Some(4)) => DataType::F32,
            ('f', Some(8)) => DataType::F64,
            ('c', None | Some(8)) => DataType::C64,
            ('c', Some(16)) => DataType::C128,
            _ => return Err(JbofError::UnsupportedDType(descr.to_string())),
        };

        Ok(Self::new(data_type, endianness))
    }
}

impl fmt::Display for DTypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = if self.data_type.size_in_bytes() == 1 {
            '|'
        } else {
            match self.endianness {
                Endianness::Little => '<',
                Endianness::Big => '>',
            }
        };
        let code = match self.data_type {
            DataType::Bool => "b1",
            DataType::I8 => "i1",
            DataType::I16 => "i2",
            DataType::I32 => "i4",
            DataType::I64 => "i8",
            DataType::U8 => "u1",
            DataType::U16 => "u2",
            DataType::U32 => "u4",
            DataType::U64 => "u8",
            DataType::F16 => "f2",
            DataType::F32 => "f4",
            DataType::F64 => "f8",
            DataType::C64 => "c8",
            DataType::C128 => "c16",
        };
        write!(f, "{order}{code}")
    }
}

/// Parsed header of a binary array file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyHeader {
    pub descr: DTypeDescriptor,
    pub fortran_order: bool,
    /// Logical shape
    pub shape: Vec<usize>,
}

impl NpyHeader {
    /// Parse the dictionary literal of a header
    pub fn parse(text: &str) -> Result<Self> {
        let mut parser = LiteralParser::new(text);
        let entries = parser.parse_dict()?;

        let mut descr = None;
        let mut fortran_order = None;
        let mut shape = None;
        for (key, value) in entries {
            match (key.as_str(), value) {
                ("descr", Literal::Str(s)) => descr = Some(DTypeDescriptor::parse(&s)?),
                ("descr", Literal::List) => {
                    return Err(JbofError::UnsupportedDType(
                        "structured dtype".to_string(),
                    ))
                }
                ("fortran_order", Literal::Bool(b)) => fortran_order = Some(b),
                ("shape", Literal::Tuple(dims)) => shape = Some(dims),
                (other, _) => {
                    return Err(JbofError::InvalidFormat(format!(
                        "unexpected header entry {other:?}"
                    )))
                }
            }
        }

        Ok(Self {
            descr: descr.ok_or_else(|| missing_key("descr"))?,
            fortran_order: fortran_order.ok_or_else(|| missing_key("fortran_order"))?,
            shape: shape.ok_or_else(|| missing_key("shape"))?,
        })
    }

    /// Number of elements described by the shape
    pub fn element_count(&self) -> Result<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| JbofError::InvalidFormat(format!("shape {:?} overflows", self.shape)))
    }

    fn dict_literal(&self) -> String {
        let shape = match self.shape.as_slice() {
            [] => "()".to_string(),
            [dim] => format!("({dim},)"),
            dims => format!(
                "({})",
                dims.iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };
        format!(
            "{{'descr': '{}', 'fortran_order': {}, 'shape': {}, }}",
            self.descr,
            if self.fortran_order { "True" } else { "False" },
            shape
        )
    }

    /// Magic, version, length field and padded header text
    ///
    /// Version 1.0 is used unless the header does not fit a u16 length.
    pub fn to_bytes(&self) -> Vec<u8> {
        let dict = self.dict_literal();
        // +1 for the terminating newline
        let hlen = dict.len() + 1;

        let (major, preamble) = {
            let padded = hlen + padding(10 + hlen);
            if padded <= u16::MAX as usize {
                (1u8, 10)
            } else {
                (2u8, 12)
            }
        };
        let padlen = padding(preamble + hlen);
        let header_len = hlen + padlen;

        let mut out = Vec::with_capacity(preamble + header_len);
        out.extend_from_slice(NPY_MAGIC);
        out.push(major);
        out.push(0);
        if major == 1 {
            out.extend_from_slice(&(header_len as u16).to_le_bytes());
        } else {
            out.extend_from_slice(&(header_len as u32).to_le_bytes());
        }
        out.extend_from_slice(dict.as_bytes());
        out.resize(out.len() + padlen, b' ');
        out.push(b'\n');
        out
    }
}

fn padding(unpadded: usize) -> usize {
    ARRAY_ALIGN - (unpadded % ARRAY_ALIGN)
}

fn missing_key(key: &str) -> JbofError {
    JbofError::InvalidFormat(format!("header is missing {key:?}"))
}

/// Options for writing binary array files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpyWriteOptions {
    /// Store elements in column-major order
    pub fortran_order: bool,
    /// Byte order of multi-byte elements
    pub endianness: Endianness,
}

impl Default for NpyWriteOptions {
    fn default() -> Self {
        Self {
            fortran_order: false,
            endianness: Endianness::Little,
        }
    }
}

/// Decode a binary array file
pub fn read_npy(bytes: &[u8]) -> Result<Tensor> {
    if bytes.len() < 8 || &bytes[..6] != NPY_MAGIC {
        return Err(JbofError::NotAnArrayFile(
            "missing binary array magic".to_string(),
        ));
    }
    let (major, minor) = (bytes[6], bytes[7]);
    let (header_len, header_start) = match major {
        1 => {
            let field = bytes.get(8..10).ok_or_else(truncated)?;
            (u16::from_le_bytes([field[0], field[1]]) as usize, 10)
        }
        2 => {
            let field = bytes.get(8..12).ok_or_else(truncated)?;
            (
                u32::from_le_bytes([field[0], field[1], field[2], field[3]]) as usize,
                12,
            )
        }
        _ => return Err(JbofError::UnsupportedVersion { major, minor }),
    };

    let header_end = header_start + header_len;
    let header = bytes.get(header_start..header_end).ok_or_else(truncated)?;
    if !header.is_ascii() {
        return Err(JbofError::InvalidFormat(
            "header is not ASCII".to_string(),
        ));
    }
    let header = std::str::from_utf8(header)
        .map_err(|e| JbofError::InvalidFormat(e.to_string()))?;
    let header = NpyHeader::parse(header)?;

    decode_payload(&header, &bytes[header_end..])
}

fn truncated() -> JbofError {
    JbofError::InvalidFormat("binary array file is truncated".to_string())
}

fn decode_payload(header: &NpyHeader, payload: &[u8]) -> Result<Tensor> {
    let count = header.element_count()?;
    let needed = count
        .checked_mul(header.descr.data_type.size_in_bytes())
        .ok_or_else(truncated)?;
    let payload = payload.get(..needed).ok_or_else(|| {
        JbofError::InvalidFormat(format!(
            "payload holds {} bytes, header requires {}",
            payload.len(),
            needed
        ))
    })?;

    let decoded = Decoding {
        payload,
        shape: &header.shape,
        fortran_order: header.fortran_order,
        endianness: header.descr.endianness,
    };
    match header.descr.data_type {
        DataType::Bool => decoded.tensor::<bool>(),
        DataType::I8 => decoded.tensor::<i8>(),
        DataType::I16 => decoded.tensor::<i16>(),
        DataType::I32 => decoded.tensor::<i32>(),
        DataType::I64 => decoded.tensor::<i64>(),
        DataType::U8 => decoded.tensor::<u8>(),
        DataType::U16 => decoded.tensor::<u16>(),
        DataType::U32 => decoded.tensor::<u32>(),
        DataType::U64 => decoded.tensor::<u64>(),
        DataType::F16 => decoded.tensor::<f16>(),
        DataType::F32 => decoded.tensor::<f32>(),
        DataType::F64 => decoded.tensor::<f64>(),
        DataType::C64 => decoded.tensor::<Complex<f32>>(),
        DataType::C128 => decoded.tensor::<Complex<f64>>(),
    }
}

struct Decoding<'a> {
    payload: &'a [u8],
    shape: &'a [usize],
    fortran_order: bool,
    endianness: Endianness,
}

impl Decoding<'_> {
    fn tensor<T: Element>(&self) -> Result<Tensor> {
        let size = T::DATA_TYPE.size_in_bytes();
        let values: Vec<T> = self
            .payload
            .chunks_exact(size)
            .map(|chunk| T::from_bytes(chunk, self.endianness))
            .collect();

        // Column-major data is a row-major array of the reversed shape,
        // transposed back to logical axis order.
        let array = if self.fortran_order {
            let storage: Vec<usize> = self.shape.iter().rev().copied().collect();
            ArrayD::from_shape_vec(IxDyn(&storage), values)
                .map_err(|e| JbofError::InvalidFormat(e.to_string()))?
                .reversed_axes()
        } else {
            ArrayD::from_shape_vec(IxDyn(self.shape), values)
                .map_err(|e| JbofError::InvalidFormat(e.to_string()))?
        };
        Ok(Tensor::from(array))
    }
}

/// Encode a tensor as a binary array file
pub fn write_npy(tensor: &Tensor, options: &NpyWriteOptions) -> Vec<u8> {
    let header = NpyHeader {
        descr: DTypeDescriptor::new(tensor.data_type(), options.endianness),
        fortran_order: options.fortran_order,
        shape: tensor.shape().to_vec(),
    };
    let mut out = header.to_bytes();
    out.reserve(tensor.size_in_bytes());
    with_tensor!(tensor, array => encode_elements(array, options, &mut out));
    out
}

fn encode_elements<T: Element>(array: &ArrayD<T>, options: &NpyWriteOptions, out: &mut Vec<u8>) {
    if options.fortran_order {
        for &value in array.t().iter() {
            value.write_bytes(out, options.endianness);
        }
    } else {
        for &value in array.iter() {
            value.write_bytes(out, options.endianness);
        }
    }
}

/// Values that can appear in a header dictionary
#[derive(Debug, PartialEq)]
enum Literal {
    Str(String),
    Bool(bool),
    Tuple(Vec<usize>),
    /// A list, only used by structured dtypes
    List,
}

/// Minimal parser for the dictionary literal found in headers
struct LiteralParser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> LiteralParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            src: text.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, what: &str) -> JbofError {
        JbofError::InvalidFormat(format!("header: {what} at offset {}", self.pos))
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        self.skip_whitespace();
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    /// Consume a separating comma if present, returning whether one was found
    fn comma(&mut self) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(b',') {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_dict(&mut self) -> Result<Vec<(String, Literal)>> {
        let mut entries = Vec::new();
        self.expect(b'{')?;
        loop {
            self.skip_whitespace();
            if self.peek() == Some(b'}') {
                self.pos += 1;
                return Ok(entries);
            }
            let key = self.parse_string()?;
            self.expect(b':')?;
            let value = self.parse_value()?;
            entries.push((key, value));
            if !self.comma() {
                self.expect(b'}')?;
                return Ok(entries);
            }
        }
    }

    fn parse_value(&mut self) -> Result<Literal> {
        self.skip_whitespace();
        match self.peek() {
            Some(b'\'') | Some(b'"') => Ok(Literal::Str(self.parse_string()?)),
            Some(b'(') => Ok(Literal::Tuple(self.parse_tuple()?)),
            Some(b'[') => {
                self.skip_bracketed()?;
                Ok(Literal::List)
            }
            _ => {
                let rest = &self.src[self.pos..];
                if rest.starts_with(b"True") {
                    self.pos += 4;
                    Ok(Literal::Bool(true))
                } else if rest.starts_with(b"False") {
                    self.pos += 5;
                    Ok(Literal::Bool(false))
                } else {
                    Err(self.error("unexpected value"))
                }
            }
        }
    }

    fn parse_string(&mut self) -> Result<String> {
        self.skip_whitespace();
        let quote = match self.peek() {
            Some(q @ (b'\'' | b'"')) => q,
            _ => return Err(self.error("expected string")),
        };
        self.pos += 1;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                let value = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
                self.pos += 1;
                return Ok(value);
            }
            self.pos += 1;
        }
        Err(self.error("unterminated string"))
    }

    fn parse_tuple(&mut self) -> Result<Vec<usize>> {
        let mut dims = Vec::new();
        self.expect(b'(')?;
        loop {
            self.skip_whitespace();
            if self.peek() == Some(b')') {
                self.pos += 1;
                return Ok(dims);
            }
            dims.push(self.parse_integer()?);
            if !self.comma() {
                self.expect(b')')?;
                return Ok(dims);
            }
        }
    }

    fn parse_integer(&mut self) -> Result<usize> {
        self.skip_whitespace();
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected non-negative integer"));
        }
        let digits = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|_| self.error("invalid integer"))?;
        let value = digits
            .parse::<usize>()
            .map_err(|_| self.error("integer out of range"))?;
        // Old writers emit long integers with an `L` suffix.
        if self.peek() == Some(b'L') {
            self.pos += 1;
        }
        Ok(value)
    }

    fn skip_bracketed(&mut self) -> Result<()> {
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                b'[' | b'(' => depth += 1,
                b']' | b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(self.error("unterminated list"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array3, ArrayD};

    fn npy_file(major: u8, header: &str, payload: &[u8]) -> Vec<u8> {
        let mut out = NPY_MAGIC.to_vec();
        out.push(major);
        out.push(0);
        match major {
            2 => out.extend_from_slice(&(header.len() as u32).to_le_bytes()),
            _ => out.extend_from_slice(&(header.len() as u16).to_le_bytes()),
        }
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_parse_descriptors() {
        let d = DTypeDescriptor::parse("<f8").unwrap();
        assert_eq!(d, DTypeDescriptor::new(DataType::F64, Endianness::Little));

        let d = DTypeDescriptor::parse(">i2").unwrap();
        assert_eq!(d, DTypeDescriptor::new(DataType::I16, Endianness::Big));

        assert_eq!(DTypeDescriptor::parse("i").unwrap().data_type, DataType::I32);
        assert_eq!(DTypeDescriptor::parse("=u").unwrap().data_type, DataType::U32);
        assert_eq!(DTypeDescriptor::parse("f").unwrap().data_type, DataType::F32);
        assert_eq!(DTypeDescriptor::parse("c").unwrap().data_type, DataType::C64);
        assert_eq!(DTypeDescriptor::parse("<c16").unwrap().data_type, DataType::C128);
        assert_eq!(DTypeDescriptor::parse("<f2").unwrap().data_type, DataType::F16);
    }

    #[test]
    fn test_byte_kind_convention() {
        assert_eq!(DTypeDescriptor::parse("b").unwrap().data_type, DataType::I8);
        assert_eq!(DTypeDescriptor::parse("B").unwrap().data_type, DataType::U8);
        assert_eq!(DTypeDescriptor::parse("|b1").unwrap().data_type, DataType::Bool);
        assert_eq!(DTypeDescriptor::parse("?").unwrap().data_type, DataType::Bool);
        assert_eq!(DTypeDescriptor::parse("|i1").unwrap().data_type, DataType::I8);
        assert_eq!(DTypeDescriptor::parse("|u1").unwrap().data_type, DataType::U8);
    }

    #[test]
    fn test_unsupported_kinds() {
        for descr in ["<U10", "|O", "|S5", "<M8", "<m8", "|V8", "|a4"] {
            match DTypeDescriptor::parse(descr) {
                Err(JbofError::UnsupportedDType(msg)) => {
                    let kind = descr.trim_start_matches(['<', '|']).chars().next().unwrap();
                    assert!(msg.contains(&format!("'{kind}'")), "{msg}");
                }
                other => panic!("{descr}: unexpected {other:?}"),
            }
        }
        assert!(matches!(
            DTypeDescriptor::parse("<i3"),
            Err(JbofError::UnsupportedDType(_))
        ));
    }

    #[test]
    fn test_descriptor_display() {
        assert_eq!(
            DTypeDescriptor::new(DataType::I64, Endianness::Little).to_string(),
            "<i8"
        );
        assert_eq!(
            DTypeDescriptor::new(DataType::F32, Endianness::Big).to_string(),
            ">f4"
        );
        assert_eq!(
            DTypeDescriptor::new(DataType::U8, Endianness::Big).to_string(),
            "|u1"
        );
        assert_eq!(
            DTypeDescriptor::new(DataType::Bool, Endianness::Little).to_string(),
            "|b1"
        );
    }

    #[test]
    fn test_header_layout() {
        let tensor = Tensor::from(arr1(&[1i32, 2, 3]).into_dyn());
        let bytes = write_npy(&tensor, &NpyWriteOptions::default());

        assert_eq!(&bytes[..6], NPY_MAGIC);
        assert_eq!(bytes[6], 1);
        assert_eq!(bytes[7], 0);
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);

        let header = std::str::from_utf8(&bytes[10..10 + header_len]).unwrap();
        assert!(header.starts_with("{'descr': '<i4', 'fortran_order': False, 'shape': (3,), }"));
        assert!(header.ends_with('\n'));

        let payload = &bytes[10 + header_len..];
        assert_eq!(payload, &[1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0]);
    }

    #[test]
    fn test_shape_literals() {
        let header = |shape: Vec<usize>| NpyHeader {
            descr: DTypeDescriptor::new(DataType::F64, Endianness::Little),
            fortran_order: false,
            shape,
        };
        assert!(header(vec![]).dict_literal().contains("'shape': ()"));
        assert!(header(vec![4]).dict_literal().contains("'shape': (4,)"));
        assert!(header(vec![2, 3, 4]).dict_literal().contains("'shape': (2, 3, 4)"));
    }

    #[test]
    fn test_read_handwritten_file() {
        let payload: Vec<u8> = [1i16, 2, 3, 4, 5, 6]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        let file = npy_file(
            1,
            "{\"shape\": (2L, 3L), \"descr\": \">i2\", \"fortran_order\": False}\n",
            &payload,
        );
        let tensor = read_npy(&file).unwrap();
        assert_eq!(
            tensor.into_array::<i16>().unwrap(),
            arr2(&[[1i16, 2, 3], [4, 5, 6]]).into_dyn()
        );
    }

    #[test]
    fn test_read_fortran_order() {
        // Column-major storage of [[1, 2, 3], [4, 5, 6]]
        let payload: Vec<u8> = [1u8, 4, 2, 5, 3, 6].to_vec();
        let file = npy_file(
            1,
            "{'descr': '|u1', 'fortran_order': True, 'shape': (2, 3), }\n",
            &payload,
        );
        let tensor = read_npy(&file).unwrap();
        assert_eq!(tensor.shape(), &[2, 3]);
        assert_eq!(
            tensor.into_array::<u8>().unwrap(),
            arr2(&[[1u8, 2, 3], [4, 5, 6]]).into_dyn()
        );
    }

    #[test]
    fn test_read_version_2() {
        let payload = 2.5f64.to_le_bytes();
        let file = npy_file(
            2,
            "{'descr': '<f8', 'fortran_order': False, 'shape': (), }\n",
            &payload,
        );
        let tensor = read_npy(&file).unwrap();
        assert_eq!(tensor.shape(), &[] as &[usize]);
        assert_eq!(tensor.as_array::<f64>().unwrap().iter().next(), Some(&2.5));
    }

    #[test]
    fn test_large_header_uses_version_2() {
        let shape = vec![1usize; 30_000];
        let tensor = Tensor::from(ArrayD::<u8>::zeros(IxDyn(&shape)));
        let bytes = write_npy(&tensor, &NpyWriteOptions::default());
        assert_eq!(bytes[6], 2);
        let header_len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        assert_eq!((12 + header_len) % 64, 0);
        assert_eq!(read_npy(&bytes).unwrap(), tensor);
    }

    #[test]
    fn test_failure_modes() {
        assert!(matches!(
            read_npy(b"PK\x03\x04 not an array"),
            Err(JbofError::NotAnArrayFile(_))
        ));
        assert!(matches!(read_npy(b""), Err(JbofError::NotAnArrayFile(_))));

        let file = npy_file(3, "{}", &[]);
        assert!(matches!(
            read_npy(&file),
            Err(JbofError::UnsupportedVersion { major: 3, minor: 0 })
        ));

        let file = npy_file(
            1,
            "{'descr': '<U8', 'fortran_order': False, 'shape': (1,), }\n",
            &[0; 32],
        );
        assert!(matches!(read_npy(&file), Err(JbofError::UnsupportedDType(_))));

        let file = npy_file(
            1,
            "{'descr': [('a', '<i4')], 'fortran_order': False, 'shape': (1,), }\n",
            &[0; 4],
        );
        assert!(matches!(read_npy(&file), Err(JbofError::UnsupportedDType(_))));
    }

    #[test]
    fn test_truncated_payload() {
        let file = npy_file(
            1,
            "{'descr': '<i4', 'fortran_order': False, 'shape': (4,), }\n",
            &[0; 8],
        );
        assert!(matches!(read_npy(&file), Err(JbofError::InvalidFormat(_))));
    }

    #[test]
    fn test_round_trip_dtypes() {
        let tensors = vec![
            Tensor::from(arr2(&[[true, false], [false, true]]).into_dyn()),
            Tensor::from(arr1(&[-1i8, 0, 127]).into_dyn()),
            Tensor::from(arr1(&[u64::MAX, 0, 7]).into_dyn()),
            Tensor::from(arr1(&[f16::from_f32(1.5), f16::from_f32(-2.0)]).into_dyn()),
            Tensor::from(arr2(&[[0.5f32, -1.0], [3.25, 8.0]]).into_dyn()),
            Tensor::from(
                arr1(&[Complex::new(1.0f64, -1.0), Complex::new(0.0, 2.5)]).into_dyn(),
            ),
        ];
        for tensor in tensors {
            for endianness in [Endianness::Little, Endianness::Big] {
                let options = NpyWriteOptions {
                    fortran_order: false,
                    endianness,
                };
                let decoded = read_npy(&write_npy(&tensor, &options)).unwrap();
                assert_eq!(decoded, tensor);
            }
        }
    }

    #[test]
    fn test_round_trip_fortran_order() {
        let array = Array3::from_shape_fn((2, 3, 4), |(i, j, k)| (i * 100 + j * 10 + k) as i32);
        let tensor = Tensor::from(array.into_dyn());
        let options = NpyWriteOptions {
            fortran_order: true,
            endianness: Endianness::Little,
        };
        let bytes = write_npy(&tensor, &options);
        let decoded = read_npy(&bytes).unwrap();
        assert_eq!(decoded, tensor);

        // First elements in storage walk the first axis fastest.
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        let payload = &bytes[10 + header_len..];
        assert_eq!(i32::from_le_bytes(payload[4..8].try_into().unwrap()), 100);
    }

    #[test]
    fn test_round_trip_empty_and_scalar() {
        let empty = Tensor::from(ArrayD::<f64>::zeros(IxDyn(&[3, 0, 2])));
        assert_eq!(read_npy(&write_npy(&empty, &NpyWriteOptions::default())).unwrap(), empty);

        let scalar = Tensor::from(ArrayD::from_elem(IxDyn(&[]), 42u16));
        let bytes = write_npy(&scalar, &NpyWriteOptions::default());
        assert_eq!(read_npy(&bytes).unwrap(), scalar);
    }
}
