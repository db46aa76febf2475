//! Core data types: element types, byte order and the typed tensor

use half::f16;
use ndarray::ArrayD;
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element types an array can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Boolean, one byte per element
    Bool,
    /// Signed 8-bit integer
    I8,
    /// Signed 16-bit integer
    I16,
    /// Signed 32-bit integer
    I32,
    /// Signed 64-bit integer
    I64,
    /// Unsigned 8-bit integer
    U8,
    /// Unsigned 16-bit integer
    U16,
    /// Unsigned 32-bit integer
    U32,
    /// Unsigned 64-bit integer
    U64,
    /// 16-bit floating point
    F16,
    /// 32-bit floating point
    F32,
    /// 64-bit floating point
    F64,
    /// Complex number made of two 32-bit floats
    C64,
    /// Complex number made of two 64-bit floats
    C128,
}

impl DataType {
    /// Size in bytes of one element
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::Bool | DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 | DataType::F16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 => 4,
            DataType::U64 | DataType::I64 | DataType::F64 | DataType::C64 => 8,
            DataType::C128 => 16,
        }
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::F16 | DataType::F32 | DataType::F64)
    }

    /// Check if this is a complex type
    pub fn is_complex(&self) -> bool {
        matches!(self, DataType::C64 | DataType::C128)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "bool",
            DataType::I8 => "int8",
            DataType::I16 => "int16",
            DataType::I32 => "int32",
            DataType::I64 => "int64",
            DataType::U8 => "uint8",
            DataType::U16 => "uint16",
            DataType::U32 => "uint32",
            DataType::U64 => "uint64",
            DataType::F16 => "float16",
            DataType::F32 => "float32",
            DataType::F64 => "float64",
            DataType::C64 => "complex64",
            DataType::C128 => "complex128",
        };
        f.write_str(name)
    }
}

/// Byte order of stored elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Least significant byte first
    Little,
    /// Most significant byte first
    Big,
}

impl Endianness {
    /// Return true if the endianness matches the endianness of the CPU.
    pub fn is_native(self) -> bool {
        self == NATIVE_ENDIAN
    }
}

/// The endianness of the CPU.
pub const NATIVE_ENDIAN: Endianness = if cfg!(target_endian = "big") {
    Endianness::Big
} else {
    Endianness::Little
};

/// A decoded array of any supported element type
#[derive(Debug, Clone, PartialEq)]
pub enum Tensor {
    Bool(ArrayD<bool>),
    I8(ArrayD<i8>),
    I16(ArrayD<i16>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    U32(ArrayD<u32>),
    U64(ArrayD<u64>),
    F16(ArrayD<f16>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    C64(ArrayD<Complex<f32>>),
    C128(ArrayD<Complex<f64>>),
}

/// Applies an expression to the inner array of a [`Tensor`], whatever its element type.
macro_rules! with_tensor {
    ($tensor:expr, $array:ident => $body:expr) => {
        match $tensor {
            Tensor::Bool($array) => $body,
            Tensor::I8($array) => $body,
            Tensor::I16($array) => $body,
            Tensor::I32($array) => $body,
            Tensor::I64($array) => $body,
            Tensor::U8($array) => $body,
            Tensor::U16($array) => $body,
            Tensor::U32($array) => $body,
            Tensor::U64($array) => $body,
            Tensor::F16($array) => $body,
            Tensor::F32($array) => $body,
            Tensor::F64($array) => $body,
            Tensor::C64($array) => $body,
            Tensor::C128($array) => $body,
        }
    };
}
pub(crate) use with_tensor;

impl Tensor {
    /// Element type of the tensor
    pub fn data_type(&self) -> DataType {
        match self {
            Tensor::Bool(_) => DataType::Bool,
            Tensor::I8(_) => DataType::I8,
            Tensor::I16(_) => DataType::I16,
            Tensor::I32(_) => DataType::I32,
            Tensor::I64(_) => DataType::I64,
            Tensor::U8(_) => DataType::U8,
            Tensor::U16(_) => DataType::U16,
            Tensor::U32(_) => DataType::U32,
            Tensor::U64(_) => DataType::U64,
            Tensor::F16(_) => DataType::F16,
            Tensor::F32(_) => DataType::F32,
            Tensor::F64(_) => DataType::F64,
            Tensor::C64(_) => DataType::C64,
            Tensor::C128(_) => DataType::C128,
        }
    }

    /// Logical shape of the tensor
    pub fn shape(&self) -> &[usize] {
        with_tensor!(self, array => array.shape())
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        with_tensor!(self, array => array.len())
    }

    /// True if the tensor holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the element data in bytes
    pub fn size_in_bytes(&self) -> usize {
        self.len() * self.data_type().size_in_bytes()
    }

    /// Borrow the inner array if it holds elements of type `T`
    pub fn as_array<T: Element>(&self) -> Option<&ArrayD<T>> {
        T::tensor_ref(self)
    }

    /// Take the inner array if it holds elements of type `T`
    pub fn into_array<T: Element>(self) -> Option<ArrayD<T>> {
        T::from_tensor(self)
    }
}

/// Scalar types that can be stored in a [`Tensor`]
pub trait Element: Copy + Send + Sync + 'static {
    /// Element type tag
    const DATA_TYPE: DataType;

    /// Decode one element from exactly `DATA_TYPE.size_in_bytes()` bytes
    fn from_bytes(bytes: &[u8], endianness: Endianness) -> Self;

    /// Append the encoded element to `out`
    fn write_bytes(self, out: &mut Vec<u8>, endianness: Endianness);

    fn into_tensor(array: ArrayD<Self>) -> Tensor;

    fn from_tensor(tensor: Tensor) -> Option<ArrayD<Self>>;

    fn tensor_ref(tensor: &Tensor) -> Option<&ArrayD<Self>>;
}

macro_rules! impl_element {
    (@tensor $ty:ty, $variant:ident) => {
        fn into_tensor(array: ArrayD<Self>) -> Tensor {
            Tensor::$variant(array)
        }

        fn from_tensor(tensor: Tensor) -> Option<ArrayD<Self>> {
            match tensor {
                Tensor::$variant(array) => Some(array),
                _ => None,
            }
        }

        fn tensor_ref(tensor: &Tensor) -> Option<&ArrayD<Self>> {
            match tensor {
                Tensor::$variant(array) => Some(array),
                _ => None,
            }
        }
    };
    ($ty:ty, $variant:ident, $size:expr) => {
        impl Element for $ty {
            const DATA_TYPE: DataType = DataType::$variant;

            fn from_bytes(bytes: &[u8], endianness: Endianness) -> Self {
                let mut buf = [0u8; $size];
                buf.copy_from_slice(bytes);
                match endianness {
                    Endianness::Little => <$ty>::from_le_bytes(buf),
                    Endianness::Big => <$ty>::from_be_bytes(buf),
                }
            }

            fn write_bytes(self, out: &mut Vec<u8>, endianness: Endianness) {
                match endianness {
                    Endianness::Little => out.extend_from_slice(&self.to_le_bytes()),
                    Endianness::Big => out.extend_from_slice(&self.to_be_bytes()),
                }
            }

            impl_element!(@tensor $ty, $variant);
        }
    };
}

impl_element!(i8, I8, 1);
impl_element!(i16, I16, 2);
impl_element!(i32, I32, 4);
impl_element!(i64, I64, 8);
impl_element!(u8, U8, 1);
impl_element!(u16, U16, 2);
impl_element!(u32, U32, 4);
impl_element!(u64, U64, 8);
impl_element!(f16, F16, 2);
impl_element!(f32, F32, 4);
impl_element!(f64, F64, 8);

impl Element for bool {
    const DATA_TYPE: DataType = DataType::Bool;

    fn from_bytes(bytes: &[u8], _endianness: Endianness) -> Self {
        bytes[0] != 0
    }

    fn write_bytes(self, out: &mut Vec<u8>, _endianness: Endianness) {
        out.push(u8::from(self));
    }

    impl_element!(@tensor bool, Bool);
}

macro_rules! impl_complex_element {
    ($component:ty, $variant:ident, $half:expr) => {
        impl Element for Complex<$component> {
            const DATA_TYPE: DataType = DataType::$variant;

            // Real part first, then imaginary part.
            fn from_bytes(bytes: &[u8], endianness: Endianness) -> Self {
                let (re, im) = bytes.split_at($half);
                Complex::new(
                    <$component>::from_bytes(re, endianness),
                    <$component>::from_bytes(im, endianness),
                )
            }

            fn write_bytes(self, out: &mut Vec<u8>, endianness: Endianness) {
                self.re.write_bytes(out, endianness);
                self.im.write_bytes(out, endianness);
            }

            impl_element!(@tensor Complex<$component>, $variant);
        }
    };
}

impl_complex_element!(f32, C64, 4);
impl_complex_element!(f64, C128, 8);

impl<T: Element> From<ArrayD<T>> for Tensor {
    fn from(array: ArrayD<T>) -> Self {
        T::into_tensor(array)
    }
}
