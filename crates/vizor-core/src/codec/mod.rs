//! JSON wire codec for multi-dimensional numeric arrays.
//!
//! An array travels as
//!
//! ```json
//! {"__ndarray__": "<base64 of the contiguous little-endian buffer>",
//!  "dtype": "uint8",
//!  "shape": [480, 640, 3]}
//! ```
//!
//! Buffers are the elements' in-memory bytes, which is little-endian on
//! every target Vizor builds for.
//!
//! [`decode`] is total: anything that is not a well-formed encoded array
//! comes back unchanged as [`Decoded::Value`].

mod py_literal;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytemuck::Pod;
use ndarray::{ArrayD, IxDyn};
use serde_json::{json, Value};

/// Key tagging an encoded array object.
pub const NDARRAY_TAG: &str = "__ndarray__";

/// Supported element types, named the way numpy names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl DType {
    pub fn name(&self) -> &'static str {
        match self {
            DType::U8 => "uint8",
            DType::I8 => "int8",
            DType::U16 => "uint16",
            DType::I16 => "int16",
            DType::U32 => "uint32",
            DType::I32 => "int32",
            DType::U64 => "uint64",
            DType::I64 => "int64",
            DType::F32 => "float32",
            DType::F64 => "float64",
        }
    }

    /// Element width in bytes.
    pub fn width(&self) -> usize {
        match self {
            DType::U8 | DType::I8 => 1,
            DType::U16 | DType::I16 => 2,
            DType::U32 | DType::I32 | DType::F32 => 4,
            DType::U64 | DType::I64 | DType::F64 => 8,
        }
    }

    /// Parse a dtype name or a little-endian/native array-protocol code
    /// (`"<f4"`, `"|u1"`, `"i8"`). Big-endian codes are not supported.
    pub fn parse(name: &str) -> Option<Self> {
        let code = name
            .strip_prefix('<')
            .or_else(|| name.strip_prefix('|'))
            .or_else(|| name.strip_prefix('='))
            .unwrap_or(name);

        Some(match code {
            "uint8" | "u1" | "B" => DType::U8,
            "int8" | "i1" | "b" => DType::I8,
            "uint16" | "u2" => DType::U16,
            "int16" | "i2" => DType::I16,
            "uint32" | "u4" => DType::U32,
            "int32" | "i4" => DType::I32,
            "uint64" | "u8" => DType::U64,
            "int64" | "i8" => DType::I64,
            "float32" | "f4" => DType::F32,
            "float64" | "f8" => DType::F64,
            _ => return None,
        })
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamically-typed n-dimensional array.
#[derive(Debug, Clone, PartialEq)]
pub enum NdArray {
    U8(ArrayD<u8>),
    I8(ArrayD<i8>),
    U16(ArrayD<u16>),
    I16(ArrayD<i16>),
    U32(ArrayD<u32>),
    I32(ArrayD<i32>),
    U64(ArrayD<u64>),
    I64(ArrayD<i64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

macro_rules! dispatch {
    ($array:expr, $a:ident => $body:expr) => {
        match $array {
            NdArray::U8($a) => $body,
            NdArray::I8($a) => $body,
            NdArray::U16($a) => $body,
            NdArray::I16($a) => $body,
            NdArray::U32($a) => $body,
            NdArray::I32($a) => $body,
            NdArray::U64($a) => $body,
            NdArray::I64($a) => $body,
            NdArray::F32($a) => $body,
            NdArray::F64($a) => $body,
        }
    };
}

macro_rules! from_array {
    ($ty:ty, $variant:ident) => {
        impl From<ArrayD<$ty>> for NdArray {
            fn from(array: ArrayD<$ty>) -> Self {
                NdArray::$variant(array)
            }
        }
    };
}

from_array!(u8, U8);
from_array!(i8, I8);
from_array!(u16, U16);
from_array!(i16, I16);
from_array!(u32, U32);
from_array!(i32, I32);
from_array!(u64, U64);
from_array!(i64, I64);
from_array!(f32, F32);
from_array!(f64, F64);

impl NdArray {
    pub fn dtype(&self) -> DType {
        match self {
            NdArray::U8(_) => DType::U8,
            NdArray::I8(_) => DType::I8,
            NdArray::U16(_) => DType::U16,
            NdArray::I16(_) => DType::I16,
            NdArray::U32(_) => DType::U32,
            NdArray::I32(_) => DType::I32,
            NdArray::U64(_) => DType::U64,
            NdArray::I64(_) => DType::I64,
            NdArray::F32(_) => DType::F32,
            NdArray::F64(_) => DType::F64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        dispatch!(self, a => a.shape())
    }

    /// Contiguous row-major bytes of the elements.
    pub fn to_bytes(&self) -> Vec<u8> {
        dispatch!(self, a => contiguous_bytes(a))
    }

    /// Take the array out if it holds `u8` samples.
    pub fn into_u8(self) -> Option<ArrayD<u8>> {
        match self {
            NdArray::U8(a) => Some(a),
            _ => None,
        }
    }
}

fn contiguous_bytes<T: Pod>(array: &ArrayD<T>) -> Vec<u8> {
    // standard layout is always contiguous, so as_slice() is Some
    array
        .as_standard_layout()
        .as_slice()
        .map(|slice| bytemuck::cast_slice::<T, u8>(slice).to_vec())
        .unwrap_or_default()
}

fn array_from_bytes<T: Pod>(bytes: &[u8], shape: &[usize]) -> Option<ArrayD<T>> {
    let expected = shape
        .iter()
        .try_fold(std::mem::size_of::<T>(), |acc, &d| acc.checked_mul(d))?;
    if bytes.len() != expected {
        return None;
    }
    // copies into a fresh Vec<T>, so the base64 buffer need not be aligned
    let values: Vec<T> = bytemuck::pod_collect_to_vec(bytes);
    ArrayD::from_shape_vec(IxDyn(shape), values).ok()
}

/// Encode an array into its tagged JSON form.
pub fn encode(array: &NdArray) -> Value {
    json!({
        NDARRAY_TAG: BASE64.encode(array.to_bytes()),
        "dtype": array.dtype().name(),
        "shape": array.shape(),
    })
}

/// Outcome of [`decode`].
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Array(NdArray),
    /// The input (or its parsed form) was not an encoded array.
    Value(Value),
}

/// Decode a JSON value that may hold an encoded array.
///
/// Strings are parsed first, as JSON and then as a Python-style literal
/// (`{'__ndarray__': '...', 'dtype': 'uint8', 'shape': (2, 3)}`). A string
/// that parses as neither is returned untouched; so is a tagged object whose
/// payload does not line up with its dtype and shape.
pub fn decode(value: &Value) -> Decoded {
    let parsed = match value {
        Value::String(text) => match parse_literal(text) {
            Some(parsed) => parsed,
            None => return Decoded::Value(value.clone()),
        },
        other => other.clone(),
    };

    match try_decode(&parsed) {
        Some(array) => Decoded::Array(array),
        None if is_tagged(&parsed) => Decoded::Value(value.clone()),
        None => Decoded::Value(parsed),
    }
}

/// Decode a tagged array object, or `None` if `value` is not one.
pub fn try_decode(value: &Value) -> Option<NdArray> {
    let object = value.as_object()?;
    let data = object.get(NDARRAY_TAG)?.as_str()?;
    let dtype = DType::parse(object.get("dtype")?.as_str()?)?;
    let shape = object
        .get("shape")?
        .as_array()?
        .iter()
        .map(|d| d.as_u64().map(|d| d as usize))
        .collect::<Option<Vec<usize>>>()?;

    let bytes = BASE64.decode(data).ok()?;

    Some(match dtype {
        DType::U8 => NdArray::U8(array_from_bytes(&bytes, &shape)?),
        DType::I8 => NdArray::I8(array_from_bytes(&bytes, &shape)?),
        DType::U16 => NdArray::U16(array_from_bytes(&bytes, &shape)?),
        DType::I16 => NdArray::I16(array_from_bytes(&bytes, &shape)?),
        DType::U32 => NdArray::U32(array_from_bytes(&bytes, &shape)?),
        DType::I32 => NdArray::I32(array_from_bytes(&bytes, &shape)?),
        DType::U64 => NdArray::U64(array_from_bytes(&bytes, &shape)?),
        DType::I64 => NdArray::I64(array_from_bytes(&bytes, &shape)?),
        DType::F32 => NdArray::F32(array_from_bytes(&bytes, &shape)?),
        DType::F64 => NdArray::F64(array_from_bytes(&bytes, &shape)?),
    })
}

/// Whether `value` is an object carrying the array tag.
pub fn is_tagged(value: &Value) -> bool {
    value
        .as_object()
        .map(|o| o.contains_key(NDARRAY_TAG))
        .unwrap_or(false)
}

fn parse_literal(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }
    let converted = py_literal::to_json(text)?;
    serde_json::from_str(&converted).ok()
}
