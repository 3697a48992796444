//! Image sources and their resolution to pixel tensors.
//!
//! A caller hands over an image in one of five encodings. [`Source`] is the
//! tagged form of that literal; [`SourceResolver`] turns it into an
//! `(height, width, 3)` array of `u8` samples.

mod resolver;
mod s3;

pub use resolver::{decode_image, SourceResolver};
pub use s3::{FetchError, ObjectFetcher, S3Fetcher};

use crate::codec::{self, Decoded, NdArray};
use crate::{Result, VizorError};
use ndarray::{Array3, Ix3};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// A caller-supplied image reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// Base64-encoded image container bytes, optionally as a `data:` URL.
    Base64(String),
    /// `s3://bucket/key`.
    ObjectStore {
        uri: String,
        bucket: String,
        key: String,
    },
    /// `http://` or `https://` URL.
    Http(String),
    /// `file://` URL or an existing local path.
    File { literal: String, path: PathBuf },
    /// An already decoded pixel array.
    Tensor(Array3<u8>),
}

impl Source {
    /// Sniff a string literal.
    ///
    /// Order: encoded array, `s3`/`http(s)`/`file` URL, existing path, and
    /// finally base64 image bytes.
    pub fn parse(literal: &str) -> Result<Self> {
        if literal.trim().is_empty() {
            return Err(VizorError::invalid_argument("source must not be empty"));
        }

        if let Decoded::Array(array) = codec::decode(&Value::String(literal.to_string())) {
            return Ok(Source::Tensor(into_pixels(array, literal)?));
        }

        if let Ok(url) = url::Url::parse(literal) {
            match url.scheme() {
                "s3" => {
                    let (bucket, key) = split_object_ref(literal);
                    if bucket.is_empty() || key.is_empty() {
                        return Err(VizorError::invalid_argument(format!(
                            "object store reference {} must name a bucket and a key",
                            literal
                        )));
                    }
                    return Ok(Source::ObjectStore {
                        uri: literal.to_string(),
                        bucket,
                        key,
                    });
                }
                "http" | "https" => return Ok(Source::Http(literal.to_string())),
                "file" => {
                    let path = url
                        .to_file_path()
                        .unwrap_or_else(|_| PathBuf::from(url.path()));
                    return Ok(Source::File {
                        literal: literal.to_string(),
                        path,
                    });
                }
                _ => {}
            }
        }

        if Path::new(literal).is_file() {
            return Ok(Source::File {
                literal: literal.to_string(),
                path: PathBuf::from(literal),
            });
        }

        Ok(Source::Base64(literal.to_string()))
    }

    /// Interpret a JSON request field.
    ///
    /// `null` is rejected, objects must be encoded arrays and strings are
    /// sniffed with [`Source::parse`].
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Err(VizorError::invalid_argument("source must not be null")),
            Value::String(literal) => Self::parse(literal),
            Value::Object(_) => match codec::try_decode(value) {
                Some(array) => Ok(Source::Tensor(into_pixels(array, "array")?)),
                None => Err(VizorError::SourceDecode {
                    source_ref: "array".into(),
                    message: "object is not a well-formed encoded array".into(),
                }),
            },
            other => Err(VizorError::invalid_argument(format!(
                "unsupported source type: {}",
                json_type(other)
            ))),
        }
    }

    /// Stable identity used for cache keys: the literal as given, or the
    /// canonical encoding of a tensor.
    pub fn identity(&self) -> String {
        match self {
            Source::Base64(literal) | Source::Http(literal) => literal.clone(),
            Source::ObjectStore { uri, .. } => uri.clone(),
            Source::File { literal, .. } => literal.clone(),
            Source::Tensor(_) => self.to_wire().to_string(),
        }
    }

    /// JSON form sent to a remote endpoint.
    pub fn to_wire(&self) -> Value {
        match self {
            Source::Tensor(pixels) => codec::encode(&NdArray::from(pixels.clone().into_dyn())),
            _ => Value::String(self.identity()),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Source::Base64(_) => "base64",
            Source::ObjectStore { .. } => "s3",
            Source::Http(_) => "http",
            Source::File { .. } => "file",
            Source::Tensor(_) => "tensor",
        }
    }
}

impl From<Array3<u8>> for Source {
    fn from(pixels: Array3<u8>) -> Self {
        Source::Tensor(pixels)
    }
}

/// Check that a decoded array is a `(height, width, 3)` `u8` image.
pub(crate) fn into_pixels(array: NdArray, source_ref: &str) -> Result<Array3<u8>> {
    let decode_error = |message: String| VizorError::SourceDecode {
        source_ref: truncate(source_ref),
        message,
    };

    let dtype = array.dtype();
    let array = array
        .into_u8()
        .ok_or_else(|| decode_error(format!("expected a uint8 array, got {}", dtype)))?;
    let pixels = array
        .into_dimensionality::<Ix3>()
        .map_err(|e| decode_error(format!("expected a 3-dimensional array: {}", e)))?;

    if pixels.shape()[2] != 3 {
        return Err(decode_error(format!(
            "expected 3 channels, got {}",
            pixels.shape()[2]
        )));
    }
    Ok(pixels)
}

/// Bucket and key of an `s3://bucket/key` literal, taken from the raw text
/// (Url would percent-encode the key). Query and fragment are not part of
/// the key.
fn split_object_ref(literal: &str) -> (String, String) {
    let rest = literal
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(literal);
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    match rest.split_once('/') {
        Some((bucket, key)) => (bucket.to_string(), key.to_string()),
        None => (rest.to_string(), String::new()),
    }
}

/// Keep error messages readable when the reference is a long base64 blob.
pub(crate) fn truncate(source_ref: &str) -> String {
    const MAX: usize = 64;
    match source_ref.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &source_ref[..idx]),
        None => source_ref.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
