//! # Lockstep Codec
//!
//! CBOR serialization for values held by persistent lockstep backends.
//!
//! The transaction core never looks at bytes: values travel through it as
//! plain Rust types. Backends that keep values outside the process (the file
//! backend in `lockstep_storage`) use this crate to turn any `serde` type into
//! a self-describing CBOR document and back.
//!
//! ## Usage
//!
//! ```
//! use lockstep_codec::{decode, encode};
//! use std::collections::BTreeMap;
//!
//! let mut counts = BTreeMap::new();
//! counts.insert("a".to_string(), 3_i64);
//!
//! let bytes = encode(&counts).unwrap();
//! let decoded: BTreeMap<String, i64> = decode(&bytes).unwrap();
//! assert_eq!(counts, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;

pub use error::{CodecError, CodecResult};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a value to CBOR bytes.
///
/// # Errors
///
/// Returns an error if the value's `Serialize` implementation fails.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(bytes)
}

/// Decode a value from CBOR bytes.
///
/// The input must contain exactly one CBOR item.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR, do not match the shape
/// of `T`, or carry data after the first item.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    let mut reader = bytes;
    let value = ciborium::de::from_reader(&mut reader)
        .map_err(|e| CodecError::decoding_failed(e.to_string()))?;
    if !reader.is_empty() {
        return Err(CodecError::TrailingBytes {
            remaining: reader.len(),
        });
    }
    Ok(value)
}
