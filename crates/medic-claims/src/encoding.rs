//! Attribute value encoding.
//!
//! Claims sign the integer form of every attribute. A value that already is
//! a 32-bit decimal integer encodes to itself; anything else encodes to the
//! big-endian integer of its UTF-8 bytes, written in decimal.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Longest raw value, in bytes, a verifier will encode.
pub const MAX_RAW_LEN: usize = 4096;

/// Raw and encoded form of one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub raw: String,
    pub encoded: String,
}

impl AttributeValue {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let encoded = encode(&raw);
        Self { raw, encoded }
    }

    /// Whether `encoded` is the encoding of `raw`.
    pub fn is_consistent(&self) -> bool {
        encode(&self.raw) == self.encoded
    }
}

/// Attribute name to value.
pub type AttributeValues = BTreeMap<String, AttributeValue>;

/// Build attribute values from `(name, raw)` pairs.
pub fn attribute_values<I, K, V>(pairs: I) -> AttributeValues
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), AttributeValue::new(v)))
        .collect()
}

/// Encode a raw attribute value.
pub fn encode(raw: &str) -> String {
    if raw.parse::<i32>().is_ok() {
        return raw.to_string();
    }
    BigUint::from_bytes_be(raw.as_bytes()).to_str_radix(10)
}
