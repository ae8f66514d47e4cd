//! Fingerprints of canonical models
//!
//! SHA-256 over the compact JSON serialization. Only meaningful for values
//! whose serialization is already deterministic, which canonical models are.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::Result;

/// Lowercase hex SHA-256 digest
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(data)))
    }

    /// Digest of a value's compact JSON form
    pub fn of<T: Serialize>(value: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self::from_bytes(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for display
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }

    /// Whether `value` serializes to the content this checksum was taken of
    pub fn matches<T: Serialize>(&self, value: &T) -> Result<bool> {
        Ok(Self::of(value)? == *self)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}

impl From<String> for Checksum {
    fn from(hex: String) -> Self {
        Self(hex.strip_prefix("sha256:").map(String::from).unwrap_or(hex))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checksum_is_stable() {
        let value = json!({ "entities": [{ "name": "Orders" }] });
        assert_eq!(Checksum::of(&value).unwrap(), Checksum::of(&value).unwrap());
        assert_eq!(Checksum::of(&value).unwrap().as_str().len(), 64);
    }

    #[test]
    fn test_checksum_distinguishes_content() {
        let a = Checksum::of(&json!({ "name": "Orders" })).unwrap();
        let b = Checksum::of(&json!({ "name": "Order" })).unwrap();
        assert_ne!(a, b);
        assert!(a.matches(&json!({ "name": "Orders" })).unwrap());
    }

    #[test]
    fn test_display_round_trips_through_from() {
        let sum = Checksum::from_bytes(b"datalex");
        assert_eq!(Checksum::from(sum.to_string()), sum);
        assert_eq!(sum.short().len(), 12);
    }
}
