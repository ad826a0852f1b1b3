//! Deterministic cache keys.
//! Key: blake3 hash of (from_style | to_style | normalized_text), where
//! normalization trims and collapses internal whitespace.

use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;
use crate::style::Style;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn compute(from: Style, to: Style, text: &str) -> Self {
        let normalized = normalize_text(text);
        let mut hasher = blake3::Hasher::new();
        hasher.update(from.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(to.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(normalized.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for CacheKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        blake3::Hash::from_hex(s.trim())
            .map(|hash| Self(*hash.as_bytes()))
            .map_err(|_| StoreError::InvalidKey(s.to_string()))
    }
}

/// Trim and collapse every run of whitespace to a single space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
