//! Stable label-set fingerprints.
//!
//! A fingerprint is xxHash64 over [`LabelSet::canonical`] with a fixed seed,
//! so the same label set maps to the same value in every process. Ingestion
//! uses it as the storage key; the query path recomputes it from the
//! selector. Distinct label sets that collide are conflated.

use crate::core::error::{GatewayError, Result};
use crate::core::types::LabelSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use xxhash_rust::xxh64::xxh64;

const FINGERPRINT_SEED: u64 = 0;

/// 64-bit identifier of a label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Wraps a raw fingerprint value
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Numeric form, used as storage key and query literal
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Hex form: 16 lowercase hex digits, big-endian
    pub fn to_hex(self) -> String {
        hex::encode(self.0.to_be_bytes())
    }

    /// Parses the hex form produced by [`Fingerprint::to_hex`]
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| GatewayError::parse(format!("invalid fingerprint hex '{}': {}", s, e)))?;
        let bytes: [u8; 8] = bytes
            .try_into()
            .map_err(|_| GatewayError::parse(format!("fingerprint hex '{}' is not 8 bytes", s)))?;
        Ok(Self(u64::from_be_bytes(bytes)))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|e| GatewayError::parse(format!("invalid fingerprint '{}': {}", s, e)))
    }
}

/// Computes the fingerprint of a label set.
#[inline]
pub fn fingerprint(labels: &LabelSet) -> Fingerprint {
    Fingerprint(xxh64(labels.canonical().as_bytes(), FINGERPRINT_SEED))
}
