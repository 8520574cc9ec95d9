//! Build fingerprint
//!
//! Fields are folded into a seeded SHA-256 with explicit lengths and tags,
//! and the first eight bytes of the digest form the 64-bit build hash.

use sha2::{Digest, Sha256};

const SEED: &[u8] = b"xsdstream.runtime.v1";

/// Incremental fingerprint over byte-level fields
pub struct Fingerprint {
    hasher: Sha256,
}

impl Default for Fingerprint {
    fn default() -> Self {
        let mut hasher = Sha256::new();
        hasher.update(SEED);
        Self { hasher }
    }
}

impl Fingerprint {
    /// Start a fingerprint
    pub fn new() -> Self {
        Self::default()
    }

    /// Separate sections so adjacent tables cannot alias
    pub fn tag(&mut self, tag: &str) -> &mut Self {
        self.hasher.update([0xFF]);
        self.str(tag)
    }

    /// Add a `u32`
    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.hasher.update(value.to_le_bytes());
        self
    }

    /// Add a `u64`
    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.hasher.update(value.to_le_bytes());
        self
    }

    /// Add a flag
    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.hasher.update([u8::from(value)]);
        self
    }

    /// Add a length-prefixed string
    pub fn str(&mut self, value: &str) -> &mut Self {
        self.u64(value.len() as u64);
        self.hasher.update(value.as_bytes());
        self
    }

    /// Add an optional string
    pub fn opt_str(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(value) => self.bool(true).str(value),
            None => self.bool(false),
        }
    }

    /// The 64-bit fingerprint
    pub fn finish(self) -> u64 {
        let digest = self.hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(parts: &[&str]) -> u64 {
        let mut fp = Fingerprint::new();
        for part in parts {
            fp.str(part);
        }
        fp.finish()
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(hash(&["a", "bc"]), hash(&["a", "bc"]));
    }

    #[test]
    fn test_length_prefix_separates_fields() {
        assert_ne!(hash(&["a", "bc"]), hash(&["ab", "c"]));
    }
}
