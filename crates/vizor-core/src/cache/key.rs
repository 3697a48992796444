//! Cache key derivation.

use std::fmt;

/// What a cached entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// A resolved source image.
    Source,
    /// A final prediction set.
    Inference,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Source => "source",
            Purpose::Inference => "inference",
        }
    }
}

/// 128-bit key, hex encoded, derived from a source identity and a purpose.
///
/// The derivation only depends on its inputs, so keys are stable across
/// processes and runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(identity: &str, purpose: Purpose) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(identity.as_bytes());
        hasher.update(b"\0");
        hasher.update(purpose.as_str().as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest.as_bytes()[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_128_bit_hex() {
        let key = CacheKey::new("file.jpg", Purpose::Inference);
        assert_eq!(key.as_str().len(), 32);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_is_deterministic() {
        assert_eq!(
            CacheKey::new("s3://bucket/a.jpg", Purpose::Source),
            CacheKey::new("s3://bucket/a.jpg", Purpose::Source)
        );
    }

    #[test]
    fn test_key_depends_on_source_and_purpose() {
        let base = CacheKey::new("a.jpg", Purpose::Source);
        assert_ne!(base, CacheKey::new("b.jpg", Purpose::Source));
        assert_ne!(base, CacheKey::new("a.jpg", Purpose::Inference));
    }

    #[test]
    fn test_separator_prevents_collisions() {
        assert_ne!(
            CacheKey::new("asource", Purpose::Inference),
            CacheKey::new("a", Purpose::Source)
        );
    }
}
