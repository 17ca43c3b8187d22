/// Capability slugs
///
/// A slug is a short random base32 string placed as the first path segment
/// of the published URL. Knowing the full URL is the only way in.

use anonshare_common::slug::{LENGTH, RANDOM_BYTES};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use std::fmt;
use std::str::FromStr;

/// A secret path prefix gating the published service
#[derive(Clone, PartialEq, Eq)]
pub struct CapabilitySlug(String);

impl CapabilitySlug {
    /// Generate a fresh slug from the operating system RNG
    pub fn generate() -> Result<Self, SlugError> {
        Self::generate_with(&mut OsRng)
    }

    /// Generate a slug from the given RNG
    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, SlugError> {
        let mut bytes = [0u8; RANDOM_BYTES];
        rng.try_fill_bytes(&mut bytes)
            .map_err(|e| SlugError::Entropy(e.to_string()))?;

        let mut encoded = data_encoding::BASE32_NOPAD.encode(&bytes).to_lowercase();
        encoded.truncate(LENGTH);
        Ok(Self(encoded))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for CapabilitySlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CapabilitySlug(<redacted>)")
    }
}

impl FromStr for CapabilitySlug {
    type Err = SlugError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != LENGTH {
            return Err(SlugError::InvalidLength(s.len()));
        }
        if !s.bytes().all(|b| matches!(b, b'a'..=b'z' | b'2'..=b'7')) {
            return Err(SlugError::InvalidAlphabet);
        }
        Ok(Self(s.to_string()))
    }
}

/// Slug errors
#[derive(Debug, thiserror::Error)]
pub enum SlugError {
    #[error("random source failed: {0}")]
    Entropy(String),

    #[error("invalid slug length: {0} (expected {expected})", expected = LENGTH)]
    InvalidLength(usize),

    #[error("slug must use the lowercase base32 alphabet")]
    InvalidAlphabet,
}
