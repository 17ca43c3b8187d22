use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;

/// Length of an ed25519 secret seed
pub const SEED_LEN: usize = 32;

/// Private key material for a published service
///
/// The published address is a function of the public half, so whoever holds
/// this key controls the address.
#[derive(Clone)]
pub struct ServiceKey {
    signing_key: SigningKey,
}

impl ServiceKey {
    /// Generate a new random key
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut seed = [0u8; SEED_LEN];
        OsRng.fill_bytes(&mut seed);

        let key = Self::from_seed(&seed);
        seed.fill(0);
        key
    }

    /// Create a key from a secret seed
    pub fn from_seed(seed: &[u8; SEED_LEN]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Get the secret seed bytes
    pub fn seed_bytes(&self) -> [u8; SEED_LEN] {
        self.signing_key.to_bytes()
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.verifying_key().to_bytes()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.public_bytes() == other.public_bytes()
    }
}

impl Eq for ServiceKey {}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceKey")
            .field("public_key", &hex::encode(self.public_bytes()))
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation_is_random() {
        let a = ServiceKey::generate();
        let b = ServiceKey::generate();
        assert_ne!(a.public_bytes(), b.public_bytes());
    }

    #[test]
    fn test_key_from_seed() {
        let key1 = ServiceKey::generate();
        let key2 = ServiceKey::from_seed(&key1.seed_bytes());
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let key = ServiceKey::from_seed(&[7u8; SEED_LEN]);
        let rendered = format!("{:?}", key);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&hex::encode(key.seed_bytes())));
    }
}
