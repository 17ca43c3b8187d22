/// Passphrase-derived service identities
///
/// A passphrase is turned into a pseudorandom keystream with BLAKE3 in
/// key-derivation mode. The context string separates this use of the
/// passphrase from any other, and the extendable output is read as the
/// entropy source for key generation, so the same passphrase always yields
/// the same key and therefore the same published address.

use super::keypair::{ServiceKey, SEED_LEN};
use std::io::Read;

/// Domain-separation label for service key derivation
pub const KEYGEN_CONTEXT: &str = "anonshare 2026-10-19 service identity keygen";

/// Errors while deriving a service key
#[derive(Debug, thiserror::Error)]
pub enum KeyDerivationError {
    #[error("passphrase is empty")]
    EmptyPassphrase,

    #[error("keystream read failed: {0}")]
    Keystream(#[from] std::io::Error),
}

/// Open the keystream for `passphrase` under `context`
pub fn keystream(passphrase: &[u8], context: &str) -> impl Read {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(passphrase);
    hasher.finalize_xof()
}

/// Derive the service key for a passphrase
pub fn derive_service_key(passphrase: &str) -> Result<ServiceKey, KeyDerivationError> {
    if passphrase.is_empty() {
        return Err(KeyDerivationError::EmptyPassphrase);
    }

    let mut stream = keystream(passphrase.as_bytes(), KEYGEN_CONTEXT);
    let mut seed = [0u8; SEED_LEN];
    stream.read_exact(&mut seed)?;

    let key = ServiceKey::from_seed(&seed);
    seed.fill(0);
    Ok(key)
}
