mod derive;
mod keypair;

pub use derive::{derive_service_key, keystream, KeyDerivationError, KEYGEN_CONTEXT};
pub use keypair::{ServiceKey, SEED_LEN};
