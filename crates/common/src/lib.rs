/// Shared configuration, errors and result types for anonshare
pub mod config;
pub mod error;
pub mod types;

pub use config::{slug, timeouts, transport, ConfigError, PublicationConfig, TimeoutConfig};
pub use error::{PublishError, Result};
pub use types::{LifecycleState, PublicationResult, ResultReport};
