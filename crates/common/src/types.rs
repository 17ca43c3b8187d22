use crate::error::PublishError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a publication: the published URL or the error that stopped it.
/// Produced exactly once per publication.
pub type PublicationResult = std::result::Result<String, PublishError>;

/// Stages a publication moves through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Connected,
    Authenticated,
    IdentityReady,
    ListenerPublished,
    Serving,
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
            Self::IdentityReady => "identity ready",
            Self::ListenerPublished => "listener published",
            Self::Serving => "serving",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Machine-readable form of a publication result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultReport {
    Published { url: String },
    Failed { error: String },
}

impl From<&PublicationResult> for ResultReport {
    fn from(result: &PublicationResult) -> Self {
        match result {
            Ok(url) => Self::Published { url: url.clone() },
            Err(err) => Self::Failed {
                error: err.to_string(),
            },
        }
    }
}
