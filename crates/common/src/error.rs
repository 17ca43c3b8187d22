use thiserror::Error;

/// Errors that end a publication.
///
/// Configuration and transport-setup errors are delivered once through the
/// publication result. Runtime errors (`TransportLost`, `Serve`) happen after
/// the result was consumed and terminate the service instead.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Unable to open path: {0}")]
    InvalidPath(String),

    #[error("Unable to open archive: {0}")]
    ArchiveOpen(String),

    #[error("Unable to generate slug: {0}")]
    SlugGeneration(String),

    #[error("Unable to derive service key: {0}")]
    KeyDerivation(String),

    #[error("Failed to connect to control endpoint: {0}")]
    ControlConnect(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Failed to create published listener: {0}")]
    ListenerCreation(String),

    #[error("Timed out while {stage}")]
    Timeout { stage: &'static str },

    #[error("Publication cancelled")]
    Cancelled,

    #[error("Lost connection to transport: {0}")]
    TransportLost(String),

    #[error("Cannot serve HTTP: {0}")]
    Serve(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type for publication operations
pub type Result<T> = std::result::Result<T, PublishError>;

impl PublishError {
    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    pub fn archive_open(msg: impl Into<String>) -> Self {
        Self::ArchiveOpen(msg.into())
    }

    pub fn key_derivation(msg: impl Into<String>) -> Self {
        Self::KeyDerivation(msg.into())
    }

    pub fn control_connect(msg: impl Into<String>) -> Self {
        Self::ControlConnect(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn listener_creation(msg: impl Into<String>) -> Self {
        Self::ListenerCreation(msg.into())
    }

    pub fn transport_lost(msg: impl Into<String>) -> Self {
        Self::TransportLost(msg.into())
    }

    /// Bad input: the path, the archive, the slug or the passphrase
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidPath(_)
                | Self::ArchiveOpen(_)
                | Self::SlugGeneration(_)
                | Self::KeyDerivation(_)
        )
    }

    /// The transport provider could not be reached or refused to publish
    pub fn is_transport_setup(&self) -> bool {
        matches!(
            self,
            Self::ControlConnect(_)
                | Self::Authentication(_)
                | Self::ListenerCreation(_)
                | Self::Timeout { .. }
        )
    }

    /// Raised after the result was delivered; the service cannot continue
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::TransportLost(_) | Self::Serve(_))
    }
}
