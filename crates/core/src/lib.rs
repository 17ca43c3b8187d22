pub mod identity;
pub mod service;
pub mod source;
pub mod transport;

pub use identity::{derive_service_key, KeyDerivationError, ServiceKey, KEYGEN_CONTEXT};

pub use service::{
    escape_filename, CapabilityGate, CapabilitySlug, GateDecision, PublishedAddress, RejectReason,
    SlugError,
};

pub use source::{ContentSource, DirEntry, Entry, FileContents, FileEntry, SourceError};

pub use transport::{
    ControlConnection, ControlConnector, ControlEvent, ListenerConfig, PublishedListener,
    ServiceStream, TransportError,
};
