/// Transport provider interface
///
/// The anonymizing transport is driven through a control channel with four
/// operations: connect, authenticate, create a published listener, and read
/// the next asynchronous event. Any provider implementing these traits can
/// publish a service.

use crate::identity::ServiceKey;
use anonshare_common::transport::SERVICE_PORT;
use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

/// A byte stream accepted from a published listener
pub trait ServiceStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> ServiceStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Parameters for creating a published listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Key to publish under; `None` lets the provider generate one
    pub key: Option<ServiceKey>,

    /// Return only once the service is discoverable
    pub await_propagation: bool,

    /// Ask the provider to keep the private key after publication
    pub retain_key: bool,

    /// Virtual port clients connect to
    pub port: u16,
}

impl ListenerConfig {
    /// Publish under a provider-generated key that is discarded afterwards
    pub fn ephemeral() -> Self {
        Self {
            key: None,
            await_propagation: true,
            retain_key: false,
            port: SERVICE_PORT,
        }
    }

    /// Publish under a caller-supplied key
    pub fn with_key(key: ServiceKey) -> Self {
        Self {
            key: Some(key),
            await_propagation: true,
            retain_key: true,
            port: SERVICE_PORT,
        }
    }

    pub fn uses_supplied_key(&self) -> bool {
        self.key.is_some()
    }
}

/// An asynchronous notification from the control channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEvent {
    pub kind: String,
    pub body: String,
}

impl ControlEvent {
    pub fn new(kind: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            body: body.into(),
        }
    }
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unsupported endpoint: {0}")]
    UnsupportedEndpoint(String),

    #[error("rejected by provider ({code}): {message}")]
    Rejected { code: u16, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("control connection closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Opens control connections
#[async_trait]
pub trait ControlConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn ControlConnection>, TransportError>;
}

/// An open control connection
#[async_trait]
pub trait ControlConnection: Send {
    async fn authenticate(&mut self, credential: &str) -> Result<(), TransportError>;

    async fn create_listener(
        &mut self,
        config: ListenerConfig,
    ) -> Result<Box<dyn PublishedListener>, TransportError>;

    /// Wait for the next event; an error means the transport is gone
    async fn next_event(&mut self) -> Result<ControlEvent, TransportError>;

    /// Release the connection and any services tied to it
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// A listener reachable through the transport
#[async_trait]
pub trait PublishedListener: Send {
    /// Address as reported by the provider, e.g. `abc...xyz.onion:80`
    fn bound_address(&self) -> &str;

    async fn accept(&mut self) -> io::Result<Box<dyn ServiceStream>>;

    async fn close(&mut self) -> io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_config_defaults() {
        let config = ListenerConfig::ephemeral();
        assert!(!config.uses_supplied_key());
        assert!(config.await_propagation);
        assert!(!config.retain_key);
        assert_eq!(config.port, 80);
    }

    #[test]
    fn test_listener_config_with_key() {
        let key = ServiceKey::from_seed(&[3u8; 32]);
        let config = ListenerConfig::with_key(key.clone());
        assert!(config.uses_supplied_key());
        assert!(config.retain_key);
        assert_eq!(config.key, Some(key));
    }
}
