/// anonshare daemon library
///
/// Publishes a local directory, file or zip archive as an onion service:
/// the gated HTTP gateway, the publication lifecycle, and the Tor
/// control-port provider that drives it.

pub mod gateway;
pub mod publisher;
pub mod tor;

pub use gateway::{CapabilityLayer, CapabilityService, GatewayService, Rejected};
pub use publisher::{PublicationHandle, Publisher};
pub use tor::TorConnector;
