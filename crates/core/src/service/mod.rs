/// Published service plumbing
///
/// - Capability slugs and the gate that checks them
/// - Published address formatting

pub mod address;
pub mod gate;
pub mod slug;

pub use address::{escape_filename, service_host, PublishedAddress};
pub use gate::{CapabilityGate, GateDecision, RejectReason};
pub use slug::{CapabilitySlug, SlugError};
