/// HTTP gateway
///
/// Serves a content source read-only over plain HTTP/1, behind the
/// capability gate:
/// - `gate`: slug check and rewrite as a tower layer
/// - `handlers`: static file and directory handling
/// - `server`: accept loop over a published listener

pub mod gate;
pub mod handlers;
pub mod listing;
pub mod server;

pub use gate::{CapabilityLayer, CapabilityService, Rejected};
pub use server::serve;

use anonshare_core::{CapabilityGate, ContentSource};
use axum::Router;
use std::sync::Arc;
use tower::Layer;

/// The complete request pipeline: gate in front of the content router
pub type GatewayService = CapabilityService<Router>;

/// Build the gated service for a content source
pub fn build(source: Arc<ContentSource>, gate: CapabilityGate) -> GatewayService {
    CapabilityLayer::new(gate).layer(handlers::router(source))
}
