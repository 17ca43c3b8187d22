/// Capability gate middleware
///
/// Wraps the content router so that only requests carrying the slug reach
/// it. A rejected request is answered with a service error instead of a
/// response, which makes hyper drop the connection without writing a single
/// byte: the client cannot tell a wrong slug from a dead service.

use anonshare_core::{CapabilityGate, GateDecision, RejectReason};
use axum::{
    http::{header, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{BoxError, Layer, Service};
use tracing::debug;

/// Error returned for requests without a valid slug
#[derive(Debug)]
pub struct Rejected(pub RejectReason);

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request rejected by capability gate: {:?}", self.0)
    }
}

impl std::error::Error for Rejected {}

/// Layer producing [`CapabilityService`]
#[derive(Clone)]
pub struct CapabilityLayer {
    gate: Arc<CapabilityGate>,
}

impl CapabilityLayer {
    pub fn new(gate: CapabilityGate) -> Self {
        Self {
            gate: Arc::new(gate),
        }
    }
}

impl<S> Layer<S> for CapabilityLayer {
    type Service = CapabilityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CapabilityService {
            inner,
            gate: self.gate.clone(),
        }
    }
}

/// Service checking and stripping the capability slug
#[derive(Clone)]
pub struct CapabilityService<S> {
    inner: S,
    gate: Arc<CapabilityGate>,
}

type GateFuture = Pin<Box<dyn Future<Output = Result<Response, BoxError>> + Send>>;

impl<S, B> Service<Request<B>> for CapabilityService<S>
where
    S: Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = BoxError;
    type Future = GateFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        if !self.gate.is_open() {
            let target = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_owned())
                .unwrap_or_else(|| "/".to_owned());

            match self.gate.decide(&target) {
                GateDecision::Forward(rewritten) => match rewritten.parse::<Uri>() {
                    Ok(uri) => *req.uri_mut() = uri,
                    Err(_) => return reject(RejectReason::WrongSlug),
                },
                GateDecision::Redirect(location) => {
                    return Box::pin(async move { Ok(found(&location)) });
                }
                GateDecision::Reject(reason) => return reject(reason),
            }
        }

        debug!("Request for \"{}\"", req.uri());

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(req).await.map_err(Into::into) })
    }
}

fn reject(reason: RejectReason) -> GateFuture {
    debug!("Dropping connection: {:?}", reason);
    Box::pin(async move { Err(Rejected(reason).into()) })
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_owned())]).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, Router};
    use tower::ServiceExt;

    const SLUG: &str = "abcdefghijklmnop";

    fn echo_router() -> Router {
        Router::new().fallback(|uri: Uri| async move { uri.to_string() })
    }

    fn gated() -> CapabilityService<Router> {
        CapabilityLayer::new(CapabilityGate::new(SLUG.parse().unwrap())).layer(echo_router())
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_matching_slug_is_stripped() {
        let response = gated()
            .oneshot(request("/abcdefghijklmnop/docs/a.txt?x=1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "/docs/a.txt?x=1");
    }

    #[tokio::test]
    async fn test_wrong_slug_is_an_error() {
        for uri in ["/", "/index.html", "/ABCDEFGHIJKLMNOP/", "/abcdefghijklmnoq/"] {
            let err = gated().oneshot(request(uri)).await.unwrap_err();
            assert!(err.downcast_ref::<Rejected>().is_some(), "{uri} was not rejected");
        }
    }

    #[tokio::test]
    async fn test_bare_slug_redirects() {
        let response = gated()
            .oneshot(request("/abcdefghijklmnop"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/abcdefghijklmnop/"
        );
    }

    #[tokio::test]
    async fn test_open_gate_passes_through() {
        let service = CapabilityLayer::new(CapabilityGate::open()).layer(echo_router());
        let response = service.oneshot(request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "/");
    }
}
