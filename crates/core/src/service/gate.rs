/// Capability gate decisions
///
/// The gate looks at the raw request target (path and query) and decides
/// whether it carries the slug. It knows nothing about HTTP; the gateway
/// turns a decision into a forwarded request, a redirect or a dropped
/// connection.

use super::slug::CapabilitySlug;
use std::borrow::Cow;
use subtle::ConstantTimeEq;

/// What to do with a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision<'a> {
    /// Forward with this rewritten target (always starts with `/`)
    Forward(Cow<'a, str>),

    /// The slug matched but nothing follows it; send the client to the slug root
    Redirect(String),

    /// Drop the connection without answering
    Reject(RejectReason),
}

/// Why a request was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TooShort,
    WrongSlug,
}

/// Filters request targets against an optional capability slug
#[derive(Debug, Clone, Default)]
pub struct CapabilityGate {
    slug: Option<CapabilitySlug>,
}

impl CapabilityGate {
    /// Gate requiring `slug`
    pub fn new(slug: CapabilitySlug) -> Self {
        Self { slug: Some(slug) }
    }

    /// Gate that lets everything through unchanged
    pub fn open() -> Self {
        Self { slug: None }
    }

    pub fn slug(&self) -> Option<&CapabilitySlug> {
        self.slug.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.slug.is_none()
    }

    /// Decide what to do with a request target such as `/slug/file?x=1`
    pub fn decide<'a>(&self, target: &'a str) -> GateDecision<'a> {
        let Some(slug) = &self.slug else {
            return GateDecision::Forward(Cow::Borrowed(target));
        };

        let stripped = target.strip_prefix('/').unwrap_or(target);
        if stripped.len() < slug.len() {
            return GateDecision::Reject(RejectReason::TooShort);
        }

        // Constant time over the whole slug, wherever the first difference is.
        let candidate = &stripped.as_bytes()[..slug.len()];
        if !bool::from(slug.as_bytes().ct_eq(candidate)) {
            return GateDecision::Reject(RejectReason::WrongSlug);
        }

        // The prefix equals the ASCII slug, so this is a char boundary.
        let rest = &stripped[slug.len()..];
        let rest_path = rest.split('?').next().unwrap_or_default();
        if rest_path.is_empty() {
            return GateDecision::Redirect(format!("/{}/", slug.as_str()));
        }

        if rest.starts_with('/') {
            GateDecision::Forward(Cow::Borrowed(rest))
        } else {
            GateDecision::Forward(Cow::Owned(format!("/{}", rest)))
        }
    }
}
