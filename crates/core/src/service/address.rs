/// Published address construction
///
/// The address handed to the user is `http://<host>/<slug>/<file>`, where the
/// host comes from the transport listener with its port removed, the slug is
/// present only in slug mode and the file name only when a single file is
/// published.

use super::slug::CapabilitySlug;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt;

/// Characters left as-is when escaping a file name; everything else,
/// including space, is percent-encoded.
const FILENAME_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Escape a file name for use as a URL path segment
pub fn escape_filename(name: &str) -> String {
    utf8_percent_encode(name, FILENAME_ESCAPE).to_string()
}

/// Strip a trailing `:<port>` from a listener address
pub fn service_host(bound_address: &str) -> &str {
    match bound_address.rsplit_once(':') {
        Some((host, port))
            if !host.is_empty() && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            host
        }
        _ => bound_address,
    }
}

/// The URL a publication is reachable at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedAddress {
    host: String,
    path: String,
}

impl PublishedAddress {
    /// Build from the listener's bound address, the slug and the escaped
    /// file name of a single-file source (empty otherwise)
    pub fn new(bound_address: &str, slug: Option<&CapabilitySlug>, escaped_file: &str) -> Self {
        let mut path = String::new();
        if let Some(slug) = slug {
            path.push_str(slug.as_str());
            path.push('/');
        }
        path.push_str(escaped_file);

        Self {
            host: service_host(bound_address).to_string(),
            path,
        }
    }

    /// Host part, e.g. `abc...xyz.onion`
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Path after the leading `/`
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn to_url(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PublishedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}/{}", self.host, self.path)
    }
}
