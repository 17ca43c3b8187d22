/// Directory listing pages

use anonshare_core::DirEntry;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt::Write;

/// Escaped in listing hrefs; unreserved characters and `/` pass through
const HREF_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Render a listing as a minimal HTML page of relative links
pub fn render_listing(entries: &[DirEntry]) -> String {
    let mut html = String::from(
        "<!doctype html>\n<meta name=\"viewport\" content=\"width=device-width\">\n<pre>\n",
    );

    for entry in entries {
        let mut name = entry.name.clone();
        if entry.is_dir {
            name.push('/');
        }
        let _ = writeln!(
            html,
            "<a href=\"{}\">{}</a>",
            utf8_percent_encode(&name, HREF_ESCAPE),
            html_escape(&name)
        );
    }

    html.push_str("</pre>\n");
    html
}

fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_links() {
        let html = render_listing(&[
            DirEntry {
                name: "docs".to_string(),
                is_dir: true,
            },
            DirEntry {
                name: "a b&<c>.txt".to_string(),
                is_dir: false,
            },
        ]);

        assert!(html.contains("<a href=\"docs/\">docs/</a>"));
        assert!(html.contains("<a href=\"a%20b%26%3Cc%3E.txt\">a b&amp;&lt;c&gt;.txt</a>"));
    }
}
