/// Static content handler

use super::listing::render_listing;
use anonshare_core::{ContentSource, Entry, FileContents, FileEntry, SourceError};
use axum::{
    body::Body,
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use percent_encoding::percent_decode_str;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

const INDEX_PAGE: &str = "index.html";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub source: Arc<ContentSource>,
}

/// Router serving every path from the content source
pub fn router(source: Arc<ContentSource>) -> Router {
    Router::new()
        .fallback(serve_content)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { source })
}

/// Handler for every path
pub async fn serve_content(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET, HEAD")],
        )
            .into_response();
    }

    let Ok(path) = percent_decode_str(uri.path()).decode_utf8() else {
        return not_found();
    };

    match state.source.lookup(&path).await {
        Ok(Entry::File(file)) => file_response(file),
        Ok(Entry::Directory(listing)) => {
            if !path.ends_with('/') {
                return redirect_to_directory(&uri);
            }

            let has_index = listing
                .iter()
                .any(|entry| entry.name == INDEX_PAGE && !entry.is_dir);
            if has_index {
                let index_path = format!("{}{}", path, INDEX_PAGE);
                if let Ok(Entry::File(file)) = state.source.lookup(&index_path).await {
                    return file_response(file);
                }
            }

            if !state.source.allows_listing() {
                return not_found();
            }
            (
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                render_listing(&listing),
            )
                .into_response()
        }
        Err(SourceError::NotFound) => {
            debug!("Not found: {}", path);
            not_found()
        }
        Err(err) => {
            warn!("Failed to read {}: {}", path, err);
            (StatusCode::INTERNAL_SERVER_ERROR, "500 internal server error\n").into_response()
        }
    }
}

fn file_response(file: FileEntry) -> Response {
    let mime = mime_guess::from_path(&file.name).first_or_octet_stream();
    let body = match file.contents {
        FileContents::Disk(handle) => Body::from_stream(ReaderStream::new(handle)),
        FileContents::Stream(pipe) => Body::from_stream(ReaderStream::new(pipe)),
    };

    (
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (header::CONTENT_LENGTH, file.len.to_string()),
        ],
        body,
    )
        .into_response()
}

/// Relative redirect from `/dir` to `/dir/`, so it works under any prefix
fn redirect_to_directory(uri: &Uri) -> Response {
    let last = uri.path().rsplit('/').next().unwrap_or_default();
    let mut location = format!("{}/", last);
    if let Some(query) = uri.query() {
        location.push('?');
        location.push_str(query);
    }
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 page not found\n").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn directory_router() -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("site")).unwrap();
        std::fs::write(dir.path().join("site").join("index.html"), "<h1>site</h1>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "plain notes").unwrap();
        std::fs::write(dir.path().join("my file.txt"), "spaced").unwrap();

        let source = ContentSource::resolve(dir.path(), false).await.unwrap();
        (dir, router(Arc::new(source)))
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn test_serves_file_with_content_type() {
        let (_dir, router) = directory_router().await;
        let (status, headers, body) = get(router, "/notes.txt").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "plain notes");
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(headers[header::CONTENT_LENGTH], "11");
    }

    #[tokio::test]
    async fn test_decodes_escaped_names() {
        let (_dir, router) = directory_router().await;
        let (status, _, body) = get(router, "/my%20file.txt").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "spaced");
    }

    #[tokio::test]
    async fn test_root_listing() {
        let (_dir, router) = directory_router().await;
        let (status, _, body) = get(router, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<a href=\"site/\">site/</a>"));
        assert!(body.contains("<a href=\"notes.txt\">notes.txt</a>"));
    }

    #[tokio::test]
    async fn test_directory_index_and_redirect() {
        let (_dir, router) = directory_router().await;

        let (status, headers, _) = get(router.clone(), "/site").await;
        assert_eq!(status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(headers[header::LOCATION], "site/");

        let (status, _, body) = get(router, "/site/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<h1>site</h1>");
    }

    #[tokio::test]
    async fn test_missing_and_traversal_are_not_found() {
        let (_dir, router) = directory_router().await;
        let (status, _, _) = get(router.clone(), "/missing.txt").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = get(router, "/../../etc/passwd").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rejects_other_methods() {
        let (_dir, router) = directory_router().await;
        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/notes.txt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_single_file_has_no_listing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.pdf");
        std::fs::write(&file, b"%PDF-1.7").unwrap();
        std::fs::write(dir.path().join("sibling.txt"), b"hidden").unwrap();

        let source = ContentSource::resolve(&file, false).await.unwrap();
        let router = router(Arc::new(source));

        let (status, headers, body) = get(router.clone(), "/report.pdf").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "%PDF-1.7");
        assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");

        for uri in ["/", "/sibling.txt", "/other.pdf"] {
            let (status, _, _) = get(router.clone(), uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        }
    }
}
