/// Serve loop over a published listener

use super::GatewayService;
use anonshare_core::PublishedListener;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use std::io;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Longest pause between retries after a failing accept
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// First pause after a failing accept
const MIN_ACCEPT_BACKOFF: Duration = Duration::from_millis(5);

/// How an accept error affects the serve loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// One peer went away before its connection was accepted
    Connection,
    /// The listener is gone for good
    Closed,
    /// Likely temporary, e.g. out of file descriptors
    Resource,
}

fn classify(err: &io::Error) -> AcceptFailure {
    match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut => AcceptFailure::Connection,
        io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::InvalidInput
        | io::ErrorKind::Unsupported => AcceptFailure::Closed,
        _ => AcceptFailure::Resource,
    }
}

/// Accept streams from `listener` and serve HTTP/1 on each until `shutdown`
/// fires. Returns an error only when the listener itself is closed or
/// unusable; per-connection failures are skipped and resource exhaustion is
/// retried with a backoff.
///
/// Connections accepted here end as soon as this future returns or is
/// dropped, whatever the reason.
pub async fn serve(
    listener: &mut dyn PublishedListener,
    service: GatewayService,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let connections = shutdown.child_token();
    let _connections_guard = connections.clone().drop_guard();
    let mut backoff = Duration::ZERO;

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted,
        };

        let stream = match accepted {
            Ok(stream) => {
                backoff = Duration::ZERO;
                stream
            }
            Err(err) => match classify(&err) {
                AcceptFailure::Connection => {
                    debug!("Accept failed for one connection: {}", err);
                    continue;
                }
                AcceptFailure::Closed => return Err(err),
                AcceptFailure::Resource => {
                    backoff = (backoff * 2).clamp(MIN_ACCEPT_BACKOFF, MAX_ACCEPT_BACKOFF);
                    warn!("Accept failed: {}; retrying in {:?}", err, backoff);
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    continue;
                }
            },
        };

        let service = TowerToHyperService::new(service.clone());
        let connections = connections.clone();

        tokio::spawn(async move {
            let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);

            tokio::select! {
                biased;
                _ = connections.cancelled() => debug!("Connection dropped at shutdown"),
                result = connection => {
                    if let Err(e) = result {
                        debug!("Connection closed: {}", e);
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway;
    use anonshare_core::{CapabilityGate, ContentSource, ServiceStream};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::sync::mpsc;

    /// Listener that first replays scripted accept errors, then hands out
    /// streams from a channel
    struct FlakyListener {
        failures: VecDeque<io::ErrorKind>,
        incoming: mpsc::Receiver<DuplexStream>,
    }

    #[async_trait]
    impl PublishedListener for FlakyListener {
        fn bound_address(&self) -> &str {
            "flaky.onion:80"
        }

        async fn accept(&mut self) -> io::Result<Box<dyn ServiceStream>> {
            if let Some(kind) = self.failures.pop_front() {
                return Err(io::Error::new(kind, "scripted accept failure"));
            }
            match self.incoming.recv().await {
                Some(stream) => Ok(Box::new(stream)),
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    async fn fixture() -> (tempfile::TempDir, GatewayService) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("note.txt"), "secret").unwrap();
        let source = ContentSource::resolve(dir.path(), false).await.unwrap();
        (dir, gateway::build(Arc::new(source), CapabilityGate::open()))
    }

    fn listener(failures: &[io::ErrorKind]) -> (FlakyListener, mpsc::Sender<DuplexStream>) {
        let (dialer, incoming) = mpsc::channel(4);
        let listener = FlakyListener {
            failures: failures.iter().copied().collect(),
            incoming,
        };
        (listener, dialer)
    }

    /// Send a keep-alive request and read exactly one response ending in `body`
    async fn exchange(client: &mut DuplexStream, body: &str) -> String {
        client
            .write_all(b"GET /note.txt HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let mut response = Vec::new();
        let mut chunk = [0u8; 1024];
        while !response.ends_with(body.as_bytes()) {
            let n = client.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed early");
            response.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8_lossy(&response).into_owned()
    }

    #[test]
    fn test_classify_accept_errors() {
        let err = |kind| io::Error::new(kind, "accept");
        assert_eq!(
            classify(&err(io::ErrorKind::ConnectionAborted)),
            AcceptFailure::Connection
        );
        assert_eq!(
            classify(&err(io::ErrorKind::ConnectionReset)),
            AcceptFailure::Connection
        );
        assert_eq!(
            classify(&err(io::ErrorKind::NotConnected)),
            AcceptFailure::Closed
        );
        assert_eq!(classify(&err(io::ErrorKind::Other)), AcceptFailure::Resource);
    }

    #[tokio::test]
    async fn test_transient_accept_errors_keep_serving() {
        let (_dir, service) = fixture().await;
        let (mut listener, dialer) = listener(&[
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::Other,
            io::ErrorKind::ConnectionReset,
        ]);
        let shutdown = CancellationToken::new();

        let server = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { serve(&mut listener, service, shutdown).await })
        };

        let (mut client, stream) = tokio::io::duplex(16 * 1024);
        dialer.send(stream).await.unwrap();
        let response = exchange(&mut client, "secret").await;
        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_closed_listener_ends_serving() {
        let (_dir, service) = fixture().await;
        let (mut listener, _dialer) = listener(&[io::ErrorKind::NotConnected]);

        let err = serve(&mut listener, service, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_open_connections_end_with_the_loop() {
        let (_dir, service) = fixture().await;
        let (mut listener, dialer) = listener(&[]);
        let shutdown = CancellationToken::new();

        let server = tokio::spawn(async move { serve(&mut listener, service, shutdown).await });

        let (mut client, stream) = tokio::io::duplex(16 * 1024);
        dialer.send(stream).await.unwrap();
        let response = exchange(&mut client, "secret").await;
        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);

        // Dropping the serve future without cancelling `shutdown`.
        server.abort();
        assert!(server.await.unwrap_err().is_cancelled());

        let _ = client
            .write_all(b"GET /note.txt HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await;
        let mut rest = Vec::new();
        let _ = client.read_to_end(&mut rest).await;
        assert!(rest.is_empty(), "{}", String::from_utf8_lossy(&rest));
    }
}
