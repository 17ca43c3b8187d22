/// Local listener behind an onion service

use anonshare_core::{PublishedListener, ServiceStream};
use async_trait::async_trait;
use std::io;
use tokio::net::TcpListener;
use tracing::debug;

/// Loopback listener that Tor forwards the onion service port to
pub struct OnionListener {
    listener: Option<TcpListener>,
    address: String,
}

impl OnionListener {
    /// `service_id` is the onion address without the `.onion` suffix
    pub fn new(listener: TcpListener, service_id: &str, port: u16) -> Self {
        Self {
            listener: Some(listener),
            address: format!("{}.onion:{}", service_id, port),
        }
    }
}

#[async_trait]
impl PublishedListener for OnionListener {
    fn bound_address(&self) -> &str {
        &self.address
    }

    async fn accept(&mut self) -> io::Result<Box<dyn ServiceStream>> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "listener closed"))?;

        let (stream, peer) = listener.accept().await?;
        debug!("Accepted connection from {}", peer);
        Ok(Box::new(stream))
    }

    async fn close(&mut self) -> io::Result<()> {
        self.listener = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn test_accepts_and_closes() {
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = tcp.local_addr().unwrap();
        let mut listener = OnionListener::new(tcp, "abcdef", 80);
        assert_eq!(listener.bound_address(), "abcdef.onion:80");

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(local).await.unwrap();
            stream.write_all(b"ping").await.unwrap();
        });

        let mut accepted = listener.accept().await.unwrap();
        let mut buf = [0u8; 4];
        accepted.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        client.await.unwrap();

        listener.close().await.unwrap();
        let err = listener.accept().await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
