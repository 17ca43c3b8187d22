/// Tor control-port transport provider
///
/// Publishes the gateway as an onion service through a running Tor
/// instance:
/// - `control`: control protocol framing
/// - `listener`: loopback listener the onion service forwards to
///
/// Onion services created here are tied to the control connection and
/// disappear when it closes.

pub mod control;
pub mod listener;

pub use control::{ControlSocket, Reply};
pub use listener::OnionListener;

use anonshare_core::{
    ControlConnection, ControlConnector, ControlEvent, ListenerConfig, PublishedListener,
    ServiceKey, ServiceStream, TransportError,
};
use async_trait::async_trait;
use data_encoding::BASE64;
use sha2::{Digest, Sha512};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use control::{quote, unquote};

/// Connects to Tor control ports given as `tcp://host:port`, `host:port`
/// or `unix:///path/to/socket`
#[derive(Debug, Clone, Copy, Default)]
pub struct TorConnector;

#[async_trait]
impl ControlConnector for TorConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn ControlConnection>, TransportError> {
        let stream = dial(endpoint).await?;
        debug!("Connected to control port {}", endpoint);
        Ok(Box::new(TorConnection::new(ControlSocket::new(stream))))
    }
}

async fn dial(endpoint: &str) -> Result<Box<dyn ServiceStream>, TransportError> {
    if let Some(path) = endpoint.strip_prefix("unix://") {
        return dial_unix(path).await;
    }

    let address = endpoint.strip_prefix("tcp://").unwrap_or(endpoint);
    if address.is_empty() || address.contains("://") {
        return Err(TransportError::UnsupportedEndpoint(endpoint.to_string()));
    }

    Ok(Box::new(TcpStream::connect(address).await?))
}

#[cfg(unix)]
async fn dial_unix(path: &str) -> Result<Box<dyn ServiceStream>, TransportError> {
    Ok(Box::new(tokio::net::UnixStream::connect(path).await?))
}

#[cfg(not(unix))]
async fn dial_unix(path: &str) -> Result<Box<dyn ServiceStream>, TransportError> {
    Err(TransportError::UnsupportedEndpoint(format!("unix://{}", path)))
}

/// An authenticated or not yet authenticated control connection
pub struct TorConnection {
    socket: ControlSocket,
    services: Vec<String>,
}

impl TorConnection {
    pub fn new(socket: ControlSocket) -> Self {
        Self {
            socket,
            services: Vec::new(),
        }
    }

    /// Wait until the descriptor for `service_id` reaches a directory
    async fn await_upload(&mut self, service_id: &str) -> Result<(), TransportError> {
        loop {
            let event = self.socket.next_event().await?;
            if event.kind != "HS_DESC" {
                continue;
            }

            let mut fields = event.body.split(' ');
            let action = fields.next();
            let address = fields.next();
            if address != Some(service_id) {
                continue;
            }

            match action {
                Some("UPLOADED") => return Ok(()),
                Some("FAILED") => debug!("Descriptor upload to one directory failed"),
                _ => {}
            }
        }
    }
}

#[async_trait]
impl ControlConnection for TorConnection {
    async fn authenticate(&mut self, credential: &str) -> Result<(), TransportError> {
        let info = self.socket.command("PROTOCOLINFO 1").await?;
        let methods = AuthMethods::parse(&info);

        let command = if !credential.is_empty() {
            format!("AUTHENTICATE {}", quote(credential))
        } else if methods.null {
            "AUTHENTICATE".to_string()
        } else if let Some(path) = methods.cookie_file.filter(|_| methods.cookie) {
            let cookie = tokio::fs::read(&path).await?;
            format!("AUTHENTICATE {}", hex::encode(cookie))
        } else {
            return Err(TransportError::Protocol(
                "no supported authentication method (a control password is required)".to_string(),
            ));
        };

        self.socket.command(&command).await?;
        Ok(())
    }

    async fn create_listener(
        &mut self,
        config: ListenerConfig,
    ) -> Result<Box<dyn PublishedListener>, TransportError> {
        let local = TcpListener::bind("127.0.0.1:0").await?;
        let local_port = local.local_addr()?.port();

        if config.await_propagation {
            self.socket.command("SETEVENTS HS_DESC").await?;
        }

        let key = match &config.key {
            Some(key) => format!("ED25519-V3:{}", expanded_secret_key(key)),
            None => "NEW:ED25519-V3".to_string(),
        };
        let mut command = format!("ADD_ONION {}", key);
        if !config.retain_key {
            command.push_str(" Flags=DiscardPK");
        }
        command.push_str(&format!(" Port={},127.0.0.1:{}", config.port, local_port));

        let reply = self.socket.command(&command).await?;
        let service_id = reply
            .value("ServiceID")
            .map(unquote)
            .ok_or_else(|| TransportError::Protocol("ADD_ONION reply without ServiceID".into()))?;
        self.services.push(service_id.clone());

        if config.await_propagation {
            info!("Waiting for the service descriptor to be published");
            self.await_upload(&service_id).await?;
            self.socket.command("SETEVENTS").await?;
        }

        Ok(Box::new(OnionListener::new(local, &service_id, config.port)))
    }

    async fn next_event(&mut self) -> Result<ControlEvent, TransportError> {
        self.socket.next_event().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        for service_id in std::mem::take(&mut self.services) {
            if let Err(err) = self.socket.command(&format!("DEL_ONION {}", service_id)).await {
                warn!("Failed to remove onion service: {}", err);
            }
        }
        self.socket.shutdown().await
    }
}

/// Authentication methods advertised by PROTOCOLINFO
#[derive(Debug, Default, PartialEq, Eq)]
struct AuthMethods {
    null: bool,
    cookie: bool,
    cookie_file: Option<String>,
}

impl AuthMethods {
    fn parse(reply: &Reply) -> Self {
        let mut methods = Self::default();
        let Some(auth) = reply.lines.iter().find_map(|l| l.strip_prefix("AUTH ")) else {
            return methods;
        };

        if let Some((list, _)) = auth
            .strip_prefix("METHODS=")
            .map(|rest| rest.split_once(' ').unwrap_or((rest, "")))
        {
            for method in list.split(',') {
                match method {
                    "NULL" => methods.null = true,
                    "COOKIE" => methods.cookie = true,
                    _ => {}
                }
            }
        }

        methods.cookie_file = auth
            .split_once("COOKIEFILE=")
            .map(|(_, path)| unquote(path.trim()));
        methods
    }
}

/// Tor's ED25519-V3 key blob: the expanded secret key, base64 encoded
fn expanded_secret_key(key: &ServiceKey) -> String {
    let mut expanded = [0u8; 64];
    expanded.copy_from_slice(&Sha512::digest(key.seed_bytes()));
    expanded[0] &= 248;
    expanded[31] &= 127;
    expanded[31] |= 64;

    let encoded = BASE64.encode(&expanded);
    expanded.fill(0);
    encoded
}
