/// Publication lifecycle
///
/// A publication runs the sequence
/// `Idle -> Connected -> Authenticated -> IdentityReady -> ListenerPublished -> Serving`
/// and ends in `Terminated`. The outcome of the setup phase is delivered
/// once through a oneshot channel; state transitions are observable through
/// a watch channel for as long as the publication runs.
///
/// After the result is delivered, failures of the control channel or the
/// serve loop end the publication task with an error. Cancelling the
/// shutdown token stops it gracefully at any suspension point.

use crate::gateway;
use anonshare_common::{LifecycleState, PublicationConfig, PublicationResult, PublishError};
use anonshare_core::{
    derive_service_key, CapabilityGate, CapabilitySlug, ContentSource, ControlConnection,
    ControlConnector, ListenerConfig, PublishedAddress, PublishedListener, SourceError,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Publishes one content source through a transport provider
pub struct Publisher<C> {
    config: PublicationConfig,
    connector: C,
}

/// Handle to a running publication
pub struct PublicationHandle {
    result: Option<oneshot::Receiver<PublicationResult>>,
    state: watch::Receiver<LifecycleState>,
    task: JoinHandle<Result<(), PublishError>>,
}

impl PublicationHandle {
    /// Wait for the one publication result
    pub async fn result(&mut self) -> PublicationResult {
        let Some(receiver) = self.result.take() else {
            return Err(PublishError::Other(anyhow::anyhow!(
                "publication result already taken"
            )));
        };

        receiver.await.unwrap_or_else(|_| {
            Err(PublishError::Other(anyhow::anyhow!(
                "publication ended without a result"
            )))
        })
    }

    /// Observe lifecycle transitions
    pub fn state(&self) -> watch::Receiver<LifecycleState> {
        self.state.clone()
    }

    /// Wait for the publication to end. Setup failures were already reported
    /// through [`result`](Self::result) and yield `Ok` here; runtime failures
    /// yield the fatal error.
    pub async fn wait(self) -> Result<(), PublishError> {
        self.task
            .await
            .map_err(|e| PublishError::Other(anyhow::anyhow!("publication task failed: {}", e)))?
    }
}

/// Delivers the result once and tracks the lifecycle state
struct Reporter {
    result: Option<oneshot::Sender<PublicationResult>>,
    state: watch::Sender<LifecycleState>,
}

impl Reporter {
    fn advance(&self, next: LifecycleState) {
        debug!("Publication {}", next);
        self.state.send_replace(next);
    }

    fn deliver(&mut self, result: PublicationResult) {
        if let Some(sender) = self.result.take() {
            if sender.send(result).is_err() {
                warn!("Publication result was not received");
            }
        }
    }

    fn fail(&mut self, err: PublishError) -> Result<(), PublishError> {
        self.deliver(Err(err));
        Ok(())
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.state.send_replace(LifecycleState::Terminated);
    }
}

/// Gate and content, resolved before the transport is contacted
struct Prepared {
    gate: CapabilityGate,
    source: Arc<ContentSource>,
}

impl<C> Publisher<C>
where
    C: ControlConnector + 'static,
{
    pub fn new(config: PublicationConfig, connector: C) -> Self {
        Self { config, connector }
    }

    /// Start the publication on the current runtime
    pub fn spawn(self, shutdown: CancellationToken) -> PublicationHandle {
        let (result_tx, result_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(LifecycleState::Idle);

        let reporter = Reporter {
            result: Some(result_tx),
            state: state_tx,
        };
        let task = tokio::spawn(self.run(reporter, shutdown));

        PublicationHandle {
            result: Some(result_rx),
            state: state_rx,
            task,
        }
    }

    async fn run(
        self,
        mut reporter: Reporter,
        shutdown: CancellationToken,
    ) -> Result<(), PublishError> {
        let prepared = match self.prepare().await {
            Ok(prepared) => prepared,
            Err(err) => return reporter.fail(err),
        };

        let timeouts = self.config.timeouts;
        let connection = step(
            "connecting",
            timeouts.connect(),
            &shutdown,
            self.connector.connect(&self.config.control_endpoint),
            |e| PublishError::control_connect(e),
        )
        .await;
        let mut connection = match connection {
            Ok(connection) => connection,
            Err(err) => return reporter.fail(err),
        };
        reporter.advance(LifecycleState::Connected);

        let mut listener = match self
            .negotiate(connection.as_mut(), &reporter, &shutdown)
            .await
        {
            Ok(listener) => listener,
            Err(err) => {
                release_connection(connection).await;
                return reporter.fail(err);
            }
        };
        reporter.advance(LifecycleState::ListenerPublished);

        let address = PublishedAddress::new(
            listener.bound_address(),
            prepared.gate.slug(),
            &prepared.source.published_path(),
        );
        info!("Service published at {}", address.host());
        reporter.deliver(Ok(address.to_url()));
        reporter.advance(LifecycleState::Serving);

        let service = gateway::build(prepared.source, prepared.gate);
        let monitor_token = shutdown.child_token();
        let mut monitor = tokio::spawn(monitor_control_channel(connection, monitor_token.clone()));
        let mut monitor_finished = false;

        let outcome = tokio::select! {
            served = gateway::serve(listener.as_mut(), service, shutdown.clone()) => {
                served.map_err(|e| PublishError::Serve(e.to_string()))
            }
            joined = &mut monitor => {
                monitor_finished = true;
                joined.unwrap_or_else(|e| Err(PublishError::transport_lost(e.to_string())))
            }
        };

        monitor_token.cancel();
        if !monitor_finished {
            if let Ok(Err(err)) = monitor.await {
                debug!("Control monitor ended with: {}", err);
            }
        }
        if let Err(err) = listener.close().await {
            warn!("Failed to close listener: {}", err);
        }

        match &outcome {
            Ok(()) => info!("Publication stopped"),
            Err(err) => error!("{}", err),
        }
        outcome
    }

    /// Generate the slug and resolve the content source
    async fn prepare(&self) -> Result<Prepared, PublishError> {
        let gate = if self.config.slug {
            let slug = CapabilitySlug::generate()
                .map_err(|e| PublishError::SlugGeneration(e.to_string()))?;
            CapabilityGate::new(slug)
        } else {
            CapabilityGate::open()
        };

        let source = ContentSource::resolve(&self.config.path, self.config.archive)
            .await
            .map_err(source_error)?;
        info!(
            "Publishing {} {}",
            source.kind(),
            self.config.path.display()
        );

        Ok(Prepared {
            gate,
            source: Arc::new(source),
        })
    }

    /// Authenticate, settle the identity and create the listener
    async fn negotiate(
        &self,
        connection: &mut dyn ControlConnection,
        reporter: &Reporter,
        shutdown: &CancellationToken,
    ) -> Result<Box<dyn PublishedListener>, PublishError> {
        let timeouts = self.config.timeouts;

        step(
            "authenticating",
            timeouts.authenticate(),
            shutdown,
            connection.authenticate(&self.config.control_password),
            |e| PublishError::authentication(e),
        )
        .await?;
        reporter.advance(LifecycleState::Authenticated);

        let listener_config = match self.config.passphrase() {
            Some(passphrase) => {
                let key = derive_service_key(passphrase)
                    .map_err(|e| PublishError::key_derivation(e.to_string()))?;
                ListenerConfig::with_key(key)
            }
            None => ListenerConfig::ephemeral(),
        };
        reporter.advance(LifecycleState::IdentityReady);

        step(
            "publishing the service",
            timeouts.publish(),
            shutdown,
            connection.create_listener(listener_config),
            |e| PublishError::listener_creation(e),
        )
        .await
    }
}

/// Run one setup step, bounded by `limit` and abandoned on shutdown
async fn step<T, E, F>(
    stage: &'static str,
    limit: Option<Duration>,
    shutdown: &CancellationToken,
    future: F,
    wrap: fn(String) -> PublishError,
) -> Result<T, PublishError>
where
    F: Future<Output = Result<T, E>>,
    E: ToString,
{
    let bounded = async {
        match limit {
            Some(limit) => match tokio::time::timeout(limit, future).await {
                Ok(result) => result.map_err(|e| wrap(e.to_string())),
                Err(_) => Err(PublishError::Timeout { stage }),
            },
            None => future.await.map_err(|e| wrap(e.to_string())),
        }
    };

    tokio::select! {
        _ = shutdown.cancelled() => Err(PublishError::Cancelled),
        result = bounded => result,
    }
}

/// Drain control events until cancelled; an error means the transport is gone
async fn monitor_control_channel(
    mut connection: Box<dyn ControlConnection>,
    token: CancellationToken,
) -> Result<(), PublishError> {
    let outcome = loop {
        tokio::select! {
            _ = token.cancelled() => break Ok(()),
            event = connection.next_event() => match event {
                Ok(event) => debug!("Control event {}: {}", event.kind, event.body),
                Err(err) => break Err(PublishError::transport_lost(err.to_string())),
            },
        }
    };

    release_connection(connection).await;
    outcome
}

async fn release_connection(mut connection: Box<dyn ControlConnection>) {
    if let Err(err) = connection.close().await {
        debug!("Failed to close control connection: {}", err);
    }
}

fn source_error(err: SourceError) -> PublishError {
    match err {
        SourceError::Archive(msg) => PublishError::archive_open(msg),
        other => PublishError::invalid_path(other.to_string()),
    }
}
