//! Load-aware selection of SDK servers

mod load;
mod poller;
mod registry;
mod selector;
mod server;

pub use load::{CycleReport, LoadTracker, PollOptions, DEFAULT_RPC_TIMEOUT};
pub use poller::{PollerHandle, PollerSettings, PollerState};
pub use registry::{Pool, Registry, DEFAULT_REFRESH_THROTTLE};
pub use selector::Strategy;
pub use server::Server;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::metrics::SinkSet;
use crate::probe::{JsonRpcProbe, LoadProbe};
use crate::store::{FileStore, ServerStore};

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("No SDK servers available")]
    NoServers,

    #[error("Refusing to replace server pool with an empty set")]
    EmptyServerSet,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Server {address} is not responding: {reason}")]
    ServerUnresponsive { address: String, reason: String },
}

/// Picks SDK servers for incoming requests.
///
/// Owns the server pool and the load readings. Request handlers share one
/// instance through an `Arc` while a single poller keeps both fresh.
pub struct Router {
    registry: Registry,
    load: LoadTracker,
    probe: Arc<dyn LoadProbe>,
    sinks: SinkSet,
    options: PollOptions,
}

impl Router {
    /// Router over a fixed list of servers
    pub fn with_servers(
        servers: Vec<Server>,
        probe: Arc<dyn LoadProbe>,
        sinks: SinkSet,
        options: PollOptions,
    ) -> Result<Self, RouterError> {
        Ok(Self {
            registry: Registry::with_servers(servers)?,
            load: LoadTracker::new(),
            probe,
            sinks,
            options,
        })
    }

    /// Router whose pool is loaded now and refreshed from `store`
    pub async fn with_store(
        store: Arc<dyn ServerStore>,
        throttle: Duration,
        probe: Arc<dyn LoadProbe>,
        sinks: SinkSet,
        options: PollOptions,
    ) -> Self {
        Self {
            registry: Registry::with_store(store, throttle).await,
            load: LoadTracker::new(),
            probe,
            sinks,
            options,
        }
    }

    /// Build from configuration: static servers if any are listed, the file
    /// store otherwise
    pub async fn from_config(config: &AppConfig, sinks: SinkSet) -> Result<Self, Box<dyn std::error::Error>> {
        let options = PollOptions {
            rpc_timeout: Duration::from_secs(config.poller.rpc_timeout_seconds),
            concurrency: config.poller.concurrency,
        };
        let probe: Arc<dyn LoadProbe> =
            Arc::new(JsonRpcProbe::new(options.rpc_timeout, config.poller.tls.as_ref())?);

        if !config.router.servers.is_empty() {
            return Ok(Self::with_servers(config.router.servers.clone(), probe, sinks, options)?);
        }

        let path = config
            .store
            .path
            .as_ref()
            .ok_or("router.servers is empty and no store.path is configured")?;
        let store: Arc<dyn ServerStore> = Arc::new(FileStore::new(path));
        let throttle = Duration::from_secs(config.router.refresh_throttle_seconds);
        Ok(Self::with_store(store, throttle, probe, sinks, options).await)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn load(&self) -> &LoadTracker {
        &self.load
    }

    /// All servers in routing order
    pub async fn get_all_servers(&self) -> Arc<[Server]> {
        self.registry.snapshot().await
    }

    pub async fn random_server(&self) -> Result<Server, RouterError> {
        self.registry.random_server().await
    }

    /// Server with the lowest recorded load.
    ///
    /// Before any poll has produced a reading for the current pool this
    /// returns a random server instead.
    pub async fn least_loaded_server(&self) -> Result<Server, RouterError> {
        let pool = self.registry.snapshot().await;
        if let Some(server) = self.load.least_loaded(&pool) {
            return Ok(server);
        }

        tracing::warn!("least_loaded_server() called before load metrics were updated. Returning random server.");
        registry::pick_random(&pool)
    }

    pub async fn select(&self, strategy: Strategy) -> Result<Server, RouterError> {
        match strategy {
            Strategy::Random => self.random_server().await,
            Strategy::LeastLoaded => self.least_loaded_server().await,
        }
    }

    /// One poll cycle: refresh the pool, then query the load of every server
    pub async fn poll_once(&self, cancel: &CancellationToken) -> CycleReport {
        let servers = self.registry.snapshot().await;
        let mut report = self
            .load
            .update_all(&servers, self.probe.as_ref(), &self.sinks, self.options, cancel)
            .await;

        if report.cancelled {
            tracing::debug!(polled = report.polled, "Load update cancelled");
            return report;
        }

        match self.least_loaded_server().await {
            Ok(server) => {
                tracing::info!(
                    responsive = report.responsive,
                    unresponsive = report.unresponsive,
                    "After updating load, least loaded server is {}",
                    server.address
                );
                report.least_loaded = Some(server);
            }
            Err(e) => tracing::warn!(error = %e, "No server to route to after updating load"),
        }
        report
    }

    /// Start the background poller. It runs until `cancel` fires or the
    /// handle is stopped.
    pub fn start_watching(self: &Arc<Self>, settings: PollerSettings, cancel: CancellationToken) -> PollerHandle {
        poller::spawn(Arc::clone(self), settings, cancel)
    }
}
