//! Ordered server pool, refreshed from a store

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{RouterError, Server};
use crate::store::ServerStore;

/// Minimum time between two store fetches.
pub const DEFAULT_REFRESH_THROTTLE: Duration = Duration::from_secs(30);

/// The current pool of servers.
#[derive(Debug, Clone)]
pub struct Pool {
    pub servers: Arc<[Server]>,
    /// Wall-clock time of the last successful replace
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Pool {
    fn empty() -> Self {
        Self {
            servers: Arc::from(Vec::<Server>::new()),
            refreshed_at: None,
        }
    }
}

/// Owns the authoritative server list.
///
/// In static mode the list is set once at construction. In store mode every
/// read first runs a throttled refresh; the fetch happens outside the pool
/// lock and a failed or empty fetch leaves the previous pool in place.
pub struct Registry {
    pool: RwLock<Pool>,
    store: Option<Arc<dyn ServerStore>>,
    throttle: Duration,
    last_attempt: Mutex<Option<Instant>>,
}

impl Registry {
    /// Static pool; the store is never consulted
    pub fn with_servers(servers: Vec<Server>) -> Result<Self, RouterError> {
        let registry = Self {
            pool: RwLock::new(Pool::empty()),
            store: None,
            throttle: DEFAULT_REFRESH_THROTTLE,
            last_attempt: Mutex::new(None),
        };
        registry.replace(servers)?;
        Ok(registry)
    }

    /// Store-backed pool, loaded immediately
    pub async fn with_store(store: Arc<dyn ServerStore>, throttle: Duration) -> Self {
        let registry = Self {
            pool: RwLock::new(Pool::empty()),
            store: Some(store),
            throttle,
            last_attempt: Mutex::new(None),
        };
        registry.refresh().await;
        registry
    }

    pub fn is_store_backed(&self) -> bool {
        self.store.is_some()
    }

    /// Fetch from the store unless one was attempted within the throttle window
    pub async fn refresh(&self) {
        let Some(store) = &self.store else {
            return;
        };

        {
            let mut last_attempt = self.last_attempt.lock();
            if let Some(at) = *last_attempt {
                if at.elapsed() < self.throttle {
                    return;
                }
            }
            *last_attempt = Some(Instant::now());
        }

        match store.list_servers().await {
            Ok(servers) => {
                // Empty sets are rejected and logged inside replace
                let _ = self.replace(servers);
            }
            Err(e) => {
                tracing::error!(
                    store = store.name(),
                    error = %RouterError::StoreUnavailable(e.to_string()),
                    "Error retrieving SDK servers"
                );
            }
        }
    }

    /// Swap in a new pool. Empty sets are rejected. Addresses are stored
    /// without a trailing slash, and duplicates keep their first occurrence.
    pub fn replace(&self, servers: Vec<Server>) -> Result<(), RouterError> {
        if servers.is_empty() {
            tracing::error!("Refusing to set servers to empty list");
            return Err(RouterError::EmptyServerSet);
        }

        let mut seen = HashSet::with_capacity(servers.len());
        let mut distinct = Vec::with_capacity(servers.len());
        for mut server in servers {
            server.address = server.base_url().to_string();
            if seen.insert(server.address.clone()) {
                distinct.push(server);
            } else {
                tracing::warn!(address = %server.address, "Dropping duplicate server address");
            }
        }

        let count = distinct.len();
        *self.pool.write() = Pool {
            servers: Arc::from(distinct),
            refreshed_at: Some(Utc::now()),
        };
        tracing::debug!("updated server list to {} servers", count);
        Ok(())
    }

    /// Current pool, after a conditional refresh
    pub async fn snapshot(&self) -> Arc<[Server]> {
        self.refresh().await;
        self.current()
    }

    /// Current pool without refreshing
    pub fn current(&self) -> Arc<[Server]> {
        self.pool.read().servers.clone()
    }

    pub fn pool(&self) -> Pool {
        self.pool.read().clone()
    }

    /// Uniformly random server from a refreshed snapshot
    pub async fn random_server(&self) -> Result<Server, RouterError> {
        pick_random(&self.snapshot().await)
    }
}

pub(crate) fn pick_random(servers: &[Server]) -> Result<Server, RouterError> {
    if servers.is_empty() {
        return Err(RouterError::NoServers);
    }
    let idx = rand::random_range(0..servers.len());
    Ok(servers[idx].clone())
}
