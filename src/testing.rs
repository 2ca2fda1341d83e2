//! In-memory store, probe and sink doubles for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::metrics::{ExportError, MetricSink};
use crate::probe::{LoadProbe, ProbeError};
use crate::router::Server;
use crate::store::{ServerStore, StoreError};

pub fn servers(addresses: &[&str]) -> Vec<Server> {
    addresses
        .iter()
        .map(|a| Server::new(format!("sdk-{}", a), *a))
        .collect()
}

/// Store whose next answer can be swapped and whose fetches are counted
#[derive(Default)]
pub struct ScriptedStore {
    reply: Mutex<Option<Vec<Server>>>,
    fetches: AtomicUsize,
}

impl ScriptedStore {
    pub fn new(servers: Vec<Server>) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Some(servers)),
            fetches: AtomicUsize::new(0),
        })
    }

    /// Subsequent fetches return these servers
    pub fn set(&self, servers: Vec<Server>) {
        *self.reply.lock() = Some(servers);
    }

    /// Subsequent fetches fail
    pub fn fail(&self) {
        *self.reply.lock() = None;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerStore for ScriptedStore {
    async fn list_servers(&self) -> Result<Vec<Server>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.reply
            .lock()
            .clone()
            .ok_or_else(|| StoreError::Unavailable("scripted failure".to_string()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

enum Reply {
    Load(u64),
    Fail,
    Hang,
}

/// Probe with a per-address scripted answer; unknown addresses fail
#[derive(Default)]
pub struct ScriptedProbe {
    replies: Mutex<HashMap<String, Reply>>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_load(&self, address: &str, load: u64) {
        self.replies.lock().insert(address.to_string(), Reply::Load(load));
    }

    pub fn set_failing(&self, address: &str) {
        self.replies.lock().insert(address.to_string(), Reply::Fail);
    }

    /// The query for `address` never completes
    pub fn set_hanging(&self, address: &str) {
        self.replies.lock().insert(address.to_string(), Reply::Hang);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LoadProbe for ScriptedProbe {
    async fn load(&self, address: &str) -> Result<u64, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = match self.replies.lock().get(address) {
            Some(Reply::Load(load)) => Ok(*load),
            Some(Reply::Hang) => Err(None),
            Some(Reply::Fail) | None => Err(Some(ProbeError::Decode(format!(
                "{} is not responding",
                address
            )))),
        };
        match reply {
            Ok(load) => Ok(load),
            Err(Some(e)) => Err(e),
            Err(None) => std::future::pending().await,
        }
    }
}

/// Sink that remembers the last value per address
#[derive(Default)]
pub struct RecordingSink {
    values: Mutex<HashMap<String, f64>>,
    writes: AtomicUsize,
}

impl RecordingSink {
    pub fn value(&self, address: &str) -> Option<f64> {
        self.values.lock().get(address).copied()
    }

    /// Yields until at least `count` gauges have been written
    pub async fn wait_for_writes(&self, count: usize) {
        while self.writes.load(Ordering::SeqCst) < count {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl MetricSink for RecordingSink {
    async fn set_gauge(&self, _metric: &str, address: &str, value: f64) -> Result<(), ExportError> {
        self.values.lock().insert(address.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Sink whose writes never complete
pub struct StalledSink;

#[async_trait]
impl MetricSink for StalledSink {
    async fn set_gauge(&self, _metric: &str, _address: &str, _value: f64) -> Result<(), ExportError> {
        std::future::pending::<Result<(), ExportError>>().await
    }

    fn name(&self) -> &str {
        "stalled"
    }
}
