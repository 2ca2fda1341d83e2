//! Last observed load per server address

use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{RouterError, Server};
use crate::metrics::{SinkSet, UNRESPONSIVE, WALLETS_LOADED};
use crate::probe::{LoadProbe, ProbeError};

/// Hard ceiling for a single load query.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(300);

/// How one cycle polls its servers
#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    pub rpc_timeout: Duration,
    /// Servers queried at once; 1 polls sequentially
    pub concurrency: usize,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            concurrency: 1,
        }
    }
}

#[derive(Debug)]
enum PollOutcome {
    Loaded(u64),
    Unresponsive,
    Cancelled,
}

/// Result of one load update over the pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub polled: usize,
    pub responsive: usize,
    pub unresponsive: usize,
    pub cancelled: bool,
    pub least_loaded: Option<Server>,
}

/// Map from server address to its last successful load reading.
///
/// Entries are overwritten on success and evicted on failure, never left
/// stale. Writes are per address, so readers may see a mix of this cycle's
/// and the previous cycle's values while a cycle runs.
#[derive(Default)]
pub struct LoadTracker {
    loads: RwLock<HashMap<String, u64>>,
}

impl LoadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, address: &str, load: u64) {
        self.loads.write().insert(address.to_string(), load);
    }

    pub fn evict(&self, address: &str) {
        self.loads.write().remove(address);
    }

    pub fn get(&self, address: &str) -> Option<u64> {
        self.loads.read().get(address).copied()
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.loads.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.loads.read().is_empty()
    }

    /// Drop readings for addresses that are no longer in the pool
    pub fn retain(&self, servers: &[Server]) {
        let live: HashSet<&str> = servers.iter().map(|s| s.address.as_str()).collect();
        self.loads.write().retain(|address, _| live.contains(address.as_str()));
    }

    /// Query every server and record the results.
    ///
    /// A failing server is evicted and reported with the `-1` gauge; it
    /// never aborts the rest of the cycle. Cancellation is checked before and
    /// after each query. Gauges are exported in the background, so a slow
    /// sink never holds up the cycle.
    pub async fn update_all(
        &self,
        servers: &[Server],
        probe: &dyn LoadProbe,
        sinks: &SinkSet,
        options: PollOptions,
        cancel: &CancellationToken,
    ) -> CycleReport {
        let polls: Vec<_> = servers
            .iter()
            .map(|server| self.poll_one(server, probe, sinks, options.rpc_timeout, cancel))
            .collect();
        let outcomes: Vec<PollOutcome> = stream::iter(polls)
            .buffer_unordered(options.concurrency.max(1))
            .collect()
            .await;

        let mut report = CycleReport::default();
        for outcome in outcomes {
            match outcome {
                PollOutcome::Loaded(_) => {
                    report.polled += 1;
                    report.responsive += 1;
                }
                PollOutcome::Unresponsive => {
                    report.polled += 1;
                    report.unresponsive += 1;
                }
                PollOutcome::Cancelled => report.cancelled = true,
            }
        }

        if !report.cancelled {
            self.retain(servers);
        }
        report
    }

    async fn poll_one(
        &self,
        server: &Server,
        probe: &dyn LoadProbe,
        sinks: &SinkSet,
        rpc_timeout: Duration,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        if cancel.is_cancelled() {
            return PollOutcome::Cancelled;
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            result = tokio::time::timeout(rpc_timeout, probe.load(&server.address)) => {
                result.unwrap_or_else(|_| Err(ProbeError::Timeout(rpc_timeout.as_secs())))
            }
        };

        if cancel.is_cancelled() {
            return PollOutcome::Cancelled;
        }

        match result {
            Ok(load) => {
                self.record(&server.address, load);
                sinks.spawn_gauge(WALLETS_LOADED, &server.address, load as f64);
                PollOutcome::Loaded(load)
            }
            Err(e) => {
                self.evict(&server.address);
                sinks.spawn_gauge(WALLETS_LOADED, &server.address, UNRESPONSIVE);
                tracing::warn!(
                    address = %server.address,
                    error = %RouterError::ServerUnresponsive {
                        address: server.address.clone(),
                        reason: e.to_string(),
                    },
                    "lbrynet instance is not responding"
                );
                PollOutcome::Unresponsive
            }
        }
    }

    /// Server in `pool` with the lowest recorded load.
    ///
    /// Ties go to the lexicographically smallest address. Returns `None` when
    /// no server in the pool has a reading.
    pub fn least_loaded(&self, pool: &[Server]) -> Option<Server> {
        let loads = self.loads.read();
        pool.iter()
            .filter_map(|server| loads.get(&server.address).map(|load| (*load, server)))
            .inspect(|(load, server)| {
                tracing::trace!(address = %server.address, load, "considering server")
            })
            .min_by(|(a_load, a), (b_load, b)| {
                a_load.cmp(b_load).then_with(|| a.address.cmp(&b.address))
            })
            .map(|(_, server)| server.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{servers, RecordingSink, ScriptedProbe, StalledSink};
    use std::sync::Arc;

    fn sinks_with(recording: &Arc<RecordingSink>) -> SinkSet {
        let mut sinks = SinkSet::new();
        sinks.add(recording.clone());
        sinks
    }

    #[test]
    fn test_least_loaded_picks_minimum() {
        let pool = servers(&["http://a:5279", "http://b:5279", "http://c:5279"]);
        let tracker = LoadTracker::new();
        tracker.record("http://a:5279", 5);
        tracker.record("http://b:5279", 2);
        tracker.record("http://c:5279", 9);

        assert_eq!(tracker.least_loaded(&pool).unwrap().address, "http://b:5279");
    }

    #[test]
    fn test_least_loaded_tie_goes_to_smallest_address() {
        let pool = servers(&["http://b:5279", "http://a:5279"]);
        let tracker = LoadTracker::new();
        tracker.record("http://b:5279", 3);
        tracker.record("http://a:5279", 3);

        for _ in 0..20 {
            assert_eq!(tracker.least_loaded(&pool).unwrap().address, "http://a:5279");
        }
    }

    #[test]
    fn test_least_loaded_without_readings() {
        let pool = servers(&["http://a:5279"]);
        assert!(LoadTracker::new().least_loaded(&pool).is_none());
    }

    #[test]
    fn test_least_loaded_ignores_servers_outside_pool() {
        let tracker = LoadTracker::new();
        tracker.record("http://gone:5279", 0);
        tracker.record("http://a:5279", 8);

        let pool = servers(&["http://a:5279"]);
        assert_eq!(tracker.least_loaded(&pool).unwrap().address, "http://a:5279");
    }

    #[test]
    fn test_readings_survive_pool_rebuild() {
        let tracker = LoadTracker::new();
        tracker.record("http://a:5279", 4);
        tracker.record("http://b:5279", 1);

        // Fresh Server values for the same backends
        let rebuilt = vec![
            Server::new("renamed-a", "http://a:5279"),
            Server::new("renamed-b", "http://b:5279"),
        ];
        assert_eq!(tracker.least_loaded(&rebuilt).unwrap().name, "renamed-b");
    }

    #[tokio::test]
    async fn test_update_all_records_loads_and_gauges() {
        let pool = servers(&["http://a:5279", "http://b:5279", "http://c:5279"]);
        let probe = ScriptedProbe::new();
        probe.set_load("http://a:5279", 5);
        probe.set_load("http://b:5279", 2);
        probe.set_load("http://c:5279", 9);
        let recording = Arc::new(RecordingSink::default());

        let tracker = LoadTracker::new();
        let report = tracker
            .update_all(
                &pool,
                probe.as_ref(),
                &sinks_with(&recording),
                PollOptions::default(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(report.polled, 3);
        assert_eq!(report.responsive, 3);
        assert!(!report.cancelled);
        assert_eq!(tracker.get("http://b:5279"), Some(2));
        recording.wait_for_writes(3).await;
        assert_eq!(recording.value("http://c:5279"), Some(9.0));
        assert_eq!(tracker.least_loaded(&pool).unwrap().address, "http://b:5279");
    }

    #[tokio::test]
    async fn test_failed_poll_evicts_and_reports_sentinel() {
        let pool = servers(&["http://a:5279", "http://b:5279", "http://c:5279"]);
        let probe = ScriptedProbe::new();
        probe.set_load("http://a:5279", 5);
        probe.set_load("http://b:5279", 2);
        probe.set_load("http://c:5279", 9);
        let recording = Arc::new(RecordingSink::default());
        let sinks = sinks_with(&recording);
        let cancel = CancellationToken::new();

        let tracker = LoadTracker::new();
        tracker
            .update_all(&pool, probe.as_ref(), &sinks, PollOptions::default(), &cancel)
            .await;
        assert_eq!(tracker.least_loaded(&pool).unwrap().address, "http://b:5279");

        probe.set_failing("http://b:5279");
        let report = tracker
            .update_all(&pool, probe.as_ref(), &sinks, PollOptions::default(), &cancel)
            .await;

        assert_eq!(report.unresponsive, 1);
        assert_eq!(report.responsive, 2);
        assert_eq!(tracker.get("http://b:5279"), None);
        recording.wait_for_writes(6).await;
        assert_eq!(recording.value("http://b:5279"), Some(UNRESPONSIVE));
        assert_eq!(tracker.least_loaded(&pool).unwrap().address, "http://a:5279");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_server_times_out() {
        let pool = servers(&["http://a:5279", "http://stuck:5279"]);
        let probe = ScriptedProbe::new();
        probe.set_load("http://a:5279", 1);
        probe.set_hanging("http://stuck:5279");
        let tracker = LoadTracker::new();
        tracker.record("http://stuck:5279", 0);

        let options = PollOptions {
            rpc_timeout: Duration::from_secs(5),
            concurrency: 1,
        };
        let report = tracker
            .update_all(&pool, probe.as_ref(), &SinkSet::new(), options, &CancellationToken::new())
            .await;

        assert_eq!(report.unresponsive, 1);
        assert_eq!(tracker.get("http://stuck:5279"), None);
        assert_eq!(tracker.get("http://a:5279"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_sink_does_not_hold_up_cycle() {
        let pool = servers(&["http://a:5279", "http://b:5279"]);
        let probe = ScriptedProbe::new();
        probe.set_load("http://a:5279", 1);
        probe.set_failing("http://b:5279");
        let mut sinks = SinkSet::new();
        sinks.add(Arc::new(StalledSink));

        let tracker = LoadTracker::new();
        let options = PollOptions {
            rpc_timeout: Duration::from_secs(5),
            concurrency: 1,
        };
        let cancel = CancellationToken::new();
        let cycle = tracker.update_all(&pool, probe.as_ref(), &sinks, options, &cancel);
        let report = tokio::time::timeout(Duration::from_secs(1), cycle)
            .await
            .expect("cycle should not wait on the sink");

        assert_eq!(report.polled, 2);
        assert_eq!(probe.calls(), 2);
        assert_eq!(tracker.get("http://a:5279"), Some(1));
    }

    #[tokio::test]
    async fn test_cancelled_before_cycle_polls_nothing() {
        let pool = servers(&["http://a:5279", "http://b:5279"]);
        let probe = ScriptedProbe::new();
        probe.set_load("http://a:5279", 1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let tracker = LoadTracker::new();
        let report = tracker
            .update_all(&pool, probe.as_ref(), &SinkSet::new(), PollOptions::default(), &cancel)
            .await;

        assert!(report.cancelled);
        assert_eq!(report.polled, 0);
        assert_eq!(probe.calls(), 0);
        assert!(tracker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_stalled_query() {
        let pool = servers(&["http://stuck:5279", "http://a:5279"]);
        let probe = ScriptedProbe::new();
        probe.set_hanging("http://stuck:5279");
        probe.set_load("http://a:5279", 1);
        let tracker = LoadTracker::new();
        tracker.record("http://stuck:5279", 3);
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                cancel.cancel();
            })
        };

        let report = tracker
            .update_all(&pool, probe.as_ref(), &SinkSet::new(), PollOptions::default(), &cancel)
            .await;
        canceller.await.unwrap();

        assert!(report.cancelled);
        // Interrupted queries leave the previous reading alone
        assert_eq!(tracker.get("http://stuck:5279"), Some(3));
        assert_eq!(tracker.get("http://a:5279"), None);
    }

    #[tokio::test]
    async fn test_parallel_polling_isolates_failures() {
        let addresses: Vec<String> = (0..10).map(|i| format!("http://sdk{}:5279", i)).collect();
        let refs: Vec<&str> = addresses.iter().map(String::as_str).collect();
        let pool = servers(&refs);
        let probe = ScriptedProbe::new();
        for (i, address) in addresses.iter().enumerate() {
            if i % 3 == 0 {
                probe.set_failing(address);
            } else {
                probe.set_load(address, 10 - i as u64);
            }
        }

        let tracker = LoadTracker::new();
        let options = PollOptions {
            rpc_timeout: Duration::from_secs(5),
            concurrency: 4,
        };
        let report = tracker
            .update_all(&pool, probe.as_ref(), &SinkSet::new(), options, &CancellationToken::new())
            .await;

        assert_eq!(report.polled, 10);
        assert_eq!(report.unresponsive, 4);
        assert_eq!(tracker.snapshot().len(), 6);
        assert_eq!(tracker.least_loaded(&pool).unwrap().address, "http://sdk8:5279");
    }

    #[tokio::test]
    async fn test_completed_cycle_prunes_removed_servers() {
        let probe = ScriptedProbe::new();
        probe.set_load("http://a:5279", 1);
        let tracker = LoadTracker::new();
        tracker.record("http://removed:5279", 0);

        tracker
            .update_all(
                &servers(&["http://a:5279"]),
                probe.as_ref(),
                &SinkSet::new(),
                PollOptions::default(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(tracker.get("http://removed:5279"), None);
        assert_eq!(tracker.get("http://a:5279"), Some(1));
    }
}
