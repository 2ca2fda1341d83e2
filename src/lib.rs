//! sdk-router: load-aware routing across lbrynet SDK servers
//!
//! Features:
//! - Server pool from a static list or a store, refreshed at most every 30s
//! - Background load polling with startup jitter and clean shutdown
//! - Random and least-loaded selection
//! - Per-server load gauges (Prometheus, InfluxDB)

pub mod config;
pub mod metrics;
pub mod probe;
pub mod router;
pub mod server;
pub mod store;
pub mod wallet;

#[cfg(test)]
mod testing;

pub use config::AppConfig;
pub use router::{Router, RouterError, Server, Strategy};
pub use wallet::wallet_id;
