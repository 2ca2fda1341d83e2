//! A single SDK server in the pool

use serde::{Deserialize, Serialize};

/// One lbrynet SDK instance.
///
/// `address` is the durable identity: load readings, metrics and pool
/// deduplication are all keyed by it. `name` is informational only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Server {
    pub name: String,
    pub address: String,
}

impl Server {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Returns the address with trailing slash stripped
    pub fn base_url(&self) -> &str {
        self.address.trim_end_matches('/')
    }
}

impl std::fmt::Display for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}
