//! Server selection strategies

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How `Router::select` picks a server
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Uniformly random over the pool
    Random,
    /// Lowest recorded load, falling back to random before the first poll
    #[default]
    LeastLoaded,
}

impl Strategy {
    /// Return the strategy name (for logging)
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Random => "random",
            Strategy::LeastLoaded => "least_loaded",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(Strategy::Random),
            "least_loaded" => Ok(Strategy::LeastLoaded),
            other => Err(format!(
                "Unknown selection strategy: '{}'. Supported: random, least_loaded",
                other
            )),
        }
    }
}
