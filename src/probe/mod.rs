//! Out-of-band load queries against SDK servers

mod jsonrpc;

use async_trait::async_trait;

pub use jsonrpc::JsonRpcProbe;

/// Asks a single server how busy it is.
#[async_trait]
pub trait LoadProbe: Send + Sync {
    /// Return the server's current load (number of loaded wallet pages
    /// at page size 1, i.e. the count of loaded wallets)
    async fn load(&self, address: &str) -> Result<u64, ProbeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Client setup failed: {0}")]
    Client(String),
}
