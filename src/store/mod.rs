//! Source of truth for the server pool

mod file;

use async_trait::async_trait;

use crate::router::Server;

pub use file::FileStore;

/// Supplies the canonical list of SDK servers.
///
/// Fetches may fail transiently; the registry keeps serving its previous
/// pool when they do.
#[async_trait]
pub trait ServerStore: Send + Sync {
    /// Fetch the current server list, in routing order
    async fn list_servers(&self) -> Result<Vec<Server>, StoreError>;

    /// Name of the store (for logging)
    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to read server list: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse server list: {0}")]
    Parse(#[from] serde_yaml::Error),
}
