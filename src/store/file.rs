//! YAML file-backed server store

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{ServerStore, StoreError};
use crate::router::Server;

/// Reads the server list from a YAML file on every fetch.
///
/// The file holds a sequence of `{name, address}` entries. Edits to the file
/// are picked up on the next (throttled) registry refresh.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ServerStore for FileStore {
    async fn list_servers(&self) -> Result<Vec<Server>, StoreError> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Err(StoreError::Unavailable(format!(
                "{} does not exist",
                self.path.display()
            )));
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        let servers: Vec<Server> = serde_yaml::from_str(&content)?;
        Ok(servers)
    }

    fn name(&self) -> &str {
        "file"
    }
}
