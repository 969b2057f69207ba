//! Routing table file updater.
//!
//! Writes every routing table as pretty-printed JSON. The file is replaced
//! atomically (temp file + rename) so readers never see a partial table.
//! The temp file is synced to disk before it is renamed into place.

use crate::routing::RoutingTable;
use crate::updater::Updater;
use anyhow::{anyhow, Context};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
enum WriteState {
    /// Nothing written since start
    Pending,
    Written,
    Failed(String),
}

/// Updater that publishes the routing table to a JSON file.
#[derive(Debug)]
pub struct FileUpdater {
    path: PathBuf,
    name: String,
    state: Mutex<WriteState>,
}

impl FileUpdater {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("file({})", path.display());
        Self {
            path,
            name,
            state: Mutex::new(WriteState::Pending),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn state(&self) -> MutexGuard<'_, WriteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn temp_path(&self) -> PathBuf {
        let mut file_name = self.path.file_name().unwrap_or_default().to_os_string();
        file_name.push(".tmp");
        self.path.with_file_name(file_name)
    }

    async fn write(&self, table: &RoutingTable) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(table).context("failed to serialize routing table")?;
        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp)
            .await
            .with_context(|| format!("failed to write {}", temp.display()))?;
        file.write_all(&json)
            .await
            .with_context(|| format!("failed to write {}", temp.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("failed to sync {}", temp.display()))?;
        drop(file);
        tokio::fs::rename(&temp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Updater for FileUpdater {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        *self.state() = WriteState::Pending;
        info!("Routing table will be written to {}", self.path.display());
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        debug!("File updater for {} stopped", self.path.display());
        Ok(())
    }

    async fn update(&self, table: &RoutingTable) -> anyhow::Result<()> {
        match self.write(table).await {
            Ok(()) => {
                *self.state() = WriteState::Written;
                debug!("Wrote {} routing entries to {}", table.len(), self.path.display());
                Ok(())
            }
            Err(e) => {
                *self.state() = WriteState::Failed(format!("{:#}", e));
                Err(e)
            }
        }
    }

    async fn health(&self) -> anyhow::Result<()> {
        match &*self.state() {
            WriteState::Written => Ok(()),
            WriteState::Pending => Err(anyhow!("no routing table written yet")),
            WriteState::Failed(message) => Err(anyhow!("last write failed: {}", message)),
        }
    }
}
