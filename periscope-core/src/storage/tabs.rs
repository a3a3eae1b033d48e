//! Editor tab persistence: a pretty-printed JSON file next to the database.

use super::StorageError;
use super::model::TabState;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

pub struct TabStorage {
    file_path: PathBuf,
}

impl TabStorage {
    pub fn new(file_path: PathBuf) -> Self {
        Self { file_path }
    }

    pub async fn save_tabs(&self, tabs: &[TabState]) -> Result<(), StorageError> {
        let data = serde_json::to_vec_pretty(tabs)?;
        tokio::fs::write(&self.file_path, data).await?;
        debug!(count = tabs.len(), "tab state saved");
        Ok(())
    }

    /// A missing file means no tabs yet, not an error.
    pub async fn load_tabs(&self) -> Result<Vec<TabState>, StorageError> {
        let data = match tokio::fs::read(&self.file_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_slice(&data)?)
    }

    pub async fn delete_tab(&self, tab_id: &str) -> Result<(), StorageError> {
        let tabs = self.load_tabs().await?;
        let remaining: Vec<TabState> = tabs.into_iter().filter(|t| t.tab_id != tab_id).collect();
        self.save_tabs(&remaining).await
    }
}
