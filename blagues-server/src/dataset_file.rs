//! The canonical dataset as a JSON file on disk.
//!
//! The file is a JSON array of jokes. It is read once at start-up and
//! rewritten in full after every mutation, through a temporary file renamed
//! over the live file so readers never see a partial write.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};

use blagues_core::dataset::{overwrite_item, push_item, Dataset, DatasetError};
use blagues_core::{Joke, JokeId, JokePayload};

pub struct JsonFileDataset {
    path: PathBuf,
    items: RwLock<Vec<Joke>>,
}

impl JsonFileDataset {
    /// Load the dataset at `path`. A missing file is an empty dataset; it is
    /// created on the first write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, DatasetError> {
        let path = path.into();
        let items = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<Joke>>(&bytes)
                .map_err(|e| DatasetError::Malformed(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "dataset file missing, starting empty");
                Vec::new()
            }
            Err(e) => return Err(DatasetError::io("read dataset", e.to_string())),
        };
        info!(path = %path.display(), jokes = items.len(), "dataset loaded");
        Ok(Self {
            path,
            items: RwLock::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `items` and only then make them visible.
    async fn commit(
        &self,
        current: &mut Vec<Joke>,
        updated: Vec<Joke>,
    ) -> Result<(), DatasetError> {
        let path = self.path.clone();
        let bytes = serde_json::to_vec_pretty(&updated)
            .map_err(|e| DatasetError::Malformed(e.to_string()))?;
        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|e| DatasetError::io("write dataset", e.to_string()))??;
        *current = updated;
        Ok(())
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), DatasetError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DatasetError::io("create dataset directory", e.to_string()))?;
        }
    }
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    std::fs::write(&temp, bytes)
        .map_err(|e| DatasetError::io("write temporary dataset", e.to_string()))?;
    std::fs::rename(&temp, path)
        .map_err(|e| DatasetError::io("replace dataset", e.to_string()))?;
    Ok(())
}

#[async_trait]
impl Dataset for JsonFileDataset {
    async fn append_item(&self, payload: JokePayload) -> Result<Joke, DatasetError> {
        // The write lock is held across the file write so mutations are
        // applied one at a time.
        let mut items = self.items.write().await;
        let mut updated = items.clone();
        let joke = push_item(&mut updated, payload);
        self.commit(&mut items, updated).await?;
        info!(joke = %joke.id, "joke appended to dataset");
        Ok(joke)
    }

    async fn replace_item(&self, id: JokeId, payload: JokePayload) -> Result<Joke, DatasetError> {
        let mut items = self.items.write().await;
        let mut updated = items.clone();
        let joke = overwrite_item(&mut updated, id, payload)?;
        self.commit(&mut items, updated).await?;
        info!(joke = %joke.id, "joke replaced in dataset");
        Ok(joke)
    }

    async fn all_items(&self) -> Result<Vec<Joke>, DatasetError> {
        Ok(self.items.read().await.clone())
    }
}
