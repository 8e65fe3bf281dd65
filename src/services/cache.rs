use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::CacheError;
use crate::models::ChannelRecord;

/// Serialize the full channel list, watch progress included
pub fn encode(channels: &[ChannelRecord]) -> Result<Vec<u8>, CacheError> {
    serde_json::to_vec(channels).map_err(CacheError::Encode)
}

/// Deserialize a channel list; malformed input is an error, never a partial list
pub fn decode(bytes: &[u8]) -> Result<Vec<ChannelRecord>, CacheError> {
    serde_json::from_slice(bytes).map_err(CacheError::Decode)
}

/// Disk-backed channel list snapshots, one JSON file per playlist name
///
/// Files live in `<data_dir>/lists/<name>_cache.json`.
#[derive(Debug, Clone)]
pub struct CacheStore {
    cache_dir: PathBuf,
}

impl CacheStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            cache_dir: data_dir.as_ref().join("lists"),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Load the snapshot for `name`; `Ok(None)` when no cache exists
    pub async fn load(&self, name: &str) -> Result<Option<Vec<ChannelRecord>>, CacheError> {
        let path = self.cache_path(name);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let channels = decode(&bytes)?;
        tracing::debug!("Loaded {} cached channels from {}", channels.len(), path.display());
        Ok(Some(channels))
    }

    /// Overwrite the snapshot for `name`
    pub async fn save(&self, name: &str, channels: &[ChannelRecord]) -> Result<(), CacheError> {
        fs::create_dir_all(&self.cache_dir).await?;

        let path = self.cache_path(name);
        let tmp_path = self.cache_tmp_path(name);
        let content = encode(channels)?;

        let file = File::create(&tmp_path).await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&content).await?;
        writer.flush().await?;
        writer.get_ref().sync_all().await?;
        drop(writer);

        // rename replaces the previous snapshot in one step
        fs::rename(&tmp_path, &path).await?;

        tracing::debug!("Saved {} channels to {}", channels.len(), path.display());
        Ok(())
    }

    pub async fn exists(&self, name: &str) -> bool {
        fs::metadata(self.cache_path(name))
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    pub async fn delete(&self, name: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.cache_path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // ============ Path Helpers ============

    fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}_cache.json", name))
    }

    fn cache_tmp_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}_cache.json.tmp", name))
    }
}
