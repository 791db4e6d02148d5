// src/downloads.rs
use std::sync::Mutex;

use bytes::Bytes;
use indexmap::IndexMap;
use log::{debug, info};

use crate::config::DEFAULT_MAX_DOWNLOADS;
use crate::models::{AssetId, Resolution};

/// Where finished high-res images and videos are handed to the user.
pub trait DownloadSink: Send + Sync {
    /// Store a file and return the URL the client fetches it from.
    fn save(&self, file_name: &str, mime_type: &str, data: Bytes) -> String;
}

pub fn high_res_file_name(stem: &str, asset_id: &AssetId, resolution: Resolution) -> String {
    format!("{stem}-{asset_id}-{resolution}.png")
}

pub fn video_file_name(asset_id: &AssetId) -> String {
    format!("luxefit-video-{asset_id}.mp4")
}

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub mime_type: String,
    pub data: Bytes,
}

/// In-memory downloads served by the HTTP layer. Holds at most `limit`
/// files, oldest evicted first.
#[derive(Debug)]
pub struct MemoryDownloads {
    url_prefix: String,
    limit: usize,
    files: Mutex<IndexMap<String, StoredFile>>,
}

impl MemoryDownloads {
    pub fn new(url_prefix: impl Into<String>) -> Self {
        Self::with_limit(url_prefix, DEFAULT_MAX_DOWNLOADS)
    }

    pub fn with_limit(url_prefix: impl Into<String>, limit: usize) -> Self {
        Self {
            url_prefix: url_prefix.into(),
            limit: limit.max(1),
            files: Mutex::new(IndexMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.files.lock().map(|files| files.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, file_name: &str) -> Option<StoredFile> {
        self.files
            .lock()
            .ok()
            .and_then(|files| files.get(file_name).cloned())
    }
}

impl DownloadSink for MemoryDownloads {
    fn save(&self, file_name: &str, mime_type: &str, data: Bytes) -> String {
        info!("Saving download {} ({} bytes)", file_name, data.len());
        if let Ok(mut files) = self.files.lock() {
            // Re-saving a name moves it to the newest position.
            files.shift_remove(file_name);
            files.insert(
                file_name.to_string(),
                StoredFile {
                    mime_type: mime_type.to_string(),
                    data,
                },
            );
            while files.len() > self.limit {
                if let Some((evicted, _)) = files.shift_remove_index(0) {
                    debug!("Evicted download {}", evicted);
                }
            }
        }
        format!("{}/{}", self.url_prefix.trim_end_matches('/'), file_name)
    }
}
