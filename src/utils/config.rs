//! Runtime settings and the persisted extended configuration

use crate::core::state::LoadingFlags;
use crate::error::TubeError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Item cap applied to user streams when the limit is switched on
pub const DEFAULT_USER_STREAM_LIMIT: usize = 5000;

/// Settings shared by every operation of a [`crate::core::Resolver`]
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    /// Interface language sent as `hl=`
    pub language: String,
    /// OAuth access token; `None` when not connected
    pub access_token: Option<String>,
    /// Display name of the connected account
    pub user_name: String,
    /// Stop following continuation tokens after this many added items
    pub limit_user_stream: Option<usize>,
    pub monitor_user_playlists: bool,
    pub timeout: Duration,
    pub retries: u32,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub requests_per_second: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            language: "en".to_string(),
            access_token: None,
            user_name: String::new(),
            limit_user_stream: None,
            monitor_user_playlists: true,
            timeout: Duration::from_secs(30),
            retries: 3,
            user_agent: None,
            proxy: None,
            requests_per_second: 10,
        }
    }
}

impl Settings {
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = api_key.to_string();
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    pub fn with_access_token(mut self, token: &str) -> Self {
        self.access_token = Some(token.to_string());
        self
    }

    pub fn with_user_name(mut self, name: &str) -> Self {
        self.user_name = name.to_string();
        self
    }

    /// Enable the user stream cap; `None` uses [`DEFAULT_USER_STREAM_LIMIT`]
    pub fn with_stream_limit(mut self, limit: Option<usize>) -> Self {
        self.limit_user_stream = Some(limit.unwrap_or(DEFAULT_USER_STREAM_LIMIT));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_proxy(mut self, proxy: &str) -> Self {
        self.proxy = Some(proxy.to_string());
        self
    }

    pub fn is_connected(&self) -> bool {
        self.access_token
            .as_deref()
            .map(|token| !token.is_empty())
            .unwrap_or(false)
    }
}

/// A listing URL re-ingested on refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorUrl {
    pub url: String,
    pub destination_id: String,
    pub label: String,
    #[serde(default)]
    pub flags: LoadingFlags,
}

/// Catalog entry for a track that was added somewhere
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: String,
    pub title: String,
    pub permalink: String,
    #[serde(default)]
    pub artwork: Option<String>,
    #[serde(default)]
    pub duration: Option<u64>,
    pub added_at: DateTime<Utc>,
}

/// One of the connected account's own playlists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPlaylist {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub items: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtendedConfig {
    #[serde(default)]
    pub exclusions: BTreeSet<String>,
    #[serde(default)]
    pub monitor_urls: Vec<MonitorUrl>,
    #[serde(default)]
    pub track_infos: HashMap<String, TrackInfo>,
    #[serde(default)]
    pub user_playlists: Vec<UserPlaylist>,
}

/// Extended configuration, shared between sessions and saved as JSON
#[derive(Debug, Default)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    data: RwLock<ExtendedConfig>,
}

impl ConfigStore {
    /// Store that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load from `path`; a missing file yields an empty store bound to it
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TubeError> {
        let path = path.as_ref().to_path_buf();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| TubeError::Config(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No configuration at {}, starting empty", path.display());
                ExtendedConfig::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write to the bound path through a temporary file
    pub async fn save(&self) -> Result<(), TubeError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(&*self.data.read())?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    pub fn is_excluded(&self, track_id: &str) -> bool {
        self.data.read().exclusions.contains(track_id)
    }

    pub fn exclude(&self, track_id: &str) {
        self.data.write().exclusions.insert(track_id.to_string());
    }

    pub fn record_track(&self, info: TrackInfo) {
        self.data.write().track_infos.insert(info.id.clone(), info);
    }

    /// Fill in a catalog duration; returns `false` for unknown tracks
    pub fn set_track_duration(&self, track_id: &str, seconds: u64) -> bool {
        match self.data.write().track_infos.get_mut(track_id) {
            Some(info) => {
                info.duration = Some(seconds);
                true
            }
            None => false,
        }
    }

    pub fn track_info(&self, track_id: &str) -> Option<TrackInfo> {
        self.data.read().track_infos.get(track_id).cloned()
    }

    /// Register a monitored URL; returns `false` when already present
    pub fn add_monitor_url(&self, entry: MonitorUrl) -> bool {
        let mut data = self.data.write();
        let exists = data
            .monitor_urls
            .iter()
            .any(|m| m.destination_id == entry.destination_id && m.url == entry.url);
        if exists {
            return false;
        }
        info!("Monitoring {} for {}", entry.url, entry.destination_id);
        data.monitor_urls.push(entry);
        true
    }

    pub fn monitor_urls(&self) -> Vec<MonitorUrl> {
        self.data.read().monitor_urls.clone()
    }

    /// Create the account playlist entry or update its title
    pub fn upsert_user_playlist(&self, playlist_id: &str, title: &str) {
        let mut data = self.data.write();
        match data.user_playlists.iter_mut().find(|p| p.id == playlist_id) {
            Some(playlist) => playlist.title = title.to_string(),
            None => data.user_playlists.push(UserPlaylist {
                id: playlist_id.to_string(),
                title: title.to_string(),
                items: BTreeSet::new(),
            }),
        }
    }

    pub fn user_playlist(&self, playlist_id: &str) -> Option<UserPlaylist> {
        self.data
            .read()
            .user_playlists
            .iter()
            .find(|p| p.id == playlist_id)
            .cloned()
    }

    /// Track an item as a member of an account playlist
    pub fn add_playlist_item(&self, playlist_id: &str, track_id: &str) -> bool {
        let mut data = self.data.write();
        match data.user_playlists.iter_mut().find(|p| p.id == playlist_id) {
            Some(playlist) => playlist.items.insert(track_id.to_string()),
            None => false,
        }
    }

    pub fn remove_playlist_item(&self, playlist_id: &str, track_id: &str) -> bool {
        let mut data = self.data.write();
        match data.user_playlists.iter_mut().find(|p| p.id == playlist_id) {
            Some(playlist) => playlist.items.remove(track_id),
            None => false,
        }
    }
}
