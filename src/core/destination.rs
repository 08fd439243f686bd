//! Playlist capability the ingestion writes into

use crate::core::track::TrackRecord;
use crate::error::TubeError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::debug;

/// A mutable playlist owned by the host application
pub trait Destination: Send + Sync {
    /// Stable identifier used for monitoring bookkeeping
    fn id(&self) -> String;

    fn display_label(&self) -> String;

    fn set_display_label(&self, label: &str);

    fn begin_batch(&self);

    fn end_batch(&self);

    /// Insert at `at`, or append when `at` is `None`
    fn insert_item(&self, record: &TrackRecord, at: Option<usize>) -> Result<(), TubeError>;

    fn existing_ids(&self) -> HashSet<String>;

    /// Returns `true` when an item was removed
    fn remove_item(&self, track_id: &str) -> bool;

    /// Returns `true` when an item with `track_id` was updated
    fn set_item_duration(&self, track_id: &str, seconds: u64) -> bool;
}

/// Dependent pass that fills in durations for freshly added items
#[async_trait]
pub trait DurationResolver: Send + Sync {
    async fn resolve(
        &self,
        destination: &dyn Destination,
        track_ids: &[String],
    ) -> Result<(), TubeError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDurationResolver;

#[async_trait]
impl DurationResolver for NoopDurationResolver {
    async fn resolve(
        &self,
        destination: &dyn Destination,
        track_ids: &[String],
    ) -> Result<(), TubeError> {
        debug!(
            "Skipping duration pass for {} items of {}",
            track_ids.len(),
            destination.id()
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct PlaylistContents {
    label: String,
    items: Vec<TrackRecord>,
    open_batches: usize,
    committed_batches: usize,
}

/// In-memory [`Destination`]
#[derive(Debug)]
pub struct MemoryPlaylist {
    id: String,
    contents: Mutex<PlaylistContents>,
}

impl MemoryPlaylist {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            contents: Mutex::new(PlaylistContents::default()),
        }
    }

    /// Playlist pre-filled with bare records for `ids`
    pub fn with_items(id: &str, ids: &[&str]) -> Self {
        let playlist = Self::new(id);
        playlist.contents.lock().items = ids
            .iter()
            .map(|track_id| TrackRecord::new(track_id, track_id))
            .collect();
        playlist
    }

    pub fn items(&self) -> Vec<TrackRecord> {
        self.contents.lock().items.clone()
    }

    pub fn ids(&self) -> Vec<String> {
        self.contents.lock().items.iter().map(|r| r.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.contents.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Batches opened and closed so far
    pub fn committed_batches(&self) -> usize {
        self.contents.lock().committed_batches
    }
}

impl Destination for MemoryPlaylist {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn display_label(&self) -> String {
        self.contents.lock().label.clone()
    }

    fn set_display_label(&self, label: &str) {
        self.contents.lock().label = label.to_string();
    }

    fn begin_batch(&self) {
        self.contents.lock().open_batches += 1;
    }

    fn end_batch(&self) {
        let mut contents = self.contents.lock();
        if contents.open_batches > 0 {
            contents.open_batches -= 1;
            contents.committed_batches += 1;
        }
    }

    fn insert_item(&self, record: &TrackRecord, at: Option<usize>) -> Result<(), TubeError> {
        let mut contents = self.contents.lock();
        match at {
            Some(position) => {
                let position = position.min(contents.items.len());
                contents.items.insert(position, record.clone());
            }
            None => contents.items.push(record.clone()),
        }
        Ok(())
    }

    fn existing_ids(&self) -> HashSet<String> {
        self.contents.lock().items.iter().map(|r| r.id.clone()).collect()
    }

    fn remove_item(&self, track_id: &str) -> bool {
        let mut contents = self.contents.lock();
        let before = contents.items.len();
        contents.items.retain(|r| r.id != track_id);
        contents.items.len() != before
    }

    fn set_item_duration(&self, track_id: &str, seconds: u64) -> bool {
        let mut contents = self.contents.lock();
        let mut updated = false;
        for record in contents.items.iter_mut().filter(|r| r.id == track_id) {
            record.duration = Some(seconds);
            updated = true;
        }
        updated
    }
}
