//! Per-session ingestion bookkeeping

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

bitflags! {
    /// Session behaviour switches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct LoadingFlags: u32 {
        /// Already known items do not move the insertion cursor
        const IGNORE_EXISTING_POSITION = 1 << 0;
        /// Cursor moves also advance the secondary offset
        const UPDATE_ADDITIONAL_POS = 1 << 1;
        /// Copy the channel title into the artist field
        const ADD_CHANNEL_TITLE = 1 << 2;
        /// Never follow continuation tokens
        const IGNORE_NEXT_PAGE = 1 << 3;
    }
}

impl Default for LoadingFlags {
    fn default() -> Self {
        LoadingFlags::empty()
    }
}

/// Cursor adjustment carried by a queued request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorOverride {
    /// Keep the session cursor as it is
    #[default]
    Unchanged,
    /// Append at the end of the destination
    End,
    At(usize),
}

/// A follow-up listing fetch waiting in the session queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub url: String,
    pub label: Option<String>,
    pub cursor: CursorOverride,
}

impl PendingRequest {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            label: None,
            cursor: CursorOverride::Unchanged,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_cursor(mut self, cursor: CursorOverride) -> Self {
        self.cursor = cursor;
        self
    }
}

/// Mutable state of one ingestion run
#[derive(Debug, Clone, Default)]
pub struct LoadingState {
    /// Primary insertion cursor; `None` appends at the end
    pub insert_cursor: Option<usize>,
    /// Secondary offset added to the cursor when inserting
    pub additional_pos: usize,
    pub known_ids: HashSet<String>,
    /// Account playlist whose item set mirrors what gets added
    pub tracked_playlist: Option<String>,
    /// Ids added during this run, in insertion order
    pub added: Vec<String>,
    pub reference_label: String,
    pub pending: VecDeque<PendingRequest>,
    pub flags: LoadingFlags,
}

impl LoadingState {
    pub fn new(reference_label: &str) -> Self {
        Self {
            reference_label: reference_label.to_string(),
            ..Self::default()
        }
    }

    pub fn with_known_ids<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.known_ids.extend(ids);
        self
    }

    pub fn with_cursor(mut self, cursor: usize) -> Self {
        self.insert_cursor = Some(cursor);
        self
    }

    pub fn with_flags(mut self, flags: LoadingFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_tracked_playlist(mut self, playlist_id: &str) -> Self {
        self.tracked_playlist = Some(playlist_id.to_string());
        self
    }

    pub fn enqueue(&mut self, request: PendingRequest) {
        self.pending.push_back(request);
    }

    pub fn added_count(&self) -> usize {
        self.added.len()
    }

    /// Effective insertion index at the start of a page
    pub fn insert_position(&self) -> Option<usize> {
        self.insert_cursor.map(|cursor| cursor + self.additional_pos)
    }

    /// Move the cursor(s) past one item
    pub fn advance_cursor(&mut self) {
        if let Some(cursor) = self.insert_cursor.as_mut() {
            *cursor += 1;
            if self.flags.contains(LoadingFlags::UPDATE_ADDITIONAL_POS) {
                self.additional_pos += 1;
            }
        }
    }

    /// Known item seen again: keep inserting after it unless positions are ignored
    pub fn skip_known(&mut self) -> bool {
        if self.insert_cursor.is_some()
            && !self.flags.contains(LoadingFlags::IGNORE_EXISTING_POSITION)
        {
            self.advance_cursor();
            return true;
        }
        false
    }

    pub fn record_added(&mut self, track_id: &str) {
        self.added.push(track_id.to_string());
        self.advance_cursor();
    }

    /// Apply the overrides of a dequeued request
    pub fn apply_override(&mut self, request: &PendingRequest) {
        if let Some(label) = request.label.as_deref().filter(|l| !l.is_empty()) {
            self.reference_label = label.to_string();
        }
        let cursor = match request.cursor {
            CursorOverride::Unchanged => return,
            CursorOverride::End => None,
            CursorOverride::At(position) => Some(position),
        };
        self.insert_cursor = cursor;
        self.flags = LoadingFlags::UPDATE_ADDITIONAL_POS | LoadingFlags::IGNORE_EXISTING_POSITION;
    }
}
