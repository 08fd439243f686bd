//! Playable track records synthesized from listing entries

use crate::platform::api::ListingItem;
use crate::utils::config::TrackInfo;
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// Titles the service gives entries that can no longer be played
pub const TOMBSTONE_TITLES: &[&str] = &["Deleted video", "Private video"];

/// Metadata handed to a destination on insertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: String,
    pub location: String,
    pub title: String,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub artwork: Option<String>,
    /// Seconds, when the entry carried a parsable duration
    pub duration: Option<u64>,
    pub permalink: String,
}

impl TrackRecord {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            location: format!("youtube://{}/{}.mp4", id, title),
            title: title.to_string(),
            album: None,
            artist: None,
            artwork: None,
            duration: None,
            permalink: format!("{}{}", WATCH_URL, id),
        }
    }

    /// Build the record for one listing entry
    ///
    /// `album` is the session label, `with_artist` copies the channel title.
    pub fn from_listing(id: &str, item: &ListingItem, album: &str, with_artist: bool) -> Self {
        let mut record = Self::new(id, item.title().unwrap_or_default());
        if !album.is_empty() {
            record.album = Some(album.to_string());
        }
        if with_artist {
            record.artist = item.snippet.channel_title.clone();
        }
        record.artwork = item.artwork().map(str::to_string);
        record.duration = item.duration_token().and_then(parse_iso_duration);
        record
    }

    pub fn to_info(&self) -> TrackInfo {
        TrackInfo {
            id: self.id.clone(),
            title: self.title.clone(),
            permalink: self.permalink.clone(),
            artwork: self.artwork.clone(),
            duration: self.duration,
            added_at: Utc::now(),
        }
    }
}

pub fn is_tombstone(title: &str) -> bool {
    TOMBSTONE_TITLES.contains(&title)
}

fn duration_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").ok())
        .as_ref()
}

/// Total seconds of a `PT#H#M#S` token, every component optional
///
/// Returns `None` when the token does not match or the total overflows.
pub fn parse_iso_duration(token: &str) -> Option<u64> {
    let captures = duration_pattern()?.captures(token.trim())?;
    let component = |index: usize| -> Option<u64> {
        match captures.get(index) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };
    component(1)?
        .checked_mul(3600)?
        .checked_add(component(2)?.checked_mul(60)?)?
        .checked_add(component(3)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::api::ListingPage;

    #[test]
    fn test_parse_iso_duration() {
        assert_eq!(parse_iso_duration("PT1H2M3S"), Some(3723));
        assert_eq!(parse_iso_duration("PT5M"), Some(300));
        assert_eq!(parse_iso_duration("PT0S"), Some(0));
        assert_eq!(parse_iso_duration("PT"), Some(0));
        assert_eq!(parse_iso_duration("P1D"), None);
        assert_eq!(parse_iso_duration("garbage"), None);
    }

    #[test]
    fn test_parse_iso_duration_overflow_is_no_value() {
        assert_eq!(parse_iso_duration("PT99999999999999999H"), None);
        assert_eq!(parse_iso_duration("PT999999999999999999999S"), None);
        assert_eq!(parse_iso_duration("PT5124095576030431H59M59S"), None);
    }

    #[test]
    fn test_record_from_listing() {
        let body = br#"[{"id":"v1","snippet":{"title":"Song","channelTitle":"Band",
            "thumbnails":{"high":{"url":"http://img"}}},"contentDetails":{"duration":"PT3M"}}]"#;
        let ListingPage::Items { items, .. } = ListingPage::parse(body).unwrap() else {
            panic!("expected items");
        };

        let record = TrackRecord::from_listing("v1", &items[0], "Label", true);
        assert_eq!(record.location, "youtube://v1/Song.mp4");
        assert_eq!(record.permalink, "https://www.youtube.com/watch?v=v1");
        assert_eq!(record.album.as_deref(), Some("Label"));
        assert_eq!(record.artist.as_deref(), Some("Band"));
        assert_eq!(record.artwork.as_deref(), Some("http://img"));
        assert_eq!(record.duration, Some(180));

        let plain = TrackRecord::from_listing("v1", &items[0], "", false);
        assert!(plain.album.is_none());
        assert!(plain.artist.is_none());
    }

    #[test]
    fn test_tombstones() {
        assert!(is_tombstone("Deleted video"));
        assert!(is_tombstone("Private video"));
        assert!(!is_tombstone("Private video 2"));
    }
}
