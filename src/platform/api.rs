//! Data API endpoints and listing response models

use crate::error::TubeError;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const CONTENT_API_BASE: &str = "https://content.googleapis.com/youtube/v3";

/// Channel listing by legacy username
pub fn channel_by_username_url(username: &str, language: &str) -> String {
    format!(
        "{}/channels?part=contentDetails%2Csnippet&hl={}&forUsername={}&fields=items(contentDetails%2Csnippet)",
        API_BASE, language, username
    )
}

/// Channel listing by channel id
pub fn channel_by_id_url(channel_id: &str, language: &str) -> String {
    format!(
        "{}/channels?part=contentDetails%2Csnippet&hl={}&id={}&fields=items(contentDetails%2Csnippet)",
        API_BASE, language, channel_id
    )
}

/// Paginated items of a playlist
pub fn playlist_items_url(playlist_id: &str) -> String {
    format!(
        "{}/playlistItems?part=contentDetails%2Csnippet&maxResults=50&playlistId={}&fields=items%2Fsnippet%2Ckind%2CnextPageToken%2CpageInfo%2CtokenPagination",
        CONTENT_API_BASE, playlist_id
    )
}

/// A single video with details
pub fn video_url(video_id: &str, language: &str) -> String {
    format!(
        "{}/videos?part=contentDetails%2Csnippet&hl={}&id={}",
        API_BASE, language, video_id
    )
}

/// Durations of up to fifty comma-separated videos
pub fn video_durations_url(video_ids: &str) -> String {
    format!(
        "{}/videos?part=contentDetails&id={}&fields=items(id%2CcontentDetails%2Fduration)",
        API_BASE, video_ids
    )
}

/// Playlist metadata (title and owner)
pub fn playlist_info_url(playlist_id: &str, language: &str) -> String {
    format!(
        "{}/playlists?part=snippet&hl={}&id={}",
        API_BASE, language, playlist_id
    )
}

/// Membership ids of a video inside a playlist
pub fn playlist_membership_url(playlist_id: &str, video_id: &str) -> String {
    format!(
        "{}/playlistItems?part=id&videoId={}&playlistId={}&fields=items%2Fid",
        CONTENT_API_BASE, video_id, playlist_id
    )
}

/// Insert endpoint for playlist items
pub fn playlist_insert_url() -> String {
    format!("{}/playlistItems?part=snippet", API_BASE)
}

/// Delete endpoint for one playlist membership
pub fn playlist_item_delete_url(membership_id: &str) -> String {
    format!("{}/playlistItems?id={}", API_BASE, membership_id)
}

/// Stream map endpoint for a video
pub fn video_info_url(video_id: &str) -> String {
    format!(
        "https://www.youtube.com/get_video_info?video_id={}&el=detailpage&sts=16511",
        video_id
    )
}

/// Append the application key to a request URL
pub fn with_api_key(url: &str, api_key: &str) -> String {
    if api_key.is_empty() {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}key={}", url, separator, api_key)
}

/// Body of a playlist insert request
pub fn playlist_insert_body(playlist_id: &str, video_id: &str) -> Value {
    serde_json::json!({
        "snippet": {
            "playlistId": playlist_id,
            "resourceId": {
                "videoId": video_id,
                "kind": "youtube#video"
            }
        }
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Snippet {
    pub title: Option<String>,
    #[serde(rename = "channelTitle")]
    pub channel_title: Option<String>,
    pub thumbnails: Option<Thumbnails>,
    #[serde(rename = "resourceId")]
    pub resource_id: Option<ResourceId>,
    pub localized: Option<Localized>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Thumbnails {
    pub high: Option<ThumbnailInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThumbnailInfo {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceId {
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Localized {
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentDetails {
    pub duration: Option<String>,
    #[serde(rename = "relatedPlaylists")]
    pub related_playlists: Option<RelatedPlaylists>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelatedPlaylists {
    pub uploads: Option<String>,
}

/// One listing entry, normalized from the accepted shapes
#[derive(Debug, Clone, Default)]
pub struct ListingItem {
    /// The entry's own id field
    pub id: Option<String>,
    pub snippet: Snippet,
    pub content_details: Option<ContentDetails>,
}

impl ListingItem {
    /// Track identity: nested resource id first, then the entry's own id
    pub fn track_id(&self) -> Option<&str> {
        self.snippet
            .resource_id
            .as_ref()
            .and_then(|r| r.video_id.as_deref())
            .or(self.id.as_deref())
            .filter(|id| !id.is_empty())
    }

    pub fn title(&self) -> Option<&str> {
        self.snippet.title.as_deref()
    }

    pub fn duration_token(&self) -> Option<&str> {
        self.content_details
            .as_ref()
            .and_then(|c| c.duration.as_deref())
    }

    pub fn artwork(&self) -> Option<&str> {
        self.snippet
            .thumbnails
            .as_ref()
            .and_then(|t| t.high.as_ref())
            .and_then(|h| h.url.as_deref())
    }

    /// Entry that carries a `snippet`
    fn from_entry(entry: &Value) -> Option<ListingItem> {
        let snippet = entry.get("snippet")?;
        Some(ListingItem {
            id: entry.get("id").and_then(Value::as_str).map(str::to_string),
            snippet: serde_json::from_value(snippet.clone()).ok()?,
            content_details: entry
                .get("contentDetails")
                .and_then(|c| serde_json::from_value(c.clone()).ok()),
        })
    }

    /// A bare object read as the snippet itself
    fn from_bare(object: &Value) -> Option<ListingItem> {
        Some(ListingItem {
            id: None,
            snippet: serde_json::from_value(object.clone()).ok()?,
            content_details: None,
        })
    }
}

/// A parsed listing response
#[derive(Debug, Clone)]
pub enum ListingPage {
    /// Channel lookup pointing at its uploads playlist
    ChannelResolution { uploads_id: String, title: String },
    /// Playable entries with an optional continuation token
    Items {
        items: Vec<ListingItem>,
        next_page_token: Option<String>,
    },
}

impl ListingPage {
    pub fn parse(body: &[u8]) -> Result<ListingPage, TubeError> {
        let document: Value = serde_json::from_slice(body)
            .map_err(|e| TubeError::MalformedResponse(e.to_string()))?;

        if let Some(page) = Self::channel_resolution(&document)? {
            return Ok(page);
        }

        let next_page_token = document
            .get("nextPageToken")
            .and_then(Value::as_str)
            .map(str::to_string);

        let items = match document.get("items") {
            Some(items) if document.is_object() => Self::collect_items(items),
            _ => Self::collect_items(&document),
        };
        debug!("Listing page with {} entries", items.len());

        Ok(ListingPage::Items {
            items,
            next_page_token,
        })
    }

    fn channel_resolution(document: &Value) -> Result<Option<ListingPage>, TubeError> {
        let Some(first) = document
            .get("items")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
        else {
            return Ok(None);
        };
        let Some(related) = first
            .get("contentDetails")
            .and_then(|c| c.get("relatedPlaylists"))
        else {
            return Ok(None);
        };

        let uploads_id = related
            .get("uploads")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                TubeError::MalformedResponse("channel without uploads playlist".to_string())
            })?;
        let title = first
            .pointer("/snippet/localized/title")
            .or_else(|| first.pointer("/snippet/title"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        Ok(Some(ListingPage::ChannelResolution {
            uploads_id: uploads_id.to_string(),
            title: title.to_string(),
        }))
    }

    fn collect_items(value: &Value) -> Vec<ListingItem> {
        match value {
            Value::Array(entries) => entries
                .iter()
                .filter(|entry| entry.is_object())
                .filter_map(ListingItem::from_entry)
                .collect(),
            Value::Object(_) if value.get("snippet").is_some() => {
                ListingItem::from_entry(value).into_iter().collect()
            }
            Value::Object(_) => ListingItem::from_bare(value).into_iter().collect(),
            _ => Vec::new(),
        }
    }
}

/// Extract the first `items[].id` of a membership lookup
pub fn first_item_id(body: &[u8]) -> Option<String> {
    let document: Value = serde_json::from_slice(body).ok()?;
    document
        .get("items")?
        .as_array()?
        .first()?
        .get("id")?
        .as_str()
        .map(str::to_string)
}

/// "<channel> - <title>" from a playlist metadata response
pub fn playlist_display_name(body: &[u8]) -> Option<String> {
    let document: Value = serde_json::from_slice(body).ok()?;
    let snippet = document.get("items")?.as_array()?.first()?.get("snippet")?;
    let channel = snippet.get("channelTitle")?.as_str()?;
    let title = snippet
        .pointer("/localized/title")
        .or_else(|| snippet.get("title"))?
        .as_str()?;
    Some(format!("{} - {}", channel, title))
}
