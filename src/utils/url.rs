//! Link classification and query-string helpers

use crate::error::TubeError;
use url::Url;

/// What a user supplied link points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Legacy `/user/<name>` channel address
    User(String),
    Channel(String),
    Playlist(String),
    Video(String),
}

impl LinkTarget {
    pub fn id(&self) -> &str {
        match self {
            LinkTarget::User(id)
            | LinkTarget::Channel(id)
            | LinkTarget::Playlist(id)
            | LinkTarget::Video(id) => id,
        }
    }
}

fn is_service_host(host: &str) -> bool {
    matches!(
        host,
        "youtube.com" | "www.youtube.com" | "m.youtube.com" | "youtu.be"
    )
}

fn first_segment_after<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    let segment = rest.split('/').next().unwrap_or_default();
    (!segment.is_empty()).then_some(segment)
}

/// Classify a service link into the listing it resolves to
pub fn classify_link(link: &str) -> Result<LinkTarget, TubeError> {
    let parsed = Url::parse(link.trim())?;
    let host = parsed.host_str().unwrap_or_default();
    if !is_service_host(host) {
        return Err(TubeError::InvalidUrl(format!(
            "Not a supported service URL: {}",
            link
        )));
    }

    let path = parsed.path();
    if let Some(name) = first_segment_after(path, "/user/") {
        return Ok(LinkTarget::User(name.to_string()));
    }
    if let Some(id) = first_segment_after(path, "/channel/") {
        return Ok(LinkTarget::Channel(id.to_string()));
    }
    if let Some((_, list)) = parsed.query_pairs().find(|(key, _)| key == "list") {
        if !list.is_empty() {
            return Ok(LinkTarget::Playlist(list.into_owned()));
        }
    }
    if host == "youtu.be" {
        if let Some(id) = first_segment_after(path, "/") {
            return Ok(LinkTarget::Video(id.to_string()));
        }
    }
    if path.starts_with("/watch") {
        if let Some((_, id)) = parsed.query_pairs().find(|(key, _)| key == "v") {
            if !id.is_empty() {
                return Ok(LinkTarget::Video(id.into_owned()));
            }
        }
    }
    if let Some(id) = first_segment_after(path, "/shorts/") {
        return Ok(LinkTarget::Video(id.to_string()));
    }

    Err(TubeError::InvalidUrl(format!("Unsupported link: {}", link)))
}

/// Remove every `name=value` pair from a URL's query string
pub fn strip_query_param(url: &str, name: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let prefix = format!("{}=", name);
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.starts_with(&prefix) && *pair != name)
        .collect();

    if kept.is_empty() {
        base.to_string()
    } else {
        format!("{}?{}", base, kept.join("&"))
    }
}

/// Append `name=value` using `?` or `&` as the URL requires
pub fn append_query_param(url: &str, name: &str, value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}{}={}",
        url,
        separator,
        name,
        urlencoding::encode(value)
    )
}
