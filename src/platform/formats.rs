//! Stream map parsing and best-format selection

use crate::platform::cipher::DecoderProgram;
use std::collections::BTreeMap;
use tracing::debug;

/// Preferred formats, audio first and then video
pub const FORMAT_PRIORITY: &[u32] = &[
    // Audio
    140, // m4a 128kbps
    141, // m4a 256kbps
    256, // m4a
    258, // m4a
    // Video
    22,  // mp4 1280x720 (192kbps)
    37,  // mp4 1920x1080 (192kbps)
    38,  // mp4 4096x3072 (192kbps)
    59,  // mp4 854x480 (128kbps)
    78,  // mp4 854x480 (128kbps)
    135, // mp4 480p
    134, // mp4 360p
    136, // mp4 720p
    137, // mp4 1080p
    18,  // mp4 640x360 (96kbps)
    160, // mp4 144p
    264, // mp4 1440p
    266, // mp4 2160p
    133, // mp4 240p
];

const STREAM_MAP_KEY: &str = "url_encoded_fmt_stream_map=";

/// One candidate stream from the format map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    /// Format id; `None` when the entry carries no itag
    pub itag: Option<u32>,
    pub url: String,
    pub signature: Option<String>,
    pub quality: Option<String>,
    pub mime_type: Option<String>,
    pub stereo3d: bool,
}

impl StreamRecord {
    /// Parse one comma-separated entry of `key=value` fields joined by `&`
    ///
    /// Returns `None` for entries without a url or with a non-numeric itag.
    pub fn parse(entry: &str) -> Option<StreamRecord> {
        let mut itag = None;
        let mut url = None;
        let mut signature = None;
        let mut quality = None;
        let mut mime_type = None;
        let mut stereo3d = false;

        for (key, value) in url::form_urlencoded::parse(entry.as_bytes()) {
            match key.as_ref() {
                "itag" => match value.trim().parse::<u32>() {
                    Ok(parsed) => itag = Some(parsed),
                    Err(_) => {
                        debug!("Skipping stream with itag {:?}", value);
                        return None;
                    }
                },
                "url" => url = Some(value.into_owned()),
                "s" => signature = Some(value.into_owned()),
                "quality" => quality = Some(value.into_owned()),
                "type" => mime_type = Some(value.into_owned()),
                "stereo3d" => stereo3d = true,
                _ => {}
            }
        }

        Some(StreamRecord {
            itag,
            url: url?,
            signature,
            quality,
            mime_type,
            stereo3d,
        })
    }

    /// Playable URL, with the decoded signature appended when one is needed
    ///
    /// Without a program the scrambled signature cannot be recovered and the
    /// bare URL is returned.
    pub fn playable_url(&self, program: Option<&DecoderProgram>) -> String {
        match (&self.signature, program) {
            (Some(signature), Some(program)) => {
                format!("{}&signature={}", self.url, program.decode(signature))
            }
            _ => self.url.clone(),
        }
    }

    /// Medium-quality, non-3D mp4 stream
    pub fn is_medium_mp4(&self) -> bool {
        self.quality.as_deref() == Some("medium")
            && !self.stereo3d
            && self
                .mime_type
                .as_deref()
                .map(|t| t.contains("mp4"))
                .unwrap_or(false)
    }
}

/// Parse every per-format entry of a decoded stream map
pub fn parse_stream_map(blob: &str) -> Vec<StreamRecord> {
    blob.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(StreamRecord::parse)
        .collect()
}

/// Pick the best stream URL from a decoded stream map
pub fn select_stream(blob: &str, program: Option<&DecoderProgram>) -> Option<String> {
    select_stream_with(blob, program, FORMAT_PRIORITY)
}

/// [`select_stream`] with an explicit priority table
pub fn select_stream_with(
    blob: &str,
    program: Option<&DecoderProgram>,
    priority: &[u32],
) -> Option<String> {
    let mut by_itag: BTreeMap<u32, String> = BTreeMap::new();
    let mut medium = None;

    for record in parse_stream_map(blob) {
        let url = record.playable_url(program);
        if record.is_medium_mp4() {
            medium = Some(url.clone());
        }
        if let Some(itag) = record.itag {
            by_itag.insert(itag, url);
        }
    }

    if let Some(url) = priority.iter().find_map(|itag| by_itag.get(itag)) {
        return Some(url.clone());
    }
    if medium.is_some() {
        debug!("No preferred format, using medium mp4 stream");
        return medium;
    }
    by_itag.into_values().next()
}

/// Cut the stream map out of a video-info response and percent-decode it
pub fn extract_stream_map(video_info: &str) -> Option<String> {
    let start = video_info.find(STREAM_MAP_KEY)? + STREAM_MAP_KEY.len();
    let rest = &video_info[start..];
    let raw = rest.split('&').next().unwrap_or(rest);
    if raw.is_empty() {
        return None;
    }
    urlencoding::decode(raw).ok().map(|decoded| decoded.into_owned())
}
