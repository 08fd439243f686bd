//! Configuration and link helpers

pub mod config;
pub mod url;

pub use config::{ConfigStore, ExtendedConfig, MonitorUrl, Settings, TrackInfo, UserPlaylist};
pub use self::url::{append_query_param, classify_link, strip_query_param, LinkTarget};
