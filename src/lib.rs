//! # tubelist - video service listings as playlists
//!
//! Ingests channel, playlist and video listings of a video service into
//! mutable, deduplicated playlists, and resolves playable stream URLs whose
//! signatures are scrambled by the service's player script.
//!
//! ## Features
//!
//! - Paginated, resumable listing ingestion with insertion-cursor bookkeeping
//! - Signature program extraction from the player script
//! - Best-stream selection by format priority
//! - Exclusions, monitored listings and account playlists in a JSON config
//! - Rate limiting and retry logic in the HTTP transport
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tubelist::{MemoryPlaylist, Resolver, Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = Resolver::new(Settings::default().with_api_key("KEY"))?;
//!     let playlist = Arc::new(MemoryPlaylist::new("mix"));
//!
//!     let report = resolver
//!         .resolve_url("https://www.youtube.com/playlist?list=PL123", playlist.clone())
//!         .await?;
//!     println!("Added {} tracks to {}", report.added_count(), report.label);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod core;
pub mod error;
pub mod platform;
pub mod utils;

pub use crate::core::{
    Destination, IngestReport, Ingestor, LoadingFlags, LoadingState, MemoryPlaylist, Resolver,
    TrackRecord,
};
pub use error::TubeError;
pub use platform::{DecoderProgram, SignatureDecoder};
pub use utils::{ConfigStore, Settings};

/// Result type alias for tubelist operations
pub type Result<T> = std::result::Result<T, TubeError>;
