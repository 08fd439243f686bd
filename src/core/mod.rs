//! Listing ingestion and the operations built on it

pub mod destination;
pub mod durations;
pub mod ingest;
pub mod resolver;
pub mod state;
pub mod track;

pub use destination::{Destination, DurationResolver, MemoryPlaylist, NoopDurationResolver};
pub use durations::ApiDurationResolver;
pub use ingest::{FetchReason, IngestReport, Ingestor, Step};
pub use resolver::Resolver;
pub use state::{CursorOverride, LoadingFlags, LoadingState, PendingRequest};
pub use track::{parse_iso_duration, TrackRecord};
