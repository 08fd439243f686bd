//! Video service API, transport and signature handling

pub mod api;
pub mod cipher;
pub mod client;
pub mod formats;
pub mod retry;

pub use api::ListingPage;
pub use cipher::{CipherLoader, DecoderProgram, DecoderStep, Mutator, SignatureDecoder};
pub use client::{HttpClientConfig, HttpTransport, Transport};
pub use formats::{select_stream, StreamRecord, FORMAT_PRIORITY};
pub use retry::{RetryConfig, RetryExecutor};
