//! Producers of raw digest text.
//!
//! | Fetcher | Source of text |
//! |---------|----------------|
//! | [`CommandFetcher`] | stdout of a shell pipeline |
//! | [`SourcesFetcher`] | concurrent HTTP fetch of named pages, optionally condensed by a chat model |
//!
//! Both enforce their own timeouts, so a hung upstream only ever holds up the
//! one caller running the refresh.

use async_trait::async_trait;

use crate::error::FetchError;

pub mod command;
pub mod sources;
pub mod summarize;

pub use command::CommandFetcher;
pub use sources::{Source, SourcesFetcher};
pub use summarize::ChatSummarizer;

/// Fetched, not yet rendered text.
pub type RawContent = String;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Produce the next raw digest. An error means nothing usable came back;
    /// partial failures are folded into the returned text.
    async fn fetch(&self) -> Result<RawContent, FetchError>;
}
