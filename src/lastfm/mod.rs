//! Last.fm scrobble import
//!
//! - `client`: fetches a user's complete scrobble history
//! - `import`: resolves scrobbles to catalog tracks and stores them as plays

mod client;
mod dto;
mod import;

pub use client::{DEFAULT_API_URL, LastFmClient};
pub use import::{ImportSummary, ScrobbleResolver, import_scrobbles};

use chrono::{DateTime, Utc};

/// One listen as recorded by Last.fm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scrobble {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub played_at: DateTime<Utc>,
}

impl Scrobble {
    /// Free-text query used to match the scrobble to a catalog track.
    pub fn query(&self) -> String {
        format!("{} {}", self.title, self.artist)
    }
}
