//! Last.fm API Data Transfer Objects
//!
//! Last.fm encodes numbers as strings and, for a page holding a single
//! track, sends an object where a list is expected.
//!
//! API Reference: https://www.last.fm/api/show/user.getRecentTracks

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RecentTracksResponse {
    pub recenttracks: RecentTracks,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecentTracks {
    #[serde(default)]
    pub track: OneOrMany<ScrobbleDto>,
    #[serde(rename = "@attr")]
    pub attr: PageAttr,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageAttr {
    pub page: Option<String>,
    pub total_pages: Option<String>,
    pub total: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextField {
    #[serde(rename = "#text", default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrobbleDto {
    pub name: String,
    pub artist: TextField,
    pub album: Option<TextField>,
    /// Missing on the now-playing entry
    pub date: Option<ScrobbleDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrobbleDate {
    /// Unix seconds
    pub uts: String,
}

/// Error body, e.g. `{"error": 6, "message": "User not found"}`
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: u32,
    pub message: String,
}
