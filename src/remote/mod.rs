//! Remote catalog integration
//!
//! Talks to a Spotify-style Web API: catalog lookups, search, a user's
//! recently played tracks and image downloads.
//!
//! Layout follows the usual split:
//! - `dto`: wire types, exactly as the API returns them
//! - `adapter`: the only place DTOs become [`crate::model`] entities
//! - `auth`: access token acquisition and refresh
//! - `client`: HTTP transport, status mapping and rate-limit handling
//!
//! API docs: https://developer.spotify.com/documentation/web-api

mod adapter;
pub mod auth;
mod client;
pub mod dto;

use async_trait::async_trait;

pub use auth::Credentials;
pub use client::{CatalogClient, DEFAULT_ACCOUNTS_URL, DEFAULT_API_BASE_URL};

use crate::error::Result;
use crate::model::Play;

/// Errors from the remote boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Authorization failed: {0}")]
    Auth(String),

    #[error("Client id and secret are not configured")]
    MissingCredentials,
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if err.is_decode() {
            RemoteError::Parse(err.to_string())
        } else {
            RemoteError::Network(err.to_string())
        }
    }
}

/// A downloaded image payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub data: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Source of image bytes for the preserve cascade.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_image(&self, url: &str) -> std::result::Result<FetchedImage, RemoteError>;
}

/// A user's listening history on the remote service.
#[async_trait]
pub trait PlayHistory: Send + Sync {
    /// Up to `limit` most recent plays, newest first.
    async fn recently_played(&self, limit: u32) -> Result<Vec<Play>>;

    /// Largest `limit` a single request accepts.
    fn max_page_size(&self) -> u32 {
        50
    }
}
