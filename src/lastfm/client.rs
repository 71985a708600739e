//! Last.fm HTTP client
//!
//! Pages through `user.getrecenttracks` to collect a user's complete
//! scrobble history. Only an API key is needed; requests are unsigned.

use std::time::Duration;

use chrono::DateTime;

use super::{Scrobble, dto};
use crate::error::{Error, ResourceKind, Result};
use crate::remote::RemoteError;

pub const DEFAULT_API_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// Largest page `user.getrecenttracks` serves
const PAGE_SIZE: u32 = 200;

/// Last.fm error code for an unknown user
const ERROR_NO_SUCH_USER: u32 = 6;

/// Last.fm API client
pub struct LastFmClient {
    api_key: String,
    http_client: reqwest::Client,
    base_url: String,
}

impl LastFmClient {
    pub fn new(
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> std::result::Result<Self, RemoteError> {
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .timeout(timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            api_key: api_key.into(),
            http_client,
            base_url: DEFAULT_API_URL.to_string(),
        })
    }

    /// Create a client for testing with custom base URL
    #[cfg(test)]
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            http_client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Every scrobble of `username`, newest first.
    ///
    /// The now-playing entry carries no date and is skipped.
    pub async fn all_scrobbles(&self, username: &str) -> Result<Vec<Scrobble>> {
        let mut scrobbles = Vec::new();
        let mut page = 1;

        loop {
            let body = self.recent_tracks_page(username, page).await?;
            let total_pages = body
                .recenttracks
                .attr
                .total_pages
                .as_deref()
                .and_then(|p| p.parse::<u32>().ok())
                .unwrap_or(1);

            scrobbles.extend(
                body.recenttracks
                    .track
                    .into_vec()
                    .into_iter()
                    .filter_map(to_scrobble),
            );

            tracing::debug!(target: "lastfm", page, total_pages, "Fetched scrobble page");
            if page >= total_pages {
                break;
            }
            page += 1;
        }

        Ok(scrobbles)
    }

    async fn recent_tracks_page(
        &self,
        username: &str,
        page: u32,
    ) -> Result<dto::RecentTracksResponse> {
        let url = format!(
            "{}?method=user.getrecenttracks&user={}&api_key={}&format=json&limit={}&page={}",
            self.base_url,
            urlencoding::encode(username),
            urlencoding::encode(&self.api_key),
            PAGE_SIZE,
            page
        );

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(RemoteError::from)?;

        let status = response.status();
        if !status.is_success() {
            // Last.fm reports most failures through its own error body
            return match response.json::<dto::ErrorResponse>().await {
                Ok(err) if err.error == ERROR_NO_SUCH_USER => {
                    Err(Error::not_found(ResourceKind::User, username))
                }
                Ok(err) => Err(RemoteError::Http {
                    status: status.as_u16(),
                    message: err.message,
                }
                .into()),
                Err(_) => Err(RemoteError::Http {
                    status: status.as_u16(),
                    message: status.canonical_reason().unwrap_or("Unknown").to_string(),
                }
                .into()),
            };
        }

        response
            .json::<dto::RecentTracksResponse>()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()).into())
    }
}

fn to_scrobble(dto: dto::ScrobbleDto) -> Option<Scrobble> {
    let secs: i64 = dto.date?.uts.parse().ok()?;
    Some(Scrobble {
        title: dto.name,
        artist: dto.artist.text,
        album: dto.album.map(|a| a.text).filter(|a| !a.is_empty()),
        played_at: DateTime::from_timestamp(secs, 0)?,
    })
}
