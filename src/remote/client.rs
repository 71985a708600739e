//! Catalog HTTP client
//!
//! Handles communication with the catalog Web API: authenticated GETs,
//! status mapping, a single honoured `Retry-After` on 429, batching and
//! paging.
//!
//! Status mapping:
//! - 404 → [`Error::NotFound`] of the requested kind
//! - 429 → one retry if `Retry-After` is short enough, else
//!   [`RemoteError::RateLimited`]
//! - 401 → [`RemoteError::Auth`], and the cached token is dropped
//! - other failures → [`RemoteError::Http`]

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;

use super::auth::{Credentials, TokenSource};
use super::{FetchedImage, ImageFetcher, PlayHistory, RemoteError, adapter, dto};
use crate::config::RemoteConfig;
use crate::error::{Error, ResourceKind, Result};
use crate::model::{Album, AlbumType, Artist, FillLevel, Play, Track};
use crate::provider::{ResourceProvider, fill_discography};

pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.spotify.com";

const USER_AGENT: &str = concat!("music-mirror/", env!("CARGO_PKG_VERSION"));

/// Ids per `GET /tracks?ids=` request
const TRACKS_PER_REQUEST: usize = 50;
/// Ids per `GET /albums?ids=` request
const ALBUMS_PER_REQUEST: usize = 20;
/// Page size for discography and tracklist paging
const PAGE_LIMIT: u32 = 50;
/// Largest `limit` accepted by the recently-played endpoint
const RECENTLY_PLAYED_MAX: u32 = 50;

/// Catalog API client
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenSource,
    max_retry_wait: Duration,
}

impl CatalogClient {
    /// Create a client for the configured endpoints.
    pub fn new(
        credentials: Credentials,
        settings: &RemoteConfig,
    ) -> std::result::Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .gzip(true)
            .user_agent(USER_AGENT)
            .timeout(settings.timeout())
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            tokens: TokenSource::new(http.clone(), &settings.accounts_url, credentials),
            http,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            max_retry_wait: settings.max_retry_wait(),
        })
    }

    /// Create a client for testing with custom base URL and a valid token
    #[cfg(test)]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let settings = RemoteConfig {
            api_base_url: base_url.into(),
            accounts_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let client = Self::new(
            Credentials::ClientCredentials {
                client_id: "test".to_string(),
                client_secret: "test".to_string(),
            },
            &settings,
        )
        .expect("Failed to build HTTP client");
        client.tokens.seed(super::auth::Token {
            access_token: "test-token".to_string(),
            expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
            refresh_token: None,
        });
        client
    }

    /// Token state, for persisting refreshed user tokens.
    pub fn tokens(&self) -> &TokenSource {
        &self.tokens
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Authenticated GET. `kind` and `id` describe what a 404 means.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        kind: ResourceKind,
        id: &str,
    ) -> Result<T> {
        let url = self.url(path);
        let mut retried = false;

        loop {
            let token = self.tokens.access_token().await?;
            tracing::trace!(target: "remote", %url, "GET");
            let response = self
                .http
                .get(&url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(RemoteError::from)?;

            let status = response.status();

            if status == StatusCode::NOT_FOUND {
                return Err(Error::not_found(kind, id));
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = parse_retry_after(response.headers());
                match retry_after {
                    Some(secs) if !retried && Duration::from_secs(secs) <= self.max_retry_wait => {
                        tracing::warn!(target: "remote", secs, "Rate limited, retrying");
                        tokio::time::sleep(Duration::from_secs(secs)).await;
                        retried = true;
                        continue;
                    }
                    _ => return Err(RemoteError::RateLimited { retry_after }.into()),
                }
            }

            if status == StatusCode::UNAUTHORIZED {
                self.tokens.invalidate();
                return Err(RemoteError::Auth("access token rejected".to_string()).into());
            }

            if !status.is_success() {
                // Try to parse error response
                let message = match response.json::<dto::ApiErrorEnvelope>().await {
                    Ok(envelope) => envelope.error.message,
                    Err(_) => status.canonical_reason().unwrap_or("Unknown").to_string(),
                };
                return Err(RemoteError::Http {
                    status: status.as_u16(),
                    message,
                }
                .into());
            }

            return response
                .json::<T>()
                .await
                .map_err(|e| RemoteError::Parse(e.to_string()).into());
        }
    }

    async fn search(&self, query: &str, kind: ResourceKind) -> Result<dto::SearchResponse> {
        let path = format!(
            "/search?q={}&type={}&limit=1",
            urlencoding::encode(query),
            kind.as_str()
        );
        self.get_json(&path, kind, query).await
    }

    /// Walk a paged listing from `first` until `next` runs out.
    async fn collect_pages<T: DeserializeOwned>(
        &self,
        first: String,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first);
        while let Some(path) = next {
            let page: dto::Paging<T> = self.get_json(&path, kind, id).await?;
            items.extend(page.items);
            next = page.next;
        }
        Ok(items)
    }

    /// Recently played tracks of the user these credentials belong to.
    pub async fn recent_plays(&self, limit: u32) -> Result<Vec<Play>> {
        let limit = limit.clamp(1, RECENTLY_PLAYED_MAX);
        let path = format!("/me/player/recently-played?limit={limit}");
        let body: dto::RecentlyPlayed = self.get_json(&path, ResourceKind::User, "me").await?;

        let mut plays: Vec<Play> = body.items.into_iter().filter_map(adapter::to_play).collect();
        plays.sort_by(|a, b| b.played_at.cmp(&a.played_at));
        Ok(plays)
    }

    /// Download an image. Image hosts need no authorization.
    pub async fn download_image(
        &self,
        url: &str,
    ) -> std::result::Result<FetchedImage, RemoteError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Http {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let data = response.bytes().await?.to_vec();
        Ok(FetchedImage { data, mime_type })
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn include_groups(types: &[AlbumType]) -> String {
    AlbumType::normalize(types)
        .iter()
        .map(AlbumType::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

fn id_list<'a>(ids: impl IntoIterator<Item = &'a String>) -> String {
    ids.into_iter()
        .map(|id| urlencoding::encode(id).into_owned())
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl ResourceProvider for CatalogClient {
    async fn track_by_id(&self, id: &str) -> Result<Track> {
        let path = format!("/tracks/{}", urlencoding::encode(id));
        let dto: dto::TrackDto = self.get_json(&path, ResourceKind::Track, id).await?;
        adapter::to_track(dto).ok_or_else(|| Error::not_found(ResourceKind::Track, id))
    }

    async fn several_tracks_by_id(&self, ids: &[String]) -> Result<Vec<Track>> {
        let mut tracks = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(TRACKS_PER_REQUEST) {
            let path = format!("/tracks?ids={}", id_list(chunk));
            let body: dto::SeveralTracks = self
                .get_json(&path, ResourceKind::Track, &chunk.join(","))
                .await?;
            let mut found = body.tracks.into_iter();
            for id in chunk {
                let track = found
                    .next()
                    .flatten()
                    .and_then(adapter::to_track)
                    .ok_or_else(|| Error::not_found(ResourceKind::Track, id))?;
                tracks.push(track);
            }
        }
        Ok(tracks)
    }

    async fn track_by_match(&self, query: &str) -> Result<Track> {
        let result = self.search(query, ResourceKind::Track).await?;
        let id = result
            .tracks
            .and_then(|page| page.items.into_iter().next())
            .and_then(|t| t.id)
            .ok_or_else(|| Error::not_found(ResourceKind::Track, query))?;
        self.track_by_id(&id).await
    }

    async fn album_by_id(&self, id: &str) -> Result<Album> {
        let path = format!("/albums/{}", urlencoding::encode(id));
        let dto: dto::AlbumDto = self.get_json(&path, ResourceKind::Album, id).await?;
        Ok(adapter::to_album(dto))
    }

    async fn several_albums_by_id(&self, ids: &[String]) -> Result<Vec<Album>> {
        let mut albums = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(ALBUMS_PER_REQUEST) {
            let path = format!("/albums?ids={}", id_list(chunk));
            let body: dto::SeveralAlbums = self
                .get_json(&path, ResourceKind::Album, &chunk.join(","))
                .await?;
            let mut found = body.albums.into_iter();
            for id in chunk {
                let album = found
                    .next()
                    .flatten()
                    .map(adapter::to_album)
                    .ok_or_else(|| Error::not_found(ResourceKind::Album, id))?;
                albums.push(album);
            }
        }
        Ok(albums)
    }

    async fn album_by_match(&self, query: &str) -> Result<Album> {
        let result = self.search(query, ResourceKind::Album).await?;
        let id = result
            .albums
            .and_then(|page| page.items.into_iter().next())
            .map(|a| a.id)
            .ok_or_else(|| Error::not_found(ResourceKind::Album, query))?;
        self.album_by_id(&id).await
    }

    async fn artist_by_id(
        &self,
        id: &str,
        fill: FillLevel,
        album_types: &[AlbumType],
    ) -> Result<Artist> {
        let path = format!("/artists/{}", urlencoding::encode(id));
        let dto: dto::ArtistDto = self.get_json(&path, ResourceKind::Artist, id).await?;
        let mut artist = adapter::to_artist(dto);
        fill_discography(self, &mut artist, album_types, fill).await?;
        Ok(artist)
    }

    async fn artist_by_match(
        &self,
        query: &str,
        fill: FillLevel,
        album_types: &[AlbumType],
    ) -> Result<Artist> {
        let result = self.search(query, ResourceKind::Artist).await?;
        let id = result
            .artists
            .and_then(|page| page.items.into_iter().next())
            .map(|a| a.id)
            .ok_or_else(|| Error::not_found(ResourceKind::Artist, query))?;
        self.artist_by_id(&id, fill, album_types).await
    }

    async fn artist_discography(
        &self,
        artist: &Artist,
        album_types: &[AlbumType],
    ) -> Result<Vec<Album>> {
        let wanted = AlbumType::normalize(album_types);
        let first = format!(
            "/artists/{}/albums?include_groups={}&limit={}",
            urlencoding::encode(&artist.id),
            include_groups(&wanted),
            PAGE_LIMIT
        );
        let listed: Vec<dto::SimplifiedAlbumDto> = self
            .collect_pages(first, ResourceKind::Discography, &artist.id)
            .await?;

        let mut ids: Vec<String> = Vec::new();
        for album in listed.into_iter().map(adapter::simplified_album) {
            let is_main = album.artists.first().is_some_and(|a| a.id == artist.id);
            if is_main && wanted.contains(&album.album_type) && !ids.contains(&album.id) {
                ids.push(album.id);
            }
        }

        // Listings carry simplified albums; fetch the full objects
        self.several_albums_by_id(&ids).await
    }

    async fn album_tracklist(&self, album: &Album) -> Result<Vec<Track>> {
        let first = format!(
            "/albums/{}/tracks?limit={}",
            urlencoding::encode(&album.id),
            PAGE_LIMIT
        );
        let listed: Vec<dto::SimplifiedTrackDto> = self
            .collect_pages(first, ResourceKind::Album, &album.id)
            .await?;
        Ok(listed
            .into_iter()
            .filter_map(|t| adapter::tracklist_track(t, &album.id))
            .collect())
    }
}

#[async_trait]
impl PlayHistory for CatalogClient {
    async fn recently_played(&self, limit: u32) -> Result<Vec<Play>> {
        self.recent_plays(limit).await
    }

    fn max_page_size(&self) -> u32 {
        RECENTLY_PLAYED_MAX
    }
}

#[async_trait]
impl ImageFetcher for CatalogClient {
    async fn fetch_image(&self, url: &str) -> std::result::Result<FetchedImage, RemoteError> {
        self.download_image(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve canned HTTP responses, one per connection, in order.
    async fn serve(responses: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        format!("http://{}", addr)
    }

    fn http(status: &str, headers: &[&str], body: &str) -> String {
        let mut out = format!(
            "HTTP/1.1 {status}\r\nConnection: close\r\nContent-Length: {}\r\n",
            body.len()
        );
        for h in headers {
            out.push_str(h);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out.push_str(body);
        out
    }

    const TRACK: &str = r#"{"id":"t1","name":"Windowlicker","duration_ms":367000,"track_number":1,"disc_number":1,"artists":[{"id":"a1","name":"Aphex Twin"}]}"#;

    #[test]
    fn test_client_with_custom_url() {
        let client = CatalogClient::with_base_url("http://localhost:8080/");
        assert_eq!(client.base_url, "http://localhost:8080");
        assert_eq!(client.url("/tracks/x"), "http://localhost:8080/tracks/x");
        assert_eq!(
            client.url("https://api.example/next?offset=50"),
            "https://api.example/next?offset=50"
        );
    }

    #[test]
    fn test_include_groups() {
        assert_eq!(include_groups(&[]), "album");
        assert_eq!(
            include_groups(&[AlbumType::Single, AlbumType::Compilation]),
            "compilation,single"
        );
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, "3".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(3));
    }

    #[tokio::test]
    async fn test_404_is_not_found() {
        let base = serve(vec![http("404 Not Found", &[], "")]).await;
        let client = CatalogClient::with_base_url(base);

        let err = client.track_by_id("nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: ResourceKind::Track, .. }));
    }

    #[tokio::test]
    async fn test_short_rate_limit_is_retried_once() {
        let base = serve(vec![
            http("429 Too Many Requests", &["Retry-After: 0"], ""),
            http("200 OK", &["Content-Type: application/json"], TRACK),
        ])
        .await;
        let client = CatalogClient::with_base_url(base);

        let track = client.track_by_id("t1").await.unwrap();
        assert_eq!(track.title, "Windowlicker");
    }

    #[tokio::test]
    async fn test_long_rate_limit_surfaces() {
        let base = serve(vec![http("429 Too Many Requests", &["Retry-After: 120"], "")]).await;
        let client = CatalogClient::with_base_url(base);

        let err = client.track_by_id("t1").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Remote(RemoteError::RateLimited { retry_after: Some(120) })
        ));
    }

    #[tokio::test]
    async fn test_error_envelope_message() {
        let body = r#"{"error":{"status":500,"message":"upstream exploded"}}"#;
        let base = serve(vec![http("500 Internal Server Error", &[], body)]).await;
        let client = CatalogClient::with_base_url(base);

        let err = client.album_by_id("alb").await.unwrap_err();
        match err {
            Error::Remote(RemoteError::Http { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "upstream exploded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_several_with_unknown_id_fails_whole_batch() {
        let body = format!(r#"{{"tracks":[{TRACK},null]}}"#);
        let base = serve(vec![http("200 OK", &[], &body)]).await;
        let client = CatalogClient::with_base_url(base);

        let err = client
            .several_tracks_by_id(&["t1".to_string(), "ghost".to_string()])
            .await
            .unwrap_err();
        match err {
            Error::NotFound { kind, id } => {
                assert_eq!(kind, ResourceKind::Track);
                assert_eq!(id, "ghost");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_recent_plays_sorted_newest_first() {
        let body = format!(
            r#"{{"items":[
                {{"track":{TRACK},"played_at":"2024-01-01T10:00:00Z"}},
                {{"track":{TRACK},"played_at":"2024-01-01T12:00:00Z"}},
                {{"track":{TRACK},"played_at":"not a date"}}
            ]}}"#
        );
        let base = serve(vec![http("200 OK", &[], &body)]).await;
        let client = CatalogClient::with_base_url(base);

        let plays = client.recent_plays(500).await.unwrap();
        assert_eq!(plays.len(), 2);
        assert!(plays[0].played_at > plays[1].played_at);
    }
}
