//! Catalog API Data Transfer Objects
//!
//! These types match what the Web API returns. Do not use them outside the
//! remote module; convert them to [`crate::model`] types via the adapter.
//!
//! API Reference: https://developer.spotify.com/documentation/web-api/reference

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ImageDto {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalIdsDto {
    pub isrc: Option<String>,
    pub ean: Option<String>,
    pub upc: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowersDto {
    pub total: Option<u64>,
}

/// Artist as embedded in tracks and albums
#[derive(Debug, Clone, Deserialize)]
pub struct SimplifiedArtistDto {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub uri: String,
}

/// Full artist object (`GET /artists/{id}`)
#[derive(Debug, Clone, Deserialize)]
pub struct ArtistDto {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub uri: String,
    pub followers: Option<FollowersDto>,
    #[serde(default)]
    pub images: Vec<ImageDto>,
}

/// Album as embedded in tracks, discographies and search results
#[derive(Debug, Clone, Deserialize)]
pub struct SimplifiedAlbumDto {
    pub id: String,
    pub name: String,
    pub album_type: Option<String>,
    pub total_tracks: Option<u32>,
    pub release_date: Option<String>,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub artists: Vec<SimplifiedArtistDto>,
    #[serde(default)]
    pub images: Vec<ImageDto>,
}

/// Full album object (`GET /albums/{id}`)
#[derive(Debug, Clone, Deserialize)]
pub struct AlbumDto {
    pub id: String,
    pub name: String,
    pub album_type: Option<String>,
    pub total_tracks: Option<u32>,
    pub release_date: Option<String>,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub artists: Vec<SimplifiedArtistDto>,
    #[serde(default)]
    pub images: Vec<ImageDto>,
    #[serde(default)]
    pub external_ids: ExternalIdsDto,
}

/// Track as listed in an album's tracklist
#[derive(Debug, Clone, Deserialize)]
pub struct SimplifiedTrackDto {
    /// Null for local files
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub track_number: u32,
    #[serde(default)]
    pub disc_number: u32,
    #[serde(default)]
    pub explicit: bool,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub artists: Vec<SimplifiedArtistDto>,
}

/// Full track object (`GET /tracks/{id}`)
#[derive(Debug, Clone, Deserialize)]
pub struct TrackDto {
    /// Null for local files
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub track_number: u32,
    #[serde(default)]
    pub disc_number: u32,
    #[serde(default)]
    pub explicit: bool,
    #[serde(default)]
    pub popularity: u32,
    #[serde(default)]
    pub external_ids: ExternalIdsDto,
    #[serde(default)]
    pub uri: String,
    pub album: Option<SimplifiedAlbumDto>,
    #[serde(default)]
    pub artists: Vec<SimplifiedArtistDto>,
}

/// Paging envelope
#[derive(Debug, Clone, Deserialize)]
pub struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    /// Absolute URL of the next page
    pub next: Option<String>,
    pub total: Option<u32>,
}

/// `GET /tracks?ids=`; unknown ids come back as null entries
#[derive(Debug, Clone, Deserialize)]
pub struct SeveralTracks {
    pub tracks: Vec<Option<TrackDto>>,
}

/// `GET /albums?ids=`; unknown ids come back as null entries
#[derive(Debug, Clone, Deserialize)]
pub struct SeveralAlbums {
    pub albums: Vec<Option<AlbumDto>>,
}

/// `GET /search`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub tracks: Option<Paging<TrackDto>>,
    pub albums: Option<Paging<SimplifiedAlbumDto>>,
    pub artists: Option<Paging<ArtistDto>>,
}

/// Entry of `GET /me/player/recently-played`
#[derive(Debug, Clone, Deserialize)]
pub struct PlayHistoryDto {
    pub track: TrackDto,
    /// RFC 3339 timestamp
    pub played_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecentlyPlayed {
    #[serde(default)]
    pub items: Vec<PlayHistoryDto>,
}

/// `POST {accounts}/api/token`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    /// Lifetime in seconds
    pub expires_in: u64,
    /// Only present when the server rotates it
    pub refresh_token: Option<String>,
}

/// Error envelope of the Web API
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorDto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDto {
    pub status: u16,
    pub message: String,
}

/// Error body of the accounts service
#[derive(Debug, Clone, Deserialize)]
pub struct AuthErrorDto {
    pub error: String,
    pub error_description: Option<String>,
}
