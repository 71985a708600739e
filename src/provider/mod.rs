//! Uniform read interface over catalog data, wherever it lives.
//!
//! [`ResourceProvider`] is implemented by:
//! - [`LocalProvider`]: the SQLite cache
//! - [`crate::remote::CatalogClient`]: the remote catalog API
//! - [`FallbackProvider`]: local first, remote on a miss, with write-through
//!
//! Every implementation signals absence with [`Error::NotFound`] and
//! propagates store and transport failures unchanged, so callers can tell a
//! miss from a broken backend with [`Error::is_not_found`].
//!
//! # Example
//!
//! ```ignore
//! use music_mirror::provider::{FallbackProvider, ResourceProvider};
//! use music_mirror::model::FillLevel;
//!
//! let artist = provider.artist_by_id(id, FillLevel::Albums, &[]).await?;
//! for album in artist.discography.unwrap_or_default() {
//!     println!("{}", album.title);
//! }
//! ```

pub mod fallback;
pub mod local;
pub mod matching;

#[cfg(test)]
pub mod mocks;

use async_trait::async_trait;

pub use fallback::FallbackProvider;
pub use local::LocalProvider;

pub use crate::error::{Error, Result};
pub use crate::model::{Album, AlbumType, Artist, FillLevel, Track};

/// Read access to tracks, albums and artists.
///
/// Album lookups never load the tracklist (`tracks` stays `None`); use
/// [`ResourceProvider::album_tracklist`] or [`fill_tracklist`] for that.
/// Artist lookups honour [`FillLevel`] as a lower bound.
///
/// An empty `album_types` filter means regular albums only.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn track_by_id(&self, id: &str) -> Result<Track>;

    /// Fetch several tracks. Fails as a whole on the first failure; the
    /// result follows the order of `ids`.
    async fn several_tracks_by_id(&self, ids: &[String]) -> Result<Vec<Track>>;

    /// Best match for a free-text query.
    async fn track_by_match(&self, query: &str) -> Result<Track>;

    async fn album_by_id(&self, id: &str) -> Result<Album>;

    /// Fetch several albums. Same all-or-nothing rule as
    /// [`ResourceProvider::several_tracks_by_id`].
    async fn several_albums_by_id(&self, ids: &[String]) -> Result<Vec<Album>>;

    async fn album_by_match(&self, query: &str) -> Result<Album>;

    async fn artist_by_id(
        &self,
        id: &str,
        fill: FillLevel,
        album_types: &[AlbumType],
    ) -> Result<Artist>;

    async fn artist_by_match(
        &self,
        query: &str,
        fill: FillLevel,
        album_types: &[AlbumType],
    ) -> Result<Artist>;

    /// Albums the artist is main artist on, restricted to `album_types`.
    async fn artist_discography(
        &self,
        artist: &Artist,
        album_types: &[AlbumType],
    ) -> Result<Vec<Album>>;

    /// Tracks of an album in disc and track order. Each member carries
    /// only an album stub.
    async fn album_tracklist(&self, album: &Album) -> Result<Vec<Track>>;
}

/// Populate `artist.discography` as required by `fill`.
///
/// `Bare` leaves the artist untouched. `Tracklists` also loads every
/// album's tracklist.
pub async fn fill_discography<P>(
    provider: &P,
    artist: &mut Artist,
    album_types: &[AlbumType],
    fill: FillLevel,
) -> Result<()>
where
    P: ResourceProvider + ?Sized,
{
    if fill == FillLevel::Bare {
        return Ok(());
    }

    let mut albums = provider.artist_discography(artist, album_types).await?;
    if fill >= FillLevel::Tracklists {
        for album in &mut albums {
            fill_tracklist(provider, album).await?;
        }
    }
    artist.discography = Some(albums);
    Ok(())
}

/// Populate `album.tracks` from the provider.
pub async fn fill_tracklist<P>(provider: &P, album: &mut Album) -> Result<()>
where
    P: ResourceProvider + ?Sized,
{
    let tracks = provider.album_tracklist(album).await?;
    album.tracks = Some(tracks);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::mocks::MockProvider;
    use super::*;
    use crate::test_utils::{sample_album, sample_album_with_tracks, sample_artist};

    #[tokio::test]
    async fn test_fill_bare_is_noop() {
        let mock = MockProvider::default();
        let mut artist = sample_artist("a1", "Portishead");

        fill_discography(&mock, &mut artist, &[], FillLevel::Bare)
            .await
            .unwrap();

        assert!(artist.discography.is_none());
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_fill_levels_are_lower_bounds() {
        let mock = MockProvider::default()
            .with_album(sample_album_with_tracks("alb1", "Dummy", &["a1"], 3))
            .with_album(sample_album("alb2", "Portishead", &["a1"]));

        let mut artist = sample_artist("a1", "Portishead");
        fill_discography(&mock, &mut artist, &[], FillLevel::Albums)
            .await
            .unwrap();
        let albums = artist.discography.as_ref().unwrap();
        assert_eq!(albums.len(), 2);
        assert!(albums.iter().all(|a| a.tracks.is_none()));

        let mut artist = sample_artist("a1", "Portishead");
        fill_discography(&mock, &mut artist, &[], FillLevel::Tracklists)
            .await
            .unwrap();
        let albums = artist.discography.unwrap();
        assert_eq!(albums[0].tracks.as_ref().map(Vec::len), Some(3));
        assert_eq!(albums[1].tracks.as_ref().map(Vec::len), Some(0));
    }
}
