//! Cache-aside composition of the local cache and a remote provider.
//!
//! Every lookup goes to [`LocalProvider`] first. A hit is returned as is.
//! On a miss ([`crate::error::Error::is_not_found`]) the remote provider is asked and,
//! with write-through enabled, the result is preserved before returning.
//! Any other local error is returned unchanged: a broken cache is not a
//! miss.
//!
//! Write-back failures never fail the read; they are logged and dropped.

use async_trait::async_trait;

use super::{LocalProvider, ResourceProvider};
use crate::error::Result;
use crate::model::{Album, AlbumType, Artist, FillLevel, ResourceRef, Track};
use crate::preserve::Preserver;

/// Turn a local miss into `None`, keeping every other error.
fn hit<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Local-first provider with remote fallback and optional write-through.
pub struct FallbackProvider<R> {
    local: LocalProvider,
    remote: R,
    preserver: Preserver,
    write_through: bool,
}

impl<R: ResourceProvider> FallbackProvider<R> {
    pub fn new(local: LocalProvider, remote: R, preserver: Preserver, write_through: bool) -> Self {
        Self {
            local,
            remote,
            preserver,
            write_through,
        }
    }

    pub fn local(&self) -> &LocalProvider {
        &self.local
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn preserver(&self) -> &Preserver {
        &self.preserver
    }

    /// Track with exactly this title and main artist.
    ///
    /// The cache is only trusted for an exact hit; anything else goes to the
    /// remote search, whose result is written back like any other miss.
    pub async fn track_by_title_artist(&self, title: &str, artist: &str) -> Result<Track> {
        if let Some(track) = hit(self.local.track_by_title_artist(title, artist).await)? {
            return Ok(track);
        }
        let track = self.remote.track_by_match(&format!("{title} {artist}")).await?;
        self.write_back(ResourceRef::Track(&track), true).await;
        Ok(track)
    }

    /// Preserve a remote result. Returns whether it was stored.
    async fn write_back(&self, resource: ResourceRef<'_>, recurse: bool) -> bool {
        if !self.write_through {
            return false;
        }
        match self.preserver.preserve(resource, recurse).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    target: "fallback",
                    kind = %resource.kind(),
                    id = resource.id(),
                    "Write-back failed: {}",
                    e
                );
                false
            }
        }
    }

    /// Preserve a remote artist. Discography albums are preserved one by one
    /// so that albums already cached still get their tracklists, and the
    /// discography is only recorded as cached when all of them made it.
    async fn write_back_artist(&self, artist: &Artist, fill: FillLevel, types: &[AlbumType]) {
        if fill == FillLevel::Bare {
            self.write_back(ResourceRef::Artist(artist), true).await;
            return;
        }
        if !self.write_back(ResourceRef::Artist(artist), false).await {
            return;
        }
        let albums = artist.discography.as_deref().unwrap_or_default();
        self.write_back_discography(&artist.id, albums, types).await;
    }

    /// Preserve discography albums and record the types as cached.
    async fn write_back_discography(&self, artist_id: &str, albums: &[Album], types: &[AlbumType]) {
        let mut complete = true;
        for album in albums {
            complete &= self.write_back(ResourceRef::Album(album), true).await;
        }
        if !complete {
            return;
        }
        if let Err(e) = self.preserver.record_discography(artist_id, types).await {
            tracing::warn!(target: "fallback", artist_id, "Recording discography failed: {}", e);
        }
    }
}

#[async_trait]
impl<R: ResourceProvider> ResourceProvider for FallbackProvider<R> {
    async fn track_by_id(&self, id: &str) -> Result<Track> {
        if let Some(track) = hit(self.local.track_by_id(id).await)? {
            return Ok(track);
        }
        tracing::debug!(target: "fallback", id, "Track cache miss");
        let track = self.remote.track_by_id(id).await?;
        self.write_back(ResourceRef::Track(&track), true).await;
        Ok(track)
    }

    async fn several_tracks_by_id(&self, ids: &[String]) -> Result<Vec<Track>> {
        if let Some(tracks) = hit(self.local.several_tracks_by_id(ids).await)? {
            return Ok(tracks);
        }
        tracing::debug!(target: "fallback", count = ids.len(), "Track batch cache miss");
        let tracks = self.remote.several_tracks_by_id(ids).await?;
        for track in &tracks {
            self.write_back(ResourceRef::Track(track), true).await;
        }
        Ok(tracks)
    }

    async fn track_by_match(&self, query: &str) -> Result<Track> {
        if let Some(track) = hit(self.local.track_by_match(query).await)? {
            return Ok(track);
        }
        let track = self.remote.track_by_match(query).await?;
        self.write_back(ResourceRef::Track(&track), true).await;
        Ok(track)
    }

    async fn album_by_id(&self, id: &str) -> Result<Album> {
        if let Some(album) = hit(self.local.album_by_id(id).await)? {
            return Ok(album);
        }
        tracing::debug!(target: "fallback", id, "Album cache miss");
        let album = self.remote.album_by_id(id).await?;
        self.write_back(ResourceRef::Album(&album), true).await;
        Ok(album)
    }

    async fn several_albums_by_id(&self, ids: &[String]) -> Result<Vec<Album>> {
        if let Some(albums) = hit(self.local.several_albums_by_id(ids).await)? {
            return Ok(albums);
        }
        tracing::debug!(target: "fallback", count = ids.len(), "Album batch cache miss");
        let albums = self.remote.several_albums_by_id(ids).await?;
        for album in &albums {
            self.write_back(ResourceRef::Album(album), true).await;
        }
        Ok(albums)
    }

    async fn album_by_match(&self, query: &str) -> Result<Album> {
        if let Some(album) = hit(self.local.album_by_match(query).await)? {
            return Ok(album);
        }
        let album = self.remote.album_by_match(query).await?;
        self.write_back(ResourceRef::Album(&album), true).await;
        Ok(album)
    }

    async fn artist_by_id(
        &self,
        id: &str,
        fill: FillLevel,
        album_types: &[AlbumType],
    ) -> Result<Artist> {
        if let Some(artist) = hit(self.local.artist_by_id(id, fill, album_types).await)? {
            return Ok(artist);
        }
        tracing::debug!(target: "fallback", id, ?fill, "Artist cache miss");
        let artist = self.remote.artist_by_id(id, fill, album_types).await?;
        self.write_back_artist(&artist, fill, album_types).await;
        Ok(artist)
    }

    async fn artist_by_match(
        &self,
        query: &str,
        fill: FillLevel,
        album_types: &[AlbumType],
    ) -> Result<Artist> {
        if let Some(artist) = hit(self.local.artist_by_match(query, fill, album_types).await)? {
            return Ok(artist);
        }
        let artist = self.remote.artist_by_match(query, fill, album_types).await?;
        self.write_back_artist(&artist, fill, album_types).await;
        Ok(artist)
    }

    async fn artist_discography(
        &self,
        artist: &Artist,
        album_types: &[AlbumType],
    ) -> Result<Vec<Album>> {
        if let Some(albums) = hit(self.local.artist_discography(artist, album_types).await)? {
            return Ok(albums);
        }
        tracing::debug!(target: "fallback", id = %artist.id, "Discography cache miss");
        let albums = self.remote.artist_discography(artist, album_types).await?;
        if self.write_back(ResourceRef::Artist(artist), false).await {
            self.write_back_discography(&artist.id, &albums, album_types)
                .await;
        }
        Ok(albums)
    }

    async fn album_tracklist(&self, album: &Album) -> Result<Vec<Track>> {
        if let Some(tracks) = hit(self.local.album_tracklist(album).await)? {
            return Ok(tracks);
        }
        tracing::debug!(target: "fallback", id = %album.id, "Tracklist cache miss");
        let tracks = self.remote.album_tracklist(album).await?;
        if self.write_through {
            // Members only carry an album stub, so the owner goes in first
            if !album.is_stub() {
                self.write_back(ResourceRef::Album(album), false).await;
            }
            for track in &tracks {
                self.write_back(ResourceRef::Track(track), true).await;
            }
        }
        Ok(tracks)
    }
}

impl<R> std::fmt::Debug for FallbackProvider<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackProvider")
            .field("write_through", &self.write_through)
            .finish_non_exhaustive()
    }
}
