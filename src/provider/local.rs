//! Catalog reads against the local SQLite cache.
//!
//! A missing base row is reported as [`Error::NotFound`] of the matching
//! kind. Discographies and tracklists are only served when the cache is
//! known to hold them completely; otherwise they are reported missing too,
//! so [`super::FallbackProvider`] asks the remote catalog instead of
//! returning a partial answer.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::matching::best_match;
use super::{ResourceProvider, fill_discography};
use crate::db::catalog;
use crate::error::{Error, ResourceKind, Result};
use crate::model::{Album, AlbumType, Artist, FillLevel, Image, ResourceRef, Track};

/// Provider reading from the local cache.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    pool: SqlitePool,
}

impl LocalProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Whether the entity's base row is stored, regardless of how complete
    /// its relations are.
    pub async fn is_preserved(&self, resource: ResourceRef<'_>) -> Result<bool> {
        let id = resource.id();
        let found = match resource {
            ResourceRef::Track(_) => catalog::track_exists(&self.pool, id).await?,
            ResourceRef::Album(_) => catalog::album_exists(&self.pool, id).await?,
            ResourceRef::Artist(_) => catalog::artist_exists(&self.pool, id).await?,
        };
        Ok(found)
    }

    /// Stored track with exactly this title and main artist (case-insensitive).
    ///
    /// Unlike [`ResourceProvider::track_by_match`] this misses whenever no
    /// such track is cached.
    pub async fn track_by_title_artist(&self, title: &str, artist: &str) -> Result<Track> {
        let id = catalog::find_track_id(&self.pool, title, artist)
            .await?
            .ok_or_else(|| Error::not_found(ResourceKind::Track, format!("{title} {artist}")))?;
        self.track_by_id(&id).await
    }

    async fn artists_for(&self, ids: Vec<String>) -> Result<Vec<Artist>> {
        let mut artists = Vec::with_capacity(ids.len());
        for id in ids {
            artists.push(self.artist_by_id(&id, FillLevel::Bare, &[]).await?);
        }
        Ok(artists)
    }

    async fn hydrate_track(&self, row: catalog::TrackRow) -> Result<Track> {
        let mut track = Track::from(row);

        if let Some(album_id) = track.album_id().map(str::to_owned) {
            // Owner rows may be absent when only the id was known at
            // preserve time; keep the stub then.
            match self.album_by_id(&album_id).await {
                Ok(album) => track.album = Some(Box::new(album)),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        let artist_ids = catalog::track_artist_ids(&self.pool, &track.id).await?;
        track.artists = self.artists_for(artist_ids).await?;
        Ok(track)
    }

    async fn hydrate_album(&self, row: catalog::AlbumRow) -> Result<Album> {
        let mut album = Album::from(row);
        let artist_ids = catalog::album_artist_ids(&self.pool, &album.id).await?;
        album.artists = self.artists_for(artist_ids).await?;
        album.images = catalog::album_images(&self.pool, &album.id)
            .await?
            .into_iter()
            .map(Image::from)
            .collect();
        Ok(album)
    }
}

#[async_trait]
impl ResourceProvider for LocalProvider {
    async fn track_by_id(&self, id: &str) -> Result<Track> {
        let row = catalog::get_track(&self.pool, id)
            .await?
            .ok_or_else(|| Error::not_found(ResourceKind::Track, id))?;
        self.hydrate_track(row).await
    }

    async fn several_tracks_by_id(&self, ids: &[String]) -> Result<Vec<Track>> {
        let mut tracks = Vec::with_capacity(ids.len());
        for id in ids {
            tracks.push(self.track_by_id(id).await?);
        }
        Ok(tracks)
    }

    async fn track_by_match(&self, query: &str) -> Result<Track> {
        let candidates = catalog::track_titles(&self.pool).await?;
        let id = best_match(query, &candidates)
            .ok_or_else(|| Error::not_found(ResourceKind::Track, query))?;
        self.track_by_id(id).await
    }

    async fn album_by_id(&self, id: &str) -> Result<Album> {
        let row = catalog::get_album(&self.pool, id)
            .await?
            .ok_or_else(|| Error::not_found(ResourceKind::Album, id))?;
        self.hydrate_album(row).await
    }

    async fn several_albums_by_id(&self, ids: &[String]) -> Result<Vec<Album>> {
        let mut albums = Vec::with_capacity(ids.len());
        for id in ids {
            albums.push(self.album_by_id(id).await?);
        }
        Ok(albums)
    }

    async fn album_by_match(&self, query: &str) -> Result<Album> {
        let candidates = catalog::album_titles(&self.pool).await?;
        let id = best_match(query, &candidates)
            .ok_or_else(|| Error::not_found(ResourceKind::Album, query))?;
        self.album_by_id(id).await
    }

    async fn artist_by_id(
        &self,
        id: &str,
        fill: FillLevel,
        album_types: &[AlbumType],
    ) -> Result<Artist> {
        let row = catalog::get_artist(&self.pool, id)
            .await?
            .ok_or_else(|| Error::not_found(ResourceKind::Artist, id))?;
        let mut artist = Artist::from(row);
        artist.images = catalog::artist_images(&self.pool, id)
            .await?
            .into_iter()
            .map(Image::from)
            .collect();

        fill_discography(self, &mut artist, album_types, fill).await?;
        Ok(artist)
    }

    async fn artist_by_match(
        &self,
        query: &str,
        fill: FillLevel,
        album_types: &[AlbumType],
    ) -> Result<Artist> {
        let candidates = catalog::artist_names(&self.pool).await?;
        let id = best_match(query, &candidates)
            .ok_or_else(|| Error::not_found(ResourceKind::Artist, query))?;
        self.artist_by_id(id, fill, album_types).await
    }

    async fn artist_discography(
        &self,
        artist: &Artist,
        album_types: &[AlbumType],
    ) -> Result<Vec<Album>> {
        let wanted = AlbumType::normalize(album_types);

        let row = catalog::get_artist(&self.pool, &artist.id)
            .await?
            .ok_or_else(|| Error::not_found(ResourceKind::Artist, &artist.id))?;
        let cached = row.cached_discography();
        if !wanted.iter().all(|t| cached.contains(t)) {
            return Err(Error::not_found(ResourceKind::Discography, &artist.id));
        }

        let mut albums = Vec::new();
        for row in catalog::main_album_rows(&self.pool, &artist.id).await? {
            let matches_type = row
                .album_type
                .parse::<AlbumType>()
                .is_ok_and(|t| wanted.contains(&t));
            if matches_type {
                albums.push(self.hydrate_album(row).await?);
            }
        }
        Ok(albums)
    }

    async fn album_tracklist(&self, album: &Album) -> Result<Vec<Track>> {
        let row = catalog::get_album(&self.pool, &album.id)
            .await?
            .ok_or_else(|| Error::not_found(ResourceKind::Album, &album.id))?;

        let rows = catalog::album_track_rows(&self.pool, &album.id).await?;
        if (rows.len() as i64) < row.track_count {
            return Err(Error::not_found(ResourceKind::Tracklist, &album.id));
        }

        let mut tracks = Vec::with_capacity(rows.len());
        for row in rows {
            let mut track = Track::from(row);
            track.album = Some(Box::new(Album::stub(&album.id)));
            let artist_ids = catalog::track_artist_ids(&self.pool, &track.id).await?;
            track.artists = self.artists_for(artist_ids).await?;
            tracks.push(track);
        }
        Ok(tracks)
    }
}
