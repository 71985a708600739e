//! In-memory provider for tests.
//!
//! Serves configured entities, counts every call, and can be told to fail
//! all calls with a given remote error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::matching::best_match;
use super::{ResourceProvider, fill_discography};
use crate::error::{Error, ResourceKind, Result};
use crate::model::{Album, AlbumType, Artist, FillLevel, Track};
use crate::remote::RemoteError;

/// Mock provider backed by hash maps.
#[derive(Default)]
pub struct MockProvider {
    /// Tracks keyed by id
    pub tracks: HashMap<String, Track>,
    /// Albums keyed by id, with their tracklists when known
    pub albums: HashMap<String, Album>,
    /// Artists keyed by id
    pub artists: HashMap<String, Artist>,
    /// Error returned by every call (takes precedence over data)
    pub error: Option<RemoteError>,
    calls: AtomicUsize,
}

impl MockProvider {
    /// Create a mock that fails every call.
    pub fn failing(error: RemoteError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn with_track(mut self, track: Track) -> Self {
        self.tracks.insert(track.id.clone(), track);
        self
    }

    /// Register an album plus its credited artists (if not known yet).
    pub fn with_album(mut self, album: Album) -> Self {
        for artist in &album.artists {
            self.artists
                .entry(artist.id.clone())
                .or_insert_with(|| artist.clone());
        }
        self.albums.insert(album.id.clone(), album);
        self
    }

    pub fn with_artist(mut self, artist: Artist) -> Self {
        self.artists.insert(artist.id.clone(), artist);
        self
    }

    /// Number of trait calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.error {
            Some(e) => Err(Error::Remote(e.clone())),
            None => Ok(()),
        }
    }

    fn album_without_tracks(&self, id: &str) -> Result<Album> {
        self.albums
            .get(id)
            .map(|a| Album {
                tracks: None,
                ..a.clone()
            })
            .ok_or_else(|| Error::not_found(ResourceKind::Album, id))
    }
}

#[async_trait]
impl ResourceProvider for MockProvider {
    async fn track_by_id(&self, id: &str) -> Result<Track> {
        self.enter()?;
        self.tracks
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(ResourceKind::Track, id))
    }

    async fn several_tracks_by_id(&self, ids: &[String]) -> Result<Vec<Track>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.track_by_id(id).await?);
        }
        Ok(out)
    }

    async fn track_by_match(&self, query: &str) -> Result<Track> {
        self.enter()?;
        let candidates: Vec<(String, String)> = self
            .tracks
            .values()
            .map(|t| (t.id.clone(), format!("{} {}", t.title, main_artist(&t.artists))))
            .collect();
        let id = best_match(query, &candidates)
            .ok_or_else(|| Error::not_found(ResourceKind::Track, query))?;
        self.tracks
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(ResourceKind::Track, query))
    }

    async fn album_by_id(&self, id: &str) -> Result<Album> {
        self.enter()?;
        self.album_without_tracks(id)
    }

    async fn several_albums_by_id(&self, ids: &[String]) -> Result<Vec<Album>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.album_by_id(id).await?);
        }
        Ok(out)
    }

    async fn album_by_match(&self, query: &str) -> Result<Album> {
        self.enter()?;
        let candidates: Vec<(String, String)> = self
            .albums
            .values()
            .map(|a| (a.id.clone(), a.title.clone()))
            .collect();
        let id = best_match(query, &candidates)
            .ok_or_else(|| Error::not_found(ResourceKind::Album, query))?;
        self.album_without_tracks(id)
    }

    async fn artist_by_id(
        &self,
        id: &str,
        fill: FillLevel,
        album_types: &[AlbumType],
    ) -> Result<Artist> {
        self.enter()?;
        let mut artist = self
            .artists
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(ResourceKind::Artist, id))?;
        fill_discography(self, &mut artist, album_types, fill).await?;
        Ok(artist)
    }

    async fn artist_by_match(
        &self,
        query: &str,
        fill: FillLevel,
        album_types: &[AlbumType],
    ) -> Result<Artist> {
        self.enter()?;
        let candidates: Vec<(String, String)> = self
            .artists
            .values()
            .map(|a| (a.id.clone(), a.name.clone()))
            .collect();
        let id = best_match(query, &candidates)
            .ok_or_else(|| Error::not_found(ResourceKind::Artist, query))?
            .to_string();
        self.artist_by_id(&id, fill, album_types).await
    }

    async fn artist_discography(
        &self,
        artist: &Artist,
        album_types: &[AlbumType],
    ) -> Result<Vec<Album>> {
        self.enter()?;
        let types = AlbumType::normalize(album_types);
        let mut albums: Vec<Album> = self
            .albums
            .values()
            .filter(|a| a.artists.first().is_some_and(|m| m.id == artist.id))
            .filter(|a| types.contains(&a.album_type))
            .map(|a| Album {
                tracks: None,
                ..a.clone()
            })
            .collect();
        albums.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(albums)
    }

    async fn album_tracklist(&self, album: &Album) -> Result<Vec<Track>> {
        self.enter()?;
        let stored = self
            .albums
            .get(&album.id)
            .ok_or_else(|| Error::not_found(ResourceKind::Album, &album.id))?;
        Ok(stored
            .tracks
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|t| Track {
                album: Some(Box::new(Album::stub(&album.id))),
                ..t
            })
            .collect())
    }
}

fn main_artist(artists: &[Artist]) -> &str {
    artists.first().map(|a| a.name.as_str()).unwrap_or("")
}
