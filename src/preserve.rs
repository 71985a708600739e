//! Cascading preserve: recursive, idempotent upsert of catalog entities.
//!
//! [`Preserver::preserve`] writes an entity and everything it references
//! (artists, owning album, images, and with `recurse` also tracklists and
//! discographies) inside a single transaction. The whole cascade commits or
//! nothing does.
//!
//! # Cascade rules
//!
//! 1. The entity's own base row is upserted first.
//! 2. Each related entity is checked for presence on the same connection and
//!    only preserved if missing. Because the parent row already exists by
//!    then, a cycle such as artist → discography album → same artist stops
//!    at the presence check.
//! 3. Relation rows are insert-or-ignore; `is_main` is set on position 0.
//!
//! Existing related entities are not refreshed; only the entity passed in
//! is. Image bytes, once stored, are never cleared.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use sqlx::{SqliteConnection, SqlitePool};

use crate::db::catalog;
use crate::error::{Error, ResourceKind, Result};
use crate::model::{Album, AlbumType, Artist, Image, ResourceRef, Track};
use crate::remote::{FetchedImage, ImageFetcher};

/// Writes catalog entities into the local cache.
#[derive(Clone)]
pub struct Preserver {
    pool: SqlitePool,
    images: Option<Arc<dyn ImageFetcher>>,
}

impl Preserver {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, images: None }
    }

    /// Download missing image bytes before each cascade.
    pub fn with_image_fetcher(mut self, fetcher: Arc<dyn ImageFetcher>) -> Self {
        self.images = Some(fetcher);
        self
    }

    /// Preserve `resource` and the entities it references.
    ///
    /// With `recurse`, album tracklists and artist discographies carried by
    /// the entity are preserved too. Runs in one transaction.
    pub async fn preserve(&self, resource: ResourceRef<'_>, recurse: bool) -> Result<()> {
        let downloads = self.download_images(resource, recurse).await?;
        let cascade = Cascade { downloads };

        let mut tx = self.pool.begin().await?;
        match resource {
            ResourceRef::Track(track) => cascade.track(&mut *tx, track, None, recurse).await?,
            ResourceRef::Album(album) => cascade.album(&mut *tx, album, recurse).await?,
            ResourceRef::Artist(artist) => cascade.artist(&mut *tx, artist, recurse).await?,
        }
        tx.commit().await?;

        tracing::debug!(
            target: "preserve",
            kind = %resource.kind(),
            id = resource.id(),
            recurse,
            "Preserved"
        );
        Ok(())
    }

    /// Whether the entity's base row is stored.
    pub async fn is_preserved(&self, resource: ResourceRef<'_>) -> Result<bool> {
        let id = resource.id();
        let found = match resource {
            ResourceRef::Track(_) => catalog::track_exists(&self.pool, id).await?,
            ResourceRef::Album(_) => catalog::album_exists(&self.pool, id).await?,
            ResourceRef::Artist(_) => catalog::artist_exists(&self.pool, id).await?,
        };
        Ok(found)
    }

    /// Mark the artist's discography as fully cached for `types`, in
    /// addition to types recorded earlier.
    pub async fn record_discography(&self, artist_id: &str, types: &[AlbumType]) -> Result<()> {
        let row = catalog::get_artist(&self.pool, artist_id)
            .await?
            .ok_or_else(|| Error::not_found(ResourceKind::Artist, artist_id))?;

        let mut all = row.cached_discography();
        all.extend(AlbumType::normalize(types));
        catalog::set_discography_types(&self.pool, artist_id, &all).await?;
        Ok(())
    }

    /// Fetch bytes for every reachable image that has none, once per URL.
    async fn download_images(
        &self,
        resource: ResourceRef<'_>,
        recurse: bool,
    ) -> Result<HashMap<String, FetchedImage>> {
        let mut downloads = HashMap::new();
        let Some(fetcher) = &self.images else {
            return Ok(downloads);
        };

        let mut pending = Vec::new();
        collect_images(resource, recurse, &mut pending);

        let mut seen = HashSet::new();
        for image in pending {
            if image.data.is_some() || !seen.insert(image.url.as_str()) {
                continue;
            }
            if catalog::image_has_data(&self.pool, &image.url).await? {
                continue;
            }
            match fetcher.fetch_image(&image.url).await {
                Ok(fetched) => {
                    downloads.insert(image.url.clone(), fetched);
                }
                Err(e) => {
                    tracing::warn!(
                        target: "preserve",
                        url = %image.url,
                        "Image download failed: {}",
                        e
                    );
                }
            }
        }
        Ok(downloads)
    }
}

/// One preserve call's state, shared down the recursion.
struct Cascade {
    downloads: HashMap<String, FetchedImage>,
}

impl Cascade {
    /// `owner` is set when the track is preserved as a tracklist member.
    fn track<'a>(
        &'a self,
        conn: &'a mut SqliteConnection,
        track: &'a Track,
        owner: Option<&'a str>,
        recurse: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let album_id = owner.or_else(|| track.album_id());
            catalog::upsert_track(&mut *conn, track, album_id).await?;

            if owner.is_none()
                && let Some(album) = track.album.as_deref()
                && !album.id.is_empty()
                && !album.is_stub()
                && !catalog::album_exists(&mut *conn, &album.id).await?
            {
                self.album(&mut *conn, album, recurse).await?;
            }

            for (position, artist) in track.artists.iter().enumerate() {
                if !catalog::artist_exists(&mut *conn, &artist.id).await? {
                    self.artist(&mut *conn, artist, recurse).await?;
                }
                catalog::link_track_artist(&mut *conn, &track.id, &artist.id, position).await?;
            }
            Ok(())
        })
    }

    fn album<'a>(
        &'a self,
        conn: &'a mut SqliteConnection,
        album: &'a Album,
        recurse: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            catalog::upsert_album(&mut *conn, album).await?;

            for (position, artist) in album.artists.iter().enumerate() {
                if !catalog::artist_exists(&mut *conn, &artist.id).await? {
                    self.artist(&mut *conn, artist, recurse).await?;
                }
                catalog::link_album_artist(&mut *conn, &album.id, &artist.id, position).await?;
            }

            for image in &album.images {
                self.image(&mut *conn, image).await?;
                catalog::link_album_image(&mut *conn, &album.id, &image.url).await?;
            }

            if recurse && let Some(tracks) = &album.tracks {
                for track in tracks {
                    if catalog::track_exists(&mut *conn, &track.id).await? {
                        catalog::adopt_track(&mut *conn, &track.id, &album.id).await?;
                    } else {
                        self.track(&mut *conn, track, Some(&album.id), recurse)
                            .await?;
                    }
                }
            }
            Ok(())
        })
    }

    fn artist<'a>(
        &'a self,
        conn: &'a mut SqliteConnection,
        artist: &'a Artist,
        recurse: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            catalog::upsert_artist(&mut *conn, artist).await?;

            for image in &artist.images {
                self.image(&mut *conn, image).await?;
                catalog::link_artist_image(&mut *conn, &artist.id, &image.url).await?;
            }

            if recurse && let Some(albums) = &artist.discography {
                for album in albums {
                    if !catalog::album_exists(&mut *conn, &album.id).await? {
                        self.album(&mut *conn, album, recurse).await?;
                    }
                }
            }
            Ok(())
        })
    }

    async fn image(&self, conn: &mut SqliteConnection, image: &Image) -> Result<()> {
        match self.downloads.get(&image.url) {
            Some(fetched) => {
                let image = Image {
                    data: Some(fetched.data.clone()),
                    mime_type: fetched.mime_type.clone().or_else(|| image.mime_type.clone()),
                    ..image.clone()
                };
                catalog::upsert_image(&mut *conn, &image).await?;
            }
            None => catalog::upsert_image(&mut *conn, image).await?,
        }
        Ok(())
    }
}

/// Gather the images a cascade with the same `recurse` flag would visit.
fn collect_images<'a>(resource: ResourceRef<'a>, recurse: bool, out: &mut Vec<&'a Image>) {
    match resource {
        ResourceRef::Track(track) => {
            if let Some(album) = track.album.as_deref() {
                collect_images(ResourceRef::Album(album), false, out);
            }
            for artist in &track.artists {
                out.extend(&artist.images);
            }
        }
        ResourceRef::Album(album) => {
            out.extend(&album.images);
            for artist in &album.artists {
                out.extend(&artist.images);
            }
            if recurse && let Some(tracks) = &album.tracks {
                for track in tracks {
                    for artist in &track.artists {
                        out.extend(&artist.images);
                    }
                }
            }
        }
        ResourceRef::Artist(artist) => {
            out.extend(&artist.images);
            if recurse && let Some(albums) = &artist.discography {
                for album in albums {
                    collect_images(ResourceRef::Album(album), recurse, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mocks::MockImages;
    use crate::test_utils::{
        count_rows, sample_album, sample_album_with_tracks, sample_artist, sample_track, temp_db,
    };

    const TABLES: [&str; 8] = [
        "tracks",
        "albums",
        "artists",
        "images",
        "track_artists",
        "album_artists",
        "album_images",
        "artist_images",
    ];

    async fn row_counts(pool: &SqlitePool) -> Vec<i64> {
        let mut counts = Vec::new();
        for table in TABLES {
            counts.push(count_rows(pool, table).await);
        }
        counts
    }

    #[tokio::test]
    async fn test_preserve_twice_is_idempotent() {
        let (pool, _dir) = temp_db().await;
        let preserver = Preserver::new(pool.clone());
        let album = sample_album_with_tracks("alb1", "In Rainbows", &["a1", "a2"], 4);

        preserver.preserve(ResourceRef::Album(&album), true).await.unwrap();
        let first = row_counts(&pool).await;
        preserver.preserve(ResourceRef::Album(&album), true).await.unwrap();
        let second = row_counts(&pool).await;

        assert_eq!(first, second);
        assert_eq!(count_rows(&pool, "tracks").await, 4);
        assert_eq!(count_rows(&pool, "album_artists").await, 2);
    }

    #[tokio::test]
    async fn test_main_flag_only_on_first_artist() {
        let (pool, _dir) = temp_db().await;
        let preserver = Preserver::new(pool.clone());
        let track = sample_track("t1", "Nude", "", &["a1", "a2", "a3"]);
        preserver.preserve(ResourceRef::Track(&track), false).await.unwrap();

        let rows: Vec<(String, bool)> = sqlx::query_as(
            "SELECT artist_id, is_main FROM track_artists WHERE track_id = 't1' ORDER BY position",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(
            rows,
            vec![
                ("a1".to_string(), true),
                ("a2".to_string(), false),
                ("a3".to_string(), false)
            ]
        );
    }

    #[tokio::test]
    async fn test_album_main_flag_only_on_first_artist() {
        let (pool, _dir) = temp_db().await;
        let preserver = Preserver::new(pool.clone());
        let album = sample_album_with_tracks("alb1", "Kid A", &["a1", "a2", "a3"], 2);
        preserver.preserve(ResourceRef::Album(&album), true).await.unwrap();

        let expected = vec![
            ("a1".to_string(), true),
            ("a2".to_string(), false),
            ("a3".to_string(), false),
        ];
        let rows: Vec<(String, bool)> = sqlx::query_as(
            "SELECT artist_id, is_main FROM album_artists WHERE album_id = 'alb1' ORDER BY position",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(rows, expected);

        // Tracklist members keep their own credits
        let rows: Vec<(String, bool)> = sqlx::query_as(
            "SELECT artist_id, is_main FROM track_artists WHERE track_id = 'alb1-t2' ORDER BY position",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(rows, expected);
    }

    #[tokio::test]
    async fn test_artist_album_cycle_terminates() {
        let (pool, _dir) = temp_db().await;
        let preserver = Preserver::new(pool.clone());

        // The discography album credits the same artist, whose discography
        // again contains the album.
        let mut inner = sample_artist("a1", "Björk");
        inner.discography = Some(vec![sample_album("alb1", "Homogenic", &["a1"])]);
        let mut album = sample_album("alb1", "Homogenic", &[]);
        album.artists = vec![inner];
        let mut artist = sample_artist("a1", "Björk");
        artist.discography = Some(vec![album]);

        preserver.preserve(ResourceRef::Artist(&artist), true).await.unwrap();

        assert_eq!(count_rows(&pool, "artists").await, 1);
        assert_eq!(count_rows(&pool, "albums").await, 1);
        assert_eq!(count_rows(&pool, "album_artists").await, 1);
    }

    #[tokio::test]
    async fn test_updated_attributes_refresh_base_row_only() {
        let (pool, _dir) = temp_db().await;
        let preserver = Preserver::new(pool.clone());
        let mut album = sample_album("alb1", "Pablo Honey", &["a1"]);
        preserver.preserve(ResourceRef::Album(&album), false).await.unwrap();
        let before = count_rows(&pool, "album_artists").await;

        album.title = "Pablo Honey (Collector's Edition)".into();
        album.track_count = 25;
        preserver.preserve(ResourceRef::Album(&album), false).await.unwrap();

        let row = catalog::get_album(&pool, "alb1").await.unwrap().unwrap();
        assert_eq!(row.title, "Pablo Honey (Collector's Edition)");
        assert_eq!(row.track_count, 25);
        assert_eq!(count_rows(&pool, "album_artists").await, before);
    }

    #[tokio::test]
    async fn test_recurse_flag_controls_tracklist() {
        let (pool, _dir) = temp_db().await;
        let preserver = Preserver::new(pool.clone());
        let album = sample_album_with_tracks("alb1", "The King of Limbs", &["a1"], 3);

        preserver.preserve(ResourceRef::Album(&album), false).await.unwrap();
        assert_eq!(count_rows(&pool, "tracks").await, 0);

        preserver.preserve(ResourceRef::Album(&album), true).await.unwrap();
        let rows = catalog::album_track_rows(&pool, "alb1").await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.album_id.as_deref() == Some("alb1")));
    }

    #[tokio::test]
    async fn test_track_without_album_has_no_association() {
        let (pool, _dir) = temp_db().await;
        let preserver = Preserver::new(pool.clone());
        let mut track = sample_track("t1", "Spinning Plates", "", &["a1"]);
        preserver.preserve(ResourceRef::Track(&track), false).await.unwrap();
        track.id = "t2".into();
        track.album = None;
        preserver.preserve(ResourceRef::Track(&track), false).await.unwrap();

        for id in ["t1", "t2"] {
            let row = catalog::get_track(&pool, id).await.unwrap().unwrap();
            assert_eq!(row.album_id, None);
        }
        assert_eq!(count_rows(&pool, "albums").await, 0);
    }

    #[tokio::test]
    async fn test_track_preserves_full_owning_album() {
        let (pool, _dir) = temp_db().await;
        let preserver = Preserver::new(pool.clone());
        let mut track = sample_track("t1", "Pyramid Song", "alb1", &["a1"]);
        track.album = Some(Box::new(sample_album("alb1", "Amnesiac", &["a1"])));

        preserver.preserve(ResourceRef::Track(&track), false).await.unwrap();

        assert!(preserver.is_preserved(ResourceRef::Track(&track)).await.unwrap());
        let album = track.album.as_deref().unwrap();
        assert!(preserver.is_preserved(ResourceRef::Album(album)).await.unwrap());
        let row = catalog::get_track(&pool, "t1").await.unwrap().unwrap();
        assert_eq!(row.album_id.as_deref(), Some("alb1"));
    }

    #[tokio::test]
    async fn test_failed_cascade_rolls_back() {
        let (pool, _dir) = temp_db().await;
        let preserver = Preserver::new(pool.clone());
        sqlx::query("DROP TABLE album_images")
            .execute(&pool)
            .await
            .unwrap();

        let album = sample_album("alb1", "Moon Shaped Pool", &["a1"]);
        let err = preserver
            .preserve(ResourceRef::Album(&album), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Database(_)));

        // Rows written before the failure did not survive
        assert_eq!(count_rows(&pool, "albums").await, 0);
        assert_eq!(count_rows(&pool, "artists").await, 0);
    }

    #[tokio::test]
    async fn test_record_discography_unions_types() {
        let (pool, _dir) = temp_db().await;
        let preserver = Preserver::new(pool.clone());
        let artist = sample_artist("a1", "Massive Attack");
        preserver.preserve(ResourceRef::Artist(&artist), false).await.unwrap();

        preserver
            .record_discography("a1", &[AlbumType::Single])
            .await
            .unwrap();
        preserver.record_discography("a1", &[]).await.unwrap();

        let row = catalog::get_artist(&pool, "a1").await.unwrap().unwrap();
        assert_eq!(
            row.cached_discography(),
            vec![AlbumType::Regular, AlbumType::Single]
        );

        let err = preserver.record_discography("zz", &[]).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_images_downloaded_once_per_url() {
        let (pool, _dir) = temp_db().await;
        let fetcher = Arc::new(
            MockImages::default().with("https://img.example/alb1.jpg", &[0xff, 0xd8]),
        );
        let preserver = Preserver::new(pool.clone()).with_image_fetcher(fetcher.clone());

        let mut album = sample_album("alb1", "Mezzanine", &["a1"]);
        // Same cover listed twice
        album.images.push(album.images[0].clone());
        preserver.preserve(ResourceRef::Album(&album), false).await.unwrap();

        // alb1 cover downloaded, a1 picture failed and stored without bytes
        assert_eq!(fetcher.fetches(), 2);
        let stored = catalog::album_images(&pool, "alb1").await.unwrap();
        assert_eq!(stored[0].data, Some(vec![0xff, 0xd8]));
        assert_eq!(stored[0].mime_type.as_deref(), Some("image/jpeg"));
        let artist_images = catalog::artist_images(&pool, "a1").await.unwrap();
        assert_eq!(artist_images[0].data, None);

        // Already stored with bytes: no new download
        preserver.preserve(ResourceRef::Album(&album), false).await.unwrap();
        assert_eq!(fetcher.fetches(), 3);
    }
}
