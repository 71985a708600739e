//! Catalog cache tables: rows, point lookups, upserts and relation links.
//!
//! Rows map one-to-one onto the tables in `migrations/0001_catalog.sql` and
//! convert into the shallow [`crate::model`] entities; relations are
//! hydrated by [`crate::provider::LocalProvider`].

use std::time::Duration;

use sqlx::{FromRow, SqliteExecutor};

use crate::model::{Album, AlbumType, Artist, ExternalIds, Image, Track, parse_release_date};

const TRACK_COLUMNS: &str = "id, title, duration_ms, track_number, disc_number, explicit, \
     popularity, uri, isrc, ean, upc, album_id";

const ALBUM_COLUMNS: &str =
    "id, title, track_count, release_date, album_type, uri, isrc, ean, upc";

#[derive(Debug, Clone, FromRow)]
pub struct TrackRow {
    pub id: String,
    pub title: String,
    pub duration_ms: i64,
    pub track_number: i64,
    pub disc_number: i64,
    pub explicit: bool,
    pub popularity: i64,
    pub uri: String,
    pub isrc: Option<String>,
    pub ean: Option<String>,
    pub upc: Option<String>,
    pub album_id: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AlbumRow {
    pub id: String,
    pub title: String,
    pub track_count: i64,
    pub release_date: Option<String>,
    pub album_type: String,
    pub uri: String,
    pub isrc: Option<String>,
    pub ean: Option<String>,
    pub upc: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ArtistRow {
    pub id: String,
    pub name: String,
    pub uri: String,
    pub followers: i64,
    /// Comma-separated album types whose discography is cached.
    pub discography_types: Option<String>,
}

impl ArtistRow {
    /// Album types whose discography has been fully cached for this artist.
    pub fn cached_discography(&self) -> Vec<AlbumType> {
        parse_type_list(self.discography_types.as_deref().unwrap_or(""))
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ImageRow {
    pub url: String,
    pub width: i64,
    pub height: i64,
    pub mime_type: Option<String>,
    pub data: Option<Vec<u8>>,
}

impl From<TrackRow> for Track {
    fn from(row: TrackRow) -> Self {
        Track {
            id: row.id,
            title: row.title,
            duration: Duration::from_millis(row.duration_ms.max(0) as u64),
            track_number: row.track_number.max(0) as u32,
            disc_number: row.disc_number.max(0) as u32,
            explicit: row.explicit,
            popularity: row.popularity.max(0) as u32,
            external_ids: ExternalIds {
                isrc: row.isrc,
                ean: row.ean,
                upc: row.upc,
            },
            uri: row.uri,
            album: row.album_id.map(|id| Box::new(Album::stub(id))),
            artists: Vec::new(),
        }
    }
}

impl From<AlbumRow> for Album {
    fn from(row: AlbumRow) -> Self {
        Album {
            id: row.id,
            title: row.title,
            track_count: row.track_count.max(0) as u32,
            release_date: row.release_date.as_deref().and_then(parse_release_date),
            // Unknown stored values fall back to the default grouping
            album_type: row.album_type.parse().unwrap_or_default(),
            external_ids: ExternalIds {
                isrc: row.isrc,
                ean: row.ean,
                upc: row.upc,
            },
            uri: row.uri,
            artists: Vec::new(),
            tracks: None,
            images: Vec::new(),
        }
    }
}

impl From<ArtistRow> for Artist {
    fn from(row: ArtistRow) -> Self {
        Artist {
            id: row.id,
            name: row.name,
            followers: row.followers.max(0) as u64,
            uri: row.uri,
            images: Vec::new(),
            discography: None,
        }
    }
}

impl From<ImageRow> for Image {
    fn from(row: ImageRow) -> Self {
        Image {
            url: row.url,
            width: row.width.max(0) as u32,
            height: row.height.max(0) as u32,
            mime_type: row.mime_type,
            data: row.data,
        }
    }
}

/// Parse a comma-separated album type list, skipping unknown entries.
pub fn parse_type_list(raw: &str) -> Vec<AlbumType> {
    let types: Vec<AlbumType> = raw
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    if types.is_empty() {
        return types;
    }
    AlbumType::normalize(&types)
}

/// Serialize an album type list in the form [`parse_type_list`] reads.
pub fn format_type_list(types: &[AlbumType]) -> String {
    AlbumType::normalize(types)
        .iter()
        .map(AlbumType::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

// ============================================================================
// Point lookups
// ============================================================================

pub async fn get_track<'e, E>(executor: E, id: &str) -> sqlx::Result<Option<TrackRow>>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as(&format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ?"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn get_album<'e, E>(executor: E, id: &str) -> sqlx::Result<Option<AlbumRow>>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as(&format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE id = ?"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn get_artist<'e, E>(executor: E, id: &str) -> sqlx::Result<Option<ArtistRow>>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as(
        "SELECT id, name, uri, followers, discography_types FROM artists WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Artist ids credited on a track, main artist first.
pub async fn track_artist_ids<'e, E>(executor: E, track_id: &str) -> sqlx::Result<Vec<String>>
where
    E: SqliteExecutor<'e>,
{
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT artist_id FROM track_artists WHERE track_id = ? \
         ORDER BY is_main DESC, position ASC",
    )
    .bind(track_id)
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Artist ids credited on an album, main artist first.
pub async fn album_artist_ids<'e, E>(executor: E, album_id: &str) -> sqlx::Result<Vec<String>>
where
    E: SqliteExecutor<'e>,
{
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT artist_id FROM album_artists WHERE album_id = ? \
         ORDER BY is_main DESC, position ASC",
    )
    .bind(album_id)
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn album_images<'e, E>(executor: E, album_id: &str) -> sqlx::Result<Vec<ImageRow>>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as(
        "SELECT i.url, i.width, i.height, i.mime_type, i.data \
         FROM album_images ai JOIN images i ON i.url = ai.url \
         WHERE ai.album_id = ? ORDER BY i.width DESC, i.url",
    )
    .bind(album_id)
    .fetch_all(executor)
    .await
}

pub async fn artist_images<'e, E>(executor: E, artist_id: &str) -> sqlx::Result<Vec<ImageRow>>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as(
        "SELECT i.url, i.width, i.height, i.mime_type, i.data \
         FROM artist_images ai JOIN images i ON i.url = ai.url \
         WHERE ai.artist_id = ? ORDER BY i.width DESC, i.url",
    )
    .bind(artist_id)
    .fetch_all(executor)
    .await
}

/// Tracks stored for an album, in disc then track order.
pub async fn album_track_rows<'e, E>(executor: E, album_id: &str) -> sqlx::Result<Vec<TrackRow>>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as(&format!(
        "SELECT {TRACK_COLUMNS} FROM tracks WHERE album_id = ? \
         ORDER BY disc_number, track_number"
    ))
    .bind(album_id)
    .fetch_all(executor)
    .await
}

/// Albums on which the artist is credited as main artist.
pub async fn main_album_rows<'e, E>(executor: E, artist_id: &str) -> sqlx::Result<Vec<AlbumRow>>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as(
        "SELECT a.id, a.title, a.track_count, a.release_date, a.album_type, a.uri, \
                a.isrc, a.ean, a.upc \
         FROM album_artists aa JOIN albums a ON a.id = aa.album_id \
         WHERE aa.artist_id = ? AND aa.is_main = 1 \
         ORDER BY a.release_date, a.title",
    )
    .bind(artist_id)
    .fetch_all(executor)
    .await
}

// ============================================================================
// Match candidates
// ============================================================================

pub async fn track_titles<'e, E>(executor: E) -> sqlx::Result<Vec<(String, String)>>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as("SELECT id, title FROM tracks ORDER BY rowid")
        .fetch_all(executor)
        .await
}

pub async fn album_titles<'e, E>(executor: E) -> sqlx::Result<Vec<(String, String)>>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as("SELECT id, title FROM albums ORDER BY rowid")
        .fetch_all(executor)
        .await
}

pub async fn artist_names<'e, E>(executor: E) -> sqlx::Result<Vec<(String, String)>>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as("SELECT id, name FROM artists ORDER BY rowid")
        .fetch_all(executor)
        .await
}

/// Id of a stored track with exactly this title and main artist, ignoring
/// case and surrounding whitespace.
pub async fn find_track_id<'e, E>(
    executor: E,
    title: &str,
    artist: &str,
) -> sqlx::Result<Option<String>>
where
    E: SqliteExecutor<'e>,
{
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        SELECT t.id FROM tracks t
        JOIN track_artists ta ON ta.track_id = t.id AND ta.is_main = 1
        JOIN artists a ON a.id = ta.artist_id
        WHERE lower(trim(t.title)) = lower(trim(?))
          AND lower(trim(a.name)) = lower(trim(?))
        ORDER BY t.rowid
        LIMIT 1
        "#,
    )
    .bind(title)
    .bind(artist)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(|(id,)| id))
}

// ============================================================================
// Existence checks
// ============================================================================

async fn exists<'e, E>(executor: E, sql: &str, key: &str) -> sqlx::Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let row: Option<(i64,)> = sqlx::query_as(sql)
        .bind(key)
        .fetch_optional(executor)
        .await?;
    Ok(row.is_some())
}

pub async fn track_exists<'e, E: SqliteExecutor<'e>>(executor: E, id: &str) -> sqlx::Result<bool> {
    exists(executor, "SELECT 1 FROM tracks WHERE id = ?", id).await
}

pub async fn album_exists<'e, E: SqliteExecutor<'e>>(executor: E, id: &str) -> sqlx::Result<bool> {
    exists(executor, "SELECT 1 FROM albums WHERE id = ?", id).await
}

pub async fn artist_exists<'e, E: SqliteExecutor<'e>>(executor: E, id: &str) -> sqlx::Result<bool> {
    exists(executor, "SELECT 1 FROM artists WHERE id = ?", id).await
}

/// Whether the image is stored together with its bytes.
pub async fn image_has_data<'e, E: SqliteExecutor<'e>>(
    executor: E,
    url: &str,
) -> sqlx::Result<bool> {
    exists(
        executor,
        "SELECT 1 FROM images WHERE url = ? AND data IS NOT NULL",
        url,
    )
    .await
}

// ============================================================================
// Upserts
// ============================================================================

/// Insert or refresh a track's base row.
///
/// `album_id` is passed separately because tracklist members are owned by
/// the album being preserved rather than by their own album field.
pub async fn upsert_track<'e, E>(
    executor: E,
    track: &Track,
    album_id: Option<&str>,
) -> sqlx::Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO tracks (id, title, duration_ms, track_number, disc_number, explicit, \
                             popularity, uri, isrc, ean, upc, album_id) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET \
             title = excluded.title, \
             duration_ms = excluded.duration_ms, \
             track_number = excluded.track_number, \
             disc_number = excluded.disc_number, \
             explicit = excluded.explicit, \
             popularity = excluded.popularity, \
             uri = excluded.uri, \
             isrc = excluded.isrc, \
             ean = excluded.ean, \
             upc = excluded.upc, \
             album_id = COALESCE(excluded.album_id, tracks.album_id)",
    )
    .bind(&track.id)
    .bind(&track.title)
    .bind(track.duration.as_millis() as i64)
    .bind(track.track_number as i64)
    .bind(track.disc_number as i64)
    .bind(track.explicit)
    .bind(track.popularity as i64)
    .bind(&track.uri)
    .bind(&track.external_ids.isrc)
    .bind(&track.external_ids.ean)
    .bind(&track.external_ids.upc)
    .bind(album_id)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn upsert_album<'e, E>(executor: E, album: &Album) -> sqlx::Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO albums (id, title, track_count, release_date, album_type, uri, isrc, ean, upc) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET \
             title = excluded.title, \
             track_count = excluded.track_count, \
             release_date = excluded.release_date, \
             album_type = excluded.album_type, \
             uri = excluded.uri, \
             isrc = excluded.isrc, \
             ean = excluded.ean, \
             upc = excluded.upc",
    )
    .bind(&album.id)
    .bind(&album.title)
    .bind(album.track_count as i64)
    .bind(album.release_date.map(|d| d.format("%Y-%m-%d").to_string()))
    .bind(album.album_type.as_str())
    .bind(&album.uri)
    .bind(&album.external_ids.isrc)
    .bind(&album.external_ids.ean)
    .bind(&album.external_ids.upc)
    .execute(executor)
    .await?;
    Ok(())
}

/// Insert or refresh an artist's base row. Recorded discography types are
/// left untouched.
pub async fn upsert_artist<'e, E>(executor: E, artist: &Artist) -> sqlx::Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO artists (id, name, uri, followers) VALUES (?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET \
             name = excluded.name, \
             uri = excluded.uri, \
             followers = excluded.followers",
    )
    .bind(&artist.id)
    .bind(&artist.name)
    .bind(&artist.uri)
    .bind(artist.followers as i64)
    .execute(executor)
    .await?;
    Ok(())
}

/// Insert or refresh an image. Stored bytes are never replaced by `NULL`.
pub async fn upsert_image<'e, E>(executor: E, image: &Image) -> sqlx::Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO images (url, width, height, mime_type, data) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(url) DO UPDATE SET \
             width = excluded.width, \
             height = excluded.height, \
             mime_type = COALESCE(excluded.mime_type, images.mime_type), \
             data = COALESCE(excluded.data, images.data)",
    )
    .bind(&image.url)
    .bind(image.width as i64)
    .bind(image.height as i64)
    .bind(&image.mime_type)
    .bind(&image.data)
    .execute(executor)
    .await?;
    Ok(())
}

/// Give an ownerless track an album. Tracks that already have one keep it.
pub async fn adopt_track<'e, E>(executor: E, track_id: &str, album_id: &str) -> sqlx::Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("UPDATE tracks SET album_id = ? WHERE id = ? AND album_id IS NULL")
        .bind(album_id)
        .bind(track_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn set_discography_types<'e, E>(
    executor: E,
    artist_id: &str,
    types: &[AlbumType],
) -> sqlx::Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("UPDATE artists SET discography_types = ? WHERE id = ?")
        .bind(format_type_list(types))
        .bind(artist_id)
        .execute(executor)
        .await?;
    Ok(())
}

// ============================================================================
// Relations (insert-or-ignore)
// ============================================================================

pub async fn link_track_artist<'e, E>(
    executor: E,
    track_id: &str,
    artist_id: &str,
    position: usize,
) -> sqlx::Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO track_artists (track_id, artist_id, position, is_main) VALUES (?, ?, ?, ?) \
         ON CONFLICT DO NOTHING",
    )
    .bind(track_id)
    .bind(artist_id)
    .bind(position as i64)
    .bind(position == 0)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn link_album_artist<'e, E>(
    executor: E,
    album_id: &str,
    artist_id: &str,
    position: usize,
) -> sqlx::Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO album_artists (album_id, artist_id, position, is_main) VALUES (?, ?, ?, ?) \
         ON CONFLICT DO NOTHING",
    )
    .bind(album_id)
    .bind(artist_id)
    .bind(position as i64)
    .bind(position == 0)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn link_album_image<'e, E>(executor: E, album_id: &str, url: &str) -> sqlx::Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("INSERT INTO album_images (album_id, url) VALUES (?, ?) ON CONFLICT DO NOTHING")
        .bind(album_id)
        .bind(url)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn link_artist_image<'e, E>(executor: E, artist_id: &str, url: &str) -> sqlx::Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("INSERT INTO artist_images (artist_id, url) VALUES (?, ?) ON CONFLICT DO NOTHING")
        .bind(artist_id)
        .bind(url)
        .execute(executor)
        .await?;
    Ok(())
}
