//! Test utilities and fixtures for music-mirror tests.
//!
//! Provides a temporary database and small entity builders so tests read as
//! scenarios rather than struct literals.
//!
//! # Example
//!
//! ```ignore
//! use music_mirror::test_utils::{temp_db, sample_track};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (pool, _dir) = temp_db().await;
//!     let track = sample_track("t1", "Airbag", "alb1", &["a1"]);
//!     // ... test logic
//! }
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

use crate::model::{Album, AlbumType, Artist, Image, Track};

/// Creates a temporary database for testing.
///
/// The database lives in a temporary directory that is removed when the
/// returned `TempDir` is dropped. Migrations are run automatically.
/// Keep the TempDir alive for the duration of your test.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// Number of rows in a table.
pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .expect("count query failed");
    n
}

/// UTC instant `secs` seconds after the epoch.
pub fn at_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).expect("timestamp in range")
}

pub fn sample_artist(id: &str, name: &str) -> Artist {
    Artist {
        id: id.to_string(),
        name: name.to_string(),
        followers: 1_000,
        uri: format!("catalog:artist:{id}"),
        images: vec![sample_image(&format!("https://img.example/{id}.jpg"))],
        discography: None,
    }
}

pub fn sample_image(url: &str) -> Image {
    Image {
        url: url.to_string(),
        width: 640,
        height: 640,
        mime_type: None,
        data: None,
    }
}

/// Album credited to `artist_ids` (first is main), with no tracklist loaded.
pub fn sample_album(id: &str, title: &str, artist_ids: &[&str]) -> Album {
    Album {
        id: id.to_string(),
        title: title.to_string(),
        track_count: 0,
        release_date: chrono::NaiveDate::from_ymd_opt(1997, 5, 21),
        album_type: AlbumType::Regular,
        external_ids: Default::default(),
        uri: format!("catalog:album:{id}"),
        artists: artist_ids
            .iter()
            .map(|a| sample_artist(a, &format!("Artist {a}")))
            .collect(),
        tracks: None,
        images: vec![sample_image(&format!("https://img.example/{id}.jpg"))],
    }
}

/// Track on album `album_id` (stub only) credited to `artist_ids`.
pub fn sample_track(id: &str, title: &str, album_id: &str, artist_ids: &[&str]) -> Track {
    Track {
        id: id.to_string(),
        title: title.to_string(),
        duration: Duration::from_secs(240),
        track_number: 1,
        disc_number: 1,
        explicit: false,
        popularity: 50,
        external_ids: Default::default(),
        uri: format!("catalog:track:{id}"),
        album: Some(Box::new(Album::stub(album_id))),
        artists: artist_ids
            .iter()
            .map(|a| sample_artist(a, &format!("Artist {a}")))
            .collect(),
    }
}

/// Album with `n` tracks loaded, numbered from 1.
pub fn sample_album_with_tracks(id: &str, title: &str, artist_ids: &[&str], n: u32) -> Album {
    let tracks = (1..=n)
        .map(|i| Track {
            track_number: i,
            ..sample_track(&format!("{id}-t{i}"), &format!("{title} {i}"), id, artist_ids)
        })
        .collect();
    Album {
        track_count: n,
        tracks: Some(tracks),
        ..sample_album(id, title, artist_ids)
    }
}
