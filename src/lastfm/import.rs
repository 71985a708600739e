//! Import scrobbles as plays.
//!
//! Each scrobble is resolved to a catalog track through a
//! [`ScrobbleResolver`]. The cache only answers for a track with the same
//! title and main artist; everything else goes to the remote search, so
//! with write-through on every matched track also lands in the cache.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::Scrobble;
use crate::db::listening;
use crate::error::Result;
use crate::model::Track;
use crate::provider::{FallbackProvider, LocalProvider, ResourceProvider};

/// Resolves a scrobble to a catalog track, or reports it not found.
#[async_trait]
pub trait ScrobbleResolver: Send + Sync {
    async fn resolve(&self, scrobble: &Scrobble) -> Result<Track>;
}

/// Offline: exact cache hits only.
#[async_trait]
impl ScrobbleResolver for LocalProvider {
    async fn resolve(&self, scrobble: &Scrobble) -> Result<Track> {
        self.track_by_title_artist(&scrobble.title, &scrobble.artist).await
    }
}

#[async_trait]
impl<R: ResourceProvider> ScrobbleResolver for FallbackProvider<R> {
    async fn resolve(&self, scrobble: &Scrobble) -> Result<Track> {
        self.track_by_title_artist(&scrobble.title, &scrobble.artist).await
    }
}

/// Outcome of an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ImportSummary {
    /// Plays newly stored
    pub imported: usize,
    /// Scrobbles no track could be matched for
    pub unresolved: usize,
    /// Scrobbles whose lookup failed
    pub failed: usize,
}

enum Resolution {
    Track(String),
    Unresolved,
    Failed,
}

/// Resolve `scrobbles` and store them as plays of `user_id`.
///
/// Each distinct query is looked up once. Lookup errors are counted and
/// logged; store errors abort the import.
pub async fn import_scrobbles<R>(
    resolver: &R,
    pool: &SqlitePool,
    user_id: i64,
    scrobbles: &[Scrobble],
) -> Result<ImportSummary>
where
    R: ScrobbleResolver + ?Sized,
{
    let mut summary = ImportSummary::default();
    let mut resolved: HashMap<String, Resolution> = HashMap::new();
    let mut plays = Vec::with_capacity(scrobbles.len());

    for scrobble in scrobbles {
        let query = scrobble.query();
        if !resolved.contains_key(&query) {
            let resolution = match resolver.resolve(scrobble).await {
                Ok(track) => Resolution::Track(track.id),
                Err(e) if e.is_not_found() => Resolution::Unresolved,
                Err(e) => {
                    tracing::warn!(target: "lastfm", %query, "Lookup failed: {}", e);
                    Resolution::Failed
                }
            };
            resolved.insert(query.clone(), resolution);
        }

        match &resolved[&query] {
            Resolution::Track(id) => plays.push((id.clone(), scrobble.played_at)),
            Resolution::Unresolved => summary.unresolved += 1,
            Resolution::Failed => summary.failed += 1,
        }
    }

    let mut tx = pool.begin().await?;
    for (track_id, played_at) in &plays {
        if listening::insert_play(&mut *tx, user_id, track_id, *played_at).await? {
            summary.imported += 1;
        }
    }
    tx.commit().await?;

    tracing::info!(
        target: "lastfm",
        imported = summary.imported,
        unresolved = summary.unresolved,
        failed = summary.failed,
        distinct = resolved.len(),
        "Import finished"
    );
    Ok(summary)
}
