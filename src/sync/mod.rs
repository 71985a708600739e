//! Background play-history sync.
//!
//! The synchronizer polls every linked user's recently played tracks and
//! stores the plays that are newer than the latest one already on record.
//! It works like a gardener: one pass every interval, users one after
//! another, failures logged and left for the next pass.
//!
//! # Per-user pass
//!
//! 1. Connect through the [`CredentialBroker`] (refreshing tokens).
//! 2. Size the request from the time since the last sync
//!    ([`request_size_hint`]).
//! 3. Fetch recent plays, newest first, and cut at the newest stored play
//!    ([`count_new_plays`]).
//! 4. Store the new plays in one transaction and move the watermark to now.
//!
//! A user whose pass fails keeps the old watermark, so the next pass asks
//! for a larger window.
//!
//! # Usage
//!
//! ```ignore
//! let sync = Synchronizer::new(pool.clone(), broker, config.sync.clone());
//! tokio::select! {
//!     _ = sync.run() => {}
//!     _ = tokio::signal::ctrl_c() => {}
//! }
//! ```

mod broker;
mod delta;

pub use broker::{CatalogBroker, CredentialBroker};
pub use delta::{count_new_plays, request_size_hint};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sqlx::SqlitePool;
use tokio::time::{MissedTickBehavior, interval};

use crate::config::SyncConfig;
use crate::db::listening::{self, LinkedUser};
use crate::error::{Result, ResultExt};
use crate::model::ResourceRef;
use crate::preserve::Preserver;

/// Whether a pass is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    Running,
}

/// Outcome of one pass over all linked users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PassSummary {
    pub users_synced: usize,
    pub users_failed: usize,
    pub plays_saved: usize,
}

/// Periodic play-history synchronizer.
pub struct Synchronizer<B> {
    pool: SqlitePool,
    broker: B,
    preserver: Preserver,
    config: SyncConfig,
    state: Mutex<SyncState>,
}

impl<B: CredentialBroker> Synchronizer<B> {
    pub fn new(pool: SqlitePool, broker: B, config: SyncConfig) -> Self {
        Self {
            preserver: Preserver::new(pool.clone()),
            pool,
            broker,
            config,
            state: Mutex::new(SyncState::Idle),
        }
    }

    /// Use a custom preserver for the tracks of new plays.
    pub fn with_preserver(mut self, preserver: Preserver) -> Self {
        self.preserver = preserver;
        self
    }

    pub fn state(&self) -> SyncState {
        *self.state.lock()
    }

    /// Run passes forever, one per configured interval.
    ///
    /// Cancel by dropping the future (e.g. in a `select!` against ctrl-c).
    pub async fn run(&self) {
        let mut timer = interval(self.config.interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            target: "sync",
            interval_secs = self.config.interval_secs,
            "Synchronizer started"
        );

        loop {
            timer.tick().await;
            match self.run_pass().await {
                Ok(summary) if summary.plays_saved > 0 || summary.users_failed > 0 => {
                    tracing::info!(
                        target: "sync",
                        synced = summary.users_synced,
                        failed = summary.users_failed,
                        plays = summary.plays_saved,
                        "Pass complete"
                    );
                }
                Ok(_) => tracing::debug!(target: "sync", "Pass complete, nothing new"),
                Err(e) => tracing::warn!(target: "sync", "Pass aborted: {}", e),
            }
        }
    }

    /// One pass over every linked user.
    ///
    /// Fails only if the user list cannot be read; per-user failures are
    /// logged and counted.
    pub async fn run_pass(&self) -> Result<PassSummary> {
        *self.state.lock() = SyncState::Running;
        let result = self.pass().await;
        *self.state.lock() = SyncState::Idle;
        result
    }

    async fn pass(&self) -> Result<PassSummary> {
        let users = listening::linked_users(&self.pool)
            .await
            .with_context("listing linked users")?;

        let mut summary = PassSummary::default();
        for user in &users {
            match self.sync_user_at(user, Utc::now()).await {
                Ok(saved) => {
                    summary.users_synced += 1;
                    summary.plays_saved += saved;
                    if saved > 0 {
                        tracing::debug!(
                            target: "sync",
                            user = %user.username,
                            saved,
                            "Saved plays"
                        );
                    }
                }
                Err(e) => {
                    summary.users_failed += 1;
                    tracing::warn!(target: "sync", user = %user.username, "Sync failed: {}", e);
                }
            }
        }
        Ok(summary)
    }

    /// Sync one user as of `now`. Returns the number of plays stored.
    pub async fn sync_user_at(&self, user: &LinkedUser, now: DateTime<Utc>) -> Result<usize> {
        let history = self.broker.connect(user).await?;

        let watermark = listening::watermark(&self.pool, user.id).await?;
        let elapsed = (now - watermark).num_seconds();
        let limit = request_size_hint(elapsed, self.config.min_track_secs, history.max_page_size());

        let plays = history.recently_played(limit).await?;
        let latest_local = listening::latest_play(&self.pool, user.id)
            .await?
            .unwrap_or(DateTime::UNIX_EPOCH);
        let fresh = &plays[..count_new_plays(&plays, latest_local)];

        tracing::trace!(
            target: "sync",
            user = %user.username,
            requested = limit,
            fetched = plays.len(),
            new = fresh.len(),
            "Fetched history"
        );

        let mut saved = 0;
        let mut tx = self.pool.begin().await?;
        for play in fresh {
            if listening::insert_play(&mut *tx, user.id, &play.track.id, play.played_at).await? {
                saved += 1;
            }
        }
        tx.commit().await?;

        if self.config.preserve_tracks {
            for play in fresh {
                if let Err(e) = self
                    .preserver
                    .preserve(ResourceRef::Track(&play.track), false)
                    .await
                {
                    tracing::warn!(
                        target: "sync",
                        track = %play.track.id,
                        "Failed to preserve track: {}",
                        e
                    );
                }
            }
        }

        listening::set_watermark(&self.pool, user.id, now).await?;
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Duration;

    use super::*;
    use crate::db::catalog;
    use crate::model::Play;
    use crate::remote::mocks::MockHistory;
    use crate::remote::{PlayHistory, RemoteError};
    use crate::test_utils::{at_secs, sample_track, temp_db};

    struct Shared(Arc<MockHistory>);

    #[async_trait]
    impl PlayHistory for Shared {
        async fn recently_played(&self, limit: u32) -> Result<Vec<Play>> {
            self.0.recently_played(limit).await
        }
    }

    /// Hands out mock histories by username; unknown users fail to connect.
    #[derive(Default)]
    struct MockBroker {
        histories: HashMap<String, Arc<MockHistory>>,
    }

    impl MockBroker {
        fn with(mut self, username: &str, history: MockHistory) -> Self {
            self.histories.insert(username.to_string(), Arc::new(history));
            self
        }

        fn history(&self, username: &str) -> Arc<MockHistory> {
            self.histories[username].clone()
        }
    }

    #[async_trait]
    impl CredentialBroker for MockBroker {
        async fn connect(&self, user: &LinkedUser) -> Result<Box<dyn PlayHistory>> {
            match self.histories.get(&user.username) {
                Some(h) => Ok(Box::new(Shared(h.clone()))),
                None => Err(RemoteError::Auth("refresh token revoked".into()).into()),
            }
        }
    }

    fn plays_at(secs: &[i64]) -> Vec<Play> {
        secs.iter()
            .map(|&s| Play {
                played_at: at_secs(s),
                track: sample_track(&format!("t{s}"), "Song", "alb", &["a1"]),
            })
            .collect()
    }

    async fn linked(pool: &SqlitePool, name: &str) -> LinkedUser {
        let id = listening::create_user(pool, name).await.unwrap();
        listening::link_user(pool, id, &format!("refresh-{name}")).await.unwrap();
        listening::linked_users(pool)
            .await
            .unwrap()
            .into_iter()
            .find(|u| u.id == id)
            .unwrap()
    }

    fn config() -> SyncConfig {
        SyncConfig {
            preserve_tracks: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_only_newer_plays_are_saved() {
        let (pool, _dir) = temp_db().await;
        let user = linked(&pool, "alice").await;
        listening::insert_play(&pool, user.id, "old", at_secs(100)).await.unwrap();

        let history = MockHistory::new(plays_at(&[130, 120, 100, 90]));
        let broker = MockBroker::default().with("alice", history);
        let sync = Synchronizer::new(pool.clone(), broker, config());

        let saved = sync.sync_user_at(&user, at_secs(1_000_000)).await.unwrap();
        assert_eq!(saved, 2);

        let stored = listening::recent_plays(&pool, user.id, 10).await.unwrap();
        let times: Vec<i64> = stored.iter().map(|(_, t)| t.timestamp()).collect();
        assert_eq!(times, vec![130, 120, 100]);
        assert_eq!(stored[0].0, "t130");
    }

    #[tokio::test]
    async fn test_empty_history_takes_everything() {
        let (pool, _dir) = temp_db().await;
        let user = linked(&pool, "alice").await;

        let broker = MockBroker::default().with("alice", MockHistory::new(plays_at(&[30, 20, 10])));
        let sync = Synchronizer::new(pool.clone(), broker, config());

        assert_eq!(sync.sync_user_at(&user, at_secs(1_000)).await.unwrap(), 3);
        assert_eq!(listening::play_count(&pool, user.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_request_size_follows_watermark() {
        let (pool, _dir) = temp_db().await;
        let user = linked(&pool, "alice").await;
        let now = Utc::now();
        listening::set_watermark(&pool, user.id, now - Duration::seconds(45))
            .await
            .unwrap();

        let broker = MockBroker::default().with("alice", MockHistory::new(Vec::new()));
        let sync = Synchronizer::new(pool.clone(), broker, config());
        sync.sync_user_at(&user, now).await.unwrap();

        assert_eq!(*sync.broker.history("alice").requested.lock(), vec![1]);
        let mark = listening::watermark(&pool, user.id).await.unwrap();
        assert_eq!(mark.timestamp(), now.timestamp());
    }

    #[tokio::test]
    async fn test_never_synced_requests_full_page() {
        let (pool, _dir) = temp_db().await;
        let user = linked(&pool, "alice").await;

        let broker = MockBroker::default().with("alice", MockHistory::new(Vec::new()));
        let sync = Synchronizer::new(pool.clone(), broker, config());
        sync.sync_user_at(&user, Utc::now()).await.unwrap();

        assert_eq!(*sync.broker.history("alice").requested.lock(), vec![50]);
    }

    #[tokio::test]
    async fn test_second_sync_adds_nothing() {
        let (pool, _dir) = temp_db().await;
        let user = linked(&pool, "alice").await;

        let broker = MockBroker::default().with("alice", MockHistory::new(plays_at(&[30, 20, 10])));
        let sync = Synchronizer::new(pool.clone(), broker, config());

        sync.sync_user_at(&user, at_secs(1_000)).await.unwrap();
        assert_eq!(sync.sync_user_at(&user, at_secs(5_000)).await.unwrap(), 0);
        assert_eq!(listening::play_count(&pool, user.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let (pool, _dir) = temp_db().await;
        let alice = linked(&pool, "alice").await;
        let bob = linked(&pool, "bob").await;
        let carol = linked(&pool, "carol").await;

        // bob cannot connect, carol's history fails
        let broker = MockBroker::default()
            .with("alice", MockHistory::new(plays_at(&[30, 20])))
            .with("carol", MockHistory::failing(RemoteError::Timeout));
        let sync = Synchronizer::new(pool.clone(), broker, config());

        let summary = sync.run_pass().await.unwrap();
        assert_eq!(
            summary,
            PassSummary {
                users_synced: 1,
                users_failed: 2,
                plays_saved: 2,
            }
        );
        assert_eq!(sync.state(), SyncState::Idle);

        let never = listening::never_synced();
        assert!(listening::watermark(&pool, alice.id).await.unwrap() > never);
        assert_eq!(listening::watermark(&pool, bob.id).await.unwrap(), never);
        assert_eq!(listening::watermark(&pool, carol.id).await.unwrap(), never);
    }

    #[tokio::test]
    async fn test_new_plays_preserve_their_tracks() {
        let (pool, _dir) = temp_db().await;
        let user = linked(&pool, "alice").await;

        let broker = MockBroker::default().with("alice", MockHistory::new(plays_at(&[20, 10])));
        let sync = Synchronizer::new(pool.clone(), broker, SyncConfig::default());
        sync.sync_user_at(&user, at_secs(1_000)).await.unwrap();

        assert!(catalog::track_exists(&pool, "t20").await.unwrap());
        assert!(catalog::track_exists(&pool, "t10").await.unwrap());
        assert!(catalog::artist_exists(&pool, "a1").await.unwrap());
    }

    #[tokio::test]
    async fn test_unlinked_users_are_skipped() {
        let (pool, _dir) = temp_db().await;
        listening::create_user(&pool, "dave").await.unwrap();

        let sync = Synchronizer::new(pool.clone(), MockBroker::default(), config());
        let summary = sync.run_pass().await.unwrap();
        assert_eq!(summary, PassSummary::default());
    }
}
