//! Pure helpers deciding how much history to fetch and which of it is new.

use chrono::{DateTime, Utc};

use crate::model::Play;

/// How many recent plays to request, given the time since the last sync.
///
/// Nobody can finish more than one track per `min_track_secs`, so after a
/// short gap only `elapsed / min_track_secs` plays can be new. Once the gap
/// covers a full page worth of tracks the whole page is requested. Never
/// returns less than 1.
pub fn request_size_hint(elapsed_secs: i64, min_track_secs: u64, page_size: u32) -> u32 {
    let page_size = page_size.max(1);
    if min_track_secs == 0 {
        return page_size;
    }

    let elapsed = elapsed_secs.max(0) as u64;
    let window = min_track_secs.saturating_mul(page_size as u64);
    if elapsed < window {
        ((elapsed / min_track_secs) as u32).clamp(1, page_size)
    } else {
        page_size
    }
}

/// Number of leading plays (newest first) that are newer than
/// `latest_local`. If no play in the page is older or equal, all are new.
pub fn count_new_plays(plays: &[Play], latest_local: DateTime<Utc>) -> usize {
    plays
        .iter()
        .position(|p| p.played_at <= latest_local)
        .unwrap_or(plays.len())
}
