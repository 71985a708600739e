//! Adapter layer: convert catalog DTOs to domain models
//!
//! This is the ONLY place where DTO types become domain types. If the API
//! changes its response format, only this file and dto.rs need to change.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::dto;
use crate::model::{Album, AlbumType, Artist, ExternalIds, Image, Play, Track, parse_release_date};

fn image(dto: dto::ImageDto) -> Image {
    Image {
        url: dto.url,
        width: dto.width.unwrap_or(0),
        height: dto.height.unwrap_or(0),
        mime_type: None,
        data: None,
    }
}

fn external_ids(dto: dto::ExternalIdsDto) -> ExternalIds {
    ExternalIds {
        isrc: dto.isrc,
        ean: dto.ean,
        upc: dto.upc,
    }
}

/// Album types outside the known set (e.g. `appears_on`) count as regular.
fn album_type(raw: Option<&str>) -> AlbumType {
    raw.and_then(|s| s.parse().ok()).unwrap_or_default()
}

pub fn simplified_artist(dto: dto::SimplifiedArtistDto) -> Artist {
    Artist {
        id: dto.id,
        name: dto.name,
        uri: dto.uri,
        ..Default::default()
    }
}

pub fn to_artist(dto: dto::ArtistDto) -> Artist {
    Artist {
        id: dto.id,
        name: dto.name,
        followers: dto.followers.and_then(|f| f.total).unwrap_or(0),
        uri: dto.uri,
        images: dto.images.into_iter().map(image).collect(),
        discography: None,
    }
}

pub fn simplified_album(dto: dto::SimplifiedAlbumDto) -> Album {
    Album {
        id: dto.id,
        title: dto.name,
        track_count: dto.total_tracks.unwrap_or(0),
        release_date: dto.release_date.as_deref().and_then(parse_release_date),
        album_type: album_type(dto.album_type.as_deref()),
        external_ids: ExternalIds::default(),
        uri: dto.uri,
        artists: dto.artists.into_iter().map(simplified_artist).collect(),
        tracks: None,
        images: dto.images.into_iter().map(image).collect(),
    }
}

/// Full album; the embedded first tracklist page is dropped because album
/// lookups never carry tracks.
pub fn to_album(dto: dto::AlbumDto) -> Album {
    Album {
        id: dto.id,
        title: dto.name,
        track_count: dto.total_tracks.unwrap_or(0),
        release_date: dto.release_date.as_deref().and_then(parse_release_date),
        album_type: album_type(dto.album_type.as_deref()),
        external_ids: external_ids(dto.external_ids),
        uri: dto.uri,
        artists: dto.artists.into_iter().map(simplified_artist).collect(),
        tracks: None,
        images: dto.images.into_iter().map(image).collect(),
    }
}

/// Full track. Returns `None` for entries without an id (local files).
pub fn to_track(dto: dto::TrackDto) -> Option<Track> {
    Some(Track {
        id: dto.id?,
        title: dto.name,
        duration: Duration::from_millis(dto.duration_ms),
        track_number: dto.track_number,
        disc_number: dto.disc_number,
        explicit: dto.explicit,
        popularity: dto.popularity,
        external_ids: external_ids(dto.external_ids),
        uri: dto.uri,
        album: dto.album.map(|a| Box::new(simplified_album(a))),
        artists: dto.artists.into_iter().map(simplified_artist).collect(),
    })
}

/// Tracklist member, owned by `album_id` through a stub.
pub fn tracklist_track(dto: dto::SimplifiedTrackDto, album_id: &str) -> Option<Track> {
    Some(Track {
        id: dto.id?,
        title: dto.name,
        duration: Duration::from_millis(dto.duration_ms),
        track_number: dto.track_number,
        disc_number: dto.disc_number,
        explicit: dto.explicit,
        popularity: 0,
        external_ids: ExternalIds::default(),
        uri: dto.uri,
        album: Some(Box::new(Album::stub(album_id))),
        artists: dto.artists.into_iter().map(simplified_artist).collect(),
    })
}

/// Recently played entry. Entries with an unreadable timestamp or no track
/// id are skipped.
pub fn to_play(dto: dto::PlayHistoryDto) -> Option<Play> {
    let played_at = DateTime::parse_from_rfc3339(&dto.played_at)
        .ok()?
        .with_timezone(&Utc);
    Some(Play {
        played_at,
        track: to_track(dto.track)?,
    })
}
