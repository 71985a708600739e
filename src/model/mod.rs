//! Catalog entities shared by every provider.
//!
//! Defines [`Track`], [`Album`], [`Artist`], [`Image`] and [`Play`]. All
//! catalog entities are identified by the immutable id the remote catalog
//! assigns; the local cache uses the same id as primary key.
//!
//! Entities are built per call. They only become persistent through
//! [`crate::preserve::Preserver`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Serialize, Serializer};

pub use crate::error::ResourceKind;

/// Cross-catalog identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExternalIds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isrc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ean: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upc: Option<String>,
}

/// Release grouping of an album.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlbumType {
    #[default]
    Regular,
    Compilation,
    Single,
}

impl AlbumType {
    /// Name used by the remote catalog and the local store.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlbumType::Regular => "album",
            AlbumType::Compilation => "compilation",
            AlbumType::Single => "single",
        }
    }

    /// An empty filter means regular albums only.
    pub fn normalize(types: &[AlbumType]) -> Vec<AlbumType> {
        if types.is_empty() {
            return vec![AlbumType::Regular];
        }
        let mut out = types.to_vec();
        out.sort();
        out.dedup();
        out
    }
}

impl fmt::Display for AlbumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlbumType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "album" | "regular" => Ok(AlbumType::Regular),
            "compilation" => Ok(AlbumType::Compilation),
            "single" => Ok(AlbumType::Single),
            other => Err(format!("unknown album type: {other}")),
        }
    }
}

impl Serialize for AlbumType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// How much of an artist's discography a lookup must return.
///
/// Levels are lower bounds: a provider may return more, never less.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum FillLevel {
    /// No discography.
    #[default]
    Bare,
    /// Discography albums without tracklists.
    Albums,
    /// Discography albums with their tracklists.
    Tracklists,
}

impl From<u8> for FillLevel {
    fn from(level: u8) -> Self {
        match level {
            0 => FillLevel::Bare,
            1 => FillLevel::Albums,
            _ => FillLevel::Tracklists,
        }
    }
}

/// Cover art or artist picture, identified by its URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Image {
    pub url: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Downloaded payload; `None` until fetched.
    #[serde(skip)]
    pub data: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub followers: u64,
    pub uri: String,
    pub images: Vec<Image>,
    /// Populated only when requested through a [`FillLevel`] above `Bare`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discography: Option<Vec<Album>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Album {
    pub id: String,
    pub title: String,
    pub track_count: u32,
    pub release_date: Option<NaiveDate>,
    pub album_type: AlbumType,
    pub external_ids: ExternalIds,
    pub uri: String,
    /// Ordered; `artists[0]` is the main artist.
    pub artists: Vec<Artist>,
    /// `None` means the tracklist was not loaded, which differs from an
    /// album that has no tracks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracks: Option<Vec<Track>>,
    pub images: Vec<Image>,
}

impl Album {
    /// An album that carries only its id.
    pub fn stub(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Whether only the id is known.
    pub fn is_stub(&self) -> bool {
        self.title.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub track_number: u32,
    pub disc_number: u32,
    pub explicit: bool,
    pub popularity: u32,
    pub external_ids: ExternalIds,
    pub uri: String,
    /// Owning album. Tracklist members only carry a stub with the id set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<Box<Album>>,
    /// Ordered; `artists[0]` is the main performer.
    pub artists: Vec<Artist>,
}

impl Track {
    /// Id of the owning album, if one is known.
    pub fn album_id(&self) -> Option<&str> {
        self.album
            .as_deref()
            .map(|a| a.id.as_str())
            .filter(|id| !id.is_empty())
    }
}

/// A single play of a track by a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Play {
    pub played_at: DateTime<Utc>,
    pub track: Track,
}

/// Borrowed reference to any entity the preserve cascade accepts.
#[derive(Debug, Clone, Copy)]
pub enum ResourceRef<'a> {
    Track(&'a Track),
    Album(&'a Album),
    Artist(&'a Artist),
}

impl ResourceRef<'_> {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceRef::Track(_) => ResourceKind::Track,
            ResourceRef::Album(_) => ResourceKind::Album,
            ResourceRef::Artist(_) => ResourceKind::Artist,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ResourceRef::Track(t) => &t.id,
            ResourceRef::Album(a) => &a.id,
            ResourceRef::Artist(a) => &a.id,
        }
    }
}

impl<'a> From<&'a Track> for ResourceRef<'a> {
    fn from(track: &'a Track) -> Self {
        ResourceRef::Track(track)
    }
}

impl<'a> From<&'a Album> for ResourceRef<'a> {
    fn from(album: &'a Album) -> Self {
        ResourceRef::Album(album)
    }
}

impl<'a> From<&'a Artist> for ResourceRef<'a> {
    fn from(artist: &'a Artist) -> Self {
        ResourceRef::Artist(artist)
    }
}

/// Parse a release date that may only carry year or year-month precision.
///
/// Missing components default to the first month or day.
pub fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let mut parts = raw.splitn(3, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 1,
    };
    let day: u32 = match parts.next() {
        Some(d) => d.parse().ok()?,
        None => 1,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn serialize_millis<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_date_precision() {
        assert_eq!(
            parse_release_date("1997"),
            NaiveDate::from_ymd_opt(1997, 1, 1)
        );
        assert_eq!(
            parse_release_date("1997-05"),
            NaiveDate::from_ymd_opt(1997, 5, 1)
        );
        assert_eq!(
            parse_release_date("1997-05-21"),
            NaiveDate::from_ymd_opt(1997, 5, 21)
        );
        assert_eq!(parse_release_date(""), None);
        assert_eq!(parse_release_date("1997-13"), None);
    }

    #[test]
    fn test_album_type_wire_names() {
        assert_eq!("album".parse::<AlbumType>(), Ok(AlbumType::Regular));
        assert_eq!("Single".parse::<AlbumType>(), Ok(AlbumType::Single));
        assert_eq!(AlbumType::Compilation.as_str(), "compilation");
        assert!("appears_on".parse::<AlbumType>().is_err());
    }

    #[test]
    fn test_empty_filter_means_regular() {
        assert_eq!(AlbumType::normalize(&[]), vec![AlbumType::Regular]);
        assert_eq!(
            AlbumType::normalize(&[AlbumType::Single, AlbumType::Regular, AlbumType::Single]),
            vec![AlbumType::Regular, AlbumType::Single]
        );
    }

    #[test]
    fn test_fill_level_from_number() {
        assert_eq!(FillLevel::from(0), FillLevel::Bare);
        assert_eq!(FillLevel::from(1), FillLevel::Albums);
        assert_eq!(FillLevel::from(2), FillLevel::Tracklists);
        assert_eq!(FillLevel::from(7), FillLevel::Tracklists);
    }

    #[test]
    fn test_track_album_id_ignores_empty() {
        let mut track = Track::default();
        assert_eq!(track.album_id(), None);
        track.album = Some(Box::new(Album::stub("")));
        assert_eq!(track.album_id(), None);
        track.album = Some(Box::new(Album::stub("abc")));
        assert_eq!(track.album_id(), Some("abc"));
    }

    #[test]
    fn test_track_serializes_duration_in_millis() {
        let track = Track {
            id: "t1".into(),
            duration: Duration::from_millis(215_000),
            ..Default::default()
        };
        let json = serde_json::to_value(&track).unwrap();
        assert_eq!(json["duration_ms"], 215_000);
        assert!(json.get("album").is_none());
    }
}
