//! Data models for the library database.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Ranking time window, as reported by the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRange {
    Short,
    Medium,
    Long,
}

impl TimeRange {
    pub const ALL: [TimeRange; 3] = [TimeRange::Short, TimeRange::Medium, TimeRange::Long];

    /// Value used both as the remote query parameter and the stored column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Short => "short_term",
            TimeRange::Medium => "medium_term",
            TimeRange::Long => "long_term",
        }
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user row. Credentials are written by the auth collaborator; the pipeline
/// only reads them and refreshes display attributes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub display_name: Option<String>,
    pub image_url: Option<String>,
    pub profile_url: Option<String>,
    pub country: Option<String>,
    pub product: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Unix seconds at which the access token expires.
    pub token_expires: Option<i64>,
}

/// An artist row. Every field is authoritative from the remote API and is
/// fully overwritten on refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistRecord {
    pub artist_id: String,
    pub name: String,
    /// Empty genre sets are stored as NULL.
    pub genres: Option<Vec<String>>,
    pub image_url: Option<String>,
    pub spotify_url: Option<String>,
    pub followers: Option<i64>,
    pub popularity: Option<i64>,
    pub uri: Option<String>,
}

/// An album row. Rows missing id, name or artist reference are never inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumRecord {
    pub album_id: String,
    pub name: String,
    pub artist_id: String,
    pub image_url: Option<String>,
    pub spotify_url: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub popularity: Option<i64>,
}

/// A track row. Refreshes merge rather than overwrite: a known value is never
/// replaced by an absent one, and artist identity is set only while null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub track_id: String,
    pub name: Option<String>,
    pub album_id: Option<String>,
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
    pub spotify_url: Option<String>,
    pub duration_ms: Option<i64>,
    pub popularity: Option<i64>,
    pub explicit: Option<bool>,
    pub track_number: Option<i64>,
    pub album_release_date: Option<NaiveDate>,
    pub album_image_url: Option<String>,
    pub album_name: Option<String>,
}

/// Multi-artist credit for a track. Insert-if-absent, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackArtistRow {
    pub track_id: String,
    pub artist_id: String,
}

/// One entry of a user's top-N ranking for a time range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub entity_id: String,
    pub rank: i64,
}

/// One listening-history event. `played_at` is unix seconds UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub track_id: String,
    pub played_at: i64,
}

/// Row counts logged when the store is opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryStats {
    pub artists: usize,
    pub albums: usize,
    pub tracks: usize,
    pub history_rows: usize,
}
