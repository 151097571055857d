//! LibraryStore trait definition.

use super::models::{
    AlbumRecord, ArtistRecord, HistoryRow, LibraryStats, RankedEntry, TimeRange, TrackArtistRow,
    TrackRecord, UserRecord,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Trait for library storage backends.
///
/// All multi-row writes execute in a single transaction: a failure mid-batch
/// leaves either the pre-batch or post-batch state visible, never a partial
/// batch.
pub trait LibraryStore: Send + Sync {
    // =========================================================================
    // Users
    // =========================================================================

    /// Insert or refresh a user's profile attributes. Credential columns are
    /// preserved when the record carries none.
    fn upsert_user(&self, user: &UserRecord) -> Result<()>;

    fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>>;

    fn list_user_ids(&self) -> Result<Vec<String>>;

    // =========================================================================
    // Catalog entities
    // =========================================================================

    /// All artist IDs currently present.
    fn existing_artist_ids(&self) -> Result<HashSet<String>>;

    /// Insert or fully overwrite artists (remote data is authoritative).
    fn upsert_artists(&self, artists: &[ArtistRecord]) -> Result<()>;

    /// All album IDs currently present.
    fn existing_album_ids(&self) -> Result<HashSet<String>>;

    /// Insert albums that are not present yet; existing rows are untouched.
    fn upsert_albums(&self, albums: &[AlbumRecord]) -> Result<()>;

    /// Merge-upsert tracks: absent payload fields never clobber known values,
    /// and artist identity is set only while null.
    fn upsert_tracks(&self, tracks: &[TrackRecord]) -> Result<()>;

    /// Insert track-artist credits that are not present yet.
    fn upsert_track_artists(&self, rows: &[TrackArtistRow]) -> Result<()>;

    /// Subset of `track_ids` that exist as track rows.
    fn track_ids_present(&self, track_ids: &[String]) -> Result<HashSet<String>>;

    /// Track IDs whose artist attribution is still null or the legacy
    /// 'Unknown' sentinel. Input to the repair pass.
    fn tracks_missing_artist(&self) -> Result<Vec<String>>;

    // =========================================================================
    // Rankings
    // =========================================================================

    /// Atomically replace the user's top-artists ranking for a time range.
    fn replace_top_artists(
        &self,
        user_id: &str,
        time_range: TimeRange,
        entries: &[RankedEntry],
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Atomically replace the user's top-tracks ranking for a time range.
    fn replace_top_tracks(
        &self,
        user_id: &str,
        time_range: TimeRange,
        entries: &[RankedEntry],
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    fn last_top_artists_update(
        &self,
        user_id: &str,
        time_range: TimeRange,
    ) -> Result<Option<DateTime<Utc>>>;

    fn last_top_tracks_update(
        &self,
        user_id: &str,
        time_range: TimeRange,
    ) -> Result<Option<DateTime<Utc>>>;

    // =========================================================================
    // Listening history
    // =========================================================================

    /// Append history events; duplicate (user, track, played_at) triples are
    /// silently ignored.
    fn append_history(&self, user_id: &str, rows: &[HistoryRow]) -> Result<()>;

    fn last_history_played_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>>;

    // =========================================================================
    // Statistics
    // =========================================================================

    fn get_library_stats(&self) -> Result<LibraryStats>;
}
