//! SQLite-backed library store implementation.

use super::models::{
    AlbumRecord, ArtistRecord, HistoryRow, LibraryStats, RankedEntry, TimeRange, TrackArtistRow,
    TrackRecord, UserRecord,
};
use super::schema::LIBRARY_VERSIONED_SCHEMAS;
use super::trait_def::LibraryStore;
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// SQLite-backed library store.
#[derive(Clone)]
pub struct SqliteLibraryStore {
    read_conn: Arc<Mutex<Connection>>,
    write_conn: Arc<Mutex<Connection>>,
}

fn migrate_if_needed(conn: &mut Connection) -> Result<()> {
    let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    let latest_version = LIBRARY_VERSIONED_SCHEMAS.len() - 1;
    let latest_schema = &LIBRARY_VERSIONED_SCHEMAS[latest_version];

    let table_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if table_count == 0 {
        info!("Creating library db schema at version {}", latest_version);
        latest_schema.create(conn)?;
        return Ok(());
    }

    let mut current_version = if db_version < BASE_DB_VERSION as i64 {
        0
    } else {
        (db_version - BASE_DB_VERSION as i64) as usize
    };

    if current_version >= latest_version {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for schema in LIBRARY_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
        if let Some(migration_fn) = schema.migration {
            info!(
                "Migrating library db from version {} to {}",
                current_version, schema.version
            );
            migration_fn(&tx)?;
            current_version = schema.version;
        }
    }
    tx.pragma_update(None, "user_version", BASE_DB_VERSION + current_version)?;
    tx.commit()?;
    Ok(())
}

impl SqliteLibraryStore {
    /// Create a new SqliteLibraryStore.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path_ref = db_path.as_ref();

        let mut write_conn = Connection::open_with_flags(
            db_path_ref,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open library database")?;

        migrate_if_needed(&mut write_conn)?;

        write_conn
            .pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode on library write connection")?;

        let read_conn = Connection::open_with_flags(
            db_path_ref,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open library database for reading")?;

        read_conn
            .pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode on library read connection")?;

        let stats = Self::count_rows(&read_conn)?;
        info!(
            "Library store ready: {} artists, {} albums, {} tracks, {} history rows",
            stats.artists, stats.albums, stats.tracks, stats.history_rows
        );

        Ok(Self {
            read_conn: Arc::new(Mutex::new(read_conn)),
            write_conn: Arc::new(Mutex::new(write_conn)),
        })
    }

    fn count_rows(conn: &Connection) -> Result<LibraryStats> {
        let artists: usize = conn.query_row("SELECT COUNT(*) FROM artists", [], |r| r.get(0))?;
        let albums: usize = conn.query_row("SELECT COUNT(*) FROM albums", [], |r| r.get(0))?;
        let tracks: usize = conn.query_row("SELECT COUNT(*) FROM tracks", [], |r| r.get(0))?;
        let history_rows: usize =
            conn.query_row("SELECT COUNT(*) FROM listening_history", [], |r| r.get(0))?;
        Ok(LibraryStats {
            artists,
            albums,
            tracks,
            history_rows,
        })
    }
}

// Helper: serialize Option<Vec<String>> to JSON or NULL
fn json_array_or_null(v: &Option<Vec<String>>) -> Option<String> {
    v.as_ref().map(|arr| serde_json::to_string(arr).unwrap())
}

// Helper: deserialize JSON array or NULL to Option<Vec<String>>
fn parse_json_array(s: Option<String>) -> Option<Vec<String>> {
    s.and_then(|json| {
        serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!("Malformed JSON array in library db: {}: {}", json, e);
            None
        })
    })
}

// Helper: Option<bool> to Option<i32>
fn bool_to_int(v: &Option<bool>) -> Option<i32> {
    v.map(|b| if b { 1 } else { 0 })
}

// Helper: Option<i32> to Option<bool>
fn int_to_bool(v: Option<i32>) -> Option<bool> {
    v.map(|i| i != 0)
}

// Helper: Option<NaiveDate> to TEXT column value
fn date_to_text(v: &Option<NaiveDate>) -> Option<String> {
    v.map(|d| d.format("%Y-%m-%d").to_string())
}

// Helper: TEXT column value to Option<NaiveDate>
fn text_to_date(s: Option<String>) -> Option<NaiveDate> {
    s.and_then(|raw| match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        Ok(d) => Some(d),
        Err(e) => {
            warn!("Malformed date in library db: {}: {}", raw, e);
            None
        }
    })
}

fn unix_to_datetime(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| Utc.timestamp_opt(s, 0).single())
}

impl LibraryStore for SqliteLibraryStore {
    fn upsert_user(&self, user: &UserRecord) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users
             (user_id, display_name, image_url, profile_url, country, product,
              access_token, refresh_token, token_expires)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(user_id) DO UPDATE SET
                display_name = excluded.display_name,
                image_url = excluded.image_url,
                profile_url = excluded.profile_url,
                country = excluded.country,
                product = excluded.product,
                access_token = COALESCE(excluded.access_token, users.access_token),
                refresh_token = COALESCE(excluded.refresh_token, users.refresh_token),
                token_expires = COALESCE(excluded.token_expires, users.token_expires)",
            params![
                user.user_id,
                user.display_name,
                user.image_url,
                user.profile_url,
                user.country,
                user.product,
                user.access_token,
                user.refresh_token,
                user.token_expires,
            ],
        )?;
        Ok(())
    }

    fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>> {
        let conn = self.read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT user_id, display_name, image_url, profile_url, country, product,
                    access_token, refresh_token, token_expires
             FROM users WHERE user_id = ?1",
        )?;
        let result = stmt
            .query_row(params![user_id], |row| {
                Ok(UserRecord {
                    user_id: row.get(0)?,
                    display_name: row.get(1)?,
                    image_url: row.get(2)?,
                    profile_url: row.get(3)?,
                    country: row.get(4)?,
                    product: row.get(5)?,
                    access_token: row.get(6)?,
                    refresh_token: row.get(7)?,
                    token_expires: row.get(8)?,
                })
            })
            .optional()?;
        Ok(result)
    }

    fn list_user_ids(&self) -> Result<Vec<String>> {
        let conn = self.read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT user_id FROM users ORDER BY user_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn existing_artist_ids(&self) -> Result<HashSet<String>> {
        let conn = self.read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT artist_id FROM artists")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<String>, _>>()?;
        Ok(ids)
    }

    fn upsert_artists(&self, artists: &[ArtistRecord]) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO artists
                 (artist_id, name, genres, image_url, spotify_url, followers, popularity, uri)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for artist in artists {
                stmt.execute(params![
                    artist.artist_id,
                    artist.name,
                    json_array_or_null(&artist.genres),
                    artist.image_url,
                    artist.spotify_url,
                    artist.followers,
                    artist.popularity,
                    artist.uri,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn existing_album_ids(&self) -> Result<HashSet<String>> {
        let conn = self.read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT album_id FROM albums")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<String>, _>>()?;
        Ok(ids)
    }

    fn upsert_albums(&self, albums: &[AlbumRecord]) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO albums
                 (album_id, name, artist_id, image_url, spotify_url, release_date, popularity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for album in albums {
                stmt.execute(params![
                    album.album_id,
                    album.name,
                    album.artist_id,
                    album.image_url,
                    album.spotify_url,
                    date_to_text(&album.release_date),
                    album.popularity,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn upsert_tracks(&self, tracks: &[TrackRecord]) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        {
            // Merge semantics: COALESCE keeps known values when the payload is
            // missing one; artist identity is first-writer-wins while null.
            let mut stmt = tx.prepare_cached(
                "INSERT INTO tracks
                 (track_id, name, album_id, artist_id, artist_name, spotify_url, duration_ms,
                  popularity, explicit, track_number, album_release_date, album_image_url,
                  album_name)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(track_id) DO UPDATE SET
                    name = COALESCE(excluded.name, tracks.name),
                    album_id = COALESCE(excluded.album_id, tracks.album_id),
                    artist_id = COALESCE(tracks.artist_id, excluded.artist_id),
                    artist_name = CASE
                        WHEN tracks.artist_name IS NULL OR tracks.artist_name = 'Unknown'
                        THEN COALESCE(excluded.artist_name, tracks.artist_name)
                        ELSE tracks.artist_name
                    END,
                    spotify_url = COALESCE(excluded.spotify_url, tracks.spotify_url),
                    duration_ms = COALESCE(excluded.duration_ms, tracks.duration_ms),
                    popularity = COALESCE(excluded.popularity, tracks.popularity),
                    explicit = COALESCE(excluded.explicit, tracks.explicit),
                    track_number = COALESCE(excluded.track_number, tracks.track_number),
                    album_release_date =
                        COALESCE(excluded.album_release_date, tracks.album_release_date),
                    album_image_url = COALESCE(excluded.album_image_url, tracks.album_image_url),
                    album_name = COALESCE(excluded.album_name, tracks.album_name)",
            )?;
            for track in tracks {
                stmt.execute(params![
                    track.track_id,
                    track.name,
                    track.album_id,
                    track.artist_id,
                    track.artist_name,
                    track.spotify_url,
                    track.duration_ms,
                    track.popularity,
                    bool_to_int(&track.explicit),
                    track.track_number,
                    date_to_text(&track.album_release_date),
                    track.album_image_url,
                    track.album_name,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn upsert_track_artists(&self, rows: &[TrackArtistRow]) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO track_artists (track_id, artist_id) VALUES (?1, ?2)",
            )?;
            for row in rows {
                stmt.execute(params![row.track_id, row.artist_id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn track_ids_present(&self, track_ids: &[String]) -> Result<HashSet<String>> {
        let conn = self.read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT 1 FROM tracks WHERE track_id = ?1")?;

        let mut present = HashSet::new();
        for id in track_ids {
            let exists: bool = stmt
                .query_row(params![id], |_| Ok(()))
                .optional()?
                .is_some();
            if exists {
                present.insert(id.clone());
            }
        }
        Ok(present)
    }

    fn tracks_missing_artist(&self) -> Result<Vec<String>> {
        let conn = self.read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT track_id FROM tracks WHERE artist_name IS NULL OR artist_name = 'Unknown'",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn replace_top_artists(
        &self,
        user_id: &str,
        time_range: TimeRange,
        entries: &[RankedEntry],
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM users_top_artists WHERE user_id = ?1 AND time_range = ?2",
            params![user_id, time_range.as_str()],
        )?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO users_top_artists (user_id, artist_id, rank, time_range, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    user_id,
                    entry.entity_id,
                    entry.rank,
                    time_range.as_str(),
                    updated_at.timestamp(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn replace_top_tracks(
        &self,
        user_id: &str,
        time_range: TimeRange,
        entries: &[RankedEntry],
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM users_top_tracks WHERE user_id = ?1 AND time_range = ?2",
            params![user_id, time_range.as_str()],
        )?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO users_top_tracks (user_id, track_id, rank, time_range, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    user_id,
                    entry.entity_id,
                    entry.rank,
                    time_range.as_str(),
                    updated_at.timestamp(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn last_top_artists_update(
        &self,
        user_id: &str,
        time_range: TimeRange,
    ) -> Result<Option<DateTime<Utc>>> {
        let conn = self.read_conn.lock().unwrap();
        let secs: Option<i64> = conn.query_row(
            "SELECT MAX(last_updated) FROM users_top_artists
             WHERE user_id = ?1 AND time_range = ?2",
            params![user_id, time_range.as_str()],
            |r| r.get(0),
        )?;
        Ok(unix_to_datetime(secs))
    }

    fn last_top_tracks_update(
        &self,
        user_id: &str,
        time_range: TimeRange,
    ) -> Result<Option<DateTime<Utc>>> {
        let conn = self.read_conn.lock().unwrap();
        let secs: Option<i64> = conn.query_row(
            "SELECT MAX(last_updated) FROM users_top_tracks
             WHERE user_id = ?1 AND time_range = ?2",
            params![user_id, time_range.as_str()],
            |r| r.get(0),
        )?;
        Ok(unix_to_datetime(secs))
    }

    fn append_history(&self, user_id: &str, rows: &[HistoryRow]) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO listening_history (user_id, track_id, played_at)
                 VALUES (?1, ?2, ?3)",
            )?;
            for row in rows {
                stmt.execute(params![user_id, row.track_id, row.played_at])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn last_history_played_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.read_conn.lock().unwrap();
        let secs: Option<i64> = conn.query_row(
            "SELECT MAX(played_at) FROM listening_history WHERE user_id = ?1",
            params![user_id],
            |r| r.get(0),
        )?;
        Ok(unix_to_datetime(secs))
    }

    fn get_library_stats(&self) -> Result<LibraryStats> {
        let conn = self.read_conn.lock().unwrap();
        Self::count_rows(&conn)
    }
}

impl SqliteLibraryStore {
    /// Read back a track row. Used by callers that render track details and by
    /// tests asserting merge semantics.
    pub fn get_track(&self, track_id: &str) -> Result<Option<TrackRecord>> {
        let conn = self.read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT track_id, name, album_id, artist_id, artist_name, spotify_url, duration_ms,
                    popularity, explicit, track_number, album_release_date, album_image_url,
                    album_name
             FROM tracks WHERE track_id = ?1",
        )?;
        let result = stmt
            .query_row(params![track_id], |row| {
                Ok(TrackRecord {
                    track_id: row.get(0)?,
                    name: row.get(1)?,
                    album_id: row.get(2)?,
                    artist_id: row.get(3)?,
                    artist_name: row.get(4)?,
                    spotify_url: row.get(5)?,
                    duration_ms: row.get(6)?,
                    popularity: row.get(7)?,
                    explicit: int_to_bool(row.get(8)?),
                    track_number: row.get(9)?,
                    album_release_date: text_to_date(row.get(10)?),
                    album_image_url: row.get(11)?,
                    album_name: row.get(12)?,
                })
            })
            .optional()?;
        Ok(result)
    }

    /// Read back an artist row.
    pub fn get_artist(&self, artist_id: &str) -> Result<Option<ArtistRecord>> {
        let conn = self.read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT artist_id, name, genres, image_url, spotify_url, followers, popularity, uri
             FROM artists WHERE artist_id = ?1",
        )?;
        let result = stmt
            .query_row(params![artist_id], |row| {
                Ok(ArtistRecord {
                    artist_id: row.get(0)?,
                    name: row.get(1)?,
                    genres: parse_json_array(row.get(2)?),
                    image_url: row.get(3)?,
                    spotify_url: row.get(4)?,
                    followers: row.get(5)?,
                    popularity: row.get(6)?,
                    uri: row.get(7)?,
                })
            })
            .optional()?;
        Ok(result)
    }

    /// Read back an album row.
    pub fn get_album(&self, album_id: &str) -> Result<Option<AlbumRecord>> {
        let conn = self.read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT album_id, name, artist_id, image_url, spotify_url, release_date, popularity
             FROM albums WHERE album_id = ?1",
        )?;
        let result = stmt
            .query_row(params![album_id], |row| {
                Ok(AlbumRecord {
                    album_id: row.get(0)?,
                    name: row.get(1)?,
                    artist_id: row.get(2)?,
                    image_url: row.get(3)?,
                    spotify_url: row.get(4)?,
                    release_date: text_to_date(row.get(5)?),
                    popularity: row.get(6)?,
                })
            })
            .optional()?;
        Ok(result)
    }

    /// Ranked entries for a user's top-artists list, in rank order.
    pub fn get_top_artists(
        &self,
        user_id: &str,
        time_range: TimeRange,
    ) -> Result<Vec<RankedEntry>> {
        let conn = self.read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT artist_id, rank FROM users_top_artists
             WHERE user_id = ?1 AND time_range = ?2 ORDER BY rank",
        )?;
        let rows = stmt
            .query_map(params![user_id, time_range.as_str()], |row| {
                Ok(RankedEntry {
                    entity_id: row.get(0)?,
                    rank: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Ranked entries for a user's top-tracks list, in rank order.
    pub fn get_top_tracks(
        &self,
        user_id: &str,
        time_range: TimeRange,
    ) -> Result<Vec<RankedEntry>> {
        let conn = self.read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT track_id, rank FROM users_top_tracks
             WHERE user_id = ?1 AND time_range = ?2 ORDER BY rank",
        )?;
        let rows = stmt
            .query_map(params![user_id, time_range.as_str()], |row| {
                Ok(RankedEntry {
                    entity_id: row.get(0)?,
                    rank: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All credited artists for a track.
    pub fn get_track_artists(&self, track_id: &str) -> Result<Vec<String>> {
        let conn = self.read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT artist_id FROM track_artists WHERE track_id = ?1 ORDER BY artist_id",
        )?;
        let ids = stmt
            .query_map(params![track_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}
