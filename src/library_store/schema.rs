//! SQLite schema definitions for the library database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

const USERS_TABLE: Table = Table {
    name: "users",
    columns: &[
        sqlite_column!("user_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("display_name", &SqlType::Text),
        sqlite_column!("image_url", &SqlType::Text),
        sqlite_column!("profile_url", &SqlType::Text),
        sqlite_column!("country", &SqlType::Text),
        sqlite_column!("product", &SqlType::Text),
        // Written by the auth collaborator, read-only here
        sqlite_column!("access_token", &SqlType::Text),
        sqlite_column!("refresh_token", &SqlType::Text),
        sqlite_column!("token_expires", &SqlType::Integer),
    ],
    indices: &[],
    unique_constraints: &[],
};

const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("artist_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("genres", &SqlType::Text), // JSON array
        sqlite_column!("image_url", &SqlType::Text),
        sqlite_column!("spotify_url", &SqlType::Text),
        sqlite_column!("followers", &SqlType::Integer),
        sqlite_column!("popularity", &SqlType::Integer),
        sqlite_column!("uri", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[],
};

const ALBUMS_TABLE: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("album_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("artist_id", &SqlType::Text, non_null = true),
        sqlite_column!("image_url", &SqlType::Text),
        sqlite_column!("spotify_url", &SqlType::Text),
        sqlite_column!("release_date", &SqlType::Text), // YYYY-MM-DD
        sqlite_column!("popularity", &SqlType::Integer),
    ],
    indices: &[("idx_albums_artist", "artist_id")],
    unique_constraints: &[],
};

const TRACKS_TABLE: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("track_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("album_id", &SqlType::Text),
        sqlite_column!("artist_id", &SqlType::Text),
        sqlite_column!("artist_name", &SqlType::Text),
        sqlite_column!("spotify_url", &SqlType::Text),
        sqlite_column!("duration_ms", &SqlType::Integer),
        sqlite_column!("popularity", &SqlType::Integer),
        sqlite_column!("explicit", &SqlType::Integer),
        sqlite_column!("track_number", &SqlType::Integer),
        sqlite_column!("album_release_date", &SqlType::Text), // YYYY-MM-DD
        sqlite_column!("album_image_url", &SqlType::Text),
        sqlite_column!("album_name", &SqlType::Text),
    ],
    indices: &[("idx_tracks_artist", "artist_id")],
    unique_constraints: &[],
};

const TRACK_ARTISTS_TABLE: Table = Table {
    name: "track_artists",
    columns: &[
        sqlite_column!("track_id", &SqlType::Text, non_null = true),
        sqlite_column!("artist_id", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_track_artists_track", "track_id")],
    unique_constraints: &[&["track_id", "artist_id"]],
};

const USERS_TOP_ARTISTS_TABLE: Table = Table {
    name: "users_top_artists",
    columns: &[
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("artist_id", &SqlType::Text, non_null = true),
        sqlite_column!("rank", &SqlType::Integer, non_null = true),
        sqlite_column!("time_range", &SqlType::Text, non_null = true),
        sqlite_column!("last_updated", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_top_artists_user", "user_id, time_range")],
    unique_constraints: &[&["user_id", "artist_id", "time_range"]],
};

const USERS_TOP_TRACKS_TABLE: Table = Table {
    name: "users_top_tracks",
    columns: &[
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("track_id", &SqlType::Text, non_null = true),
        sqlite_column!("rank", &SqlType::Integer, non_null = true),
        sqlite_column!("time_range", &SqlType::Text, non_null = true),
        sqlite_column!("last_updated", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_top_tracks_user", "user_id, time_range")],
    unique_constraints: &[&["user_id", "track_id", "time_range"]],
};

const LISTENING_HISTORY_TABLE: Table = Table {
    name: "listening_history",
    columns: &[
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("track_id", &SqlType::Text, non_null = true),
        sqlite_column!("played_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_history_user", "user_id, played_at")],
    unique_constraints: &[&["user_id", "track_id", "played_at"]],
};

pub const LIBRARY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        USERS_TABLE,
        ARTISTS_TABLE,
        ALBUMS_TABLE,
        TRACKS_TABLE,
        TRACK_ARTISTS_TABLE,
        USERS_TOP_ARTISTS_TABLE,
        USERS_TOP_TRACKS_TABLE,
        LISTENING_HISTORY_TABLE,
    ],
    migration: None,
}];
