//! Entity resolution: turns remote payloads into consistent library rows.
//!
//! Writes always happen in dependency order (artists, then albums, then
//! tracks, then track credits) so a track never lands before the rows it
//! references. Objects arriving without an id are dropped and logged rather
//! than stored under a sentinel.

use super::release_date::normalize_release_date;
use crate::catalog_client::{
    best_image, AlbumObject, ArtistObject, CatalogApi, NowPlaying, PlayHistoryObject, TrackObject,
};
use crate::library_store::{
    AlbumRecord, ArtistRecord, HistoryRow, LibraryStore, RankedEntry, TimeRange, TrackArtistRow,
    TrackRecord, UserRecord,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How many entries to request for top lists and recent history.
pub const PAGE_LIMIT: usize = 50;

pub struct EntityResolver {
    api: Arc<dyn CatalogApi>,
    store: Arc<dyn LibraryStore>,
}

/// Snapshot of the user's current playback, for the cycle log.
#[derive(Debug)]
pub struct NowPlayingSummary {
    pub track_name: Option<String>,
    pub artist_names: Vec<String>,
    pub album_image_url: Option<String>,
    pub is_playing: bool,
    pub progress_ms: Option<i64>,
}

impl NowPlayingSummary {
    fn from_payload(payload: NowPlaying) -> Self {
        let (track_name, artist_names, album_image_url) = match payload.item {
            Some(track) => (
                track.name,
                track.artists.into_iter().filter_map(|a| a.name).collect(),
                track.album.as_ref().and_then(|album| best_image(&album.images)),
            ),
            None => (None, Vec::new(), None),
        };
        Self {
            track_name,
            artist_names,
            album_image_url,
            is_playing: payload.is_playing.unwrap_or(false),
            progress_ms: payload.progress_ms,
        }
    }
}

fn artist_to_record(artist: ArtistObject) -> Option<ArtistRecord> {
    let (Some(artist_id), Some(name)) = (artist.id, artist.name) else {
        warn!("Dropping artist payload without id or name");
        return None;
    };
    Some(ArtistRecord {
        artist_id,
        name,
        genres: (!artist.genres.is_empty()).then_some(artist.genres),
        image_url: best_image(&artist.images),
        spotify_url: artist.external_urls.spotify,
        followers: artist.followers.total.map(|t| t as i64),
        popularity: artist.popularity,
        uri: artist.uri,
    })
}

fn album_to_record(album: AlbumObject) -> Option<AlbumRecord> {
    let (Some(album_id), Some(name)) = (album.id, album.name) else {
        warn!("Dropping album payload without id or name");
        return None;
    };
    let Some(artist_id) = album.artists.first().and_then(|a| a.id.clone()) else {
        warn!("Dropping album {} without a primary artist", album_id);
        return None;
    };
    Some(AlbumRecord {
        album_id,
        name,
        artist_id,
        image_url: best_image(&album.images),
        spotify_url: album.external_urls.spotify,
        release_date: album.release_date.as_deref().and_then(normalize_release_date),
        popularity: album.popularity,
    })
}

fn track_to_record(track: &TrackObject) -> Option<TrackRecord> {
    let Some(track_id) = track.id.clone() else {
        warn!("Dropping track payload without id");
        return None;
    };
    let primary = track.artists.first();
    Some(TrackRecord {
        track_id,
        name: track.name.clone(),
        album_id: track.album.as_ref().and_then(|a| a.id.clone()),
        artist_id: primary.and_then(|a| a.id.clone()),
        artist_name: primary.and_then(|a| a.name.clone()),
        spotify_url: track.external_urls.spotify.clone(),
        duration_ms: track.duration_ms,
        popularity: track.popularity,
        explicit: track.explicit,
        track_number: track.track_number,
        album_release_date: track
            .album
            .as_ref()
            .and_then(|a| a.release_date.as_deref())
            .and_then(normalize_release_date),
        album_image_url: track.album.as_ref().and_then(|a| best_image(&a.images)),
        album_name: track.album.as_ref().and_then(|a| a.name.clone()),
    })
}

fn track_credit_rows(track: &TrackObject) -> Vec<TrackArtistRow> {
    let Some(track_id) = track.id.as_ref() else {
        return vec![];
    };
    track
        .artists
        .iter()
        .filter_map(|a| a.id.as_ref())
        .map(|artist_id| TrackArtistRow {
            track_id: track_id.clone(),
            artist_id: artist_id.clone(),
        })
        .collect()
}

impl EntityResolver {
    pub fn new(api: Arc<dyn CatalogApi>, store: Arc<dyn LibraryStore>) -> Self {
        Self { api, store }
    }

    pub(crate) fn store(&self) -> &Arc<dyn LibraryStore> {
        &self.store
    }

    pub(crate) fn api(&self) -> &Arc<dyn CatalogApi> {
        &self.api
    }

    /// Best-effort peek at the user's current playback. None when nothing
    /// is playing (the remote answers 204).
    pub async fn now_playing_summary(
        &self,
        access_token: &str,
    ) -> Result<Option<NowPlayingSummary>> {
        Ok(self
            .api
            .now_playing(access_token)
            .await?
            .map(NowPlayingSummary::from_payload))
    }

    /// Refresh the user's profile attributes from the remote. Credential
    /// columns stay whatever the auth collaborator last wrote.
    pub async fn sync_user_profile(&self, user_id: &str, access_token: &str) -> Result<()> {
        let profile = self.api.get_profile(access_token).await?;
        self.store.upsert_user(&UserRecord {
            user_id: user_id.to_string(),
            display_name: profile.display_name,
            image_url: best_image(&profile.images),
            profile_url: profile.external_urls.spotify,
            country: profile.country,
            product: profile.product,
            ..Default::default()
        })?;
        Ok(())
    }

    /// Fetch and store the user's top artists for one time range, replacing
    /// the previous ranking.
    pub async fn sync_top_artists(
        &self,
        user_id: &str,
        access_token: &str,
        time_range: TimeRange,
    ) -> Result<()> {
        let items = self
            .api
            .top_artists(access_token, time_range, PAGE_LIMIT)
            .await?;
        let fetched = items.len();

        let records: Vec<ArtistRecord> = items.into_iter().filter_map(artist_to_record).collect();
        self.store.upsert_artists(&records)?;

        let entries: Vec<RankedEntry> = records
            .iter()
            .enumerate()
            .map(|(index, artist)| RankedEntry {
                entity_id: artist.artist_id.clone(),
                rank: index as i64 + 1,
            })
            .collect();
        self.store
            .replace_top_artists(user_id, time_range, &entries, Utc::now())?;

        info!(
            "Synced top artists for {} ({}): {} ranked of {} fetched",
            user_id,
            time_range,
            entries.len(),
            fetched
        );
        Ok(())
    }

    /// Fetch and store the user's top tracks for one time range, resolving
    /// referenced artists and albums first, then replacing the ranking.
    pub async fn sync_top_tracks(
        &self,
        user_id: &str,
        access_token: &str,
        time_range: TimeRange,
    ) -> Result<()> {
        let items = self
            .api
            .top_tracks(access_token, time_range, PAGE_LIMIT)
            .await?;
        let fetched = items.len();

        self.resolve_tracks(access_token, &items).await?;

        // Rank only what actually landed as a track row.
        let ranked_ids: Vec<String> = items.iter().filter_map(|t| t.id.clone()).collect();
        let present = self.store.track_ids_present(&ranked_ids)?;
        let entries: Vec<RankedEntry> = ranked_ids
            .iter()
            .filter(|id| present.contains(*id))
            .enumerate()
            .map(|(index, track_id)| RankedEntry {
                entity_id: track_id.clone(),
                rank: index as i64 + 1,
            })
            .collect();
        self.store
            .replace_top_tracks(user_id, time_range, &entries, Utc::now())?;

        info!(
            "Synced top tracks for {} ({}): {} ranked of {} fetched",
            user_id,
            time_range,
            entries.len(),
            fetched
        );
        Ok(())
    }

    /// Fetch play events newer than the stored cursor, resolve their tracks
    /// and append them. Duplicate events are ignored by the store.
    pub async fn sync_recent_history(&self, user_id: &str, access_token: &str) -> Result<()> {
        let after_ms = self
            .store
            .last_history_played_at(user_id)?
            .map(|ts| ts.timestamp_millis());

        let items = self
            .api
            .recently_played(access_token, after_ms, PAGE_LIMIT)
            .await?;

        let tracks: Vec<TrackObject> = items.iter().filter_map(|i| i.track.clone()).collect();
        self.resolve_tracks(access_token, &tracks).await?;

        let rows = history_rows(&items);
        let row_count = rows.len();
        self.store.append_history(user_id, &rows)?;

        info!(
            "Synced recent history for {}: {} events ({} fetched)",
            user_id,
            row_count,
            items.len()
        );
        Ok(())
    }

    /// Store a batch of track payloads along with everything they reference,
    /// in dependency order.
    pub(crate) async fn resolve_tracks(
        &self,
        access_token: &str,
        tracks: &[TrackObject],
    ) -> Result<()> {
        let artist_ids: HashSet<String> = tracks
            .iter()
            .flat_map(|t| t.artists.iter())
            .filter_map(|a| a.id.clone())
            .collect();
        self.resolve_artists(access_token, artist_ids).await?;

        let album_ids: HashSet<String> = tracks
            .iter()
            .filter_map(|t| t.album.as_ref())
            .filter_map(|a| a.id.clone())
            .collect();
        self.resolve_albums(access_token, album_ids).await?;

        let records: Vec<TrackRecord> = tracks.iter().filter_map(track_to_record).collect();
        self.store.upsert_tracks(&records)?;

        let credits: Vec<TrackArtistRow> = tracks.iter().flat_map(track_credit_rows).collect();
        self.store.upsert_track_artists(&credits)?;
        Ok(())
    }

    /// Fetch and store artists that are not in the library yet.
    pub(crate) async fn resolve_artists(
        &self,
        access_token: &str,
        ids: HashSet<String>,
    ) -> Result<()> {
        let existing = self.store.existing_artist_ids()?;
        let missing: Vec<String> = ids.difference(&existing).cloned().collect();
        if missing.is_empty() {
            return Ok(());
        }

        debug!("Resolving {} missing artists", missing.len());
        let fetched = match self.api.artists_by_ids(access_token, &missing).await {
            Ok(items) => items,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!("Skipping artist batch of {}: {}", missing.len(), e);
                return Ok(());
            }
        };

        let records: Vec<ArtistRecord> = fetched.into_iter().filter_map(artist_to_record).collect();
        self.store.upsert_artists(&records)?;
        Ok(())
    }

    /// Fetch and store albums that are not in the library yet.
    pub(crate) async fn resolve_albums(
        &self,
        access_token: &str,
        ids: HashSet<String>,
    ) -> Result<()> {
        let existing = self.store.existing_album_ids()?;
        let missing: Vec<String> = ids.difference(&existing).cloned().collect();
        if missing.is_empty() {
            return Ok(());
        }

        debug!("Resolving {} missing albums", missing.len());
        let fetched = match self.api.albums_by_ids(access_token, &missing).await {
            Ok(items) => items,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!("Skipping album batch of {}: {}", missing.len(), e);
                return Ok(());
            }
        };

        let records: Vec<AlbumRecord> = fetched.into_iter().filter_map(album_to_record).collect();
        self.store.upsert_albums(&records)?;
        Ok(())
    }
}

/// Convert play events into history rows, skipping events with a missing
/// track id or an unparseable timestamp.
fn history_rows(items: &[PlayHistoryObject]) -> Vec<HistoryRow> {
    items
        .iter()
        .filter_map(|item| {
            let track_id = item.track.as_ref().and_then(|t| t.id.clone())?;
            let Some(raw) = item.played_at.as_deref() else {
                warn!("Dropping play event for {} without timestamp", track_id);
                return None;
            };
            match DateTime::parse_from_rfc3339(raw) {
                Ok(ts) => Some(HistoryRow {
                    track_id,
                    played_at: ts.with_timezone(&Utc).timestamp(),
                }),
                Err(e) => {
                    warn!(
                        "Dropping play event for {} with bad timestamp {:?}: {}",
                        track_id, raw, e
                    );
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{play_event, wire_artist, wire_track, FakeCatalog};
    use super::*;
    use crate::catalog_client::ImageObject;
    use crate::library_store::SqliteLibraryStore;
    use tempfile::TempDir;

    fn create_resolver(api: FakeCatalog) -> (EntityResolver, Arc<SqliteLibraryStore>, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(SqliteLibraryStore::new(tmp.path().join("library.db")).unwrap());
        let resolver = EntityResolver::new(Arc::new(api), store.clone());
        (resolver, store, tmp)
    }

    #[tokio::test]
    async fn test_sync_top_artists_stores_and_ranks() {
        let mut api = FakeCatalog::default();
        api.top_artists = vec![wire_artist("a1", "First"), wire_artist("a2", "Second")];
        let (resolver, store, _tmp) = create_resolver(api);

        resolver
            .sync_top_artists("u1", "token", TimeRange::Short)
            .await
            .unwrap();

        assert!(store.get_artist("a1").unwrap().is_some());
        let ranking = store.get_top_artists("u1", TimeRange::Short).unwrap();
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].entity_id, "a1");
        assert_eq!(ranking[0].rank, 1);
        assert_eq!(ranking[1].entity_id, "a2");
        assert_eq!(ranking[1].rank, 2);
    }

    #[tokio::test]
    async fn test_sync_top_artists_drops_unidentifiable() {
        let mut api = FakeCatalog::default();
        let mut nameless = wire_artist("a1", "x");
        nameless.name = None;
        api.top_artists = vec![nameless, wire_artist("a2", "Kept")];
        let (resolver, store, _tmp) = create_resolver(api);

        resolver
            .sync_top_artists("u1", "token", TimeRange::Long)
            .await
            .unwrap();

        assert!(store.get_artist("a1").unwrap().is_none());
        let ranking = store.get_top_artists("u1", TimeRange::Long).unwrap();
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking[0].entity_id, "a2");
        assert_eq!(ranking[0].rank, 1);
    }

    #[tokio::test]
    async fn test_sync_top_tracks_resolves_dependencies() {
        let mut api = FakeCatalog::default();
        api.top_tracks = vec![wire_track("t1", "Song", "a1", "alb1")];
        api.artists_by_id
            .insert("a1".to_string(), wire_artist("a1", "Artist"));
        api.add_album("alb1", "Album", "a1");
        let (resolver, store, _tmp) = create_resolver(api);

        resolver
            .sync_top_tracks("u1", "token", TimeRange::Medium)
            .await
            .unwrap();

        // Referenced rows exist alongside the track itself
        assert!(store.get_artist("a1").unwrap().is_some());
        assert!(store.get_album("alb1").unwrap().is_some());
        let track = store.get_track("t1").unwrap().unwrap();
        assert_eq!(track.artist_id, Some("a1".to_string()));
        assert_eq!(store.get_track_artists("t1").unwrap(), vec!["a1"]);

        let ranking = store.get_top_tracks("u1", TimeRange::Medium).unwrap();
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking[0].entity_id, "t1");
    }

    #[tokio::test]
    async fn test_sync_top_tracks_skips_failed_artist_batch() {
        let mut api = FakeCatalog::default();
        api.top_tracks = vec![wire_track("t1", "Song", "a1", "alb1")];
        api.fail_artist_batches = true;
        api.add_album("alb1", "Album", "a1");
        let (resolver, store, _tmp) = create_resolver(api);

        // A non-auth batch failure must not sink the whole sync
        resolver
            .sync_top_tracks("u1", "token", TimeRange::Short)
            .await
            .unwrap();

        assert!(store.get_artist("a1").unwrap().is_none());
        assert!(store.get_track("t1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_sync() {
        let mut api = FakeCatalog::default();
        api.top_tracks = vec![wire_track("t1", "Song", "a1", "alb1")];
        api.auth_rejected = true;
        let (resolver, store, _tmp) = create_resolver(api);

        let result = resolver.sync_top_tracks("u1", "token", TimeRange::Short).await;
        assert!(result.is_err());
        assert!(store.get_track("t1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_artists_fetches_only_missing() {
        let mut api = FakeCatalog::default();
        api.artists_by_id
            .insert("a2".to_string(), wire_artist("a2", "New"));
        let (resolver, store, _tmp) = create_resolver(api);

        store
            .upsert_artists(&[crate::library_store::ArtistRecord {
                artist_id: "a1".to_string(),
                name: "Already here".to_string(),
                genres: None,
                image_url: None,
                spotify_url: None,
                followers: None,
                popularity: None,
                uri: None,
            }])
            .unwrap();

        let ids: HashSet<String> = ["a1", "a2"].iter().map(|s| s.to_string()).collect();
        resolver.resolve_artists("token", ids).await.unwrap();

        // a1 untouched, a2 fetched
        assert_eq!(
            store.get_artist("a1").unwrap().unwrap().name,
            "Already here"
        );
        assert_eq!(store.get_artist("a2").unwrap().unwrap().name, "New");
    }

    #[tokio::test]
    async fn test_sync_recent_history() {
        let mut api = FakeCatalog::default();
        api.recently_played = vec![
            play_event("t1", "2024-03-01T10:00:00Z"),
            play_event("t1", "2024-03-01T10:00:00Z"), // duplicate event
            play_event("t2", "not-a-timestamp"),
        ];
        api.artists_by_id
            .insert("a1".to_string(), wire_artist("a1", "Artist"));
        api.add_album("alb1", "Album", "a1");
        let (resolver, store, _tmp) = create_resolver(api);

        resolver.sync_recent_history("u1", "token").await.unwrap();

        // One valid deduped event; the malformed timestamp is dropped
        assert_eq!(store.get_library_stats().unwrap().history_rows, 1);
        let last = store.last_history_played_at("u1").unwrap().unwrap();
        assert_eq!(last.to_rfc3339(), "2024-03-01T10:00:00+00:00");
    }

    #[tokio::test]
    async fn test_sync_recent_history_passes_cursor() {
        let mut api = FakeCatalog::default();
        // The fake panics if recently_played gets a different cursor
        api.expected_after_ms = Some(1_700_000_000_000);
        let (resolver, store, _tmp) = create_resolver(api);

        store
            .append_history(
                "u1",
                &[HistoryRow {
                    track_id: "t0".to_string(),
                    played_at: 1_700_000_000,
                }],
            )
            .unwrap();

        resolver.sync_recent_history("u1", "token").await.unwrap();
    }

    #[tokio::test]
    async fn test_sync_user_profile() {
        let mut api = FakeCatalog::default();
        api.profile_display_name = Some("Listener".to_string());
        let (resolver, store, _tmp) = create_resolver(api);

        // Pre-existing credentials survive the profile refresh
        store
            .upsert_user(&UserRecord {
                user_id: "u1".to_string(),
                access_token: Some("token-a".to_string()),
                ..Default::default()
            })
            .unwrap();

        resolver.sync_user_profile("u1", "token").await.unwrap();

        let user = store.get_user("u1").unwrap().unwrap();
        assert_eq!(user.display_name, Some("Listener".to_string()));
        assert_eq!(user.access_token, Some("token-a".to_string()));
    }

    #[tokio::test]
    async fn test_now_playing_summary_reports_track_and_artwork() {
        let mut track = wire_track("t1", "Song", "a1", "alb1");
        if let Some(album) = track.album.as_mut() {
            album.images = vec![
                ImageObject {
                    url: "small.jpg".to_string(),
                    height: Some(64),
                    width: Some(64),
                },
                ImageObject {
                    url: "big.jpg".to_string(),
                    height: Some(640),
                    width: Some(640),
                },
            ];
        }
        let mut api = FakeCatalog::default();
        api.now_playing = Some(NowPlaying {
            item: Some(track),
            is_playing: Some(true),
            progress_ms: Some(42_000),
        });
        let (resolver, _store, _tmp) = create_resolver(api);

        let playing = resolver.now_playing_summary("token").await.unwrap().unwrap();
        assert_eq!(playing.track_name, Some("Song".to_string()));
        assert_eq!(playing.artist_names, vec!["Artist a1".to_string()]);
        assert_eq!(playing.album_image_url, Some("big.jpg".to_string()));
        assert!(playing.is_playing);
        assert_eq!(playing.progress_ms, Some(42_000));
    }

    #[tokio::test]
    async fn test_now_playing_summary_none_when_idle() {
        let (resolver, _store, _tmp) = create_resolver(FakeCatalog::default());
        assert!(resolver.now_playing_summary("token").await.unwrap().is_none());
    }
}
