//! In-memory catalog fake shared by resolver and scheduler tests.

use crate::catalog_client::{
    AlbumObject, ArtistObject, CatalogApi, CatalogError, CatalogResult, ExternalUrls, Followers,
    NowPlaying, PlayHistoryObject, SimplifiedAlbum, SimplifiedArtist, TrackObject, UserProfile,
};
use crate::library_store::TimeRange;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn wire_artist(id: &str, name: &str) -> ArtistObject {
    ArtistObject {
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        genres: vec!["indie".to_string()],
        images: vec![],
        external_urls: ExternalUrls::default(),
        followers: Followers { total: Some(100) },
        popularity: Some(50),
        uri: Some(format!("spotify:artist:{}", id)),
    }
}

pub fn wire_track(id: &str, name: &str, artist_id: &str, album_id: &str) -> TrackObject {
    TrackObject {
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        artists: vec![SimplifiedArtist {
            id: Some(artist_id.to_string()),
            name: Some(format!("Artist {}", artist_id)),
        }],
        album: Some(SimplifiedAlbum {
            id: Some(album_id.to_string()),
            name: Some(format!("Album {}", album_id)),
            images: vec![],
            release_date: Some("2020-05-01".to_string()),
        }),
        external_urls: ExternalUrls::default(),
        duration_ms: Some(180_000),
        popularity: Some(40),
        explicit: Some(false),
        track_number: Some(1),
    }
}

pub fn play_event(track_id: &str, played_at: &str) -> PlayHistoryObject {
    PlayHistoryObject {
        track: Some(wire_track(track_id, "Song", "a1", "alb1")),
        played_at: Some(played_at.to_string()),
    }
}

/// Canned-response catalog. Unconfigured lookups return empty results, like
/// the remote does for unknown ids.
#[derive(Default, Clone)]
pub struct FakeCatalog {
    pub profile_display_name: Option<String>,
    pub top_artists: Vec<ArtistObject>,
    pub top_tracks: Vec<TrackObject>,
    pub recently_played: Vec<PlayHistoryObject>,
    pub artists_by_id: HashMap<String, ArtistObject>,
    pub albums_by_id: HashMap<String, AlbumObject>,
    pub tracks_by_id: HashMap<String, TrackObject>,
    pub now_playing: Option<NowPlaying>,
    pub auth_rejected: bool,
    pub fail_profile: bool,
    pub fail_artist_batches: bool,
    pub expected_after_ms: Option<i64>,
    pub call_count: Arc<AtomicUsize>,
}

impl FakeCatalog {
    pub fn add_album(&mut self, id: &str, name: &str, artist_id: &str) {
        self.albums_by_id.insert(
            id.to_string(),
            AlbumObject {
                id: Some(id.to_string()),
                name: Some(name.to_string()),
                artists: vec![SimplifiedArtist {
                    id: Some(artist_id.to_string()),
                    name: Some(format!("Artist {}", artist_id)),
                }],
                images: vec![],
                external_urls: ExternalUrls::default(),
                release_date: Some("2020-05-01".to_string()),
                popularity: Some(30),
            },
        );
    }

    fn check_auth(&self) -> CatalogResult<()> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.auth_rejected {
            Err(CatalogError::Auth { status: 401 })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn get_profile(&self, _access_token: &str) -> CatalogResult<UserProfile> {
        self.check_auth()?;
        if self.fail_profile {
            return Err(CatalogError::TransientExhausted {
                status: 503,
                attempts: 5,
            });
        }
        Ok(UserProfile {
            id: Some("u1".to_string()),
            display_name: self.profile_display_name.clone(),
            images: vec![],
            external_urls: ExternalUrls::default(),
            country: Some("IT".to_string()),
            product: Some("premium".to_string()),
        })
    }

    async fn top_artists(
        &self,
        _access_token: &str,
        _time_range: TimeRange,
        _limit: usize,
    ) -> CatalogResult<Vec<ArtistObject>> {
        self.check_auth()?;
        Ok(self.top_artists.clone())
    }

    async fn top_tracks(
        &self,
        _access_token: &str,
        _time_range: TimeRange,
        _limit: usize,
    ) -> CatalogResult<Vec<TrackObject>> {
        self.check_auth()?;
        Ok(self.top_tracks.clone())
    }

    async fn recently_played(
        &self,
        _access_token: &str,
        after_ms: Option<i64>,
        _limit: usize,
    ) -> CatalogResult<Vec<PlayHistoryObject>> {
        self.check_auth()?;
        if let Some(expected) = self.expected_after_ms {
            assert_eq!(after_ms, Some(expected));
        }
        Ok(self.recently_played.clone())
    }

    async fn artists_by_ids(
        &self,
        _access_token: &str,
        ids: &[String],
    ) -> CatalogResult<Vec<ArtistObject>> {
        self.check_auth()?;
        if self.fail_artist_batches {
            return Err(CatalogError::TransientExhausted {
                status: 503,
                attempts: 5,
            });
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.artists_by_id.get(id).cloned())
            .collect())
    }

    async fn albums_by_ids(
        &self,
        _access_token: &str,
        ids: &[String],
    ) -> CatalogResult<Vec<AlbumObject>> {
        self.check_auth()?;
        Ok(ids
            .iter()
            .filter_map(|id| self.albums_by_id.get(id).cloned())
            .collect())
    }

    async fn tracks_by_ids(
        &self,
        _access_token: &str,
        ids: &[String],
    ) -> CatalogResult<Vec<TrackObject>> {
        self.check_auth()?;
        Ok(ids
            .iter()
            .filter_map(|id| self.tracks_by_id.get(id).cloned())
            .collect())
    }

    async fn now_playing(&self, _access_token: &str) -> CatalogResult<Option<NowPlaying>> {
        self.check_auth()?;
        Ok(self.now_playing.clone())
    }
}
