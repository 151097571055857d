//! HTTP client for the remote catalog.
//!
//! Batch lookups are chunked to the documented per-endpoint caps. Rate-limit
//! responses honor the Retry-After header; server failures use exponential
//! backoff. Both give up after the policy's attempt budget.

use super::backoff::{RetryPolicy, DEFAULT_RETRY_AFTER};
use super::error::{CatalogError, CatalogResult};
use super::models::{
    AlbumObject, AlbumsEnvelope, ArtistObject, ArtistsEnvelope, NowPlaying, PagedItems,
    PlayHistoryObject, TrackObject, TracksEnvelope, UserProfile,
};
use crate::library_store::TimeRange;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";

/// Per-endpoint batch caps imposed by the remote catalog.
pub const ARTIST_BATCH_LIMIT: usize = 50;
pub const ALBUM_BATCH_LIMIT: usize = 20;
pub const TRACK_BATCH_LIMIT: usize = 50;

/// One URL per chunk of ids, in input order, each carrying at most
/// `batch_limit` comma-joined ids.
fn batch_urls(api_base: &str, resource: &str, ids: &[String], batch_limit: usize) -> Vec<String> {
    ids.chunks(batch_limit)
        .map(|chunk| format!("{}/{}?ids={}", api_base, resource, chunk.join(",")))
        .collect()
}

/// Abstraction over the remote catalog, mockable in tests.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn get_profile(&self, access_token: &str) -> CatalogResult<UserProfile>;

    async fn top_artists(
        &self,
        access_token: &str,
        time_range: TimeRange,
        limit: usize,
    ) -> CatalogResult<Vec<ArtistObject>>;

    async fn top_tracks(
        &self,
        access_token: &str,
        time_range: TimeRange,
        limit: usize,
    ) -> CatalogResult<Vec<TrackObject>>;

    /// Play events after the given unix-millisecond cursor, oldest first not
    /// guaranteed by the remote; callers dedup on (user, track, played_at).
    async fn recently_played(
        &self,
        access_token: &str,
        after_ms: Option<i64>,
        limit: usize,
    ) -> CatalogResult<Vec<PlayHistoryObject>>;

    async fn artists_by_ids(
        &self,
        access_token: &str,
        ids: &[String],
    ) -> CatalogResult<Vec<ArtistObject>>;

    async fn albums_by_ids(
        &self,
        access_token: &str,
        ids: &[String],
    ) -> CatalogResult<Vec<AlbumObject>>;

    async fn tracks_by_ids(
        &self,
        access_token: &str,
        ids: &[String],
    ) -> CatalogResult<Vec<TrackObject>>;

    /// None when nothing is playing (the remote answers 204).
    async fn now_playing(&self, access_token: &str) -> CatalogResult<Option<NowPlaying>>;
}

pub struct SpotifyClient {
    client: reqwest::Client,
    api_base: String,
    retry_policy: RetryPolicy,
}

impl SpotifyClient {
    pub fn new(api_base: &str, timeout: Duration) -> CatalogResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            retry_policy: RetryPolicy::default(),
        })
    }

    /// GET with retries. Returns the response once the status is neither a
    /// rate limit nor a server failure; the caller decides what the remaining
    /// statuses mean.
    async fn get_with_retry(
        &self,
        access_token: &str,
        url: &str,
    ) -> CatalogResult<reqwest::Response> {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let response = self
                .client
                .get(url)
                .bearer_auth(access_token)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if !self.retry_policy.should_retry(attempts) {
                    return Err(CatalogError::RateLimitExhausted { attempts });
                }
                let wait = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_RETRY_AFTER);
                warn!("Rate limited by catalog, waiting {:?} before retry", wait);
                tokio::time::sleep(wait).await;
                continue;
            }

            if status.is_server_error() {
                if !self.retry_policy.should_retry(attempts) {
                    return Err(CatalogError::TransientExhausted {
                        status: status.as_u16(),
                        attempts,
                    });
                }
                let wait = self.retry_policy.backoff(attempts - 1);
                warn!(
                    "Catalog returned {}, retrying in {:?} (attempt {})",
                    status, wait, attempts
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            return Ok(response);
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        access_token: &str,
        url: &str,
    ) -> CatalogResult<T> {
        let response = self.get_with_retry(access_token, url).await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CatalogError::Auth {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Api {
                status: status.as_u16(),
                body,
            });
        }

        debug!("GET {} -> {}", url, status);
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl CatalogApi for SpotifyClient {
    async fn get_profile(&self, access_token: &str) -> CatalogResult<UserProfile> {
        let url = format!("{}/me", self.api_base);
        self.get_json(access_token, &url).await
    }

    async fn top_artists(
        &self,
        access_token: &str,
        time_range: TimeRange,
        limit: usize,
    ) -> CatalogResult<Vec<ArtistObject>> {
        let url = format!(
            "{}/me/top/artists?time_range={}&limit={}",
            self.api_base, time_range, limit
        );
        let page: PagedItems<ArtistObject> = self.get_json(access_token, &url).await?;
        Ok(page.items)
    }

    async fn top_tracks(
        &self,
        access_token: &str,
        time_range: TimeRange,
        limit: usize,
    ) -> CatalogResult<Vec<TrackObject>> {
        let url = format!(
            "{}/me/top/tracks?time_range={}&limit={}",
            self.api_base, time_range, limit
        );
        let page: PagedItems<TrackObject> = self.get_json(access_token, &url).await?;
        Ok(page.items)
    }

    async fn recently_played(
        &self,
        access_token: &str,
        after_ms: Option<i64>,
        limit: usize,
    ) -> CatalogResult<Vec<PlayHistoryObject>> {
        let mut url = format!(
            "{}/me/player/recently-played?limit={}",
            self.api_base, limit
        );
        if let Some(after) = after_ms {
            url.push_str(&format!("&after={}", after));
        }
        let page: PagedItems<PlayHistoryObject> = self.get_json(access_token, &url).await?;
        Ok(page.items)
    }

    async fn artists_by_ids(
        &self,
        access_token: &str,
        ids: &[String],
    ) -> CatalogResult<Vec<ArtistObject>> {
        let mut results = Vec::with_capacity(ids.len());
        for url in batch_urls(&self.api_base, "artists", ids, ARTIST_BATCH_LIMIT) {
            let envelope: ArtistsEnvelope = self.get_json(access_token, &url).await?;
            results.extend(envelope.artists.into_iter().flatten());
        }
        Ok(results)
    }

    async fn albums_by_ids(
        &self,
        access_token: &str,
        ids: &[String],
    ) -> CatalogResult<Vec<AlbumObject>> {
        let mut results = Vec::with_capacity(ids.len());
        for url in batch_urls(&self.api_base, "albums", ids, ALBUM_BATCH_LIMIT) {
            let envelope: AlbumsEnvelope = self.get_json(access_token, &url).await?;
            results.extend(envelope.albums.into_iter().flatten());
        }
        Ok(results)
    }

    async fn tracks_by_ids(
        &self,
        access_token: &str,
        ids: &[String],
    ) -> CatalogResult<Vec<TrackObject>> {
        let mut results = Vec::with_capacity(ids.len());
        for url in batch_urls(&self.api_base, "tracks", ids, TRACK_BATCH_LIMIT) {
            let envelope: TracksEnvelope = self.get_json(access_token, &url).await?;
            results.extend(envelope.tracks.into_iter().flatten());
        }
        Ok(results)
    }

    async fn now_playing(&self, access_token: &str) -> CatalogResult<Option<NowPlaying>> {
        let url = format!("{}/me/player/currently-playing", self.api_base);
        let response = self.get_with_retry(access_token, &url).await?;
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CatalogError::Auth {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Some(response.json::<NowPlaying>().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("id{}", i)).collect()
    }

    #[test]
    fn test_batch_urls_splits_at_the_artist_cap() {
        let urls = batch_urls(DEFAULT_API_BASE, "artists", &ids(51), ARTIST_BATCH_LIMIT);
        assert_eq!(urls.len(), 2);
        assert!(urls[0].starts_with("https://api.spotify.com/v1/artists?ids=id0,"));
        assert_eq!(urls[0].matches(',').count(), 49);
        assert_eq!(urls[1], "https://api.spotify.com/v1/artists?ids=id50");
    }

    #[test]
    fn test_batch_urls_uses_the_smaller_album_cap() {
        let urls = batch_urls(DEFAULT_API_BASE, "albums", &ids(41), ALBUM_BATCH_LIMIT);
        assert_eq!(urls.len(), 3);
        assert_eq!(urls[2], "https://api.spotify.com/v1/albums?ids=id40");
    }

    #[test]
    fn test_batch_urls_keeps_input_order() {
        let input = vec!["b".to_string(), "a".to_string(), "c".to_string()];
        let urls = batch_urls("http://localhost", "tracks", &input, TRACK_BATCH_LIMIT);
        assert_eq!(urls, vec!["http://localhost/tracks?ids=b,a,c".to_string()]);
    }

    #[test]
    fn test_batch_urls_empty_ids_means_no_requests() {
        assert!(batch_urls(DEFAULT_API_BASE, "tracks", &[], TRACK_BATCH_LIMIT).is_empty());
    }
}
