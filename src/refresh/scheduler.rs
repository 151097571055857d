//! TTL-gated refresh orchestration.
//!
//! Each dataset is refreshed only when its stored timestamp has aged past the
//! policy window. Staleness checks fail open: a store error means refresh,
//! since fetching fresh data is safer than trusting a verdict that cannot be
//! read.

use super::single_flight::SingleFlight;
use super::ttl::TtlPolicy;
use crate::catalog_client::CatalogError;
use crate::credentials::CredentialProvider;
use crate::library_store::TimeRange;
use crate::resolver::EntityResolver;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshCategory {
    TopArtists,
    TopTracks,
    RecentHistory,
}

/// Identity of one refreshable dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefreshKey {
    pub user_id: String,
    pub category: RefreshCategory,
    pub time_range: Option<TimeRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    Fresh,
    AlreadyInFlight,
}

/// What one full user cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub fresh: usize,
    pub skipped: usize,
}

pub struct RefreshScheduler {
    resolver: Arc<EntityResolver>,
    credentials: Arc<dyn CredentialProvider>,
    ttl: TtlPolicy,
    in_flight: SingleFlight<RefreshKey>,
}

fn is_stale(last: Result<Option<DateTime<Utc>>>, window: Duration) -> bool {
    match last {
        Ok(Some(ts)) => Utc::now() - ts >= window,
        Ok(None) => true,
        Err(e) => {
            warn!("Staleness check failed, refreshing anyway: {:#}", e);
            true
        }
    }
}

fn is_fatal(e: &anyhow::Error) -> bool {
    e.downcast_ref::<CatalogError>()
        .map(CatalogError::is_fatal)
        .unwrap_or(false)
}

impl RefreshScheduler {
    pub fn new(
        resolver: Arc<EntityResolver>,
        credentials: Arc<dyn CredentialProvider>,
        ttl: TtlPolicy,
    ) -> Self {
        Self {
            resolver,
            credentials,
            ttl,
            in_flight: SingleFlight::new(),
        }
    }

    /// Whether the dataset's stored timestamp has aged past its window.
    /// `time_range` is ignored for recent history.
    pub fn should_refresh(
        &self,
        user_id: &str,
        category: RefreshCategory,
        time_range: TimeRange,
    ) -> bool {
        let store = self.resolver.store();
        let (last, window) = match category {
            RefreshCategory::TopArtists => (
                store.last_top_artists_update(user_id, time_range),
                self.ttl.top_artists(time_range),
            ),
            RefreshCategory::TopTracks => (
                store.last_top_tracks_update(user_id, time_range),
                self.ttl.top_tracks(time_range),
            ),
            RefreshCategory::RecentHistory => (
                store.last_history_played_at(user_id),
                self.ttl.recent_history,
            ),
        };
        is_stale(last, window)
    }

    /// Refresh one dataset if stale. `time_range` is ignored for recent
    /// history.
    pub async fn refresh_if_stale(
        &self,
        user_id: &str,
        category: RefreshCategory,
        time_range: TimeRange,
    ) -> Result<RefreshOutcome> {
        match category {
            RefreshCategory::TopArtists => self.refresh_top_artists(user_id, time_range).await,
            RefreshCategory::TopTracks => self.refresh_top_tracks(user_id, time_range).await,
            RefreshCategory::RecentHistory => self.refresh_recent_history(user_id).await,
        }
    }

    /// Refresh the user's top artists for one time range if stale.
    pub async fn refresh_top_artists(
        &self,
        user_id: &str,
        time_range: TimeRange,
    ) -> Result<RefreshOutcome> {
        if !self.should_refresh(user_id, RefreshCategory::TopArtists, time_range) {
            debug!("Top artists for {} ({}) still fresh", user_id, time_range);
            return Ok(RefreshOutcome::Fresh);
        }

        let key = RefreshKey {
            user_id: user_id.to_string(),
            category: RefreshCategory::TopArtists,
            time_range: Some(time_range),
        };
        let Some(_guard) = self.in_flight.try_acquire(key) else {
            return Ok(RefreshOutcome::AlreadyInFlight);
        };

        let token = self.credentials.access_token(user_id)?;
        self.resolver
            .sync_top_artists(user_id, &token, time_range)
            .await?;
        Ok(RefreshOutcome::Refreshed)
    }

    /// Refresh the user's top tracks for one time range if stale.
    pub async fn refresh_top_tracks(
        &self,
        user_id: &str,
        time_range: TimeRange,
    ) -> Result<RefreshOutcome> {
        if !self.should_refresh(user_id, RefreshCategory::TopTracks, time_range) {
            debug!("Top tracks for {} ({}) still fresh", user_id, time_range);
            return Ok(RefreshOutcome::Fresh);
        }

        let key = RefreshKey {
            user_id: user_id.to_string(),
            category: RefreshCategory::TopTracks,
            time_range: Some(time_range),
        };
        let Some(_guard) = self.in_flight.try_acquire(key) else {
            return Ok(RefreshOutcome::AlreadyInFlight);
        };

        let token = self.credentials.access_token(user_id)?;
        self.resolver
            .sync_top_tracks(user_id, &token, time_range)
            .await?;
        Ok(RefreshOutcome::Refreshed)
    }

    /// Refresh the user's listening history if the newest stored event is
    /// older than the history window.
    pub async fn refresh_recent_history(&self, user_id: &str) -> Result<RefreshOutcome> {
        if !self.should_refresh(user_id, RefreshCategory::RecentHistory, TimeRange::Short) {
            debug!("Recent history for {} still fresh", user_id);
            return Ok(RefreshOutcome::Fresh);
        }

        let key = RefreshKey {
            user_id: user_id.to_string(),
            category: RefreshCategory::RecentHistory,
            time_range: None,
        };
        let Some(_guard) = self.in_flight.try_acquire(key) else {
            return Ok(RefreshOutcome::AlreadyInFlight);
        };

        let token = self.credentials.access_token(user_id)?;
        self.resolver.sync_recent_history(user_id, &token).await?;
        Ok(RefreshOutcome::Refreshed)
    }

    /// Run one full cycle for a user: profile, every ranking dataset, recent
    /// history, then a repair pass. Fatal auth failures abort the cycle;
    /// anything else skips the dataset and moves on.
    pub async fn refresh_all(&self, user_id: &str) -> Result<RefreshSummary> {
        let token = self.credentials.access_token(user_id)?;
        if let Err(e) = self.resolver.sync_user_profile(user_id, &token).await {
            if is_fatal(&e) {
                return Err(e);
            }
            warn!("Profile refresh failed for {}, continuing: {:#}", user_id, e);
        }

        // Categories fan out; time ranges within a category stay sequential
        // so resolution steps read rows written just before them.
        let artists = async {
            let mut partial = RefreshSummary::default();
            for time_range in TimeRange::ALL {
                self.tally(
                    &mut partial,
                    self.refresh_top_artists(user_id, time_range).await,
                )?;
            }
            Ok::<_, anyhow::Error>(partial)
        };
        let tracks = async {
            let mut partial = RefreshSummary::default();
            for time_range in TimeRange::ALL {
                self.tally(
                    &mut partial,
                    self.refresh_top_tracks(user_id, time_range).await,
                )?;
            }
            Ok::<_, anyhow::Error>(partial)
        };
        let history = async {
            let mut partial = RefreshSummary::default();
            self.tally(&mut partial, self.refresh_recent_history(user_id).await)?;
            Ok::<_, anyhow::Error>(partial)
        };

        let (artists, tracks, history) = tokio::join!(artists, tracks, history);
        let mut summary = RefreshSummary::default();
        for partial in [artists?, tracks?, history?] {
            summary.refreshed += partial.refreshed;
            summary.fresh += partial.fresh;
            summary.skipped += partial.skipped;
        }

        match self.resolver.repair_incomplete_tracks(&token).await {
            Ok(repair) if repair.remaining > 0 => warn!(
                "{} tracks still missing attribution for {}",
                repair.remaining, user_id
            ),
            Ok(_) => {}
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => warn!("Track repair failed for {}, continuing: {:#}", user_id, e),
        }

        match self.resolver.now_playing_summary(&token).await {
            Ok(Some(playing)) => debug!(
                "{} is currently playing {:?} by {} (playing={}, progress_ms={:?}, artwork={:?})",
                user_id,
                playing.track_name,
                playing.artist_names.join(", "),
                playing.is_playing,
                playing.progress_ms,
                playing.album_image_url
            ),
            Ok(None) => {}
            Err(e) => debug!("Now-playing check failed for {}: {:#}", user_id, e),
        }

        info!(
            "Cycle for {}: {} refreshed, {} fresh, {} skipped",
            user_id, summary.refreshed, summary.fresh, summary.skipped
        );
        Ok(summary)
    }

    fn tally(&self, summary: &mut RefreshSummary, outcome: Result<RefreshOutcome>) -> Result<()> {
        match outcome {
            Ok(RefreshOutcome::Refreshed) => summary.refreshed += 1,
            Ok(RefreshOutcome::Fresh | RefreshOutcome::AlreadyInFlight) => summary.fresh += 1,
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => {
                warn!("Refresh failed, skipping dataset: {:#}", e);
                summary.skipped += 1;
            }
        }
        Ok(())
    }
}
