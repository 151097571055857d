//! Consistency repair for tracks stored without artist attribution.
//!
//! A track can land without its artist when a batch lookup failed or the
//! payload was incomplete. The repair pass re-fetches those tracks and runs
//! them through normal resolution. Passes are bounded so a track the remote
//! simply never attributes cannot loop forever.

use super::resolver::EntityResolver;
use anyhow::Result;
use tracing::{debug, info};

/// Passes per repair run. A second pass only happens when the first one made
/// progress, so two is enough to catch follow-on gaps without churning.
pub const MAX_REPAIR_PASSES: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairReport {
    pub passes: usize,
    pub repaired: usize,
    pub remaining: usize,
}

impl EntityResolver {
    /// Re-fetch and re-resolve every track whose artist attribution is still
    /// missing. Stops when resolved, out of passes, or no longer progressing.
    pub async fn repair_incomplete_tracks(&self, access_token: &str) -> Result<RepairReport> {
        let initial = self.store().tracks_missing_artist()?;
        if initial.is_empty() {
            return Ok(RepairReport {
                passes: 0,
                repaired: 0,
                remaining: 0,
            });
        }

        let mut missing = initial.clone();
        let mut passes = 0;
        while !missing.is_empty() && passes < MAX_REPAIR_PASSES {
            passes += 1;
            debug!("Repair pass {}: {} incomplete tracks", passes, missing.len());

            let fetched = self.fetch_tracks(access_token, &missing).await?;
            if !fetched.is_empty() {
                self.resolve_tracks(access_token, &fetched).await?;
            }

            let still_missing = self.store().tracks_missing_artist()?;
            let progressed = still_missing.len() < missing.len();
            missing = still_missing;
            if !progressed {
                break;
            }
        }

        let report = RepairReport {
            passes,
            repaired: initial.len() - missing.len(),
            remaining: missing.len(),
        };
        info!(
            "Repair finished: {} repaired, {} remaining after {} passes",
            report.repaired, report.remaining, report.passes
        );
        Ok(report)
    }

    async fn fetch_tracks(
        &self,
        access_token: &str,
        ids: &[String],
    ) -> Result<Vec<crate::catalog_client::TrackObject>> {
        match self.api().tracks_by_ids(access_token, ids).await {
            Ok(items) => Ok(items),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                tracing::warn!("Skipping track batch of {}: {}", ids.len(), e);
                Ok(vec![])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{wire_artist, wire_track, FakeCatalog};
    use super::*;
    use crate::library_store::{LibraryStore, SqliteLibraryStore, TrackRecord};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_resolver(api: FakeCatalog) -> (EntityResolver, Arc<SqliteLibraryStore>, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(SqliteLibraryStore::new(tmp.path().join("library.db")).unwrap());
        let resolver = EntityResolver::new(Arc::new(api), store.clone());
        (resolver, store, tmp)
    }

    fn insert_bare_track(store: &SqliteLibraryStore, track_id: &str) {
        store
            .upsert_tracks(&[TrackRecord {
                track_id: track_id.to_string(),
                name: Some("Bare".to_string()),
                ..Default::default()
            }])
            .unwrap();
    }

    #[tokio::test]
    async fn test_repair_fills_missing_attribution() {
        let mut api = FakeCatalog::default();
        api.tracks_by_id
            .insert("t1".to_string(), wire_track("t1", "Song", "a1", "alb1"));
        api.artists_by_id
            .insert("a1".to_string(), wire_artist("a1", "Artist"));
        api.add_album("alb1", "Album", "a1");
        let (resolver, store, _tmp) = create_resolver(api);

        insert_bare_track(&store, "t1");

        let report = resolver.repair_incomplete_tracks("token").await.unwrap();
        assert_eq!(
            report,
            RepairReport {
                passes: 1,
                repaired: 1,
                remaining: 0,
            }
        );

        let track = store.get_track("t1").unwrap().unwrap();
        assert_eq!(track.artist_id, Some("a1".to_string()));
        assert_eq!(track.artist_name, Some("Artist a1".to_string()));
    }

    #[tokio::test]
    async fn test_repair_stops_without_progress() {
        // Remote has nothing for this track, so the first pass cannot help
        // and there is no point in a second one.
        let api = FakeCatalog::default();
        let (resolver, store, _tmp) = create_resolver(api);

        insert_bare_track(&store, "t1");

        let report = resolver.repair_incomplete_tracks("token").await.unwrap();
        assert_eq!(
            report,
            RepairReport {
                passes: 1,
                repaired: 0,
                remaining: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_repair_noop_when_consistent() {
        let api = FakeCatalog::default();
        let counter = api.call_count.clone();
        let (resolver, _store, _tmp) = create_resolver(api);

        let report = resolver.repair_incomplete_tracks("token").await.unwrap();
        assert_eq!(report.passes, 0);
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_repair_is_bounded() {
        // One of two tracks is repairable. The first pass makes progress, the
        // second cannot, and the run stops at the pass cap.
        let mut api = FakeCatalog::default();
        api.tracks_by_id
            .insert("t1".to_string(), wire_track("t1", "Song", "a1", "alb1"));
        api.artists_by_id
            .insert("a1".to_string(), wire_artist("a1", "Artist"));
        api.add_album("alb1", "Album", "a1");
        let (resolver, store, _tmp) = create_resolver(api);

        insert_bare_track(&store, "t1");
        insert_bare_track(&store, "t2");

        let report = resolver.repair_incomplete_tracks("token").await.unwrap();
        assert_eq!(report.passes, MAX_REPAIR_PASSES);
        assert_eq!(report.repaired, 1);
        assert_eq!(report.remaining, 1);
    }
}
