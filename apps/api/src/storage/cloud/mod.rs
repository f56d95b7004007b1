//! Cloud-backed records for the privileged account.
//!
//! `CloudMedium` is the document store (PostgreSQL in production, in-process for
//! development). `CloudBackend` keeps a live subscription over one owner's
//! collections: every change notice triggers a full re-query and the complete
//! result set replaces the published snapshot.

pub mod memory;
pub mod postgres;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{RecordBackend, Snapshot, StorageMode, StoreError};
use crate::identity::Principal;
use crate::models::profile::{ProfilePatch, ProfileRow, UserProfile};
use crate::models::reflection::{NewReflection, ReflectionRow, WeeklyReflection};
use crate::models::win::{NewWin, Win, WinPatch, WinRow};

/// Something in `owner_id`'s collections changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    pub owner_id: String,
}

/// Per-owner document collections with change notifications.
///
/// Queries return wins by `date` descending and reflections by
/// `week_start_date` descending. Writes stamp `created_at` / `updated_at`
/// with the medium's own clock.
#[async_trait]
pub trait CloudMedium: Send + Sync {
    fn changes(&self) -> broadcast::Receiver<ChangeNotice>;

    async fn query_wins(&self, owner_id: &str) -> Result<Vec<WinRow>, StoreError>;

    async fn insert_win(&self, owner_id: &str, id: &str, draft: &NewWin)
        -> Result<WinRow, StoreError>;

    /// `None` when the owner has no win with this id.
    async fn patch_win(
        &self,
        owner_id: &str,
        id: &str,
        patch: &WinPatch,
    ) -> Result<Option<WinRow>, StoreError>;

    async fn delete_win(&self, owner_id: &str, id: &str) -> Result<(), StoreError>;

    async fn query_reflections(&self, owner_id: &str) -> Result<Vec<ReflectionRow>, StoreError>;

    async fn insert_reflection(
        &self,
        owner_id: &str,
        id: &str,
        draft: &NewReflection,
    ) -> Result<ReflectionRow, StoreError>;

    async fn load_profile(&self, owner_id: &str) -> Result<Option<ProfileRow>, StoreError>;

    /// Upserts the profile and stamps `updated_at`.
    async fn save_profile(&self, row: &ProfileRow) -> Result<ProfileRow, StoreError>;
}

/// Published snapshots, ordered by when their fetch started.
///
/// The listener and a writer's own refresh can fetch concurrently. Each fetch
/// takes a ticket first, and a result is only published if no later ticket has
/// been published already, so a slow fetch never replaces a newer snapshot.
struct SnapshotFeed {
    state: watch::Sender<Option<Arc<Snapshot>>>,
    issued: AtomicU64,
    published: AtomicU64,
}

impl SnapshotFeed {
    fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            state,
            issued: AtomicU64::new(0),
            published: AtomicU64::new(0),
        }
    }

    fn ticket(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns whether `snapshot` was published.
    fn offer(&self, ticket: u64, snapshot: Snapshot) -> bool {
        self.state.send_if_modified(|current| {
            // Runs under the channel's write lock, so check-and-set is atomic.
            if ticket <= self.published.load(Ordering::SeqCst) {
                return false;
            }
            self.published.store(ticket, Ordering::SeqCst);
            *current = Some(Arc::new(snapshot));
            true
        })
    }
}

pub struct CloudBackend {
    medium: Arc<dyn CloudMedium>,
    principal: Principal,
    feed: Arc<SnapshotFeed>,
    listener: JoinHandle<()>,
}

impl CloudBackend {
    /// Starts the live subscription for `principal`. The first snapshot is
    /// delivered asynchronously; see [`CloudBackend::wait_for_first_snapshot`].
    pub fn subscribe(medium: Arc<dyn CloudMedium>, principal: Principal) -> Self {
        let feed = Arc::new(SnapshotFeed::new());
        // Subscribe before the initial fetch so no change slips in between.
        let notices = medium.changes();
        let listener = tokio::spawn(listen(
            medium.clone(),
            principal.uid.clone(),
            feed.clone(),
            notices,
        ));
        info!("Subscribed to cloud collections for {}", principal.uid);
        Self {
            medium,
            principal,
            feed,
            listener,
        }
    }

    /// Waits up to `timeout` for the first snapshot. On timeout an empty
    /// snapshot is published so readers are not left waiting; a late delivery
    /// still replaces it.
    pub async fn wait_for_first_snapshot(&self, timeout: Duration) -> bool {
        let mut rx = self.feed.state.subscribe();
        let arrived = matches!(
            tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await,
            Ok(Ok(_))
        );
        if !arrived {
            warn!(
                "No cloud snapshot for {} within {}ms; presenting an empty set",
                self.principal.uid,
                timeout.as_millis()
            );
            self.feed.state.send_if_modified(|current| {
                if current.is_none() {
                    *current = Some(Arc::new(Snapshot::default()));
                    true
                } else {
                    false
                }
            });
        }
        arrived
    }

    async fn refresh(&self) {
        publish(self.medium.as_ref(), &self.principal.uid, &self.feed).await;
    }
}

impl Drop for CloudBackend {
    fn drop(&mut self) {
        self.listener.abort();
        debug!("Cloud subscription for {} torn down", self.principal.uid);
    }
}

async fn listen(
    medium: Arc<dyn CloudMedium>,
    owner_id: String,
    feed: Arc<SnapshotFeed>,
    mut notices: broadcast::Receiver<ChangeNotice>,
) {
    publish(medium.as_ref(), &owner_id, &feed).await;
    loop {
        match notices.recv().await {
            Ok(notice) if notice.owner_id == owner_id => {
                publish(medium.as_ref(), &owner_id, &feed).await
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Skipped {skipped} change notices; refreshing {owner_id}");
                publish(medium.as_ref(), &owner_id, &feed).await;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Re-queries both collections and replaces the snapshot unless a fetch that
/// started later already published. Read failures keep the previous snapshot.
async fn publish(medium: &dyn CloudMedium, owner_id: &str, feed: &SnapshotFeed) {
    let ticket = feed.ticket();
    match fetch_snapshot(medium, owner_id).await {
        Ok(snapshot) => {
            if !feed.offer(ticket, snapshot) {
                debug!("Dropped stale snapshot {ticket} for {owner_id}");
            }
        }
        Err(e) => error!("Cloud snapshot refresh failed for {owner_id}: {e}"),
    }
}

async fn fetch_snapshot(medium: &dyn CloudMedium, owner_id: &str) -> Result<Snapshot, StoreError> {
    let wins = medium
        .query_wins(owner_id)
        .await?
        .into_iter()
        .filter_map(|row| {
            let id = row.id.clone();
            Win::try_from(row)
                .map_err(|e| warn!("Skipping cloud win {id}: {e}"))
                .ok()
        })
        .collect();
    let reflections = medium
        .query_reflections(owner_id)
        .await?
        .into_iter()
        .map(WeeklyReflection::from)
        .collect();
    Ok(Snapshot { wins, reflections })
}

#[async_trait]
impl RecordBackend for CloudBackend {
    fn mode(&self) -> StorageMode {
        StorageMode::Cloud
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.feed.state.borrow().clone().unwrap_or_default()
    }

    async fn add_win(&self, draft: NewWin) -> Result<Win, StoreError> {
        let id = Uuid::new_v4().to_string();
        let row = self
            .medium
            .insert_win(&self.principal.uid, &id, &draft)
            .await?;
        let win = Win::try_from(row)?;
        self.refresh().await;
        Ok(win)
    }

    async fn update_win(&self, id: &str, patch: WinPatch) -> Result<Win, StoreError> {
        let row = self
            .medium
            .patch_win(&self.principal.uid, id, &patch)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let win = Win::try_from(row)?;
        self.refresh().await;
        Ok(win)
    }

    async fn delete_win(&self, id: &str) -> Result<(), StoreError> {
        self.medium.delete_win(&self.principal.uid, id).await?;
        self.refresh().await;
        Ok(())
    }

    async fn add_reflection(&self, draft: NewReflection) -> Result<WeeklyReflection, StoreError> {
        let id = Uuid::new_v4().to_string();
        let row = self
            .medium
            .insert_reflection(&self.principal.uid, &id, &draft)
            .await?;
        self.refresh().await;
        Ok(row.into())
    }

    async fn profile(&self) -> Result<UserProfile, StoreError> {
        let profile = match self.medium.load_profile(&self.principal.uid).await? {
            Some(row) => {
                let mut profile = UserProfile::from(row);
                if profile.display_name.is_empty() {
                    profile.display_name = self.principal.display_name.clone().unwrap_or_default();
                }
                profile.email = self.principal.email.clone().unwrap_or_default();
                profile
            }
            None => UserProfile::initial_for(&self.principal),
        };
        Ok(profile)
    }

    async fn update_profile(&self, patch: ProfilePatch) -> Result<UserProfile, StoreError> {
        let mut profile = self.profile().await?;
        profile.apply(&patch, &self.principal, chrono::Utc::now());
        let saved = self
            .medium
            .save_profile(&ProfileRow::from_profile(&self.principal.uid, &profile))
            .await?;
        Ok(saved.into())
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryCloud;
    use super::*;
    use crate::models::win::{ImpactLevel, ImpactType, WinCategory};
    use chrono::NaiveDate;

    fn owner() -> Principal {
        Principal {
            uid: "owner-1".into(),
            email: Some("owner@example.com".into()),
            email_verified: true,
            display_name: None,
        }
    }

    fn draft(day: u32) -> NewWin {
        NewWin {
            date: NaiveDate::from_ymd_opt(2024, 2, day).unwrap(),
            category: WinCategory::Stakeholder,
            situation: "Two teams disagreed on scope".into(),
            action: "I ran a decision workshop".into(),
            impact: "Aligned roadmap".into(),
            impact_type: ImpactType::QualityImproved,
            impact_level: Some(ImpactLevel::Low),
            evidence: None,
        }
    }

    #[tokio::test]
    async fn test_first_snapshot_arrives() {
        let medium = Arc::new(InMemoryCloud::new());
        medium.insert_win("owner-1", "seed", &draft(1)).await.unwrap();
        let backend = CloudBackend::subscribe(medium, owner());
        assert!(backend.wait_for_first_snapshot(Duration::from_secs(5)).await);
        assert_eq!(backend.snapshot().wins.len(), 1);
    }

    #[tokio::test]
    async fn test_writes_are_reflected_before_returning() {
        let medium = Arc::new(InMemoryCloud::new());
        let backend = CloudBackend::subscribe(medium, owner());
        backend.wait_for_first_snapshot(Duration::from_secs(5)).await;

        let older = backend.add_win(draft(1)).await.unwrap();
        let newer = backend.add_win(draft(20)).await.unwrap();
        let ids: Vec<_> = backend.snapshot().wins.iter().map(|w| w.id.clone()).collect();
        assert_eq!(ids, vec![newer.id, older.id.clone()]);

        backend.delete_win(&older.id).await.unwrap();
        backend.delete_win(&older.id).await.unwrap();
        assert_eq!(backend.snapshot().wins.len(), 1);
    }

    #[test]
    fn test_stale_fetch_never_replaces_newer_snapshot() {
        let feed = SnapshotFeed::new();
        let listener_fetch = feed.ticket();
        let writer_refresh = feed.ticket();

        let newer = Snapshot {
            wins: vec![Win::from_draft("w1".into(), draft(2), chrono::Utc::now())],
            reflections: vec![],
        };
        assert!(feed.offer(writer_refresh, newer.clone()));
        assert!(!feed.offer(listener_fetch, Snapshot::default()));
        assert_eq!(feed.state.borrow().as_deref(), Some(&newer));

        let latest = feed.ticket();
        assert!(feed.offer(latest, Snapshot::default()));
        assert!(feed.state.borrow().as_ref().is_some_and(|s| s.wins.is_empty()));
    }

    #[tokio::test]
    async fn test_remote_change_is_delivered() {
        let medium = Arc::new(InMemoryCloud::new());
        let backend = CloudBackend::subscribe(medium.clone(), owner());
        backend.wait_for_first_snapshot(Duration::from_secs(5)).await;

        let mut rx = backend.feed.state.subscribe();
        medium.insert_win("owner-1", "remote", &draft(3)).await.unwrap();
        tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| s.as_ref().is_some_and(|s| s.wins.len() == 1)),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(backend.snapshot().wins[0].id, "remote");
    }

    #[tokio::test]
    async fn test_other_owners_are_invisible() {
        let medium = Arc::new(InMemoryCloud::new());
        medium.insert_win("someone-else", "x", &draft(4)).await.unwrap();
        let backend = CloudBackend::subscribe(medium, owner());
        backend.wait_for_first_snapshot(Duration::from_secs(5)).await;
        assert!(backend.snapshot().wins.is_empty());
    }

    #[tokio::test]
    async fn test_update_refreshes_updated_at() {
        let medium = Arc::new(InMemoryCloud::new());
        let backend = CloudBackend::subscribe(medium, owner());
        backend.wait_for_first_snapshot(Duration::from_secs(5)).await;
        let win = backend.add_win(draft(5)).await.unwrap();

        let patch = WinPatch {
            date: NaiveDate::from_ymd_opt(2024, 2, 6),
            ..Default::default()
        };
        let updated = backend.update_win(&win.id, patch).await.unwrap();
        assert_eq!(updated.date, NaiveDate::from_ymd_opt(2024, 2, 6).unwrap());
        assert!(updated.updated_at >= win.updated_at);
        assert_eq!(updated.created_at, win.created_at);
        assert_eq!(updated.impact_level, ImpactLevel::Low);
    }

    #[tokio::test]
    async fn test_profile_round_trip_locks_email() {
        let medium = Arc::new(InMemoryCloud::new());
        let backend = CloudBackend::subscribe(medium, owner());
        let patch = ProfilePatch {
            display_name: Some("Owner".into()),
            ..Default::default()
        };
        let saved = backend.update_profile(patch).await.unwrap();
        assert_eq!(saved.display_name, "Owner");
        assert_eq!(saved.email, "owner@example.com");
        assert!(saved.updated_at.is_some());
        assert_eq!(backend.profile().await.unwrap().display_name, "Owner");
    }
}
