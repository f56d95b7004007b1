// Wins / reflections store: one per signed-in principal.
//
// Hides which medium backs the session. The backend is chosen once per
// account by the identity policy and dropped on sign-out or idle eviction,
// which also tears down any live cloud subscription.

pub mod handlers;
pub mod sessions;
pub mod stats;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tracing::info;

use crate::identity::{IdentityPolicy, IdentityVerdict, Principal};
use crate::models::dates::DateRange;
use crate::models::profile::{ProfilePatch, UserProfile};
use crate::models::reflection::{NewReflection, WeeklyReflection};
use crate::models::win::{NewWin, Win, WinPatch};
use crate::storage::cloud::{CloudBackend, CloudMedium};
use crate::storage::local::LocalStore;
use crate::storage::local_backend::LocalBackend;
use crate::storage::{RecordBackend, Snapshot, StorageMode, StoreError};
use stats::{WinFilter, WinStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreState {
    Uninitialized,
    Loading,
    CloudSynced,
    LocalLoaded,
    Empty,
}

/// Everything a store needs to pick and build a backend.
#[derive(Clone)]
pub struct StoreDeps {
    pub policy: Arc<dyn IdentityPolicy>,
    pub cloud: Arc<dyn CloudMedium>,
    pub local_root: PathBuf,
    /// Bounded wait for the first cloud snapshot.
    pub snapshot_timeout: Duration,
}

#[derive(Default)]
struct Session {
    /// Account and verdict the backend was built for.
    key: Option<(String, IdentityVerdict)>,
    /// Bumped on every identity change; a load only installs its backend if
    /// no newer change started meanwhile.
    generation: u64,
    backend: Option<Arc<dyn RecordBackend>>,
}

/// Resets an interrupted load so the next request starts it again.
struct LoadGuard<'a> {
    state: &'a watch::Sender<StoreState>,
    armed: bool,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_replace(StoreState::Uninitialized);
        }
    }
}

pub struct WinsStore {
    deps: StoreDeps,
    state: watch::Sender<StoreState>,
    session: RwLock<Session>,
}

impl WinsStore {
    pub fn new(deps: StoreDeps) -> Self {
        let (state, _) = watch::channel(StoreState::Uninitialized);
        Self {
            deps,
            state,
            session: RwLock::new(Session::default()),
        }
    }

    /// Readable while a load is in progress.
    pub fn state(&self) -> StoreState {
        *self.state.borrow()
    }

    fn transition(&self, next: StoreState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!("Store state {previous:?} -> {next:?}");
        }
    }

    /// Waits out a load started by another request.
    async fn settled(&self) -> StoreState {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|state| *state != StoreState::Loading)
            .await
            .map(|state| *state);
        state.unwrap_or(StoreState::Empty)
    }

    pub async fn mode(&self) -> Option<StorageMode> {
        self.session.read().await.backend.as_ref().map(|b| b.mode())
    }

    /// Drives the state machine from an identity change; `None` signs out.
    ///
    /// Only the uid and the policy verdict select the backend, so a principal
    /// whose other claims drift keeps its session. The backend is built
    /// without holding the session lock; concurrent callers for the same
    /// account wait for that load instead of starting another.
    pub async fn set_principal(&self, principal: Option<Principal>) -> StoreState {
        let key = principal
            .as_ref()
            .map(|p| (p.uid.clone(), self.deps.policy.resolve(Some(p))));
        loop {
            let (generation, principal, verdict) = {
                let mut session = self.session.write().await;
                if session.key == key {
                    match self.state() {
                        StoreState::Uninitialized => {}
                        StoreState::Loading => {
                            drop(session);
                            match self.settled().await {
                                StoreState::Uninitialized => continue,
                                state => return state,
                            }
                        }
                        state => return state,
                    }
                }

                session.backend = None;
                session.key = key.clone();
                session.generation += 1;

                let (Some(principal), Some((_, verdict))) = (principal.clone(), key.clone()) else {
                    self.transition(StoreState::Empty);
                    return StoreState::Empty;
                };
                self.transition(StoreState::Loading);
                (session.generation, principal, verdict)
            };

            let mut guard = LoadGuard {
                state: &self.state,
                armed: true,
            };
            let (backend, next) = self.build_backend(principal, verdict).await;

            let mut session = self.session.write().await;
            guard.armed = false;
            if session.generation != generation {
                // A newer identity change owns the session now.
                drop(session);
                return self.settled().await;
            }
            session.backend = backend;
            self.transition(next);
            return next;
        }
    }

    async fn build_backend(
        &self,
        principal: Principal,
        verdict: IdentityVerdict,
    ) -> (Option<Arc<dyn RecordBackend>>, StoreState) {
        match verdict {
            IdentityVerdict::Privileged => {
                let backend = CloudBackend::subscribe(self.deps.cloud.clone(), principal);
                backend
                    .wait_for_first_snapshot(self.deps.snapshot_timeout)
                    .await;
                let backend: Arc<dyn RecordBackend> = Arc::new(backend);
                (Some(backend), StoreState::CloudSynced)
            }
            IdentityVerdict::Standard => {
                let store = LocalStore::for_account(&self.deps.local_root, &principal.uid);
                let backend: Arc<dyn RecordBackend> = Arc::new(LocalBackend::load(store, principal));
                (Some(backend), StoreState::LocalLoaded)
            }
            IdentityVerdict::Unauthenticated => (None, StoreState::Empty),
        }
    }

    async fn backend(&self) -> Result<Arc<dyn RecordBackend>, StoreError> {
        self.session
            .read()
            .await
            .backend
            .clone()
            .ok_or(StoreError::NoSession)
    }

    /// Current record set; empty when signed out.
    pub async fn snapshot(&self) -> Arc<Snapshot> {
        match self.session.read().await.backend.as_ref() {
            Some(backend) => backend.snapshot(),
            None => Arc::default(),
        }
    }

    pub async fn wins(&self) -> Vec<Win> {
        self.snapshot().await.wins.clone()
    }

    pub async fn reflections(&self) -> Vec<WeeklyReflection> {
        self.snapshot().await.reflections.clone()
    }

    pub async fn add_win(&self, draft: NewWin) -> Result<Win, StoreError> {
        self.backend().await?.add_win(draft).await
    }

    pub async fn update_win(&self, id: &str, patch: WinPatch) -> Result<Win, StoreError> {
        self.backend().await?.update_win(id, patch).await
    }

    pub async fn delete_win(&self, id: &str) -> Result<(), StoreError> {
        self.backend().await?.delete_win(id).await
    }

    pub async fn add_reflection(&self, draft: NewReflection) -> Result<WeeklyReflection, StoreError> {
        self.backend().await?.add_reflection(draft).await
    }

    pub async fn profile(&self) -> Result<UserProfile, StoreError> {
        self.backend().await?.profile().await
    }

    pub async fn update_profile(&self, patch: ProfilePatch) -> Result<UserProfile, StoreError> {
        self.backend().await?.update_profile(patch).await
    }

    pub async fn reflection_for_week(&self, week_start: NaiveDate) -> Option<WeeklyReflection> {
        self.snapshot()
            .await
            .reflections
            .iter()
            .find(|r| r.week_start_date == week_start)
            .cloned()
    }

    pub async fn stats(&self, today: NaiveDate) -> WinStats {
        WinStats::compute(&self.snapshot().await.wins, today)
    }

    pub async fn wins_in_range(&self, range: DateRange) -> Vec<Win> {
        stats::wins_in_range(&self.snapshot().await.wins, range)
    }

    pub async fn filtered_wins(&self, filter: &WinFilter, today: NaiveDate) -> Vec<Win> {
        stats::filter_wins(&self.snapshot().await.wins, filter, today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AllowListPolicy;
    use crate::models::profile::ProfileRow;
    use crate::models::reflection::ReflectionRow;
    use crate::models::win::{ImpactType, WinCategory, WinRow};
    use crate::storage::cloud::memory::InMemoryCloud;
    use crate::storage::cloud::ChangeNotice;
    use crate::storage::local::StorageKey;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::broadcast;

    const OWNER: &str = "owner@example.com";

    /// Counts every call that reaches the cloud medium.
    struct CountingCloud {
        inner: InMemoryCloud,
        calls: AtomicUsize,
    }

    impl CountingCloud {
        fn new() -> Self {
            Self {
                inner: InMemoryCloud::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl CloudMedium for CountingCloud {
        fn changes(&self) -> broadcast::Receiver<ChangeNotice> {
            self.hit();
            self.inner.changes()
        }
        async fn query_wins(&self, owner_id: &str) -> Result<Vec<WinRow>, StoreError> {
            self.hit();
            self.inner.query_wins(owner_id).await
        }
        async fn insert_win(
            &self,
            owner_id: &str,
            id: &str,
            draft: &NewWin,
        ) -> Result<WinRow, StoreError> {
            self.hit();
            self.inner.insert_win(owner_id, id, draft).await
        }
        async fn patch_win(
            &self,
            owner_id: &str,
            id: &str,
            patch: &WinPatch,
        ) -> Result<Option<WinRow>, StoreError> {
            self.hit();
            self.inner.patch_win(owner_id, id, patch).await
        }
        async fn delete_win(&self, owner_id: &str, id: &str) -> Result<(), StoreError> {
            self.hit();
            self.inner.delete_win(owner_id, id).await
        }
        async fn query_reflections(&self, owner_id: &str) -> Result<Vec<ReflectionRow>, StoreError> {
            self.hit();
            self.inner.query_reflections(owner_id).await
        }
        async fn insert_reflection(
            &self,
            owner_id: &str,
            id: &str,
            draft: &NewReflection,
        ) -> Result<ReflectionRow, StoreError> {
            self.hit();
            self.inner.insert_reflection(owner_id, id, draft).await
        }
        async fn load_profile(&self, owner_id: &str) -> Result<Option<ProfileRow>, StoreError> {
            self.hit();
            self.inner.load_profile(owner_id).await
        }
        async fn save_profile(&self, row: &ProfileRow) -> Result<ProfileRow, StoreError> {
            self.hit();
            self.inner.save_profile(row).await
        }
    }

    /// Never answers a query.
    struct StalledCloud {
        notices: broadcast::Sender<ChangeNotice>,
    }

    #[async_trait]
    impl CloudMedium for StalledCloud {
        fn changes(&self) -> broadcast::Receiver<ChangeNotice> {
            self.notices.subscribe()
        }
        async fn query_wins(&self, _: &str) -> Result<Vec<WinRow>, StoreError> {
            std::future::pending().await
        }
        async fn insert_win(&self, _: &str, _: &str, _: &NewWin) -> Result<WinRow, StoreError> {
            std::future::pending().await
        }
        async fn patch_win(
            &self,
            _: &str,
            _: &str,
            _: &WinPatch,
        ) -> Result<Option<WinRow>, StoreError> {
            std::future::pending().await
        }
        async fn delete_win(&self, _: &str, _: &str) -> Result<(), StoreError> {
            std::future::pending().await
        }
        async fn query_reflections(&self, _: &str) -> Result<Vec<ReflectionRow>, StoreError> {
            std::future::pending().await
        }
        async fn insert_reflection(
            &self,
            _: &str,
            _: &str,
            _: &NewReflection,
        ) -> Result<ReflectionRow, StoreError> {
            std::future::pending().await
        }
        async fn load_profile(&self, _: &str) -> Result<Option<ProfileRow>, StoreError> {
            std::future::pending().await
        }
        async fn save_profile(&self, _: &ProfileRow) -> Result<ProfileRow, StoreError> {
            std::future::pending().await
        }
    }

    fn deps(cloud: Arc<dyn CloudMedium>, root: &std::path::Path) -> StoreDeps {
        StoreDeps {
            policy: Arc::new(AllowListPolicy::new(OWNER)),
            cloud,
            local_root: root.to_path_buf(),
            snapshot_timeout: Duration::from_secs(5),
        }
    }

    fn principal(uid: &str, email: &str) -> Principal {
        Principal {
            uid: uid.into(),
            email: Some(email.into()),
            email_verified: true,
            display_name: None,
        }
    }

    fn draft() -> NewWin {
        NewWin {
            date: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            category: WinCategory::Leadership,
            situation: "New hires were ramping slowly".into(),
            action: "I wrote an onboarding guide".into(),
            impact: "Ramp-up time halved".into(),
            impact_type: ImpactType::TimeSaved,
            impact_level: None,
            evidence: Some("https://wiki/onboarding".into()),
        }
    }

    #[tokio::test]
    async fn test_add_win_yields_exactly_one_more_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = WinsStore::new(deps(Arc::new(InMemoryCloud::new()), dir.path()));
        store.set_principal(Some(principal("g1", "guest@example.com"))).await;

        let before = store.wins().await.len();
        let input = draft();
        let win = store.add_win(input.clone()).await.unwrap();
        let wins = store.wins().await;

        assert_eq!(wins.len(), before + 1);
        let stored = wins.iter().find(|w| w.id == win.id).unwrap();
        assert_eq!(stored.date, input.date);
        assert_eq!(stored.category, input.category);
        assert_eq!(stored.situation, input.situation);
        assert_eq!(stored.action, input.action);
        assert_eq!(stored.impact, input.impact);
        assert_eq!(stored.impact_type, input.impact_type);
        assert_eq!(stored.evidence, input.evidence);
        assert!(!stored.id.is_empty());
        assert_eq!(stored.created_at, stored.updated_at);
    }

    #[tokio::test]
    async fn test_delete_twice_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = WinsStore::new(deps(Arc::new(InMemoryCloud::new()), dir.path()));
        store.set_principal(Some(principal("g1", "guest@example.com"))).await;

        let keep = store.add_win(draft()).await.unwrap();
        let gone = store.add_win(draft()).await.unwrap();
        store.delete_win(&gone.id).await.unwrap();
        let after_once = store.wins().await;
        store.delete_win(&gone.id).await.unwrap();
        assert_eq!(store.wins().await, after_once);
        assert_eq!(after_once.len(), 1);
        assert_eq!(after_once[0].id, keep.id);
    }

    #[tokio::test]
    async fn test_standard_session_never_touches_cloud() {
        let dir = tempfile::tempdir().unwrap();
        let cloud = Arc::new(CountingCloud::new());
        let store = WinsStore::new(deps(cloud.clone(), dir.path()));

        let state = store.set_principal(Some(principal("g1", "guest@example.com"))).await;
        assert_eq!(state, StoreState::LocalLoaded);
        assert_eq!(store.mode().await, Some(StorageMode::Local));

        let win = store.add_win(draft()).await.unwrap();
        let patch = WinPatch {
            impact: Some("Ramp-up time down 60%".into()),
            ..Default::default()
        };
        store.update_win(&win.id, patch).await.unwrap();
        store.delete_win(&win.id).await.unwrap();

        assert_eq!(cloud.calls(), 0);
        let local = LocalStore::for_account(dir.path(), "g1");
        assert_eq!(local.get::<Vec<Win>>(StorageKey::Wins), Some(vec![]));
    }

    #[tokio::test]
    async fn test_privileged_session_never_writes_local_storage() {
        let dir = tempfile::tempdir().unwrap();
        let cloud = Arc::new(CountingCloud::new());
        let store = WinsStore::new(deps(cloud.clone(), dir.path()));

        let state = store.set_principal(Some(principal("o1", OWNER))).await;
        assert_eq!(state, StoreState::CloudSynced);
        assert_eq!(store.mode().await, Some(StorageMode::Cloud));

        let win = store.add_win(draft()).await.unwrap();
        let patch = WinPatch {
            category: Some(WinCategory::Process),
            ..Default::default()
        };
        let updated = store.update_win(&win.id, patch).await.unwrap();
        assert_eq!(updated.category, WinCategory::Process);
        assert_eq!(store.wins().await[0].category, WinCategory::Process);
        store.delete_win(&win.id).await.unwrap();

        assert!(cloud.calls() > 0);
        assert!(store.wins().await.is_empty());
        let local = LocalStore::for_account(dir.path(), "o1");
        assert!(!local.root().exists());
    }

    #[tokio::test]
    async fn test_sign_out_empties_memory() {
        let dir = tempfile::tempdir().unwrap();
        let store = WinsStore::new(deps(Arc::new(InMemoryCloud::new()), dir.path()));
        store.set_principal(Some(principal("g1", "guest@example.com"))).await;
        store.add_win(draft()).await.unwrap();

        assert_eq!(store.set_principal(None).await, StoreState::Empty);
        assert!(store.wins().await.is_empty());
        assert!(matches!(
            store.add_win(draft()).await,
            Err(StoreError::NoSession)
        ));

        // Signing back in reloads what was persisted.
        store.set_principal(Some(principal("g1", "guest@example.com"))).await;
        assert_eq!(store.wins().await.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_local_data_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalStore::for_account(dir.path(), "g1");
        std::fs::create_dir_all(local.root()).unwrap();
        std::fs::write(local.root().join("impactlog-wins.json"), "{{{").unwrap();

        let store = WinsStore::new(deps(Arc::new(InMemoryCloud::new()), dir.path()));
        let state = store.set_principal(Some(principal("g1", "guest@example.com"))).await;
        assert_eq!(state, StoreState::LocalLoaded);
        assert!(store.wins().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_first_snapshot_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (notices, _) = broadcast::channel(4);
        let cloud = Arc::new(StalledCloud { notices });
        let store = WinsStore::new(deps(cloud, dir.path()));

        let state = store.set_principal(Some(principal("o1", OWNER))).await;
        assert_eq!(state, StoreState::CloudSynced);
        assert!(store.wins().await.is_empty());
    }

    #[tokio::test]
    async fn test_claim_drift_keeps_cloud_subscription() {
        let dir = tempfile::tempdir().unwrap();
        let cloud = Arc::new(CountingCloud::new());
        let store = WinsStore::new(deps(cloud.clone(), dir.path()));

        store.set_principal(Some(principal("o1", OWNER))).await;
        let calls = cloud.calls();

        let mut renamed = principal("o1", OWNER);
        renamed.display_name = Some("Owner".into());
        assert_eq!(store.set_principal(Some(renamed)).await, StoreState::CloudSynced);
        assert_eq!(cloud.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cloud_load_does_not_hold_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let (notices, _) = broadcast::channel(4);
        let store = Arc::new(WinsStore::new(deps(Arc::new(StalledCloud { notices }), dir.path())));

        let first = tokio::spawn({
            let store = store.clone();
            async move { store.set_principal(Some(principal("o1", OWNER))).await }
        });
        while store.state() != StoreState::Loading {
            tokio::task::yield_now().await;
        }

        // Reads stay available while the first snapshot is outstanding.
        let mode = tokio::time::timeout(Duration::from_millis(10), store.mode()).await;
        assert_eq!(mode.unwrap(), None);

        // A second request for the same account joins the load in progress.
        let second = store.set_principal(Some(principal("o1", OWNER))).await;
        assert_eq!(second, StoreState::CloudSynced);
        assert_eq!(first.await.unwrap(), StoreState::CloudSynced);
        assert_eq!(store.mode().await, Some(StorageMode::Cloud));
    }

    #[tokio::test]
    async fn test_interrupted_load_resets_state() {
        let dir = tempfile::tempdir().unwrap();
        let (notices, _) = broadcast::channel(4);
        let store = WinsStore::new(deps(Arc::new(StalledCloud { notices }), dir.path()));

        let attempt = tokio::time::timeout(
            Duration::from_millis(1),
            store.set_principal(Some(principal("o1", OWNER))),
        )
        .await;
        assert!(attempt.is_err());
        assert_eq!(store.state(), StoreState::Uninitialized);
    }

    #[tokio::test]
    async fn test_reflection_lookup_by_week() {
        let dir = tempfile::tempdir().unwrap();
        let store = WinsStore::new(deps(Arc::new(InMemoryCloud::new()), dir.path()));
        store.set_principal(Some(principal("g1", "guest@example.com"))).await;
        let monday = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        store
            .add_reflection(NewReflection {
                week_start_date: monday,
                focused_on: Some("Hiring loop".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(store.reflection_for_week(monday).await.is_some());
        assert!(store
            .reflection_for_week(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_uninitialized_until_principal_known() {
        let dir = tempfile::tempdir().unwrap();
        let store = WinsStore::new(deps(Arc::new(InMemoryCloud::new()), dir.path()));
        assert_eq!(store.state(), StoreState::Uninitialized);
        assert_eq!(store.mode().await, None);
        assert_eq!(store.stats(NaiveDate::from_ymd_opt(2024, 1, 8).unwrap()).await.wins_this_week, 0);
    }
}
