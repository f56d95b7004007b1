use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use super::local::{LocalStore, StorageKey};
use super::{RecordBackend, Snapshot, StorageMode, StoreError};
use crate::identity::Principal;
use crate::models::profile::{ProfilePatch, UserProfile};
use crate::models::reflection::{NewReflection, WeeklyReflection};
use crate::models::win::{NewWin, Win, WinPatch};

/// Backend for standard accounts. Every mutation rewrites the full collection
/// to the local medium and only then publishes it in memory.
pub struct LocalBackend {
    store: LocalStore,
    principal: Principal,
    state: watch::Sender<Arc<Snapshot>>,
    writes: Mutex<()>,
}

impl LocalBackend {
    /// One synchronous read of both collections. Missing or corrupt data loads as empty.
    pub fn load(store: LocalStore, principal: Principal) -> Self {
        let wins: Vec<Win> = store.get(StorageKey::Wins).unwrap_or_default();
        let reflections: Vec<WeeklyReflection> =
            store.get(StorageKey::Reflections).unwrap_or_default();
        info!(
            "Loaded {} wins and {} reflections from {}",
            wins.len(),
            reflections.len(),
            store.root().display()
        );
        let (state, _) = watch::channel(Arc::new(Snapshot { wins, reflections }));
        Self {
            store,
            principal,
            state,
            writes: Mutex::new(()),
        }
    }

    fn commit_wins(&self, wins: Vec<Win>) -> Result<(), StoreError> {
        if !self.store.set(StorageKey::Wins, &wins) {
            return Err(StoreError::LocalWrite(StorageKey::Wins.as_str()));
        }
        self.state.send_modify(|snap| Arc::make_mut(snap).wins = wins);
        Ok(())
    }

    fn commit_reflections(&self, reflections: Vec<WeeklyReflection>) -> Result<(), StoreError> {
        if !self.store.set(StorageKey::Reflections, &reflections) {
            return Err(StoreError::LocalWrite(StorageKey::Reflections.as_str()));
        }
        self.state
            .send_modify(|snap| Arc::make_mut(snap).reflections = reflections);
        Ok(())
    }
}

#[async_trait]
impl RecordBackend for LocalBackend {
    fn mode(&self) -> StorageMode {
        StorageMode::Local
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.state.borrow().clone()
    }

    async fn add_win(&self, draft: NewWin) -> Result<Win, StoreError> {
        let _guard = self.writes.lock().await;
        let win = Win::from_draft(Uuid::new_v4().to_string(), draft, Utc::now());
        let mut wins = self.snapshot().wins.clone();
        wins.insert(0, win.clone());
        self.commit_wins(wins)?;
        debug!("Added win {} locally", win.id);
        Ok(win)
    }

    async fn update_win(&self, id: &str, patch: WinPatch) -> Result<Win, StoreError> {
        let _guard = self.writes.lock().await;
        let mut wins = self.snapshot().wins.clone();
        let win = wins
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        win.apply(&patch, Utc::now());
        let updated = win.clone();
        self.commit_wins(wins)?;
        Ok(updated)
    }

    async fn delete_win(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.writes.lock().await;
        let mut wins = self.snapshot().wins.clone();
        let before = wins.len();
        wins.retain(|w| w.id != id);
        if wins.len() == before {
            debug!("Delete of unknown win {id} ignored");
            return Ok(());
        }
        self.commit_wins(wins)
    }

    async fn add_reflection(&self, draft: NewReflection) -> Result<WeeklyReflection, StoreError> {
        let _guard = self.writes.lock().await;
        let reflection = WeeklyReflection::from_draft(Uuid::new_v4().to_string(), draft, Utc::now());
        let mut reflections = self.snapshot().reflections.clone();
        reflections.insert(0, reflection.clone());
        self.commit_reflections(reflections)?;
        Ok(reflection)
    }

    async fn profile(&self) -> Result<UserProfile, StoreError> {
        Ok(self
            .store
            .get(StorageKey::Profile)
            .unwrap_or_else(|| UserProfile::initial_for(&self.principal)))
    }

    async fn update_profile(&self, patch: ProfilePatch) -> Result<UserProfile, StoreError> {
        let _guard = self.writes.lock().await;
        let mut profile = self.profile().await?;
        profile.apply(&patch, &self.principal, Utc::now());
        if !self.store.set(StorageKey::Profile, &profile) {
            return Err(StoreError::LocalWrite(StorageKey::Profile.as_str()));
        }
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::win::{ImpactType, WinCategory};
    use chrono::NaiveDate;

    fn principal() -> Principal {
        Principal {
            uid: "guest-1".into(),
            email: Some("guest@example.com".into()),
            email_verified: true,
            display_name: Some("Guest".into()),
        }
    }

    fn draft(day: u32) -> NewWin {
        NewWin {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            category: WinCategory::Delivery,
            situation: "Release was slipping".into(),
            action: "I re-sequenced the backlog".into(),
            impact: "Shipped on time".into(),
            impact_type: ImpactType::RiskReduced,
            impact_level: None,
            evidence: None,
        }
    }

    #[tokio::test]
    async fn test_add_prepends_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::load(LocalStore::new(dir.path()), principal());
        let first = backend.add_win(draft(1)).await.unwrap();
        let second = backend.add_win(draft(2)).await.unwrap();

        let ids: Vec<_> = backend.snapshot().wins.iter().map(|w| w.id.clone()).collect();
        assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);

        let reloaded = LocalBackend::load(LocalStore::new(dir.path()), principal());
        assert_eq!(reloaded.snapshot().wins, backend.snapshot().wins);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();
        let backend = LocalBackend::load(LocalStore::new(&blocker), principal());

        let err = backend.add_win(draft(3)).await.unwrap_err();
        assert!(matches!(err, StoreError::LocalWrite("impactlog-wins")));
        assert!(backend.snapshot().wins.is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::load(LocalStore::new(dir.path()), principal());
        let err = backend
            .update_win("missing", WinPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_profile_defaults_then_persists() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::load(LocalStore::new(dir.path()), principal());
        assert_eq!(backend.profile().await.unwrap().display_name, "Guest");

        let patch = ProfilePatch {
            bio: Some("Program lead".into()),
            ..Default::default()
        };
        backend.update_profile(patch).await.unwrap();
        let stored: UserProfile = LocalStore::new(dir.path()).get(StorageKey::Profile).unwrap();
        assert_eq!(stored.bio, "Program lead");
        assert_eq!(stored.email, "guest@example.com");
    }
}
