use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{StoreDeps, StoreState, WinsStore};
use crate::identity::Principal;

struct Entry {
    store: Arc<WinsStore>,
    last_seen: Instant,
}

/// One `WinsStore` per signed-in account, created on first request and closed
/// on sign-out or after sitting idle.
pub struct SessionRegistry {
    deps: StoreDeps,
    sessions: RwLock<HashMap<String, Entry>>,
}

impl SessionRegistry {
    pub fn new(deps: StoreDeps) -> Self {
        Self {
            deps,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the principal's store, loading it on first use, and marks the
    /// session as seen.
    pub async fn open(&self, principal: &Principal) -> Arc<WinsStore> {
        let store = {
            let mut sessions = self.sessions.write().await;
            let entry = sessions
                .entry(principal.uid.clone())
                .or_insert_with(|| Entry {
                    store: Arc::new(WinsStore::new(self.deps.clone())),
                    last_seen: Instant::now(),
                });
            entry.last_seen = Instant::now();
            entry.store.clone()
        };
        store.set_principal(Some(principal.clone())).await;
        store
    }

    /// Signs the account out. The store empties and any cloud subscription is torn down.
    pub async fn close(&self, uid: &str) -> bool {
        let removed = self.sessions.write().await.remove(uid);
        match removed {
            Some(entry) => {
                let state = entry.store.set_principal(None).await;
                debug_assert_eq!(state, StoreState::Empty);
                info!("Session closed for {uid}");
                true
            }
            None => false,
        }
    }

    /// Closes every session not seen within `idle`. Returns how many were closed.
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let stale: Vec<String> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_seen) >= idle)
            .map(|(uid, _)| uid.clone())
            .collect();

        let mut closed = 0;
        for uid in stale {
            let removed = {
                let mut sessions = self.sessions.write().await;
                // Seen again since the scan.
                match sessions.get(&uid) {
                    Some(entry) if now.duration_since(entry.last_seen) >= idle => sessions.remove(&uid),
                    _ => None,
                }
            };
            if let Some(entry) = removed {
                entry.store.set_principal(None).await;
                debug!("Evicted idle session {uid}");
                closed += 1;
            }
        }
        if closed > 0 {
            info!("Closed {closed} idle sessions");
        }
        closed
    }

    /// Runs `evict_idle` every `every` until the handle is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, idle: Duration, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.evict_idle(idle).await;
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
