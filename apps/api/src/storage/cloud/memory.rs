use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};

use super::{ChangeNotice, CloudMedium};
use crate::models::profile::ProfileRow;
use crate::models::reflection::{NewReflection, ReflectionRow};
use crate::models::win::{NewWin, WinPatch, WinRow};
use crate::storage::StoreError;

/// Process-local cloud medium for development (`CLOUD_BACKEND=memory`) and tests.
/// Same ordering, stamping and notification behaviour as the PostgreSQL medium.
pub struct InMemoryCloud {
    documents: RwLock<Documents>,
    notices: broadcast::Sender<ChangeNotice>,
}

#[derive(Default)]
struct Documents {
    wins: Vec<WinRow>,
    reflections: Vec<ReflectionRow>,
    profiles: HashMap<String, ProfileRow>,
}

impl InMemoryCloud {
    pub fn new() -> Self {
        let (notices, _) = broadcast::channel(64);
        Self {
            documents: RwLock::new(Documents::default()),
            notices,
        }
    }

    fn notify(&self, owner_id: &str) {
        // No subscribers is fine.
        let _ = self.notices.send(ChangeNotice {
            owner_id: owner_id.to_string(),
        });
    }
}

impl Default for InMemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudMedium for InMemoryCloud {
    fn changes(&self) -> broadcast::Receiver<ChangeNotice> {
        self.notices.subscribe()
    }

    async fn query_wins(&self, owner_id: &str) -> Result<Vec<WinRow>, StoreError> {
        let docs = self.documents.read().await;
        let mut wins: Vec<WinRow> = docs
            .wins
            .iter()
            .filter(|w| w.owner_id == owner_id)
            .cloned()
            .collect();
        wins.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(wins)
    }

    async fn insert_win(
        &self,
        owner_id: &str,
        id: &str,
        draft: &NewWin,
    ) -> Result<WinRow, StoreError> {
        let now = Utc::now();
        let row = WinRow {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            date: draft.date,
            category: draft.category.as_str().to_string(),
            situation: draft.situation.clone(),
            action: draft.action.clone(),
            impact: draft.impact.clone(),
            impact_type: draft.impact_type.as_str().to_string(),
            impact_level: draft.impact_level.map(|l| l.as_str().to_string()),
            evidence: draft.evidence.clone(),
            created_at: now,
            updated_at: now,
        };
        self.documents.write().await.wins.push(row.clone());
        self.notify(owner_id);
        Ok(row)
    }

    async fn patch_win(
        &self,
        owner_id: &str,
        id: &str,
        patch: &WinPatch,
    ) -> Result<Option<WinRow>, StoreError> {
        let mut docs = self.documents.write().await;
        let Some(row) = docs
            .wins
            .iter_mut()
            .find(|w| w.id == id && w.owner_id == owner_id)
        else {
            return Ok(None);
        };
        if let Some(date) = patch.date {
            row.date = date;
        }
        if let Some(category) = patch.category {
            row.category = category.as_str().to_string();
        }
        if let Some(situation) = &patch.situation {
            row.situation = situation.clone();
        }
        if let Some(action) = &patch.action {
            row.action = action.clone();
        }
        if let Some(impact) = &patch.impact {
            row.impact = impact.clone();
        }
        if let Some(impact_type) = patch.impact_type {
            row.impact_type = impact_type.as_str().to_string();
        }
        if let Some(level) = patch.impact_level {
            row.impact_level = Some(level.as_str().to_string());
        }
        if let Some(evidence) = &patch.evidence {
            row.evidence = Some(evidence.clone());
        }
        row.updated_at = Utc::now();
        let updated = row.clone();
        drop(docs);
        self.notify(owner_id);
        Ok(Some(updated))
    }

    async fn delete_win(&self, owner_id: &str, id: &str) -> Result<(), StoreError> {
        let mut docs = self.documents.write().await;
        let before = docs.wins.len();
        docs.wins.retain(|w| !(w.id == id && w.owner_id == owner_id));
        let removed = docs.wins.len() != before;
        drop(docs);
        if removed {
            self.notify(owner_id);
        }
        Ok(())
    }

    async fn query_reflections(&self, owner_id: &str) -> Result<Vec<ReflectionRow>, StoreError> {
        let docs = self.documents.read().await;
        let mut reflections: Vec<ReflectionRow> = docs
            .reflections
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        reflections.sort_by(|a, b| {
            b.week_start_date
                .cmp(&a.week_start_date)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(reflections)
    }

    async fn insert_reflection(
        &self,
        owner_id: &str,
        id: &str,
        draft: &NewReflection,
    ) -> Result<ReflectionRow, StoreError> {
        let row = ReflectionRow {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            week_start_date: draft.week_start_date,
            went_well: draft.went_well.clone(),
            unblocked: draft.unblocked.clone(),
            proud_of: draft.proud_of.clone(),
            focused_on: draft.focused_on.clone(),
            contributed: draft.contributed.clone(),
            impact: draft.impact.clone(),
            learned: draft.learned.clone(),
            carry_forward: draft.carry_forward.clone(),
            created_at: Utc::now(),
        };
        self.documents.write().await.reflections.push(row.clone());
        self.notify(owner_id);
        Ok(row)
    }

    async fn load_profile(&self, owner_id: &str) -> Result<Option<ProfileRow>, StoreError> {
        Ok(self.documents.read().await.profiles.get(owner_id).cloned())
    }

    async fn save_profile(&self, row: &ProfileRow) -> Result<ProfileRow, StoreError> {
        let mut saved = row.clone();
        saved.updated_at = Some(Utc::now());
        self.documents
            .write()
            .await
            .profiles
            .insert(saved.owner_id.clone(), saved.clone());
        Ok(saved)
    }
}
