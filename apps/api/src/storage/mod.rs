// Persistence backends behind one capability interface.
// A session picks exactly one `RecordBackend` when it loads and keeps it until sign-out.

pub mod cloud;
pub mod local;
pub mod local_backend;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::profile::{ProfilePatch, UserProfile};
use crate::models::reflection::{NewReflection, WeeklyReflection};
use crate::models::win::{NewWin, Win, WinPatch};
use crate::models::UnknownVariant;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to persist '{0}' to local storage")]
    LocalWrite(&'static str),

    #[error("Win {0} not found")]
    NotFound(String),

    #[error("Malformed cloud document: {0}")]
    Malformed(#[from] UnknownVariant),

    #[error("No active session")]
    NoSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    Cloud,
    Local,
}

/// Complete record set of one account, as last confirmed by its medium.
/// Wins are ordered newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub wins: Vec<Win>,
    pub reflections: Vec<WeeklyReflection>,
}

/// Operations every backend offers.
///
/// Mutations are confirmation-based: the in-memory snapshot changes only
/// after the medium accepted the write, and before the call returns.
#[async_trait]
pub trait RecordBackend: Send + Sync {
    fn mode(&self) -> StorageMode;

    fn snapshot(&self) -> Arc<Snapshot>;

    async fn add_win(&self, draft: NewWin) -> Result<Win, StoreError>;

    /// Fails with `NotFound` when no win has this id.
    async fn update_win(&self, id: &str, patch: WinPatch) -> Result<Win, StoreError>;

    /// Deleting an unknown id is a no-op.
    async fn delete_win(&self, id: &str) -> Result<(), StoreError>;

    async fn add_reflection(&self, draft: NewReflection) -> Result<WeeklyReflection, StoreError>;

    async fn profile(&self) -> Result<UserProfile, StoreError>;

    async fn update_profile(&self, patch: ProfilePatch) -> Result<UserProfile, StoreError>;
}
