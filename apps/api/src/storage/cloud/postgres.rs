use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::{ChangeNotice, CloudMedium};
use crate::models::profile::ProfileRow;
use crate::models::reflection::{NewReflection, ReflectionRow};
use crate::models::win::{NewWin, WinPatch, WinRow};
use crate::storage::StoreError;

/// NOTIFY channel carrying the owner id of every write.
pub const CHANGE_CHANNEL: &str = "impactlog_changes";

/// PostgreSQL-backed cloud medium. Dates are stored as `DATE`, audit
/// timestamps as `TIMESTAMPTZ` stamped by the server with `now()`.
pub struct PgCloudStore {
    pool: PgPool,
    notices: broadcast::Sender<ChangeNotice>,
    listener: JoinHandle<()>,
}

impl PgCloudStore {
    /// Opens a dedicated LISTEN connection and fans notifications out to subscribers.
    pub async fn connect(pool: PgPool) -> Result<Self> {
        let mut pg_listener = PgListener::connect_with(&pool).await?;
        pg_listener.listen(CHANGE_CHANNEL).await?;
        info!("Listening for cloud changes on '{CHANGE_CHANNEL}'");

        let (notices, _) = broadcast::channel(256);
        let fan_out = notices.clone();
        let listener = tokio::spawn(async move {
            loop {
                match pg_listener.recv().await {
                    Ok(notification) => {
                        let _ = fan_out.send(ChangeNotice {
                            owner_id: notification.payload().to_string(),
                        });
                    }
                    Err(e) => {
                        // PgListener reconnects on the next recv.
                        error!("Change listener error: {e}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok(Self {
            pool,
            notices,
            listener,
        })
    }

    /// The write is already committed; a failed notify only delays other subscribers.
    async fn notify(&self, owner_id: &str) {
        if let Err(e) = sqlx::query("SELECT pg_notify($1, $2)")
            .bind(CHANGE_CHANNEL)
            .bind(owner_id)
            .execute(&self.pool)
            .await
        {
            error!("Failed to notify changes for {owner_id}: {e}");
        }
    }
}

impl Drop for PgCloudStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[async_trait]
impl CloudMedium for PgCloudStore {
    fn changes(&self) -> broadcast::Receiver<ChangeNotice> {
        self.notices.subscribe()
    }

    async fn query_wins(&self, owner_id: &str) -> Result<Vec<WinRow>, StoreError> {
        Ok(sqlx::query_as::<_, WinRow>(
            "SELECT * FROM wins WHERE owner_id = $1 ORDER BY date DESC, created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_win(
        &self,
        owner_id: &str,
        id: &str,
        draft: &NewWin,
    ) -> Result<WinRow, StoreError> {
        let row = sqlx::query_as::<_, WinRow>(
            r#"
            INSERT INTO wins
                (id, owner_id, date, category, situation, action, impact,
                 impact_type, impact_level, evidence, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now(), now())
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(draft.date)
        .bind(draft.category.as_str())
        .bind(&draft.situation)
        .bind(&draft.action)
        .bind(&draft.impact)
        .bind(draft.impact_type.as_str())
        .bind(draft.impact_level.map(|l| l.as_str()))
        .bind(draft.evidence.as_deref())
        .fetch_one(&self.pool)
        .await?;

        self.notify(owner_id).await;
        Ok(row)
    }

    async fn patch_win(
        &self,
        owner_id: &str,
        id: &str,
        patch: &WinPatch,
    ) -> Result<Option<WinRow>, StoreError> {
        let row = sqlx::query_as::<_, WinRow>(
            r#"
            UPDATE wins SET
                date         = COALESCE($3, date),
                category     = COALESCE($4, category),
                situation    = COALESCE($5, situation),
                action       = COALESCE($6, action),
                impact       = COALESCE($7, impact),
                impact_type  = COALESCE($8, impact_type),
                impact_level = COALESCE($9, impact_level),
                evidence     = COALESCE($10, evidence),
                updated_at   = now()
            WHERE id = $1 AND owner_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(patch.date)
        .bind(patch.category.map(|c| c.as_str()))
        .bind(patch.situation.as_deref())
        .bind(patch.action.as_deref())
        .bind(patch.impact.as_deref())
        .bind(patch.impact_type.map(|t| t.as_str()))
        .bind(patch.impact_level.map(|l| l.as_str()))
        .bind(patch.evidence.as_deref())
        .fetch_optional(&self.pool)
        .await?;

        if row.is_some() {
            self.notify(owner_id).await;
        }
        Ok(row)
    }

    async fn delete_win(&self, owner_id: &str, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM wins WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            self.notify(owner_id).await;
        }
        Ok(())
    }

    async fn query_reflections(&self, owner_id: &str) -> Result<Vec<ReflectionRow>, StoreError> {
        Ok(sqlx::query_as::<_, ReflectionRow>(
            "SELECT * FROM reflections WHERE owner_id = $1 ORDER BY week_start_date DESC, created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_reflection(
        &self,
        owner_id: &str,
        id: &str,
        draft: &NewReflection,
    ) -> Result<ReflectionRow, StoreError> {
        let row = sqlx::query_as::<_, ReflectionRow>(
            r#"
            INSERT INTO reflections
                (id, owner_id, week_start_date, went_well, unblocked, proud_of,
                 focused_on, contributed, impact, learned, carry_forward, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now())
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(draft.week_start_date)
        .bind(draft.went_well.as_deref())
        .bind(draft.unblocked.as_deref())
        .bind(draft.proud_of.as_deref())
        .bind(draft.focused_on.as_deref())
        .bind(draft.contributed.as_deref())
        .bind(draft.impact.as_deref())
        .bind(draft.learned.as_deref())
        .bind(draft.carry_forward.as_deref())
        .fetch_one(&self.pool)
        .await?;

        self.notify(owner_id).await;
        Ok(row)
    }

    async fn load_profile(&self, owner_id: &str) -> Result<Option<ProfileRow>, StoreError> {
        Ok(
            sqlx::query_as::<_, ProfileRow>("SELECT * FROM profiles WHERE owner_id = $1")
                .bind(owner_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn save_profile(&self, row: &ProfileRow) -> Result<ProfileRow, StoreError> {
        Ok(sqlx::query_as::<_, ProfileRow>(
            r#"
            INSERT INTO profiles
                (owner_id, display_name, email, role, bio, status, photo_url, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, now())
            ON CONFLICT (owner_id) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                email        = EXCLUDED.email,
                role         = EXCLUDED.role,
                bio          = EXCLUDED.bio,
                status       = EXCLUDED.status,
                photo_url    = EXCLUDED.photo_url,
                updated_at   = now()
            RETURNING *
            "#,
        )
        .bind(&row.owner_id)
        .bind(&row.display_name)
        .bind(&row.email)
        .bind(&row.role)
        .bind(&row.bio)
        .bind(&row.status)
        .bind(row.photo_url.as_deref())
        .fetch_one(&self.pool)
        .await?)
    }
}
