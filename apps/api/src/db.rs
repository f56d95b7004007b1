use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS wins (
        id           TEXT PRIMARY KEY,
        owner_id     TEXT NOT NULL,
        date         DATE NOT NULL,
        category     TEXT NOT NULL,
        situation    TEXT NOT NULL,
        action       TEXT NOT NULL,
        impact       TEXT NOT NULL,
        impact_type  TEXT NOT NULL,
        impact_level TEXT,
        evidence     TEXT,
        created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at   TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS wins_owner_date_idx ON wins (owner_id, date DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS reflections (
        id              TEXT PRIMARY KEY,
        owner_id        TEXT NOT NULL,
        week_start_date DATE NOT NULL,
        went_well       TEXT,
        unblocked       TEXT,
        proud_of        TEXT,
        focused_on      TEXT,
        contributed     TEXT,
        impact          TEXT,
        learned         TEXT,
        carry_forward   TEXT,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS profiles (
        owner_id     TEXT PRIMARY KEY,
        display_name TEXT NOT NULL,
        email        TEXT NOT NULL,
        role         TEXT NOT NULL,
        bio          TEXT NOT NULL,
        status       TEXT NOT NULL,
        photo_url    TEXT,
        updated_at   TIMESTAMPTZ
    )
    "#,
];

/// Creates the cloud collections if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("Failed to apply schema")?;
    }
    info!("Cloud schema ready");
    Ok(())
}
