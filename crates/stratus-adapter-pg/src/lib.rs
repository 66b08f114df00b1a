//! Postgres implementation of the Stratus stores.
//!
//! One [`PgStore`] serves the resource registry, resource groups and audit
//! results. Queries are checked at runtime (`sqlx::query`), so building the
//! crate needs no live database.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use stratus_core::DatabaseConfig;
use stratus_runtime::StoreError;
use tracing::info;

mod groups;
mod resources;
mod results;

/// Tables are created on [`PgStore::bootstrap`] when missing.
const SCHEMA: &[&str] = &[
    r#"
    create table if not exists resources (
        id bigserial primary key,
        uid text not null,
        name text not null,
        resource_type text not null,
        status text not null,
        cloud_account_id bigint not null,
        provider text not null,
        region text not null default '',
        settings jsonb,
        created_at timestamptz not null default now(),
        updated_at timestamptz not null default now(),
        unique (cloud_account_id, uid)
    )
    "#,
    r#"
    create table if not exists resource_groups (
        id bigserial primary key,
        cloud_account_id bigint not null,
        name text not null,
        created_at timestamptz not null default now(),
        unique (cloud_account_id, name)
    )
    "#,
    r#"
    create table if not exists resource_group_members (
        group_id bigint not null references resource_groups(id) on delete cascade,
        resource_id bigint not null references resources(id) on delete cascade,
        position bigserial,
        primary key (group_id, resource_id)
    )
    "#,
    r#"
    create table if not exists audit_results (
        id bigserial primary key,
        cloud_account_id bigint not null,
        rule_id text not null,
        evaluated_at timestamptz not null,
        state text not null,
        data jsonb not null default '[]'::jsonb,
        unique (cloud_account_id, rule_id, evaluated_at)
    )
    "#,
    r#"
    create index if not exists audit_results_last_run
        on audit_results (cloud_account_id, rule_id, evaluated_at desc)
    "#,
];

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect using the `database` configuration section.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StoreError::Database("database.url is not set".to_string()))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await
            .map_err(db_error)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create missing tables and indexes.
    pub async fn bootstrap(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        }
        info!(tables = 4, "Database schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub(crate) fn db_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(e.to_string()),
        _ => StoreError::Database(e.to_string()),
    }
}

pub(crate) fn decode_error(what: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Database(format!("failed to decode {what}: {e}"))
}
