//! Postgres 版租户数据库（PgTenantDatabase）
//!
//! - schema 存在性查询 `information_schema.schemata`，不做缓存；
//! - `CREATE SCHEMA` / `DROP SCHEMA ... CASCADE` 为单条语句，不包在跨租户的长事务里；
//! - 迁移历史表 `_schema_migrations` 位于租户 schema 内部，随 schema 一起删除；
//!   每条迁移在独立事务中执行，并通过 `SET LOCAL search_path` 限定在目标 schema。
//!
//! schema 名在进入本模块前已由 [`SchemaName`] 校验为 `[a-z0-9_]`，拼接进 DDL 是安全的。

use super::{SchemaCatalog, SchemaName};
use crate::error::{ProvisioningError, ProvisioningResult};
use crate::migration::{Migration, MigrationStore};
use async_trait::async_trait;
use sqlx::PgPool;

const HISTORY_TABLE: &str = "_schema_migrations";

// SQLSTATE
const DUPLICATE_SCHEMA: &str = "42P06";
const INVALID_SCHEMA_NAME: &str = "3F000";

#[derive(Clone)]
pub struct PgTenantDatabase {
    pool: PgPool,
}

impl PgTenantDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

#[async_trait]
impl SchemaCatalog for PgTenantDatabase {
    async fn exists(&self, schema: &SchemaName) -> ProvisioningResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
        )
        .bind(schema.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create_schema(&self, schema: &SchemaName) -> ProvisioningResult<()> {
        let sql = format!("CREATE SCHEMA {}", schema.quoted());
        match sqlx::raw_sql(&sql).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(e) if sqlstate(&e).as_deref() == Some(DUPLICATE_SCHEMA) => {
                Err(ProvisioningError::SchemaAlreadyExists {
                    schema: schema.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn drop_schema(&self, schema: &SchemaName) -> ProvisioningResult<()> {
        let sql = format!("DROP SCHEMA {} CASCADE", schema.quoted());
        match sqlx::raw_sql(&sql).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(e) if sqlstate(&e).as_deref() == Some(INVALID_SCHEMA_NAME) => {
                Err(ProvisioningError::SchemaNotFound {
                    schema: schema.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl MigrationStore for PgTenantDatabase {
    async fn applied_version(&self, schema: &SchemaName) -> ProvisioningResult<Option<i64>> {
        let table = format!("{}.{HISTORY_TABLE}", schema.quoted());
        let registered: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
            .bind(&table)
            .fetch_one(&self.pool)
            .await?;
        if registered.is_none() {
            return Ok(None);
        }

        let version: Option<i64> =
            sqlx::query_scalar(&format!("SELECT MAX(version) FROM {table}"))
                .fetch_one(&self.pool)
                .await?;
        Ok(version)
    }

    async fn apply(&self, schema: &SchemaName, migration: &Migration) -> ProvisioningResult<()> {
        let quoted = schema.quoted();
        let failed = |e: sqlx::Error| ProvisioningError::Migration {
            schema: schema.to_string(),
            version: migration.version(),
            reason: e.to_string(),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::raw_sql(&format!(
            r#"CREATE TABLE IF NOT EXISTS {quoted}.{HISTORY_TABLE} (
                version     BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"#
        ))
        .execute(&mut *tx)
        .await?;

        sqlx::raw_sql(&format!("SET LOCAL search_path TO {quoted}"))
            .execute(&mut *tx)
            .await?;

        sqlx::raw_sql(migration.sql())
            .execute(&mut *tx)
            .await
            .map_err(failed)?;

        sqlx::query(&format!(
            "INSERT INTO {quoted}.{HISTORY_TABLE} (version, description) VALUES ($1, $2)"
        ))
        .bind(migration.version())
        .bind(migration.description())
        .execute(&mut *tx)
        .await
        .map_err(failed)?;

        tx.commit().await?;
        Ok(())
    }
}
