use super::{Migration, MigrationSet};
use crate::error::ProvisioningResult;
use crate::schema::SchemaName;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// 迁移历史存储：记录某个 schema 已应用的迁移版本
///
/// 历史表位于 schema 内部，随 schema 一起删除。
#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// 已应用的最高版本；schema 或历史表不存在时返回 `None`
    async fn applied_version(&self, schema: &SchemaName) -> ProvisioningResult<Option<i64>>;

    /// 在 schema 内执行一条迁移并记录版本（原子完成）
    async fn apply(&self, schema: &SchemaName, migration: &Migration) -> ProvisioningResult<()>;
}

/// 一次迁移运行的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// 本次新应用的版本（升序）
    pub applied: Vec<i64>,
    /// 运行结束后 schema 的版本
    pub current_version: Option<i64>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// 版本化迁移执行器
///
/// 通过版本比较跳过已应用的迁移，重复运行是幂等的。
#[derive(Clone)]
pub struct MigrationRunner {
    migrations: Arc<MigrationSet>,
    store: Arc<dyn MigrationStore>,
}

impl MigrationRunner {
    pub fn new(migrations: Arc<MigrationSet>, store: Arc<dyn MigrationStore>) -> Self {
        Self { migrations, store }
    }

    pub fn migrations(&self) -> &MigrationSet {
        &self.migrations
    }

    /// 最新可用版本是否高于 schema 已记录的版本
    pub async fn is_pending(&self, schema: &SchemaName) -> ProvisioningResult<bool> {
        let Some(latest) = self.migrations.latest_version() else {
            return Ok(false);
        };
        let applied = self.store.applied_version(schema).await?;
        Ok(applied.is_none_or(|v| v < latest))
    }

    /// 应用所有高于已记录版本的迁移
    pub async fn run(&self, schema: &SchemaName) -> ProvisioningResult<MigrationReport> {
        let mut current = self.store.applied_version(schema).await?;
        let pending = self.migrations.pending_after(current);

        if pending.is_empty() {
            debug!(schema = %schema, version = ?current, "schema is up to date");
            return Ok(MigrationReport {
                applied: Vec::new(),
                current_version: current,
            });
        }

        let mut applied = Vec::with_capacity(pending.len());
        for migration in pending {
            self.store.apply(schema, migration).await?;
            info!(
                schema = %schema,
                version = migration.version(),
                description = migration.description(),
                "migration applied"
            );
            applied.push(migration.version());
            current = Some(migration.version());
        }

        Ok(MigrationReport {
            applied,
            current_version: current,
        })
    }
}
