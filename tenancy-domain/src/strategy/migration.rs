use super::{TenantProvisioningStrategy, ensure_schema, remove_schema};
use crate::error::ProvisioningResult;
use crate::migration::{MigrationRunner, MigrationSet, MigrationStore};
use crate::schema::{SchemaCatalog, SchemaName};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// 基于迁移的策略：确保 schema 存在后运行版本化迁移
///
/// - `initialize`：建 schema（已存在则跳过），再只应用高于已记录版本的迁移；
/// - `teardown`：删除 schema，schema 内的迁移历史随之删除；
/// - `is_migration_pending`：schema 不存在或最新可用版本高于已记录版本。
#[derive(Clone)]
pub struct MigrationStrategy {
    catalog: Arc<dyn SchemaCatalog>,
    runner: MigrationRunner,
}

impl MigrationStrategy {
    pub fn new(
        catalog: Arc<dyn SchemaCatalog>,
        store: Arc<dyn MigrationStore>,
        migrations: Arc<MigrationSet>,
    ) -> Self {
        Self {
            catalog,
            runner: MigrationRunner::new(migrations, store),
        }
    }

    pub fn runner(&self) -> &MigrationRunner {
        &self.runner
    }
}

#[async_trait]
impl TenantProvisioningStrategy for MigrationStrategy {
    async fn initialize(&self, tenant_id: &str, schema: &SchemaName) -> ProvisioningResult<()> {
        ensure_schema(self.catalog.as_ref(), tenant_id, schema).await?;

        let report = self.runner.run(schema).await?;
        if !report.is_noop() {
            info!(
                tenant_id,
                schema = %schema,
                applied = ?report.applied,
                version = ?report.current_version,
                "tenant schema migrated"
            );
        }
        Ok(())
    }

    async fn teardown(&self, tenant_id: &str, schema: &SchemaName) -> ProvisioningResult<()> {
        remove_schema(self.catalog.as_ref(), tenant_id, schema).await
    }

    async fn is_migration_pending(&self, schema: &SchemaName) -> ProvisioningResult<bool> {
        if !self.catalog.exists(schema).await? {
            return Ok(true);
        }
        self.runner.is_pending(schema).await
    }
}
