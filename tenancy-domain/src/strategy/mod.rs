//! schema 供给策略（Provisioning Strategy）
//!
//! 业务服务唯一可以依赖的契约是 [`TenantProvisioningStrategy`]：
//! `initialize` / `teardown` / `is_migration_pending`。
//!
//! 两种实现：
//! - [`DirectDdlStrategy`]：直接建/删 schema，没有迁移概念；
//! - [`MigrationStrategy`]：建 schema 后运行版本化迁移。
//!
//! 两者都必须容忍同一租户被重复调用（至少一次投递、人工重放）：
//! "已经完成"的路径记录日志后直接返回，不视为错误。
//! 启动时由配置在 [`ProvisioningStrategy`] 的两个变体中二选一，运行期不可切换。
//!
mod direct_ddl;
mod migration;

pub use direct_ddl::DirectDdlStrategy;
pub use migration::MigrationStrategy;

use crate::error::{ProvisioningError, ProvisioningResult};
use crate::schema::{SchemaCatalog, SchemaName};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

/// 租户 schema 供给契约
#[async_trait]
pub trait TenantProvisioningStrategy: Send + Sync {
    /// 为租户准备 schema；重复调用安全
    async fn initialize(&self, tenant_id: &str, schema: &SchemaName) -> ProvisioningResult<()>;

    /// 删除租户 schema；schema 不存在时为空操作
    async fn teardown(&self, tenant_id: &str, schema: &SchemaName) -> ProvisioningResult<()>;

    /// 是否存在尚未应用到该 schema 的迁移
    async fn is_migration_pending(&self, schema: &SchemaName) -> ProvisioningResult<bool>;
}

/// 策略类型（配置项）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    DirectDdl,
    MigrationBased,
}

impl StrategyKind {
    /// 对应配置中的"启用迁移"开关
    pub fn from_migrations_enabled(enabled: bool) -> Self {
        if enabled {
            Self::MigrationBased
        } else {
            Self::DirectDdl
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectDdl => "direct-ddl",
            Self::MigrationBased => "migration-based",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ProvisioningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct-ddl" | "direct" | "ddl" => Ok(Self::DirectDdl),
            "migration-based" | "migration" | "migrations" => Ok(Self::MigrationBased),
            other => Err(ProvisioningError::InvalidStrategy {
                value: other.to_string(),
            }),
        }
    }
}

/// 启动时选定的供给策略
#[derive(Clone)]
pub enum ProvisioningStrategy {
    DirectDdl(DirectDdlStrategy),
    MigrationBased(MigrationStrategy),
}

impl ProvisioningStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::DirectDdl(_) => StrategyKind::DirectDdl,
            Self::MigrationBased(_) => StrategyKind::MigrationBased,
        }
    }
}

impl From<DirectDdlStrategy> for ProvisioningStrategy {
    fn from(value: DirectDdlStrategy) -> Self {
        Self::DirectDdl(value)
    }
}

impl From<MigrationStrategy> for ProvisioningStrategy {
    fn from(value: MigrationStrategy) -> Self {
        Self::MigrationBased(value)
    }
}

#[async_trait]
impl TenantProvisioningStrategy for ProvisioningStrategy {
    async fn initialize(&self, tenant_id: &str, schema: &SchemaName) -> ProvisioningResult<()> {
        match self {
            Self::DirectDdl(s) => s.initialize(tenant_id, schema).await,
            Self::MigrationBased(s) => s.initialize(tenant_id, schema).await,
        }
    }

    async fn teardown(&self, tenant_id: &str, schema: &SchemaName) -> ProvisioningResult<()> {
        match self {
            Self::DirectDdl(s) => s.teardown(tenant_id, schema).await,
            Self::MigrationBased(s) => s.teardown(tenant_id, schema).await,
        }
    }

    async fn is_migration_pending(&self, schema: &SchemaName) -> ProvisioningResult<bool> {
        match self {
            Self::DirectDdl(s) => s.is_migration_pending(schema).await,
            Self::MigrationBased(s) => s.is_migration_pending(schema).await,
        }
    }
}

/// schema 不存在则创建；已存在（包括与并发重投递竞争落败）时记录日志并跳过
pub(crate) async fn ensure_schema(
    catalog: &dyn SchemaCatalog,
    tenant_id: &str,
    schema: &SchemaName,
) -> ProvisioningResult<()> {
    if catalog.exists(schema).await? {
        info!(tenant_id, schema = %schema, "schema already exists, skipping create");
        return Ok(());
    }

    match catalog.create_schema(schema).await {
        Ok(()) => {
            info!(tenant_id, schema = %schema, "schema created");
            Ok(())
        }
        Err(ProvisioningError::SchemaAlreadyExists { .. }) => {
            warn!(tenant_id, schema = %schema, "schema created concurrently, skipping create");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// schema 存在则删除；不存在时记录日志并跳过
pub(crate) async fn remove_schema(
    catalog: &dyn SchemaCatalog,
    tenant_id: &str,
    schema: &SchemaName,
) -> ProvisioningResult<()> {
    if !catalog.exists(schema).await? {
        info!(tenant_id, schema = %schema, "schema absent, skipping drop");
        return Ok(());
    }

    match catalog.drop_schema(schema).await {
        Ok(()) => {
            info!(tenant_id, schema = %schema, "schema dropped");
            Ok(())
        }
        Err(ProvisioningError::SchemaNotFound { .. }) => {
            warn!(tenant_id, schema = %schema, "schema dropped concurrently, skipping drop");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_kind_parses_config_values() {
        assert_eq!(
            "migration".parse::<StrategyKind>().unwrap(),
            StrategyKind::MigrationBased
        );
        assert_eq!(
            " Direct-DDL ".parse::<StrategyKind>().unwrap(),
            StrategyKind::DirectDdl
        );
        assert!("flyway".parse::<StrategyKind>().is_err());
        assert_eq!(
            StrategyKind::from_migrations_enabled(true),
            StrategyKind::MigrationBased
        );
        assert_eq!(StrategyKind::default(), StrategyKind::DirectDdl);
    }
}
