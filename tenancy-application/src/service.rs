//! 租户供给服务（TenantProvisioningService）
//!
//! 启动流程：
//! 1. 子系统关闭时直接返回 `None`；
//! 2. 按配置二选一构造供给策略，配置不完整时直接失败；
//! 3. 幂等地落地服务拓扑，参数冲突是致命错误；
//! 4. 以标准处理器（或注入的处理器）构造分发器并开始消费入站队列。
//!
use crate::config::ProvisioningConfig;
use crate::error::{AppError, AppResult};
use bon::Builder;
use std::sync::Arc;
use tenancy_domain::eventing::{
    ConsumerConfig, ConsumerHandle, MessageBroker, TenantEventConsumer, TenantEventDispatcher,
    TenantEventHandlers, TopologyProvisioner,
};
use tenancy_domain::migration::{MigrationSet, MigrationStore};
use tenancy_domain::schema::SchemaCatalog;
use tenancy_domain::strategy::{
    DirectDdlStrategy, MigrationStrategy, ProvisioningStrategy, StrategyKind,
};
use tracing::info;

#[derive(Builder)]
pub struct TenantProvisioningService {
    config: ProvisioningConfig,
    broker: Arc<dyn MessageBroker>,
    catalog: Arc<dyn SchemaCatalog>,
    /// 迁移策略需要
    migration_store: Option<Arc<dyn MigrationStore>>,
    #[builder(default)]
    migrations: Arc<MigrationSet>,
    /// 不提供时使用基于策略的标准处理器
    handlers: Option<TenantEventHandlers>,
}

impl TenantProvisioningService {
    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    /// 按配置构造供给策略
    pub fn strategy(&self) -> AppResult<ProvisioningStrategy> {
        match self.config.strategy {
            StrategyKind::DirectDdl => Ok(DirectDdlStrategy::new(self.catalog.clone()).into()),
            StrategyKind::MigrationBased => {
                let store = self.migration_store.clone().ok_or_else(|| {
                    AppError::Config("migration-based strategy needs a migration store".to_string())
                })?;
                Ok(MigrationStrategy::new(self.catalog.clone(), store, self.migrations.clone()).into())
            }
        }
    }

    /// 启动消费；子系统关闭时返回 `None`
    pub async fn start(&self) -> AppResult<Option<ConsumerHandle>> {
        let config = &self.config;
        if !config.enabled {
            info!(service = %config.service_name, "tenant provisioning disabled");
            return Ok(None);
        }

        // 配置错误要在声明任何拓扑之前暴露
        let strategy = self.strategy()?;
        let provisioner = TopologyProvisioner::new(self.broker.clone(), config.exchanges.clone());
        let topology = provisioner.ensure(&config.service_name).await?;

        info!(
            service = %config.service_name,
            strategy = %strategy.kind(),
            migrations = self.migrations.len(),
            "tenant provisioning strategy selected"
        );

        let handlers = match &self.handlers {
            Some(handlers) => handlers.clone(),
            None => TenantEventHandlers::for_strategy(Arc::new(strategy)),
        };
        let dispatcher = TenantEventDispatcher::new(handlers, config.retry);

        let consumer = TenantEventConsumer::builder()
            .broker(self.broker.clone())
            .dispatcher(dispatcher)
            .queue(topology.inbound.name.clone())
            .config(ConsumerConfig {
                workers: config.workers,
            })
            .build();
        let handle = Arc::new(consumer).start().await?;

        Ok(Some(handle))
    }
}
