//! 事件处理器分发表（TenantEventHandlers）
//!
//! 事件类型到处理函数的固定映射，每个服务在启动时由至多四个函数值构造一次。
//! 服务只需注册自己关心的处理器；未注册的类型与未知类型一样被记录后确认。
//!
use crate::context::TenantContext;
use crate::error::ProvisioningResult;
use crate::strategy::TenantProvisioningStrategy;
use crate::tenant_event::{TenantEvent, TenantEventType};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info};

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ProvisioningResult<()>> + Send + 'a>>;

/// 处理函数：接收显式传入的执行上下文与事件
pub type HandlerFn =
    Arc<dyn for<'a> Fn(&'a TenantContext, &'a TenantEvent) -> HandlerFuture<'a> + Send + Sync>;

#[derive(Clone, Default)]
pub struct TenantEventHandlers {
    created: Option<HandlerFn>,
    deleted: Option<HandlerFn>,
    updated: Option<HandlerFn>,
    status_changed: Option<HandlerFn>,
}

impl TenantEventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// 基于供给策略的标准处理器组合
    ///
    /// - CREATED：`initialize`；
    /// - DELETED：`teardown`；
    /// - UPDATED：有待应用迁移时再次 `initialize`，否则空操作；
    /// - STATUS_CHANGED：仅记录状态迁移，不改动 schema。
    pub fn for_strategy(strategy: Arc<dyn TenantProvisioningStrategy>) -> Self {
        let on_created = strategy.clone();
        let on_deleted = strategy.clone();
        let on_updated = strategy;

        Self::new()
            .on_created(move |_ctx, event| {
                let strategy = on_created.clone();
                Box::pin(async move {
                    strategy
                        .initialize(event.tenant_id(), event.schema_name())
                        .await
                })
            })
            .on_deleted(move |_ctx, event| {
                let strategy = on_deleted.clone();
                Box::pin(async move {
                    strategy
                        .teardown(event.tenant_id(), event.schema_name())
                        .await
                })
            })
            .on_updated(move |_ctx, event| {
                let strategy = on_updated.clone();
                Box::pin(async move {
                    if strategy.is_migration_pending(event.schema_name()).await? {
                        info!(
                            tenant_id = event.tenant_id(),
                            schema = %event.schema_name(),
                            "pending migrations found, re-initializing"
                        );
                        strategy
                            .initialize(event.tenant_id(), event.schema_name())
                            .await
                    } else {
                        debug!(
                            tenant_id = event.tenant_id(),
                            schema = %event.schema_name(),
                            "nothing pending for update"
                        );
                        Ok(())
                    }
                })
            })
            .on_status_changed(|_ctx, event| {
                Box::pin(async move {
                    info!(
                        tenant_id = event.tenant_id(),
                        status = event.status().unwrap_or("<none>"),
                        "tenant status changed"
                    );
                    Ok(())
                })
            })
    }

    pub fn on_created<F>(mut self, handler: F) -> Self
    where
        F: for<'a> Fn(&'a TenantContext, &'a TenantEvent) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.created = Some(Arc::new(handler));
        self
    }

    pub fn on_deleted<F>(mut self, handler: F) -> Self
    where
        F: for<'a> Fn(&'a TenantContext, &'a TenantEvent) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.deleted = Some(Arc::new(handler));
        self
    }

    pub fn on_updated<F>(mut self, handler: F) -> Self
    where
        F: for<'a> Fn(&'a TenantContext, &'a TenantEvent) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.updated = Some(Arc::new(handler));
        self
    }

    pub fn on_status_changed<F>(mut self, handler: F) -> Self
    where
        F: for<'a> Fn(&'a TenantContext, &'a TenantEvent) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.status_changed = Some(Arc::new(handler));
        self
    }

    /// 查找事件类型对应的处理器
    pub fn resolve(&self, event_type: &TenantEventType) -> Option<&HandlerFn> {
        match event_type {
            TenantEventType::Created => self.created.as_ref(),
            TenantEventType::Deleted => self.deleted.as_ref(),
            TenantEventType::Updated => self.updated.as_ref(),
            TenantEventType::StatusChanged => self.status_changed.as_ref(),
            TenantEventType::Other(_) => None,
        }
    }
}
