//! 租户执行上下文
//!
//! 一次事件处理期间生效的 (租户 ID, schema 名) 绑定，以参数形式显式向下传递，
//! 不使用线程局部或全局状态；并发处理不同租户时互不可见。
//!
use crate::schema::SchemaName;
use crate::tenant_event::TenantEvent;

/// 系统租户 ID：处理生命周期事件时使用（事件自身的 schema 可能尚未创建）
pub const SYSTEM_TENANT_ID: &str = "system";
/// 系统租户绑定的 schema
pub const SYSTEM_SCHEMA: &str = "public";

/// 租户执行上下文（不可变）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: String,
    schema_name: SchemaName,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>, schema_name: SchemaName) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            schema_name,
        }
    }

    /// 系统租户上下文
    pub fn system() -> Self {
        Self {
            tenant_id: SYSTEM_TENANT_ID.to_string(),
            schema_name: SchemaName::new_unchecked(SYSTEM_SCHEMA),
        }
    }

    /// 事件所属租户的上下文（仅在 schema 已存在后使用）
    pub fn for_event(event: &TenantEvent) -> Self {
        Self::new(event.tenant_id(), event.schema_name().clone())
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn schema_name(&self) -> &SchemaName {
        &self.schema_name
    }

    pub fn is_system(&self) -> bool {
        self.tenant_id == SYSTEM_TENANT_ID
    }
}
