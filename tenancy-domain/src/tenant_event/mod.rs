//! 租户事件契约（Tenant Event Contract）
//!
//! 定义注册中心发布的租户生命周期事件的线上格式与事件类型。
//! `schemaName` 是 `tenantId` 的纯函数，见 [`crate::schema::SchemaName::derive`]。

mod event;
mod event_type;

pub use event::TenantEvent;
pub use event_type::TenantEventType;
