//! 多租户 schema 供给与租户生命周期事件处理
//!
//! 租户管理方向共享主题交换机发布 CREATED / DELETED / UPDATED / STATUS_CHANGED 事件，
//! 每个业务服务消费自己的入站队列，据此创建、迁移或删除租户私有的数据库 schema。
//!
//! 模块划分：
//! - [`tenant_event`]：事件载荷与事件类型；
//! - [`schema`]：schema 命名与存在性判定；
//! - [`migration`]：版本化迁移集合与执行器；
//! - [`strategy`]：Direct-DDL / Migration-Based 两种供给策略；
//! - [`context`]：显式传入处理器的租户执行上下文；
//! - [`eventing`]（`eventing` 特性）：拓扑、分发、重试与消费引擎。
//!
pub mod context;
pub mod error;
#[cfg(feature = "eventing")]
pub mod eventing;
pub mod migration;
pub mod schema;
pub mod strategy;
pub mod tenant_event;
