//! 租户 schema 供给的应用层
//!
//! 读取配置、初始化日志，并按配置把拓扑、策略、分发器与消费者组装起来。
//!
pub mod config;
pub mod error;
pub mod service;
pub mod telemetry;

pub use config::ProvisioningConfig;
pub use error::{AppError, AppResult};
pub use service::TenantProvisioningService;
