//! 版本化迁移（migration）
//!
//! - `MigrationSet`：按版本排序、校验过的迁移脚本集合；
//! - `MigrationStore`：schema 内迁移历史的读写协议；
//! - `MigrationRunner`：比较版本并只应用尚未应用的迁移。
//!
mod migration_set;
mod runner;

pub use migration_set::{Migration, MigrationSet};
pub use runner::{MigrationReport, MigrationRunner, MigrationStore};
