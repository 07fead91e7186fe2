//! schema 命名与存在性判定
//!
//! 提供租户 schema 名值对象、`SchemaCatalog` 协议，以及内存版与
//! Postgres 版（`postgres` 特性）的数据库实现。
//!
mod catalog;
mod inmemory;
#[cfg(feature = "postgres")]
mod postgres;
mod schema_name;

pub use catalog::SchemaCatalog;
pub use inmemory::InMemoryDatabase;
#[cfg(feature = "postgres")]
pub use postgres::PgTenantDatabase;
pub use schema_name::{SCHEMA_NAME_DERIVATION_VERSION, SCHEMA_PREFIX, SchemaName};
