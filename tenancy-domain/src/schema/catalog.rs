use super::SchemaName;
use crate::error::ProvisioningResult;
use async_trait::async_trait;

/// schema 存在性判定（Schema Existence Oracle）
///
/// `create_schema`/`drop_schema` 是不幂等的原语：在已存在的 schema 上创建返回
/// `SchemaAlreadyExists`，删除不存在的 schema 返回 `SchemaNotFound`。
/// 幂等性由调用方先 `exists` 再操作来保证。
#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    /// 查询数据库目录；每次都重新查询，不做缓存
    async fn exists(&self, schema: &SchemaName) -> ProvisioningResult<bool>;

    /// 创建 schema
    async fn create_schema(&self, schema: &SchemaName) -> ProvisioningResult<()>;

    /// 级联删除 schema（连同 schema 内的迁移历史）
    async fn drop_schema(&self, schema: &SchemaName) -> ProvisioningResult<()>;
}
