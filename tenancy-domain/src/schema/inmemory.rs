//! 内存版租户数据库（InMemoryDatabase）
//!
//! 同时实现 `SchemaCatalog` 与 `MigrationStore`：迁移历史挂在 schema 下，
//! 删除 schema 时一并丢弃，与真实数据库的 schema 内历史表语义一致。
//!
//! 典型用途：测试环境、示例与本地开发。提供执行计数与故障注入，
//! 便于断言幂等性与重试行为。

use super::{SchemaCatalog, SchemaName};
use crate::error::{ProvisioningError, ProvisioningResult};
use crate::migration::{Migration, MigrationStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    /// schema -> 已应用的迁移版本
    schemas: Mutex<BTreeMap<SchemaName, Vec<i64>>>,
    creates: AtomicUsize,
    drops: AtomicUsize,
    migrations_executed: AtomicUsize,
    fail_next: AtomicUsize,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// 后续 `n` 次调用（任意操作）返回瞬时数据库错误
    pub fn fail_next(&self, n: usize) {
        self.inner.fail_next.store(n, Ordering::SeqCst);
    }

    /// 当前存在的 schema
    pub fn schemas(&self) -> Vec<SchemaName> {
        self.state().keys().cloned().collect()
    }

    /// 某个 schema 已应用的迁移版本
    pub fn history(&self, schema: &SchemaName) -> Option<Vec<i64>> {
        self.state().get(schema).cloned()
    }

    pub fn create_count(&self) -> usize {
        self.inner.creates.load(Ordering::SeqCst)
    }

    pub fn drop_count(&self) -> usize {
        self.inner.drops.load(Ordering::SeqCst)
    }

    /// 实际执行过的迁移脚本次数
    pub fn migrations_executed(&self) -> usize {
        self.inner.migrations_executed.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, BTreeMap<SchemaName, Vec<i64>>> {
        // 持锁期间不会 panic，出现中毒时沿用内部数据
        self.inner
            .schemas
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> ProvisioningResult<()> {
        let injected = self
            .inner
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(ProvisioningError::database("injected failure: database unavailable")),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl SchemaCatalog for InMemoryDatabase {
    async fn exists(&self, schema: &SchemaName) -> ProvisioningResult<bool> {
        self.check_available()?;
        Ok(self.state().contains_key(schema))
    }

    async fn create_schema(&self, schema: &SchemaName) -> ProvisioningResult<()> {
        self.check_available()?;
        let mut state = self.state();
        if state.contains_key(schema) {
            return Err(ProvisioningError::SchemaAlreadyExists {
                schema: schema.to_string(),
            });
        }
        state.insert(schema.clone(), Vec::new());
        self.inner.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn drop_schema(&self, schema: &SchemaName) -> ProvisioningResult<()> {
        self.check_available()?;
        if self.state().remove(schema).is_none() {
            return Err(ProvisioningError::SchemaNotFound {
                schema: schema.to_string(),
            });
        }
        self.inner.drops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl MigrationStore for InMemoryDatabase {
    async fn applied_version(&self, schema: &SchemaName) -> ProvisioningResult<Option<i64>> {
        self.check_available()?;
        Ok(self
            .state()
            .get(schema)
            .and_then(|history| history.iter().copied().max()))
    }

    async fn apply(&self, schema: &SchemaName, migration: &Migration) -> ProvisioningResult<()> {
        self.check_available()?;
        let mut state = self.state();
        let Some(history) = state.get_mut(schema) else {
            return Err(ProvisioningError::SchemaNotFound {
                schema: schema.to_string(),
            });
        };
        if history.contains(&migration.version()) {
            return Err(ProvisioningError::Migration {
                schema: schema.to_string(),
                version: migration.version(),
                reason: "version already recorded".to_string(),
            });
        }
        history.push(migration.version());
        self.inner.migrations_executed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn schema(name: &str) -> SchemaName {
        SchemaName::parse(name).unwrap()
    }

    #[tokio::test]
    async fn create_and_drop_are_not_idempotent() {
        let db = InMemoryDatabase::new();
        let s = schema("tenant_acme");

        assert!(!db.exists(&s).await.unwrap());
        db.create_schema(&s).await.unwrap();
        assert!(db.exists(&s).await.unwrap());
        assert!(matches!(
            db.create_schema(&s).await,
            Err(ProvisioningError::SchemaAlreadyExists { .. })
        ));

        db.drop_schema(&s).await.unwrap();
        assert!(matches!(
            db.drop_schema(&s).await,
            Err(ProvisioningError::SchemaNotFound { .. })
        ));
        assert_eq!(db.create_count(), 1);
        assert_eq!(db.drop_count(), 1);
    }

    #[tokio::test]
    async fn history_is_dropped_with_schema() {
        let db = InMemoryDatabase::new();
        let s = schema("tenant_acme");
        let m = Migration::builder()
            .version(1)
            .description("init")
            .sql("CREATE TABLE documents (id BIGINT)")
            .build();

        assert!(db.apply(&s, &m).await.is_err());
        db.create_schema(&s).await.unwrap();
        db.apply(&s, &m).await.unwrap();
        assert_eq!(db.applied_version(&s).await.unwrap(), Some(1));

        db.drop_schema(&s).await.unwrap();
        assert_eq!(db.applied_version(&s).await.unwrap(), None);
        assert_eq!(db.history(&s), None);
    }

    #[tokio::test]
    async fn injected_failures_are_transient() {
        let db = InMemoryDatabase::new();
        let s = schema("tenant_acme");
        db.fail_next(1);

        let err = db.exists(&s).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(!db.exists(&s).await.unwrap());
    }
}
