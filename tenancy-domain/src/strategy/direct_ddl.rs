use super::{TenantProvisioningStrategy, ensure_schema, remove_schema};
use crate::error::ProvisioningResult;
use crate::schema::{SchemaCatalog, SchemaName};
use async_trait::async_trait;
use std::sync::Arc;

/// 直接 DDL 策略：只负责建/删 schema，没有迁移概念
#[derive(Clone)]
pub struct DirectDdlStrategy {
    catalog: Arc<dyn SchemaCatalog>,
}

impl DirectDdlStrategy {
    pub fn new(catalog: Arc<dyn SchemaCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl TenantProvisioningStrategy for DirectDdlStrategy {
    async fn initialize(&self, tenant_id: &str, schema: &SchemaName) -> ProvisioningResult<()> {
        ensure_schema(self.catalog.as_ref(), tenant_id, schema).await
    }

    async fn teardown(&self, tenant_id: &str, schema: &SchemaName) -> ProvisioningResult<()> {
        remove_schema(self.catalog.as_ref(), tenant_id, schema).await
    }

    async fn is_migration_pending(&self, _schema: &SchemaName) -> ProvisioningResult<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::InMemoryDatabase;

    fn setup() -> (InMemoryDatabase, DirectDdlStrategy, SchemaName) {
        let db = InMemoryDatabase::new();
        let strategy = DirectDdlStrategy::new(Arc::new(db.clone()));
        (db, strategy, SchemaName::derive("acme").unwrap())
    }

    #[tokio::test]
    async fn initialize_twice_creates_once() {
        let (db, strategy, schema) = setup();

        strategy.initialize("acme", &schema).await.unwrap();
        strategy.initialize("acme", &schema).await.unwrap();

        assert_eq!(db.schemas(), vec![schema]);
        assert_eq!(db.create_count(), 1);
    }

    #[tokio::test]
    async fn teardown_without_initialize_is_noop() {
        let (db, strategy, schema) = setup();

        strategy.teardown("acme", &schema).await.unwrap();
        strategy.teardown("acme", &schema).await.unwrap();

        assert!(db.schemas().is_empty());
        assert_eq!(db.drop_count(), 0);
    }

    #[tokio::test]
    async fn teardown_after_initialize_drops_once() {
        let (db, strategy, schema) = setup();

        strategy.initialize("acme", &schema).await.unwrap();
        strategy.teardown("acme", &schema).await.unwrap();
        strategy.teardown("acme", &schema).await.unwrap();

        assert!(db.schemas().is_empty());
        assert_eq!(db.drop_count(), 1);
    }

    #[tokio::test]
    async fn never_reports_pending_migrations() {
        let (_db, strategy, schema) = setup();
        assert!(!strategy.is_migration_pending(&schema).await.unwrap());
    }

    #[tokio::test]
    async fn database_failures_propagate() {
        let (db, strategy, schema) = setup();
        db.fail_next(1);
        assert!(strategy.initialize("acme", &schema).await.is_err());
        assert!(db.schemas().is_empty());
    }
}
