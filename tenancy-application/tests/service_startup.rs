use std::sync::Arc;
use std::time::Duration;
use tenancy_application::{AppError, ProvisioningConfig, TenantProvisioningService};
use tenancy_domain::error::ProvisioningError;
use tenancy_domain::eventing::{
    InMemoryBroker, MessageBroker, QueueSpec, ServiceName, TenantEventHandlers,
    publish_tenant_event,
};
use tenancy_domain::migration::{Migration, MigrationSet};
use tenancy_domain::schema::{InMemoryDatabase, SchemaName};
use tenancy_domain::strategy::{StrategyKind, TenantProvisioningStrategy};
use tenancy_domain::tenant_event::{TenantEvent, TenantEventType};

fn config() -> ProvisioningConfig {
    ProvisioningConfig::for_service(ServiceName::parse("documents").unwrap())
}

fn created(tenant_id: &str) -> TenantEvent {
    TenantEvent::builder()
        .event_type(TenantEventType::Created)
        .tenant_id(tenant_id)
        .schema_name(SchemaName::derive(tenant_id).unwrap())
        .build()
}

#[tokio::test]
async fn disabled_service_declares_nothing() {
    let broker = InMemoryBroker::new();
    let mut config = config();
    config.enabled = false;

    let service = TenantProvisioningService::builder()
        .config(config)
        .broker(Arc::new(broker.clone()))
        .catalog(Arc::new(InMemoryDatabase::new()))
        .build();

    assert!(service.start().await.unwrap().is_none());
    assert!(broker.bindings().is_empty());
}

#[tokio::test]
async fn migration_based_service_provisions_created_tenants() {
    let broker = InMemoryBroker::new();
    let db = InMemoryDatabase::new();
    let mut config = config();
    config.strategy = StrategyKind::MigrationBased;

    let migrations = MigrationSet::new(vec![
        Migration::builder()
            .version(1)
            .description("documents")
            .sql("CREATE TABLE documents (id BIGINT PRIMARY KEY)")
            .build(),
    ])
    .unwrap();
    let service = TenantProvisioningService::builder()
        .config(config)
        .broker(Arc::new(broker.clone()))
        .catalog(Arc::new(db.clone()))
        .migration_store(Arc::new(db.clone()))
        .migrations(Arc::new(migrations))
        .build();

    let handle = service.start().await.unwrap().unwrap();
    publish_tenant_event(&broker, "tenant.events", &created("acme"))
        .await
        .unwrap();

    let acme = SchemaName::derive("acme").unwrap();
    let mut applied = None;
    for _ in 0..200 {
        applied = db.history(&acme);
        if applied.as_deref() == Some(&[1][..]) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(applied, Some(vec![1]));
    assert!(
        !service
            .strategy()
            .unwrap()
            .is_migration_pending(&acme)
            .await
            .unwrap()
    );

    handle.shutdown();
    handle.join().await;
}

#[tokio::test]
async fn injected_handlers_replace_the_standard_ones() {
    let broker = InMemoryBroker::new();
    let db = InMemoryDatabase::new();

    let service = TenantProvisioningService::builder()
        .config(config())
        .broker(Arc::new(broker.clone()))
        .catalog(Arc::new(db.clone()))
        .handlers(TenantEventHandlers::new())
        .build();

    let handle = service.start().await.unwrap().unwrap();
    publish_tenant_event(&broker, "tenant.events", &created("acme"))
        .await
        .unwrap();

    for _ in 0..200 {
        if broker.queue_depth("tenant.events.documents") == 0 && broker.unacked_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(db.schemas().is_empty());

    handle.shutdown();
    handle.join().await;
}

#[tokio::test]
async fn conflicting_topology_is_fatal() {
    let broker = InMemoryBroker::new();
    broker
        .declare_queue(&QueueSpec::durable("tenant.events.documents"))
        .await
        .unwrap();

    let service = TenantProvisioningService::builder()
        .config(config())
        .broker(Arc::new(broker))
        .catalog(Arc::new(InMemoryDatabase::new()))
        .build();

    let err = service.start().await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Provisioning(ProvisioningError::TopologyConflict { .. })
    ));
}

#[tokio::test]
async fn migration_strategy_without_store_is_a_config_error() {
    let mut config = config();
    config.strategy = StrategyKind::MigrationBased;

    let broker = InMemoryBroker::new();
    let service = TenantProvisioningService::builder()
        .config(config)
        .broker(Arc::new(broker.clone()))
        .catalog(Arc::new(InMemoryDatabase::new()))
        .build();

    assert!(matches!(service.start().await, Err(AppError::Config(_))));
    assert!(broker.bindings().is_empty());
    assert!(broker.consume("tenant.events.documents").await.is_err());
}
