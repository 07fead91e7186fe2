use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tenancy_application::config::ENV_PREFIX;
use tenancy_application::telemetry::init_tracing;
use tenancy_application::{ProvisioningConfig, TenantProvisioningService};
use tenancy_domain::eventing::topology::inbound_queue_name;
use tenancy_domain::eventing::{InMemoryBroker, ServiceName, publish_tenant_event};
use tenancy_domain::migration::{Migration, MigrationSet};
use tenancy_domain::schema::{InMemoryDatabase, SchemaName};
use tenancy_domain::strategy::StrategyKind;
use tenancy_domain::tenant_event::{TenantEvent, TenantEventType};
use tracing::info;

fn migrations() -> Result<MigrationSet> {
    let set = MigrationSet::new(vec![
        Migration::builder()
            .version(1)
            .description("create documents")
            .sql("CREATE TABLE documents (id BIGINT PRIMARY KEY, title TEXT NOT NULL)")
            .build(),
        Migration::builder()
            .version(2)
            .description("add documents.archived")
            .sql("ALTER TABLE documents ADD COLUMN archived BOOLEAN NOT NULL DEFAULT FALSE")
            .build(),
    ])?;
    Ok(set)
}

fn event(event_type: TenantEventType, tenant_id: &str) -> Result<TenantEvent> {
    Ok(TenantEvent::builder()
        .event_type(event_type)
        .tenant_id(tenant_id)
        .schema_name(SchemaName::derive(tenant_id)?)
        .build())
}

/// 等待入站队列处理完毕
async fn settle(broker: &InMemoryBroker, queue: &str) {
    for _ in 0..100 {
        if broker.queue_depth(queue) == 0 && broker.unacked_count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    init_tracing();

    // 未设置服务名时以 documents 服务、迁移策略运行；其余配置错误照常报错
    let config = ProvisioningConfig::from_env_or_else(|| {
        info!("{ENV_PREFIX}SERVICE_NAME not set, using demo defaults");
        let mut config = ProvisioningConfig::for_service(ServiceName::parse("documents")?);
        config.strategy = StrategyKind::MigrationBased;
        Ok(config)
    })?;
    let inbound = inbound_queue_name(&config.service_name);
    let exchange = config.exchanges.events.clone();

    let broker = InMemoryBroker::new();
    let db = InMemoryDatabase::new();
    let service = TenantProvisioningService::builder()
        .config(config)
        .broker(Arc::new(broker.clone()))
        .catalog(Arc::new(db.clone()))
        .migration_store(Arc::new(db.clone()))
        .migrations(Arc::new(migrations()?))
        .build();

    let Some(handle) = service.start().await? else {
        info!("tenant provisioning disabled, nothing to do");
        return Ok(());
    };

    let acme = SchemaName::derive("acme")?;
    for event_type in [TenantEventType::Created, TenantEventType::Updated] {
        publish_tenant_event(&broker, &exchange, &event(event_type, "acme")?).await?;
    }
    publish_tenant_event(&broker, &exchange, &event(TenantEventType::Created, "Globex Corp")?)
        .await?;
    settle(&broker, &inbound).await;

    println!("schemas after create: {:?}", db.schemas());
    println!(
        "acme migration history: {:?}",
        db.history(&acme).context("acme schema missing")?
    );

    publish_tenant_event(&broker, &exchange, &event(TenantEventType::Deleted, "acme")?).await?;
    settle(&broker, &inbound).await;
    println!("schemas after delete: {:?}", db.schemas());
    println!(
        "creates={} drops={} migrations executed={}",
        db.create_count(),
        db.drop_count(),
        db.migrations_executed()
    );

    handle.shutdown();
    handle.join().await;
    Ok(())
}
