//! 租户事件子系统（eventing）
//!
//! - `broker`：AMQP 风格的消息中间件协议与发布助手；
//! - `topology`：服务私有的入站/死信队列拓扑；
//! - `handler` / `dispatcher`：事件类型分发表与单条消息的状态机；
//! - `deletions`：租户删除时间记录，挡住晚到的过期 CREATED/UPDATED；
//! - `engine`：按租户分道的并发消费、确认/死信与优雅排空。
//!
pub mod broker;
pub mod broker_inmemory;
pub mod deletions;
pub mod dispatcher;
pub mod engine;
pub mod handler;
pub mod retry;
pub mod tenant_locks;
pub mod topology;

pub use broker::{
    BindingSpec, Delivery, ExchangeKind, ExchangeSpec, MessageBroker, OutboundMessage,
    QueueHandle, QueueSpec, publish_tenant_event,
};
pub use broker_inmemory::{InMemoryBroker, QueuedMessage};
pub use deletions::DeletionLedger;
pub use dispatcher::{DispatchOutcome, Disposition, TenantEventDispatcher};
pub use engine::{ConsumerConfig, ConsumerHandle, TenantEventConsumer};
pub use handler::{HandlerFn, HandlerFuture, TenantEventHandlers};
pub use retry::RetryPolicy;
pub use tenant_locks::{TenantGuard, TenantLocks};
pub use topology::{
    ExchangeNames, QueueTopology, ServiceName, ServiceTopology, TopologyProvisioner,
};
