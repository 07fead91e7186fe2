//! 服务私有的消息拓扑（Topology Provisioner）
//!
//! 每个服务启动时声明：
//! - 入站队列 `tenant.events.<service>`（持久化），死信参数指向共享死信交换机，
//!   死信路由键 `dlq.<service>`；以 `tenant.*` 绑定到共享主题交换机；
//! - 死信队列 `tenant.events.dlq.<service>`（持久化、终点，不再死信），
//!   以 `dlq.<service>` 绑定到共享死信交换机。
//!
//! 拓扑先描述为声明式的 [`QueueTopology`]，再由 [`TopologyProvisioner::ensure`]
//! 一次性幂等地落地；参数冲突是致命的启动错误，不做重试。
//!
use super::broker::{
    ARG_DEAD_LETTER_EXCHANGE, ARG_DEAD_LETTER_ROUTING_KEY, BindingSpec, ExchangeKind,
    ExchangeSpec, MessageBroker, QueueHandle, QueueSpec,
};
use crate::error::{ProvisioningError, ProvisioningResult};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// 共享主题交换机默认名
pub const DEFAULT_EVENTS_EXCHANGE: &str = "tenant.events";
/// 共享死信交换机默认名
pub const DEFAULT_DEAD_LETTER_EXCHANGE: &str = "tenant.events.dlx";
/// 入站绑定模式：匹配所有租户事件类型
pub const INBOUND_BINDING_PATTERN: &str = "tenant.*";

pub fn inbound_queue_name(service: &ServiceName) -> String {
    format!("tenant.events.{service}")
}

pub fn dead_letter_queue_name(service: &ServiceName) -> String {
    format!("tenant.events.dlq.{service}")
}

pub fn dead_letter_routing_key(service: &ServiceName) -> String {
    format!("dlq.{service}")
}

/// 服务名（出现在队列名与路由键中）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceName(String);

impl ServiceName {
    /// 只允许小写字母、数字、`-` 与 `_`，避免与路由键的 `.` 分隔符冲突
    pub fn parse(value: impl Into<String>) -> ProvisioningResult<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(ProvisioningError::InvalidServiceName {
                reason: "service name is empty".to_string(),
            });
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(ProvisioningError::InvalidServiceName {
                reason: format!("only [a-z0-9_-] allowed: {value}"),
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 共享交换机名称
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeNames {
    pub events: String,
    pub dead_letter: String,
}

impl Default for ExchangeNames {
    fn default() -> Self {
        Self {
            events: DEFAULT_EVENTS_EXCHANGE.to_string(),
            dead_letter: DEFAULT_DEAD_LETTER_EXCHANGE.to_string(),
        }
    }
}

/// 声明式拓扑描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTopology {
    pub exchanges: Vec<ExchangeSpec>,
    pub queues: Vec<QueueSpec>,
    pub bindings: Vec<BindingSpec>,
}

impl QueueTopology {
    pub fn for_service(service: &ServiceName, exchanges: &ExchangeNames) -> Self {
        let inbound = inbound_queue_spec(service, exchanges);
        let dead_letter = dead_letter_queue_spec(service);
        let bindings = vec![
            inbound_binding(&inbound.name, &exchanges.events),
            dead_letter_binding(&dead_letter.name, &exchanges.dead_letter, service),
        ];

        Self {
            exchanges: vec![
                ExchangeSpec::durable(exchanges.events.clone(), ExchangeKind::Topic),
                ExchangeSpec::durable(exchanges.dead_letter.clone(), ExchangeKind::Direct),
            ],
            queues: vec![inbound, dead_letter],
            bindings,
        }
    }
}

fn inbound_queue_spec(service: &ServiceName, exchanges: &ExchangeNames) -> QueueSpec {
    QueueSpec::durable(inbound_queue_name(service))
        .with_argument(ARG_DEAD_LETTER_EXCHANGE, exchanges.dead_letter.clone())
        .with_argument(ARG_DEAD_LETTER_ROUTING_KEY, dead_letter_routing_key(service))
}

fn dead_letter_queue_spec(service: &ServiceName) -> QueueSpec {
    QueueSpec::durable(dead_letter_queue_name(service))
}

fn inbound_binding(queue: &str, exchange: &str) -> BindingSpec {
    BindingSpec {
        queue: queue.to_string(),
        exchange: exchange.to_string(),
        routing_key: INBOUND_BINDING_PATTERN.to_string(),
    }
}

fn dead_letter_binding(queue: &str, exchange: &str, service: &ServiceName) -> BindingSpec {
    BindingSpec {
        queue: queue.to_string(),
        exchange: exchange.to_string(),
        routing_key: dead_letter_routing_key(service),
    }
}

/// 落地后的服务拓扑
#[derive(Debug, Clone)]
pub struct ServiceTopology {
    pub inbound: QueueHandle,
    pub dead_letter: QueueHandle,
}

/// 拓扑声明器
#[derive(Clone)]
pub struct TopologyProvisioner {
    broker: Arc<dyn MessageBroker>,
    exchanges: ExchangeNames,
}

impl TopologyProvisioner {
    pub fn new(broker: Arc<dyn MessageBroker>, exchanges: ExchangeNames) -> Self {
        Self { broker, exchanges }
    }

    pub fn exchanges(&self) -> &ExchangeNames {
        &self.exchanges
    }

    pub async fn declare_inbound_queue(
        &self,
        service: &ServiceName,
    ) -> ProvisioningResult<QueueHandle> {
        self.broker
            .declare_queue(&inbound_queue_spec(service, &self.exchanges))
            .await
    }

    pub async fn declare_dead_letter_queue(
        &self,
        service: &ServiceName,
    ) -> ProvisioningResult<QueueHandle> {
        self.broker
            .declare_queue(&dead_letter_queue_spec(service))
            .await
    }

    pub async fn bind_inbound(&self, queue: &QueueHandle, exchange: &str) -> ProvisioningResult<()> {
        self.broker
            .bind_queue(&inbound_binding(&queue.name, exchange))
            .await
    }

    pub async fn bind_dead_letter(
        &self,
        queue: &QueueHandle,
        exchange: &str,
        service: &ServiceName,
    ) -> ProvisioningResult<()> {
        self.broker
            .bind_queue(&dead_letter_binding(&queue.name, exchange, service))
            .await
    }

    /// 幂等地落地服务的完整拓扑
    ///
    /// 只按 [`QueueTopology`] 的描述依次声明交换机、队列与绑定。
    pub async fn ensure(&self, service: &ServiceName) -> ProvisioningResult<ServiceTopology> {
        let topology = QueueTopology::for_service(service, &self.exchanges);

        for exchange in &topology.exchanges {
            self.broker.declare_exchange(exchange).await?;
        }
        let mut declared = Vec::with_capacity(topology.queues.len());
        for queue in &topology.queues {
            declared.push(self.broker.declare_queue(queue).await?);
        }
        for binding in &topology.bindings {
            self.broker.bind_queue(binding).await?;
        }

        let take = |name: String| {
            declared
                .iter()
                .find(|handle| handle.name == name)
                .cloned()
                .ok_or_else(|| ProvisioningError::TopologyNotFound {
                    resource: format!("queue {name}"),
                })
        };
        let inbound = take(inbound_queue_name(service))?;
        let dead_letter = take(dead_letter_queue_name(service))?;

        info!(
            service = %service,
            inbound = %inbound.name,
            dead_letter = %dead_letter.name,
            "tenant event topology ensured"
        );
        Ok(ServiceTopology {
            inbound,
            dead_letter,
        })
    }
}
