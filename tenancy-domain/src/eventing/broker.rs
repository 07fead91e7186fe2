//! 消息中间件（MessageBroker）协议
//!
//! 以 AMQP 的交换机/队列/绑定模型描述拓扑声明、发布、消费与确认，
//! 不绑定具体客户端实现。声明操作要求幂等：参数一致的重复声明静默成功，
//! 参数冲突必须返回 `TopologyConflict`，不允许悄悄改写已有资源。
//!
use crate::error::ProvisioningResult;
use crate::tenant_event::TenantEvent;
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use std::collections::BTreeMap;
use std::fmt;

/// 队列参数：死信交换机
pub const ARG_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";
/// 队列参数：死信路由键
pub const ARG_DEAD_LETTER_ROUTING_KEY: &str = "x-dead-letter-routing-key";

/// 死信消息头：首次死信时所在队列
pub const HEADER_FIRST_DEATH_QUEUE: &str = "x-first-death-queue";
/// 死信消息头：首次死信原因
pub const HEADER_FIRST_DEATH_REASON: &str = "x-first-death-reason";
/// 死信消息头：首次死信前消息所经的交换机
pub const HEADER_FIRST_DEATH_EXCHANGE: &str = "x-first-death-exchange";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Topic,
    Direct,
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topic => f.write_str("topic"),
            Self::Direct => f.write_str("direct"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSpec {
    pub name: String,
    pub kind: ExchangeKind,
    pub durable: bool,
}

impl ExchangeSpec {
    pub fn durable(name: impl Into<String>, kind: ExchangeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            durable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
    pub arguments: BTreeMap<String, String>,
}

impl QueueSpec {
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            arguments: BTreeMap::new(),
        }
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// 拒收消息时转投的死信交换机与路由键
    pub fn dead_letter_target(&self) -> Option<(&str, Option<&str>)> {
        let exchange = self.arguments.get(ARG_DEAD_LETTER_EXCHANGE)?;
        let routing_key = self
            .arguments
            .get(ARG_DEAD_LETTER_ROUTING_KEY)
            .map(String::as_str);
        Some((exchange.as_str(), routing_key))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSpec {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
}

/// 队列声明结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    pub name: String,
    pub message_count: usize,
}

/// 待发布消息
#[derive(Debug, Clone, Default)]
pub struct OutboundMessage {
    pub payload: Vec<u8>,
    pub message_id: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl OutboundMessage {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            ..Default::default()
        }
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }
}

/// 投递给消费者的消息
#[derive(Debug, Clone)]
pub struct Delivery {
    /// 投递标签，用于 ack/nack
    pub delivery_tag: u64,
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub message_id: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// 是否为重新投递（此前投递过但未被确认）
    pub redelivered: bool,
}

/// 消息中间件
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> ProvisioningResult<()>;

    async fn declare_queue(&self, spec: &QueueSpec) -> ProvisioningResult<QueueHandle>;

    async fn bind_queue(&self, binding: &BindingSpec) -> ProvisioningResult<()>;

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> ProvisioningResult<()>;

    /// 返回一个 'static 生命周期的投递流，便于在 tokio::spawn 中使用
    async fn consume(
        &self,
        queue: &str,
    ) -> ProvisioningResult<BoxStream<'static, ProvisioningResult<Delivery>>>;

    /// 确认消息，永久移出队列
    async fn ack(&self, delivery_tag: u64) -> ProvisioningResult<()>;

    /// 否认消息：`requeue = true` 放回队列；否则按队列死信参数转投
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> ProvisioningResult<()>;
}

/// 以事件类型对应的路由键把租户事件发布到主题交换机
pub async fn publish_tenant_event(
    broker: &dyn MessageBroker,
    exchange: &str,
    event: &TenantEvent,
) -> ProvisioningResult<()> {
    let message =
        OutboundMessage::new(event.to_vec()?).with_message_id(uuid::Uuid::new_v4().to_string());
    broker
        .publish(exchange, &event.event_type().routing_key(), message)
        .await
}
