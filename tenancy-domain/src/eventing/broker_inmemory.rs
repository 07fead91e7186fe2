//! 内存版消息中间件（InMemoryBroker）
//!
//! 按 AMQP 语义实现 `MessageBroker` 协议：
//! - 主题交换机（`*` 匹配一个单词，`#` 匹配零个或多个单词）与直连交换机；
//! - 队列声明幂等，参数不一致时返回 `TopologyConflict`；
//! - `nack(requeue = false)` 按队列的 `x-dead-letter-*` 参数转投死信交换机，载荷保持原样；
//! - 典型用途：测试环境、示例与本地开发。
//!
//! 注意：消息只保存在进程内存中，不具备持久化能力。

use super::broker::{
    BindingSpec, Delivery, ExchangeKind, ExchangeSpec, HEADER_FIRST_DEATH_EXCHANGE,
    HEADER_FIRST_DEATH_QUEUE, HEADER_FIRST_DEATH_REASON, MessageBroker, OutboundMessage,
    QueueHandle, QueueSpec,
};
use crate::error::{ProvisioningError, ProvisioningResult as Result};
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use futures_util::stream;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// 队列中等待投递的消息
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub message_id: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub redelivered: bool,
}

struct QueueState {
    spec: QueueSpec,
    messages: VecDeque<QueuedMessage>,
    notify: Arc<Notify>,
}

struct Unacked {
    queue: String,
    message: QueuedMessage,
}

#[derive(Default)]
struct State {
    exchanges: HashMap<String, ExchangeSpec>,
    queues: HashMap<String, QueueState>,
    bindings: Vec<BindingSpec>,
    unacked: HashMap<u64, Unacked>,
    next_tag: u64,
}

/// 简单的内存消息中间件实现
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 队列中尚未投递的消息数
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.lock()
            .queues
            .get(queue)
            .map_or(0, |q| q.messages.len())
    }

    /// 已投递但尚未确认的消息数
    pub fn unacked_count(&self) -> usize {
        self.lock().unacked.len()
    }

    /// 查看队列中等待投递的消息（不移除）
    pub fn messages(&self, queue: &str) -> Vec<QueuedMessage> {
        self.lock()
            .queues
            .get(queue)
            .map(|q| q.messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn bindings(&self) -> Vec<BindingSpec> {
        self.lock().bindings.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_delivery(&self, queue: &str) -> Option<Delivery> {
        let mut state = self.lock();
        let message = state.queues.get_mut(queue)?.messages.pop_front()?;

        state.next_tag += 1;
        let delivery_tag = state.next_tag;
        let delivery = Delivery {
            delivery_tag,
            exchange: message.exchange.clone(),
            routing_key: message.routing_key.clone(),
            payload: message.payload.clone(),
            message_id: message.message_id.clone(),
            headers: message.headers.clone(),
            redelivered: message.redelivered,
        };
        state.unacked.insert(
            delivery_tag,
            Unacked {
                queue: queue.to_string(),
                message,
            },
        );
        Some(delivery)
    }
}

impl State {
    /// 按交换机类型与绑定把消息路由到队列，返回命中的队列数
    fn route(&mut self, exchange: &str, message: QueuedMessage) -> usize {
        let targets: Vec<String> = if exchange.is_empty() {
            // 默认交换机：路由键即队列名
            vec![message.routing_key.clone()]
        } else {
            let Some(kind) = self.exchanges.get(exchange).map(|e| e.kind) else {
                return 0;
            };
            let mut targets: Vec<String> = self
                .bindings
                .iter()
                .filter(|b| b.exchange == exchange)
                .filter(|b| match kind {
                    ExchangeKind::Direct => b.routing_key == message.routing_key,
                    ExchangeKind::Topic => topic_matches(&b.routing_key, &message.routing_key),
                })
                .map(|b| b.queue.clone())
                .collect();
            targets.sort();
            targets.dedup();
            targets
        };

        let mut routed = 0;
        for name in targets {
            if let Some(queue) = self.queues.get_mut(&name) {
                queue.messages.push_back(message.clone());
                queue.notify.notify_one();
                routed += 1;
            }
        }
        routed
    }

    fn take_unacked(&mut self, delivery_tag: u64) -> Result<Unacked> {
        self.unacked
            .remove(&delivery_tag)
            .ok_or_else(|| ProvisioningError::broker(format!("unknown delivery tag: {delivery_tag}")))
    }
}

/// AMQP 主题匹配：`*` 匹配恰好一个单词，`#` 匹配零个或多个单词
fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    fn matches(pattern: &[&str], key: &[&str]) -> bool {
        match (pattern.first(), key.first()) {
            (None, None) => true,
            (Some(&"#"), _) => {
                matches(&pattern[1..], key) || (!key.is_empty() && matches(pattern, &key[1..]))
            }
            (Some(&"*"), Some(_)) => matches(&pattern[1..], &key[1..]),
            (Some(p), Some(k)) if p == k => matches(&pattern[1..], &key[1..]),
            _ => false,
        }
    }

    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches(&pattern, &key)
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<()> {
        let mut state = self.lock();
        match state.exchanges.get(&spec.name) {
            Some(existing) if existing != spec => Err(ProvisioningError::TopologyConflict {
                resource: format!("exchange {}", spec.name),
                reason: format!(
                    "declared as {}/durable={}, existing is {}/durable={}",
                    spec.kind, spec.durable, existing.kind, existing.durable
                ),
            }),
            Some(_) => Ok(()),
            None => {
                state.exchanges.insert(spec.name.clone(), spec.clone());
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<QueueHandle> {
        let mut state = self.lock();
        if let Some(existing) = state.queues.get(&spec.name) {
            if existing.spec != *spec {
                return Err(ProvisioningError::TopologyConflict {
                    resource: format!("queue {}", spec.name),
                    reason: format!(
                        "inequivalent arguments: declared {:?}, existing {:?}",
                        spec.arguments, existing.spec.arguments
                    ),
                });
            }
            return Ok(QueueHandle {
                name: spec.name.clone(),
                message_count: existing.messages.len(),
            });
        }

        state.queues.insert(
            spec.name.clone(),
            QueueState {
                spec: spec.clone(),
                messages: VecDeque::new(),
                notify: Arc::new(Notify::new()),
            },
        );
        Ok(QueueHandle {
            name: spec.name.clone(),
            message_count: 0,
        })
    }

    async fn bind_queue(&self, binding: &BindingSpec) -> Result<()> {
        let mut state = self.lock();
        if !state.queues.contains_key(&binding.queue) {
            return Err(ProvisioningError::TopologyNotFound {
                resource: format!("queue {}", binding.queue),
            });
        }
        if !state.exchanges.contains_key(&binding.exchange) {
            return Err(ProvisioningError::TopologyNotFound {
                resource: format!("exchange {}", binding.exchange),
            });
        }
        if !state.bindings.contains(binding) {
            state.bindings.push(binding.clone());
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> Result<()> {
        let mut state = self.lock();
        if !exchange.is_empty() && !state.exchanges.contains_key(exchange) {
            return Err(ProvisioningError::TopologyNotFound {
                resource: format!("exchange {exchange}"),
            });
        }

        let routed = state.route(
            exchange,
            QueuedMessage {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                payload: message.payload,
                message_id: message.message_id,
                headers: message.headers,
                redelivered: false,
            },
        );
        if routed == 0 {
            debug!(exchange, routing_key, "message unroutable, dropped");
        }
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<BoxStream<'static, Result<Delivery>>> {
        let notify = match self.lock().queues.get(queue) {
            Some(q) => q.notify.clone(),
            None => {
                return Err(ProvisioningError::TopologyNotFound {
                    resource: format!("queue {queue}"),
                });
            }
        };

        let broker = self.clone();
        let queue = queue.to_string();
        let stream = stream::unfold((broker, queue, notify), |(broker, queue, notify)| async move {
            loop {
                if let Some(delivery) = broker.next_delivery(&queue) {
                    return Some((Ok(delivery), (broker, queue, notify)));
                }
                notify.notified().await;
            }
        });
        Ok(Box::pin(stream))
    }

    async fn ack(&self, delivery_tag: u64) -> Result<()> {
        self.lock().take_unacked(delivery_tag).map(|_| ())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
        let mut state = self.lock();
        let Unacked { queue, mut message } = state.take_unacked(delivery_tag)?;

        let Some(queue_state) = state.queues.get_mut(&queue) else {
            return Ok(());
        };

        if requeue {
            message.redelivered = true;
            queue_state.messages.push_front(message);
            queue_state.notify.notify_one();
            return Ok(());
        }

        let Some((dlx, dl_key)) = queue_state.spec.dead_letter_target() else {
            debug!(queue = %queue, "rejected message discarded, no dead-letter exchange");
            return Ok(());
        };
        let dlx = dlx.to_string();
        let routing_key = dl_key.map_or_else(|| message.routing_key.clone(), str::to_string);

        message
            .headers
            .entry(HEADER_FIRST_DEATH_QUEUE.to_string())
            .or_insert_with(|| queue.clone());
        message
            .headers
            .entry(HEADER_FIRST_DEATH_REASON.to_string())
            .or_insert_with(|| "rejected".to_string());
        message
            .headers
            .entry(HEADER_FIRST_DEATH_EXCHANGE.to_string())
            .or_insert_with(|| message.exchange.clone());
        message.exchange = dlx.clone();
        message.routing_key = routing_key;
        message.redelivered = false;

        if state.route(&dlx, message) == 0 {
            warn!(queue = %queue, exchange = %dlx, "dead-lettered message unroutable, dropped");
        }
        Ok(())
    }
}
