//! 租户事件消费者（TenantEventConsumer）
//!
//! 订阅服务入站队列，按租户 ID 把投递分到各自的串行通道（lane），
//! 每条投递交给 [`TenantEventDispatcher`] 得出处置，再翻译为中间件确认：
//! - `Ack` → `ack`；
//! - `DeadLetter` → `nack(requeue = false)`，由队列死信参数转投死信队列；
//! - `Requeue` → `nack(requeue = true)`。
//!
//! 同一租户的投递在通道内按到达顺序逐条执行；轮到某条投递时才申请 worker 许可，
//! 排队等待自己租户的投递不占许可，慢租户因此不会挤占其他租户。
//!
//! 关闭时先停止拉取新投递，已取到的投递执行到底后才结束（优雅排空）。
//!
use super::broker::{Delivery, MessageBroker};
use super::dispatcher::{Disposition, TenantEventDispatcher};
use crate::error::ProvisioningResult;
use crate::tenant_event::TenantEvent;
use bon::Builder;
use futures_core::stream::BoxStream;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 消费者配置
#[derive(Clone, Copy, Debug)]
pub struct ConsumerConfig {
    /// 同时执行处理器的租户数上限（同一租户始终串行）
    pub workers: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

#[derive(Builder)]
pub struct TenantEventConsumer {
    broker: Arc<dyn MessageBroker>,
    dispatcher: TenantEventDispatcher,
    #[builder(into)]
    queue: String,
    #[builder(default)]
    config: ConsumerConfig,
}

/// 单个租户的串行通道
struct Lane {
    tx: mpsc::UnboundedSender<Delivery>,
    /// 已送入通道、尚未结算的投递数；只由拉取循环增加
    pending: Arc<AtomicUsize>,
}

/// 通道键：租户 ID；无法解析的消息共用空键，由分发器直接死信
fn lane_key(payload: &[u8]) -> String {
    TenantEvent::from_slice(payload)
        .map(|event| event.tenant_id().to_string())
        .unwrap_or_default()
}

impl TenantEventConsumer {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// 开始消费入站队列，返回可用于关闭/等待的句柄
    ///
    /// 订阅失败（例如队列不存在）直接返回错误，不会启动后台任务。
    pub async fn start(self: Arc<Self>) -> ProvisioningResult<ConsumerHandle> {
        let deliveries = self.broker.consume(&self.queue).await?;
        let token = CancellationToken::new();

        info!(queue = %self.queue, workers = self.config.workers, "tenant event consumer started");
        let task = tokio::spawn(Self::consume_loop(self.clone(), deliveries, token.clone()));

        Ok(ConsumerHandle {
            token,
            tasks: vec![task],
        })
    }

    async fn consume_loop(
        self: Arc<Self>,
        deliveries: BoxStream<'static, ProvisioningResult<Delivery>>,
        token: CancellationToken,
    ) {
        let permits = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut lanes: HashMap<String, Lane> = HashMap::new();
        let mut lane_tasks = JoinSet::new();

        let mut deliveries = pin!(deliveries.take_until(token.clone().cancelled_owned()));
        while let Some(delivery) = deliveries.next().await {
            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(err) => {
                    warn!(queue = %self.queue, error = %err, "delivery failed");
                    continue;
                }
            };

            // 空闲通道关闭发送端，通道任务随之退出
            lanes.retain(|_, lane| lane.pending.load(Ordering::Acquire) > 0);
            while lane_tasks.try_join_next().is_some() {}

            let key = lane_key(&delivery.payload);
            let lane = lanes.entry(key.clone()).or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                let pending = Arc::new(AtomicUsize::new(0));
                lane_tasks.spawn(self.clone().run_lane(
                    rx,
                    pending.clone(),
                    permits.clone(),
                    token.clone(),
                ));
                Lane { tx, pending }
            });

            lane.pending.fetch_add(1, Ordering::AcqRel);
            if let Err(mpsc::error::SendError(delivery)) = lane.tx.send(delivery) {
                lanes.remove(&key);
                warn!(tenant_id = %key, delivery_tag = delivery.delivery_tag, "tenant lane closed, requeueing");
                self.settle(delivery.delivery_tag, Disposition::Requeue).await;
            }
        }

        drop(lanes);
        while lane_tasks.join_next().await.is_some() {}

        info!(queue = %self.queue, "tenant event consumer drained");
    }

    async fn run_lane(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<Delivery>,
        pending: Arc<AtomicUsize>,
        permits: Arc<Semaphore>,
        token: CancellationToken,
    ) {
        while let Some(delivery) = rx.recv().await {
            let disposition = match permits.acquire().await {
                Ok(_permit) => self.handle(&delivery, &token).await,
                Err(_) => Disposition::Requeue,
            };

            if disposition == Disposition::Requeue {
                // 后面的投递不能越过被放回的这条
                self.requeue_lane(delivery, &mut rx).await;
                pending.store(0, Ordering::Release);
                return;
            }

            self.settle(delivery.delivery_tag, disposition).await;
            pending.fetch_sub(1, Ordering::AcqRel);
        }
    }

    async fn handle(&self, delivery: &Delivery, token: &CancellationToken) -> Disposition {
        debug!(
            delivery_tag = delivery.delivery_tag,
            routing_key = %delivery.routing_key,
            redelivered = delivery.redelivered,
            "delivery received"
        );
        self.dispatcher.process(&delivery.payload, token).await
    }

    /// 连同通道中剩余的投递一起放回队列
    ///
    /// 放回的消息插在队首，按到达的逆序 nack 才能保持原有顺序。
    async fn requeue_lane(&self, first: Delivery, rx: &mut mpsc::UnboundedReceiver<Delivery>) {
        rx.close();
        let mut returned = vec![first];
        while let Ok(delivery) = rx.try_recv() {
            returned.push(delivery);
        }

        for delivery in returned.into_iter().rev() {
            self.settle(delivery.delivery_tag, Disposition::Requeue).await;
        }
    }

    async fn settle(&self, tag: u64, disposition: Disposition) {
        let settled = match disposition {
            Disposition::Ack => self.broker.ack(tag).await,
            Disposition::DeadLetter { .. } => self.broker.nack(tag, false).await,
            Disposition::Requeue => self.broker.nack(tag, true).await,
        };

        if let Err(err) = settled {
            warn!(delivery_tag = tag, ?disposition, error = %err, "failed to settle delivery");
        }
    }
}

/// 消费者运行句柄：用于优雅关闭与等待任务结束
#[derive(Debug)]
pub struct ConsumerHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ConsumerHandle {
    /// 停止拉取新消息；处理中的消息继续执行
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 等待处理中的消息全部结算
    pub async fn join(mut self) {
        let tasks = std::mem::take(&mut self.tasks);

        for t in tasks {
            let _ = t.await;
        }
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventing::broker::{OutboundMessage, QueueSpec};
    use crate::eventing::{InMemoryBroker, RetryPolicy, TenantEventHandlers};
    use crate::schema::SchemaName;
    use crate::tenant_event::{TenantEvent, TenantEventType};
    use std::time::Duration;

    #[tokio::test]
    async fn acks_handled_deliveries_and_stops_on_shutdown() {
        let broker = InMemoryBroker::new();
        broker.declare_queue(&QueueSpec::durable("inbound")).await.unwrap();

        let dispatcher =
            TenantEventDispatcher::new(TenantEventHandlers::new(), RetryPolicy::default());
        let consumer = TenantEventConsumer::builder()
            .broker(Arc::new(broker.clone()))
            .dispatcher(dispatcher)
            .queue("inbound")
            .build();
        let handle = Arc::new(consumer).start().await.unwrap();

        let event = TenantEvent::builder()
            .event_type(TenantEventType::Created)
            .tenant_id("acme")
            .schema_name(SchemaName::derive("acme").unwrap())
            .build();
        // 默认交换机按队列名路由
        broker
            .publish("", "inbound", OutboundMessage::new(event.to_vec().unwrap()))
            .await
            .unwrap();

        for _ in 0..50 {
            if broker.queue_depth("inbound") == 0 && broker.unacked_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(broker.queue_depth("inbound"), 0);
        assert_eq!(broker.unacked_count(), 0);

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn start_fails_for_missing_queue() {
        let dispatcher =
            TenantEventDispatcher::new(TenantEventHandlers::new(), RetryPolicy::default());
        let consumer = TenantEventConsumer::builder()
            .broker(Arc::new(InMemoryBroker::new()))
            .dispatcher(dispatcher)
            .queue("missing")
            .build();

        assert!(Arc::new(consumer).start().await.is_err());
    }

    #[tokio::test]
    async fn shutdown_during_backoff_requeues_the_lane_in_order() {
        let broker = InMemoryBroker::new();
        broker.declare_queue(&QueueSpec::durable("inbound")).await.unwrap();

        let handlers = TenantEventHandlers::new().on_created(|_ctx, _event| {
            Box::pin(async { Err(crate::error::ProvisioningError::database("down")) })
        });
        let dispatcher =
            TenantEventDispatcher::new(handlers, RetryPolicy::fixed(3, Duration::from_secs(60)));
        let consumer = TenantEventConsumer::builder()
            .broker(Arc::new(broker.clone()))
            .dispatcher(dispatcher)
            .queue("inbound")
            .build();
        let handle = Arc::new(consumer).start().await.unwrap();

        let payloads: Vec<Vec<u8>> = [TenantEventType::Created, TenantEventType::Updated]
            .into_iter()
            .map(|event_type| {
                TenantEvent::builder()
                    .event_type(event_type)
                    .tenant_id("acme")
                    .schema_name(SchemaName::derive("acme").unwrap())
                    .build()
                    .to_vec()
                    .unwrap()
            })
            .collect();
        for payload in &payloads {
            broker
                .publish("", "inbound", OutboundMessage::new(payload.clone()))
                .await
                .unwrap();
        }

        for _ in 0..50 {
            if broker.unacked_count() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(broker.unacked_count(), 2);

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .unwrap();

        let returned: Vec<Vec<u8>> = broker
            .messages("inbound")
            .into_iter()
            .map(|m| m.payload)
            .collect();
        assert_eq!(returned, payloads);
        assert_eq!(broker.unacked_count(), 0);
    }

    #[test]
    fn malformed_payloads_share_one_lane() {
        assert_eq!(lane_key(b"not json"), "");
        let event = TenantEvent::builder()
            .event_type(TenantEventType::Created)
            .tenant_id("acme")
            .schema_name(SchemaName::derive("acme").unwrap())
            .build();
        assert_eq!(lane_key(&event.to_vec().unwrap()), "acme");
    }
}
