//! 租户事件分发器（TenantEventDispatcher）
//!
//! 每条消息的状态机：
//! `RECEIVED → CONTEXT_BOUND → HANDLER_DISPATCHED → {SUCCEEDED, FAILED}`
//!
//! - RECEIVED：解析消息体；格式错误直接 FAILED，不消耗重试预算；
//! - CONTEXT_BOUND：以系统租户上下文调用处理器（事件自身的 schema 可能尚不存在），
//!   上下文按值传入，调用结束即失效；
//! - HANDLER_DISPATCHED：按事件类型查分发表；未注册/未知类型记录后视为 SUCCEEDED；
//! - 处理器失败时在持有租户锁的情况下按 [`RetryPolicy`] 退避重试，
//!   预算耗尽后交由中间件死信。
//!
//! 租户锁只保证互斥，不保证先后：DELETED 先拿到锁时，发生得更早的 CREATED/UPDATED
//! 会在之后才执行。分发器因此记下每个租户最近的删除时间，`occurredAt` 不晚于它的
//! CREATED/UPDATED 直接确认、不调用处理器。
//!
use super::deletions::DeletionLedger;
use super::handler::TenantEventHandlers;
use super::retry::RetryPolicy;
use super::tenant_locks::TenantLocks;
use crate::context::TenantContext;
use crate::error::ProvisioningResult;
use crate::tenant_event::{TenantEvent, TenantEventType};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// 单次分发的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 处理器正常返回
    Handled,
    /// 没有匹配的处理器（未知或未注册的事件类型）
    Ignored,
}

/// 消息的最终处置，由消费引擎翻译为 ack/nack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 确认并永久移出队列
    Ack,
    /// 拒收且不回队列，由中间件转投死信队列
    DeadLetter { attempts: u32 },
    /// 放回队列（仅在关闭时打断了退避等待）
    Requeue,
}

#[derive(Clone)]
pub struct TenantEventDispatcher {
    handlers: TenantEventHandlers,
    retry: RetryPolicy,
    locks: TenantLocks,
    deletions: DeletionLedger,
}

impl TenantEventDispatcher {
    pub fn new(handlers: TenantEventHandlers, retry: RetryPolicy) -> Self {
        Self {
            handlers,
            retry,
            locks: TenantLocks::new(),
            deletions: DeletionLedger::new(),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn deletions(&self) -> &DeletionLedger {
        &self.deletions
    }

    /// 一次分发：绑定系统租户上下文并调用匹配的处理器
    pub async fn dispatch(&self, event: &TenantEvent) -> ProvisioningResult<DispatchOutcome> {
        let ctx = TenantContext::system();

        let Some(handler) = self.handlers.resolve(event.event_type()) else {
            info!(
                tenant_id = event.tenant_id(),
                event_type = %event.event_type(),
                "no handler for event type, acknowledging"
            );
            return Ok(DispatchOutcome::Ignored);
        };

        debug!(
            tenant_id = event.tenant_id(),
            event_type = %event.event_type(),
            context_tenant = ctx.tenant_id(),
            "handler dispatched"
        );
        handler(&ctx, event).await?;
        Ok(DispatchOutcome::Handled)
    }

    /// 处理一条原始消息直到得出最终处置
    ///
    /// 同一租户的消息串行处理；退避等待期间若 `shutdown` 被取消，
    /// 消息原样放回队列，已在执行的处理器不会被打断。
    pub async fn process(&self, payload: &[u8], shutdown: &CancellationToken) -> Disposition {
        let event = match TenantEvent::from_slice(payload) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, error_kind = %err.kind(), "malformed tenant event, dead-lettering");
                return Disposition::DeadLetter { attempts: 0 };
            }
        };

        let span = info_span!(
            "tenant_event",
            tenant_id = event.tenant_id(),
            schema = %event.schema_name(),
            event_type = %event.event_type(),
        );
        self.process_event(&event, shutdown).instrument(span).await
    }

    async fn process_event(&self, event: &TenantEvent, shutdown: &CancellationToken) -> Disposition {
        debug!("tenant event received");
        if !event.schema_matches_derivation() {
            warn!("schema name differs from local derivation, using the published name");
        }

        let _guard = self.locks.acquire(event.tenant_id()).await;

        match event.event_type() {
            TenantEventType::Deleted => {
                self.deletions.record(event.tenant_id(), event.occurred_at());
            }
            TenantEventType::Created | TenantEventType::Updated => {
                if let Some(deleted_at) = self
                    .deletions
                    .superseding(event.tenant_id(), event.occurred_at())
                {
                    info!(
                        occurred_at = %event.occurred_at(),
                        %deleted_at,
                        "event predates tenant deletion, skipping"
                    );
                    return Disposition::Ack;
                }
            }
            _ => {}
        }

        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match self.dispatch(event).await {
                Ok(outcome) => {
                    info!(attempt = attempts, ?outcome, "tenant event succeeded");
                    return Disposition::Ack;
                }
                Err(err) if self.retry.should_retry(attempts) => {
                    let delay = self.retry.backoff(attempts);
                    warn!(
                        attempt = attempts,
                        error = %err,
                        error_kind = %err.kind(),
                        delay_ms = delay.as_millis() as u64,
                        "tenant event failed, retrying"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            info!(attempt = attempts, "shutdown during backoff, requeueing");
                            return Disposition::Requeue;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => {
                    error!(
                        attempt = attempts,
                        error = %err,
                        error_kind = %err.kind(),
                        "tenant event failed permanently, dead-lettering"
                    );
                    return Disposition::DeadLetter { attempts };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProvisioningError;
    use crate::schema::SchemaName;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn payload(event_type: &str) -> Vec<u8> {
        TenantEvent::builder()
            .event_type(TenantEventType::from(event_type.to_string()))
            .tenant_id("acme")
            .schema_name(SchemaName::derive("acme").unwrap())
            .build()
            .to_vec()
            .unwrap()
    }

    fn counting_failures(calls: Arc<AtomicUsize>) -> TenantEventHandlers {
        TenantEventHandlers::new().on_created(move |_ctx, _event| {
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProvisioningError::database("down"))
            })
        })
    }

    #[tokio::test]
    async fn handlers_run_in_system_context() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let handlers = {
            let seen = seen.clone();
            TenantEventHandlers::new().on_created(move |ctx, _event| {
                *seen.lock().unwrap() = Some(ctx.clone());
                Box::pin(async { Ok(()) })
            })
        };
        let dispatcher = TenantEventDispatcher::new(handlers, RetryPolicy::default());

        let disposition = dispatcher
            .process(&payload("CREATED"), &CancellationToken::new())
            .await;

        assert_eq!(disposition, Disposition::Ack);
        assert!(seen.lock().unwrap().as_ref().unwrap().is_system());
    }

    #[tokio::test]
    async fn unknown_and_unregistered_types_are_acknowledged() {
        let dispatcher =
            TenantEventDispatcher::new(TenantEventHandlers::new(), RetryPolicy::default());
        let token = CancellationToken::new();

        assert_eq!(dispatcher.process(&payload("ARCHIVED"), &token).await, Disposition::Ack);
        assert_eq!(dispatcher.process(&payload("CREATED"), &token).await, Disposition::Ack);
    }

    #[tokio::test]
    async fn malformed_payload_skips_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = TenantEventDispatcher::new(
            counting_failures(calls.clone()),
            RetryPolicy::fixed(3, Duration::ZERO),
        );

        let disposition = dispatcher
            .process(br#"{"eventType":"CREATED"}"#, &CancellationToken::new())
            .await;

        assert_eq!(disposition, Disposition::DeadLetter { attempts: 0 });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_handler_exhausts_retry_budget() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = TenantEventDispatcher::new(
            counting_failures(calls.clone()),
            RetryPolicy::fixed(3, Duration::from_millis(1)),
        );

        let disposition = dispatcher
            .process(&payload("CREATED"), &CancellationToken::new())
            .await;

        assert_eq!(disposition, Disposition::DeadLetter { attempts: 4 });
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn shutdown_during_backoff_requeues() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = TenantEventDispatcher::new(
            counting_failures(calls.clone()),
            RetryPolicy::fixed(3, Duration::from_secs(60)),
        );
        let token = CancellationToken::new();
        token.cancel();

        let disposition = dispatcher.process(&payload("CREATED"), &token).await;

        assert_eq!(disposition, Disposition::Requeue);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
