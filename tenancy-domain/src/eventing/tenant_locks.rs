use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 按租户 ID 串行化事件处理
///
/// 同一租户的事件不会被两个 worker 同时处理（避免 DELETED 与 CREATED 交错）；
/// 不同租户之间互不阻塞。`tokio::sync::Mutex` 按等待顺序公平唤醒，
/// 先到的事件先执行。
#[derive(Clone, Default)]
pub struct TenantLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// 持有期间独占该租户；释放时清理无人等待的条目
pub struct TenantGuard {
    guard: Option<OwnedMutexGuard<()>>,
    tenant_id: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, tenant_id: &str) -> TenantGuard {
        let lock = self
            .locks
            .entry(tenant_id.to_string())
            .or_default()
            .value()
            .clone();
        let guard = lock.lock_owned().await;

        TenantGuard {
            guard: Some(guard),
            tenant_id: tenant_id.to_string(),
            locks: self.locks.clone(),
        }
    }

    /// 当前持有或等待中的租户数
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for TenantGuard {
    fn drop(&mut self) {
        // 先释放互斥锁，剩下的引用只来自 map 本身时才移除
        self.guard.take();
        self.locks
            .remove_if(&self.tenant_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_tenant_is_serialized() {
        let locks = TenantLocks::new();
        let first = locks.acquire("acme").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("acme").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        let other = tokio::time::timeout(Duration::from_millis(100), locks.acquire("globex")).await;
        assert!(other.is_ok(), "different tenants must not block each other");
        drop(other);

        drop(first);
        contender.await.unwrap();
        assert!(locks.is_empty());
    }
}
