use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// 每个租户最近一次 DELETED 事件的发生时间
///
/// 与 [`TenantLocks`](super::TenantLocks) 的条目不同，记录在分发器存活期间一直保留，
/// 用来识别晚于 DELETED 到达、实际却更早发生的 CREATED/UPDATED。
#[derive(Clone, Default)]
pub struct DeletionLedger {
    deleted_at: Arc<DashMap<String, DateTime<Utc>>>,
}

impl DeletionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录删除时间，只保留最晚的一次
    pub fn record(&self, tenant_id: &str, occurred_at: DateTime<Utc>) {
        self.deleted_at
            .entry(tenant_id.to_string())
            .and_modify(|at| {
                if occurred_at > *at {
                    *at = occurred_at;
                }
            })
            .or_insert(occurred_at);
    }

    pub fn deleted_at(&self, tenant_id: &str) -> Option<DateTime<Utc>> {
        self.deleted_at.get(tenant_id).map(|at| *at)
    }

    /// 事件发生时间不晚于已记录的删除时，返回该删除时间
    pub fn superseding(
        &self,
        tenant_id: &str,
        occurred_at: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.deleted_at(tenant_id)
            .filter(|deleted_at| occurred_at <= *deleted_at)
    }
}
