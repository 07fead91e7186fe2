use serde::{Deserialize, Serialize};
use std::fmt;

/// 租户生命周期事件类型
///
/// 线上格式为大写字符串（`CREATED` 等）。未知类型保留为 `Other`，
/// 由分发器记录后直接确认，保证新增事件类型不会堵塞队列。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TenantEventType {
    Created,
    Deleted,
    Updated,
    StatusChanged,
    Other(String),
}

impl TenantEventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "CREATED",
            Self::Deleted => "DELETED",
            Self::Updated => "UPDATED",
            Self::StatusChanged => "STATUS_CHANGED",
            Self::Other(raw) => raw,
        }
    }

    /// 注册中心发布到主题交换机时使用的路由键
    pub fn routing_key(&self) -> String {
        format!("tenant.{}", self.as_str().to_ascii_lowercase())
    }
}

impl From<String> for TenantEventType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "CREATED" => Self::Created,
            "DELETED" => Self::Deleted,
            "UPDATED" => Self::Updated,
            "STATUS_CHANGED" => Self::StatusChanged,
            _ => Self::Other(value),
        }
    }
}

impl From<TenantEventType> for String {
    fn from(value: TenantEventType) -> Self {
        match value {
            TenantEventType::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for TenantEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_types_decode() {
        let t: TenantEventType = serde_json::from_str("\"STATUS_CHANGED\"").unwrap();
        assert_eq!(t, TenantEventType::StatusChanged);

        let t: TenantEventType = serde_json::from_str("\"ARCHIVED\"").unwrap();
        assert_eq!(t, TenantEventType::Other("ARCHIVED".into()));
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"ARCHIVED\"");
    }

    #[test]
    fn routing_keys_match_inbound_pattern() {
        assert_eq!(TenantEventType::Created.routing_key(), "tenant.created");
        assert_eq!(
            TenantEventType::StatusChanged.routing_key(),
            "tenant.status_changed"
        );
    }
}
