//! 租户供给子系统统一错误定义
//!
//! 覆盖消息解析、schema 目录、迁移、消息拓扑与基础设施故障，
//! 并通过 [`ErrorKind`] 归类为"格式错误 / 前置条件违背 / 瞬时故障"三类，
//! 便于日志与死信排查时快速判断是否需要人工介入。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProvisioningError {
    // --- 消息契约 ---
    #[error("malformed tenant event: {reason}")]
    MalformedEvent { reason: String },
    #[error("invalid schema name: {reason}")]
    InvalidSchemaName { reason: String },
    #[error("invalid service name: {reason}")]
    InvalidServiceName { reason: String },
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    // --- schema 目录 ---
    #[error("schema already exists: {schema}")]
    SchemaAlreadyExists { schema: String },
    #[error("schema not found: {schema}")]
    SchemaNotFound { schema: String },

    // --- 迁移 ---
    #[error("invalid migration set: {reason}")]
    InvalidMigrations { reason: String },
    #[error("unknown provisioning strategy: {value}")]
    InvalidStrategy { value: String },
    #[error("migration failed: schema={schema}, version={version}, reason={reason}")]
    Migration {
        schema: String,
        version: i64,
        reason: String,
    },

    // --- 消息拓扑 ---
    #[error("topology conflict: resource={resource}, reason={reason}")]
    TopologyConflict { resource: String, reason: String },
    #[error("topology resource not found: {resource}")]
    TopologyNotFound { resource: String },

    // --- 基础设施 ---
    #[error("database error: {reason}")]
    Database { reason: String },
    #[error("broker error: {reason}")]
    Broker { reason: String },
}

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 无法解析的消息，重试永远不会成功
    Malformed,
    /// 逻辑或配置缺陷（如重复建 schema、拓扑参数冲突）
    Precondition,
    /// 数据库/消息中间件不可用等，可重试
    Transient,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Malformed => "malformed",
            ErrorKind::Precondition => "precondition",
            ErrorKind::Transient => "transient",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProvisioningError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            reason: reason.into(),
        }
    }

    pub fn database(reason: impl Into<String>) -> Self {
        Self::Database {
            reason: reason.into(),
        }
    }

    pub fn broker(reason: impl Into<String>) -> Self {
        Self::Broker {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedEvent { .. } | Self::Serde { .. } => ErrorKind::Malformed,
            Self::InvalidSchemaName { .. }
            | Self::InvalidServiceName { .. }
            | Self::SchemaAlreadyExists { .. }
            | Self::SchemaNotFound { .. }
            | Self::InvalidMigrations { .. }
            | Self::InvalidStrategy { .. }
            | Self::TopologyConflict { .. }
            | Self::TopologyNotFound { .. } => ErrorKind::Precondition,
            Self::Migration { .. } | Self::Database { .. } | Self::Broker { .. } => {
                ErrorKind::Transient
            }
        }
    }
}

/// 统一 Result 类型别名
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;

// 允许在基础设施层直接使用 `?` 将 sqlx 错误转换为 ProvisioningError
#[cfg(feature = "postgres")]
impl From<sqlx::Error> for ProvisioningError {
    fn from(err: sqlx::Error) -> Self {
        ProvisioningError::Database {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors_by_kind() {
        assert_eq!(
            ProvisioningError::malformed("no tenantId").kind(),
            ErrorKind::Malformed
        );
        assert_eq!(
            ProvisioningError::SchemaAlreadyExists {
                schema: "tenant_acme".into()
            }
            .kind(),
            ErrorKind::Precondition
        );
        assert_eq!(
            ProvisioningError::database("connection refused").kind(),
            ErrorKind::Transient
        );
        assert_eq!(ErrorKind::Transient.to_string(), "transient");
    }
}
