use crate::error::{ProvisioningError, ProvisioningResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 租户 schema 名前缀
pub const SCHEMA_PREFIX: &str = "tenant_";

/// schema 名推导规则的版本号；规则变化必须伴随已有 schema 的重命名方案
pub const SCHEMA_NAME_DERIVATION_VERSION: u32 = 1;

/// Postgres 标识符的最大字节数（NAMEDATALEN - 1）
const MAX_IDENTIFIER_LEN: usize = 63;

/// 租户 schema 名（值对象）
///
/// 只允许 `[a-z0-9_]` 且不以数字开头，保证可以安全地拼接进 DDL 语句。
///
/// ```
/// use tenancy_domain::schema::SchemaName;
///
/// let name = SchemaName::derive("Acme-Corp").unwrap();
/// assert_eq!(name.as_str(), "tenant_acme_corp");
/// assert!(SchemaName::parse("tenant_acme\"; drop").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaName(String);

impl SchemaName {
    /// 由租户 ID 推导 schema 名：前缀 + 小写化并把非 `[a-z0-9_]` 字符替换为 `_`
    ///
    /// 纯函数，任何服务都可以独立重算，不需要查询注册中心。
    pub fn derive(tenant_id: &str) -> ProvisioningResult<Self> {
        let tenant_id = tenant_id.trim();
        if tenant_id.is_empty() {
            return Err(ProvisioningError::InvalidSchemaName {
                reason: "tenant id is empty".to_string(),
            });
        }

        let sanitized: String = tenant_id
            .chars()
            .map(|c| {
                let c = c.to_ascii_lowercase();
                if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        Self::parse(format!("{SCHEMA_PREFIX}{sanitized}"))
    }

    /// 校验并构造 schema 名
    pub fn parse(value: impl Into<String>) -> ProvisioningResult<Self> {
        let value = value.into();
        Self::validate(&value)?;
        Ok(Self(value))
    }

    /// 仅用于 crate 内已知合法的常量
    pub(crate) fn new_unchecked(value: &str) -> Self {
        Self(value.to_string())
    }

    fn validate(value: &str) -> ProvisioningResult<()> {
        let invalid = |reason: String| ProvisioningError::InvalidSchemaName { reason };

        let Some(first) = value.chars().next() else {
            return Err(invalid("schema name is empty".to_string()));
        };
        if value.len() > MAX_IDENTIFIER_LEN {
            return Err(invalid(format!(
                "schema name exceeds {MAX_IDENTIFIER_LEN} bytes: {value}"
            )));
        }
        if !(first.is_ascii_lowercase() || first == '_') {
            return Err(invalid(format!(
                "schema name must start with a lowercase letter or '_': {value}"
            )));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(invalid(format!(
                "schema name contains characters outside [a-z0-9_]: {value}"
            )));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 双引号包裹的标识符，用于拼接 DDL
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SchemaName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SchemaName {
    type Error = ProvisioningError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SchemaName> for String {
    fn from(value: SchemaName) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic_and_sanitized() {
        assert_eq!(SchemaName::derive("acme").unwrap().as_str(), "tenant_acme");
        assert_eq!(
            SchemaName::derive(" ACME.eu-west ").unwrap().as_str(),
            "tenant_acme_eu_west"
        );
        assert_eq!(
            SchemaName::derive("acme").unwrap(),
            SchemaName::derive("acme").unwrap()
        );
    }

    #[test]
    fn derive_rejects_empty_and_oversized_ids() {
        assert!(SchemaName::derive("   ").is_err());
        assert!(SchemaName::derive(&"x".repeat(64)).is_err());
    }

    #[test]
    fn parse_rejects_unsafe_identifiers() {
        assert!(SchemaName::parse("").is_err());
        assert!(SchemaName::parse("1tenant").is_err());
        assert!(SchemaName::parse("Tenant_acme").is_err());
        assert!(SchemaName::parse("tenant_acme; DROP SCHEMA public").is_err());
        assert!(SchemaName::parse("_tenant").is_ok());
    }

    #[test]
    fn quoted_wraps_identifier() {
        let name = SchemaName::parse("tenant_acme").unwrap();
        assert_eq!(name.quoted(), "\"tenant_acme\"");
    }
}
