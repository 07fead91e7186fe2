use super::TenantEventType;
use crate::error::{ProvisioningError, ProvisioningResult};
use crate::schema::SchemaName;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 租户生命周期事件（不可变消息）
///
/// 由注册中心在每次状态迁移时发布一次，各服务的队列各自收到一份。
#[derive(Debug, Clone, PartialEq, Builder, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantEvent {
    #[builder(into)]
    event_type: TenantEventType,
    #[builder(into)]
    tenant_id: String,
    schema_name: SchemaName,
    #[builder(into)]
    status: Option<String>,
    #[builder(default = Utc::now())]
    occurred_at: DateTime<Utc>,
}

/// 线上载荷：所有字段可缺省，以便给出精确的拒收原因
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTenantEvent {
    event_type: Option<String>,
    tenant_id: Option<String>,
    schema_name: Option<String>,
    status: Option<String>,
    occurred_at: Option<DateTime<Utc>>,
}

impl TenantEvent {
    /// 从消息体解析事件
    ///
    /// 缺少 `eventType`/`tenantId`/`schemaName`、JSON 非法或 schema 名不合法
    /// 均返回 `MalformedEvent`（不可重试）。
    pub fn from_slice(payload: &[u8]) -> ProvisioningResult<Self> {
        let raw: RawTenantEvent = serde_json::from_slice(payload)
            .map_err(|e| ProvisioningError::malformed(format!("invalid json: {e}")))?;

        let event_type = required(raw.event_type, "eventType")?;
        let tenant_id = required(raw.tenant_id, "tenantId")?;
        let schema_name = required(raw.schema_name, "schemaName")?;
        let schema_name = SchemaName::parse(schema_name)
            .map_err(|e| ProvisioningError::malformed(e.to_string()))?;

        Ok(Self {
            event_type: TenantEventType::from(event_type),
            tenant_id,
            schema_name,
            status: raw.status,
            occurred_at: raw.occurred_at.unwrap_or_else(Utc::now),
        })
    }

    pub fn to_vec(&self) -> ProvisioningResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn event_type(&self) -> &TenantEventType {
        &self.event_type
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn schema_name(&self) -> &SchemaName {
        &self.schema_name
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// schema 名是否与本服务按当前推导规则重算的结果一致
    pub fn schema_matches_derivation(&self) -> bool {
        SchemaName::derive(&self.tenant_id)
            .map(|derived| derived == self.schema_name)
            .unwrap_or(false)
    }
}

fn required(value: Option<String>, field: &str) -> ProvisioningResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ProvisioningError::malformed(format!(
            "missing required field `{field}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parses_wire_payload() {
        let payload = br#"{
            "eventType": "STATUS_CHANGED",
            "tenantId": "acme",
            "schemaName": "tenant_acme",
            "status": "SUSPENDED",
            "occurredAt": "2026-01-02T03:04:05Z"
        }"#;

        let event = TenantEvent::from_slice(payload).unwrap();
        assert_eq!(event.event_type(), &TenantEventType::StatusChanged);
        assert_eq!(event.tenant_id(), "acme");
        assert_eq!(event.schema_name().as_str(), "tenant_acme");
        assert_eq!(event.status(), Some("SUSPENDED"));
        assert_eq!(event.occurred_at().to_rfc3339(), "2026-01-02T03:04:05+00:00");
        assert!(event.schema_matches_derivation());
    }

    #[test]
    fn missing_required_fields_are_malformed() {
        let payloads: [&[u8]; 5] = [
            br#"{"tenantId":"acme","schemaName":"tenant_acme"}"#,
            br#"{"eventType":"CREATED","schemaName":"tenant_acme"}"#,
            br#"{"eventType":"CREATED","tenantId":"acme"}"#,
            br#"{"eventType":"CREATED","tenantId":"  ","schemaName":"tenant_acme"}"#,
            br#"not json"#,
        ];
        for payload in payloads {
            let err = TenantEvent::from_slice(payload).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Malformed, "{err}");
        }
    }

    #[test]
    fn unsafe_schema_name_is_malformed() {
        let payload =
            br#"{"eventType":"CREATED","tenantId":"acme","schemaName":"x\"; DROP SCHEMA public"}"#;
        let err = TenantEvent::from_slice(payload).unwrap_err();
        assert!(matches!(err, ProvisioningError::MalformedEvent { .. }));
    }

    #[test]
    fn builder_output_decodes_back() {
        let event = TenantEvent::builder()
            .event_type(TenantEventType::Created)
            .tenant_id("acme")
            .schema_name(SchemaName::derive("acme").unwrap())
            .build();

        let decoded = TenantEvent::from_slice(&event.to_vec().unwrap()).unwrap();
        assert_eq!(decoded, event);
    }
}
