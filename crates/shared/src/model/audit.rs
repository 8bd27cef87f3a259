use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditLogType {
    #[serde(rename = "ORDER_STATUS")]
    OrderStatus,
}

impl AuditLogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditLogType::OrderStatus => "ORDER_STATUS",
        }
    }
}

impl TryFrom<&str> for AuditLogType {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "ORDER_STATUS" => Ok(AuditLogType::OrderStatus),
            other => Err(format!("unknown audit log type '{other}'")),
        }
    }
}

/// A single business event flowing through the audit pipeline. The
/// request/response fields mirror the nullable storage columns reserved for
/// the caller-facing surfaces; this core only ever emits status changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    #[serde(rename = "type")]
    pub kind: AuditLogType,
    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_status: Option<String>,
}

impl AuditLog {
    pub fn order_status(order_id: i64, old_status: &str, new_status: &str) -> Self {
        Self {
            kind: AuditLogType::OrderStatus,
            timestamp: Utc::now(),
            request_id: None,
            path: None,
            method: None,
            ip: None,
            body: None,
            status_code: None,
            order_id: Some(order_id),
            old_status: Some(old_status.to_string()),
            new_status: Some(new_status.to_string()),
        }
    }
}

/// Database row shape of `audit_logs`; every event-specific column is
/// nullable.
#[derive(Debug, FromRow)]
pub struct AuditLogRow {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub path: Option<String>,
    pub method: Option<String>,
    pub request_id: Option<String>,
    pub ip: Option<String>,
    pub body: Option<String>,
    pub status_code: Option<i32>,
    pub order_id: Option<i64>,
    pub old_status: Option<String>,
    pub new_status: Option<String>,
}

impl TryFrom<AuditLogRow> for AuditLog {
    type Error = String;

    fn try_from(row: AuditLogRow) -> Result<Self, Self::Error> {
        let kind = AuditLogType::try_from(row.kind.as_str())?;

        // Body is stored as text; non-JSON content is kept as a plain string.
        let body = row.body.filter(|raw| !raw.is_empty()).map(|raw| {
            serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
        });

        Ok(AuditLog {
            kind,
            timestamp: row.timestamp,
            request_id: row.request_id,
            path: row.path,
            method: row.method,
            ip: row.ip,
            body,
            status_code: row.status_code,
            order_id: row.order_id,
            old_status: row.old_status,
            new_status: row.new_status,
        })
    }
}

/// Identifiers of a reserved dispatch task and its audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct AuditTaskRef {
    #[sqlx(rename = "id")]
    pub task_id: i64,
    pub log_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Created,
    Processing,
    Completed,
    Failed,
    NoAttemptsLeft,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Created => "CREATED",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::NoAttemptsLeft => "NO_ATTEMPTS_LEFT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_log_serializes_only_relevant_fields() {
        let log = AuditLog::order_status(42, "accepted", "delivered");

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["type"], "ORDER_STATUS");
        assert_eq!(json["order_id"], 42);
        assert_eq!(json["old_status"], "accepted");
        assert_eq!(json["new_status"], "delivered");
        assert!(json.get("path").is_none());
        assert!(json.get("status_code").is_none());
    }

    #[test]
    fn row_body_falls_back_to_raw_string_for_non_json() {
        let row = AuditLogRow {
            id: 1,
            timestamp: Utc::now(),
            kind: "ORDER_STATUS".to_string(),
            path: None,
            method: None,
            request_id: None,
            ip: None,
            body: Some("not json at all".to_string()),
            status_code: None,
            order_id: Some(7),
            old_status: Some("none".to_string()),
            new_status: Some("accepted".to_string()),
        };

        let log = AuditLog::try_from(row).unwrap();
        assert_eq!(
            log.body,
            Some(serde_json::Value::String("not json at all".to_string()))
        );
        assert_eq!(log.order_id, Some(7));
    }

    #[test]
    fn unknown_log_type_is_rejected() {
        assert!(AuditLogType::try_from("REQUEST").is_err());
        assert!(AuditLogType::try_from("TRACE").is_err());
    }
}
