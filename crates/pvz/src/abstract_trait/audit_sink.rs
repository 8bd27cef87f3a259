use std::sync::Arc;

use shared::model::AuditLog;

pub type DynAuditSink = Arc<dyn AuditSinkTrait + Send + Sync>;

/// Ingress side of the audit pipeline. `log` must never block the caller.
pub trait AuditSinkTrait {
    fn log(&self, log: AuditLog);

    fn log_order_status_change(&self, order_id: i64, old_status: &str, new_status: &str) {
        self.log(AuditLog::order_status(order_id, old_status, new_status));
    }
}
