mod audit;
mod order;

pub use self::audit::{AuditLog, AuditLogRow, AuditLogType, AuditTaskRef, TaskStatus};
pub use self::order::{Order, OrderRow, OrderState, PackageType, WrapperType};
