mod deadline;
mod logs;
mod metrics;
mod shutdown;

pub use self::deadline::parse_deadline;
pub use self::logs::init_logger;
pub use self::metrics::{OrderMetrics, RequestLabels, RequestMetrics};
pub use self::shutdown::shutdown_signal;
