mod filter;
mod logger;
mod processor;

pub use self::filter::load_filter_config;
pub use self::logger::AuditLogger;
pub use self::processor::{PersistentLogProcessor, StdoutLogProcessor};
