mod producer;
mod worker;

pub use self::producer::KafkaOutboxProducer;
pub use self::worker::OutboxWorkerPool;
