pub mod abstract_trait;
pub mod audit;
pub mod cache;
pub mod consumer;
pub mod outbox;
pub mod repository;
pub mod service;
pub mod state;
