// Kafka backend for the durable message queue
//
// The chat server publishes every routed message to a single topic keyed by
// receiver; persistence consumers in one consumer group drain it into the
// message store.

pub mod config;
pub mod consumer;
pub mod producer;

pub use consumer::MessageConsumer;
pub use producer::MessageProducer;
