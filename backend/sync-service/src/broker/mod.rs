//! RabbitMQ plumbing: topology declaration and consumer groups.

pub mod consumer;
pub mod topology;

pub use consumer::ConsumerGroup;
pub use topology::{declare_topology, QueueRoute, QueueSpec, TopologyConfig};
