//! `pseudogps-middleware` – internal event routing.
//!
//! Home of the [`EventBus`]: a topic-partitioned broadcast bus connecting
//! the tracker loop, the station server, and the CLI.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
