// spalink-mqtt: message-bus plumbing for the spa bridge.
//
// Read state and write intents are exposed as sibling channels per
// property: the read topic reports the current value (retained), the
// `<topic>/set` sibling accepts new desired values.

pub mod client;
pub mod commands;
pub mod error;
pub mod publisher;
pub mod topics;

pub use client::{BusClient, BusSettings, IncomingPublish};
pub use commands::{IntakeCommand, parse_command};
pub use error::BusError;
pub use publisher::BusBridge;
pub use topics::{BusMessage, TopicScheme};
