//! Network subsystem: WebSocket delivery of wire frames to the consumer

pub mod publisher;
pub mod state;
pub mod transport;

pub use publisher::{spawn_publisher, Publisher};
pub use state::{ConnectionState, PublisherStats, PublisherStatus};
pub use transport::Connection;
