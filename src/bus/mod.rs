//! Message-bus client layer.
//!
//! - [`Transport`], [`Inbound`], [`TransportRef`] the broker seam;
//! - [`MessageRouter`] dispatch, keepalive, and state aggregation on top
//!   of the shared scheduler.
//!
//! This is a single device-side client, not a broker: one prefix, one
//! subscription, at-most-once publishing.

mod router;
mod transport;

pub use router::{MessageRouter, StateProducer, TopicHandler, QUIET_PERIOD_MS, STATE_TOPIC};
pub use transport::{Inbound, Transport, TransportRef};
