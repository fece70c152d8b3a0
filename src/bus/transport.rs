//! # Transport seam for the message bus.
//!
//! The router is transport-agnostic: anything that can subscribe, publish,
//! ping, and hand over queued inbound messages works — an MQTT client, a
//! serial bridge, or an in-memory double in tests.
//!
//! ## Rules
//! - All methods take `&self`: a connected transport is shared across the
//!   router's scheduled tasks without a mutable borrow.
//! - `poll` is non-blocking in spirit: it returns an already-received
//!   message or `None`, it does not wait for traffic. The router calls it
//!   from a high-frequency scheduled task and drains until `None`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportError;

/// One inbound message as received from the broker.
#[derive(Debug, Clone)]
pub struct Inbound {
    /// Full topic, including the device prefix.
    pub topic: String,
    /// Raw payload bytes. Decoding is the router's job.
    pub payload: Vec<u8>,
}

impl Inbound {
    /// Convenience constructor used by transports and tests.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Publish/subscribe transport consumed by the router.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Subscribes to a topic filter (e.g. `"clock/bedroom/#"`).
    async fn subscribe(&self, filter: &str) -> Result<(), TransportError>;

    /// Publishes one message. At-most-once: the caller drops on failure.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Sends a protocol-level keepalive ping.
    async fn ping(&self) -> Result<(), TransportError>;

    /// Returns the next queued inbound message, if any.
    async fn poll(&self) -> Result<Option<Inbound>, TransportError>;
}

/// Shared handle to a transport.
pub type TransportRef = Arc<dyn Transport>;
