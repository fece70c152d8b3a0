//! # MessageRouter: device-side client for the configuration bus.
//!
//! Wraps a [`Transport`] and gives the rest of the firmware three things:
//! per-topic-suffix callback dispatch for inbound messages, prefix-scoped
//! publishing, and two background duties installed on the shared scheduler —
//! a quiet-period keepalive and a periodic aggregated-state snapshot.
//!
//! ## Architecture
//! ```text
//!                         ┌───────────────────────────────┐
//!   broker ── inbound ──► │ bus_poll (10ms): drain + dispatch ──► handlers
//!                         │ bus_heartbeat (250ms): ping if idle ≥ 5min
//!                         │ bus_state (60s): providers → JSON → publish
//!                         └───────────────────────────────┘
//!   publish(topic, ...) ──► "<prefix><topic>" ──► broker   (drop on failure)
//! ```
//!
//! ## Rules
//! - Registration (`register_topic_callback` / `register_state_callback`) is
//!   append-only for the process lifetime; dispatch snapshots the matching
//!   handlers before invoking any of them, so a handler that registers more
//!   callbacks cannot invalidate the iteration.
//! - Publish and ping failures are logged and dropped. At-most-once, no
//!   retry queue; the next scheduled attempt proceeds normally.
//! - A payload that is not valid UTF-8 skips dispatch for that message
//!   entirely (logged); other messages are unaffected.
//!
//! ## Known limitation
//! The topic suffix is computed by *removing* the device prefix from the
//! front of the topic (repeatedly), not by matching it once. A topic whose
//! remainder itself starts with the prefix text, e.g.
//! `clock/clock/alarm/set` under prefix `clock/`, loses both copies and
//! dispatches as `alarm/set`. This mirrors the deployed behavior that
//! remote tooling depends on; do not "fix" it without coordinating a
//! protocol change.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bus::transport::{Inbound, TransportRef};
use crate::error::TransportError;
use crate::sched::{ActionFn, Scheduler};
use crate::ticks::{ticks_diff, Monotonic};

/// Suffix of the outbound aggregated-state topic.
pub const STATE_TOPIC: &str = "state";

/// Ping only when nothing proved liveness for this long.
pub const QUIET_PERIOD_MS: u32 = 300_000;

const TASK_POLL: &str = "bus_poll";
const TASK_HEARTBEAT: &str = "bus_heartbeat";
const TASK_STATE: &str = "bus_state";

const POLL_EVERY: Duration = Duration::from_millis(10);
const HEARTBEAT_EVERY: Duration = Duration::from_millis(250);
const STATE_EVERY: Duration = Duration::from_secs(60);

/// Handler invoked for every matching inbound message.
///
/// Receives the ORIGINAL topic (prefix included) and the decoded payload.
pub type TopicHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Producer of one named entry in the aggregated state snapshot.
pub type StateProducer = Arc<dyn Fn() -> serde_json::Value + Send + Sync>;

struct TopicBinding {
    suffix: String,
    handler: TopicHandler,
}

struct StateProvider {
    name: String,
    producer: StateProducer,
}

/// Device-side pub/sub client: dispatch, keepalive, state aggregation.
pub struct MessageRouter {
    /// Self-handle for the scheduled duty closures; set by [`MessageRouter::new`].
    weak: Weak<MessageRouter>,
    transport: TransportRef,
    ticks: Arc<dyn Monotonic>,
    prefix: String,
    bindings: Mutex<Vec<TopicBinding>>,
    providers: Mutex<Vec<StateProvider>>,
    last_ping: Mutex<u32>,
}

impl MessageRouter {
    /// Creates a router over `transport`, scoped to the device `prefix`.
    pub fn new(
        transport: TransportRef,
        prefix: impl Into<String>,
        ticks: Arc<dyn Monotonic>,
    ) -> Arc<Self> {
        let last_ping = ticks.ticks_ms();
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            transport,
            ticks,
            prefix: prefix.into(),
            bindings: Mutex::new(Vec::new()),
            providers: Mutex::new(Vec::new()),
            last_ping: Mutex::new(last_ping),
        })
    }

    /// Subscribes to everything under the device prefix and sends the
    /// initial ping, stamping the keepalive clock.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let filter = format!("{}#", self.prefix);
        self.transport.subscribe(&filter).await?;
        info!(filter = %filter, "subscribed to device namespace");

        self.transport.ping().await?;
        *self.last_ping.lock().unwrap() = self.ticks.ticks_ms();
        Ok(())
    }

    /// Registers `handler` for inbound messages whose prefix-stripped topic
    /// equals `suffix`. Multiple handlers per suffix run in registration
    /// order. Append-only.
    pub fn register_topic_callback(&self, suffix: impl Into<String>, handler: TopicHandler) {
        self.bindings.lock().unwrap().push(TopicBinding {
            suffix: suffix.into(),
            handler,
        });
    }

    /// Registers `producer` under `name` in the state snapshot. Append-only;
    /// if a name is registered twice the LAST registration wins at snapshot
    /// build time.
    pub fn register_state_callback(&self, name: impl Into<String>, producer: StateProducer) {
        self.providers.lock().unwrap().push(StateProvider {
            name: name.into(),
            producer,
        });
    }

    /// Installs the router's periodic duties on the shared scheduler.
    pub fn install(&self, scheduler: &Scheduler) {
        let Some(me) = self.weak.upgrade() else {
            return;
        };

        {
            let me = me.clone();
            scheduler.schedule(
                TASK_POLL,
                POLL_EVERY,
                ActionFn::arc(move || {
                    let me = me.clone();
                    async move {
                        me.poll_inbound().await;
                        Ok::<_, crate::error::TaskError>(())
                    }
                }),
            );
        }

        {
            let me = me.clone();
            scheduler.schedule(
                TASK_HEARTBEAT,
                HEARTBEAT_EVERY,
                ActionFn::arc(move || {
                    let me = me.clone();
                    async move {
                        me.heartbeat().await;
                        Ok::<_, crate::error::TaskError>(())
                    }
                }),
            );
        }

        scheduler.schedule(
            TASK_STATE,
            STATE_EVERY,
            ActionFn::arc(move || {
                let me = me.clone();
                async move {
                    me.publish_state().await;
                    Ok::<_, crate::error::TaskError>(())
                }
            }),
        );
    }

    /// Publishes `payload` on `<prefix><topic>`. Failures are logged and the
    /// message is dropped.
    pub async fn publish(&self, topic: &str, payload: &[u8]) {
        let full = format!("{}{}", self.prefix, topic);
        if let Err(e) = self.transport.publish(&full, payload).await {
            warn!(topic = %full, label = e.as_label(), error = %e, "publish dropped");
        }
    }

    /// Drains every queued inbound message and dispatches each one.
    pub async fn poll_inbound(&self) {
        loop {
            match self.transport.poll().await {
                Ok(Some(msg)) => self.dispatch(&msg),
                Ok(None) => break,
                Err(e) => {
                    warn!(label = e.as_label(), error = %e, "inbound poll failed");
                    break;
                }
            }
        }
    }

    /// Pings the transport if the quiet period has elapsed since the last
    /// successful ping, using wraparound-safe tick arithmetic.
    ///
    /// A failed ping does NOT stamp the clock, so the next heartbeat check
    /// retries immediately instead of waiting out another quiet period.
    pub async fn heartbeat(&self) {
        let now = self.ticks.ticks_ms();
        let last = *self.last_ping.lock().unwrap();
        if ticks_diff(now, last) < QUIET_PERIOD_MS {
            return;
        }
        match self.transport.ping().await {
            Ok(()) => {
                *self.last_ping.lock().unwrap() = now;
                debug!("keepalive ping sent");
            }
            Err(e) => warn!(label = e.as_label(), error = %e, "keepalive ping failed"),
        }
    }

    /// Builds the snapshot and publishes it on `<prefix>state`.
    pub async fn publish_state(&self) {
        let state = self.build_state();
        match serde_json::to_vec(&state) {
            Ok(body) => self.publish(STATE_TOPIC, &body).await,
            Err(e) => warn!(error = %e, "state snapshot serialization failed"),
        }
    }

    /// Invokes every registered provider and assembles name → value pairs.
    ///
    /// Providers run in registration order outside the registry lock, so a
    /// provider may itself touch the router. Duplicate names overwrite:
    /// the last registration wins.
    pub fn build_state(&self) -> serde_json::Value {
        let providers: Vec<(String, StateProducer)> = {
            let providers = self.providers.lock().unwrap();
            providers
                .iter()
                .map(|p| (p.name.clone(), p.producer.clone()))
                .collect()
        };

        let mut state = serde_json::Map::new();
        for (name, producer) in providers {
            state.insert(name, producer());
        }
        serde_json::Value::Object(state)
    }

    /// Dispatches one inbound message to every binding whose suffix equals
    /// the prefix-stripped topic.
    fn dispatch(&self, msg: &Inbound) {
        let payload = match std::str::from_utf8(&msg.payload) {
            Ok(p) => p,
            Err(e) => {
                warn!(topic = %msg.topic, error = %e, "dropping message with undecodable payload");
                return;
            }
        };

        // Prefix REMOVAL, not prefix matching; see the module docs for the
        // limitation this preserves.
        let suffix = msg.topic.trim_start_matches(self.prefix.as_str());

        let matched: Vec<TopicHandler> = {
            let bindings = self.bindings.lock().unwrap();
            bindings
                .iter()
                .filter(|b| b.suffix == suffix)
                .map(|b| b.handler.clone())
                .collect()
        };
        if matched.is_empty() {
            // Unmatched topics are silently ignored by contract.
            return;
        }
        debug!(topic = %msg.topic, suffix = %suffix, handlers = matched.len(), "dispatching");
        for handler in matched {
            handler(&msg.topic, payload);
        }
    }
}
