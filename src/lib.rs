//! # clockvisor
//!
//! **clockvisor** is the firmware core of a connected alarm clock: a
//! cooperative task scheduler and the two stateful protocols built on it —
//! the alarm trigger/cancel state machine and the message-bus
//! routing/heartbeat/state-aggregation layer.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                 ┌─────────────────────────────────────────────┐
//!                 │  Scheduler (named periodic tasks, one tick  │
//!                 │  source, actions run one at a time)         │
//!                 └───┬──────────────┬──────────────┬───────────┘
//!                     │              │              │
//!              alarm_ticker      bus_poll      bus_heartbeat
//!              (1s match)        bus_state     (quiet-period ping)
//!                     │              │
//!                     ▼              ▼
//!          ┌──────────────────┐   ┌──────────────────────────────┐
//!          │   AlarmEngine    │◄──│  MessageRouter               │
//!          │ Idle ⇄ Active    │   │  <prefix># subscribe,        │
//!          │ beep task while  │   │  suffix dispatch, snapshot   │
//!          │ active (200ms)   │   └──────────┬───────────────────┘
//!          └───┬──────────────┘              │
//!              │ Display / Speaker /         │ Transport (MQTT or
//!              │ Buttons / AppManager /      │ anything pub/sub)
//!              │ WallClock seams             ▼
//!              ▼                          broker
//!           host firmware
//! ```
//!
//! ### Execution model
//! Everything runs on one logical thread of control. Scheduled actions and
//! bus callbacks run to completion, interleaved only at explicit await
//! points between actions; no two actions are ever in flight at once, so
//! shared state needs no locking discipline beyond Rust's own. A hung
//! action stalls the whole loop; there is deliberately no per-action
//! timeout.
//!
//! ## Quick start
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use clockvisor::{Device, DeviceConfig, Hardware, TransportRef};
//!
//! # fn hardware() -> Hardware { unimplemented!() }
//! # fn transport() -> TransportRef { unimplemented!() }
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DeviceConfig::from_toml_str(r#"
//!         [alarm]
//!         enabled = true
//!         target_time = "07:30"
//!
//!         [bus]
//!         prefix = "clock/bedroom/"
//!     "#)?;
//!
//!     let device = Device::new(config, hardware(), transport());
//!     device.run(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Remote interface
//! | Topic (under the device prefix) | Direction | Meaning |
//! |---|---|---|
//! | `alarm/enable` | in | `"true"`/`"on"` enables, anything else disables |
//! | `alarm/set` | in | target time `"hh:mm"`, stored verbatim |
//! | `alarm/message` | in | alarm message; mirrored to the status line |
//! | `state` | out, ~60 s | JSON snapshot of all registered state providers |

mod alarm;
mod bus;
mod config;
mod device;
mod error;
mod hw;
mod sched;
mod ticks;

// ---- Public re-exports ----

pub use alarm::AlarmEngine;
pub use bus::{
    Inbound, MessageRouter, StateProducer, TopicHandler, Transport, TransportRef,
    QUIET_PERIOD_MS, STATE_TOPIC,
};
pub use config::{AlarmConfig, BusConfig, DeviceConfig, SharedAlarmConfig};
pub use device::{Device, Hardware};
pub use error::{ConfigError, TaskError, TransportError};
pub use hw::{AppManager, Buttons, Display, PressCallback, Speaker, WallClock, WallTime};
pub use sched::{Action, ActionFn, ActionRef, Scheduler};
pub use ticks::{ticks_diff, Monotonic, SystemTicks};
