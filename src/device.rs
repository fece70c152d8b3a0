//! # Device: composition root.
//!
//! Builds and owns the scheduler, the message router, and the alarm engine,
//! wires them together, and drives the tick loop. Every dependency is
//! injected; nothing in the crate is a singleton.
//!
//! ```text
//! DeviceConfig ─┐
//! Hardware ─────┼──► Device::new ──► Scheduler ◄── router duties
//! TransportRef ─┘                        ▲    ◄── alarm ticker (+ beep task
//!                                        │         while active)
//!                      Device::run(token)┘  (tick source)
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::alarm::AlarmEngine;
use crate::bus::{MessageRouter, TransportRef};
use crate::config::{DeviceConfig, SharedAlarmConfig};
use crate::error::TransportError;
use crate::hw::{AppManager, Buttons, Display, Speaker, WallClock};
use crate::sched::Scheduler;
use crate::ticks::{Monotonic, SystemTicks};

/// Scheduler resolution. Must stay well below the fastest task cadence
/// (the 200 ms beep tick and the 10 ms bus poll).
const TICK_EVERY: Duration = Duration::from_millis(5);

/// Bundle of the hardware collaborators the core consumes.
pub struct Hardware {
    pub display: Arc<dyn Display>,
    pub speaker: Arc<dyn Speaker>,
    pub buttons: Arc<dyn Buttons>,
    pub apps: Arc<dyn AppManager>,
    pub clock: Arc<dyn WallClock>,
}

/// The assembled firmware core.
pub struct Device {
    scheduler: Arc<Scheduler>,
    router: Arc<MessageRouter>,
    alarm: Arc<AlarmEngine>,
    bus_enabled: bool,
}

impl Device {
    /// Wires all components from configuration, hardware, and a transport.
    ///
    /// With `config.bus.enabled == false` the router is still constructed
    /// (the alarm registers its callbacks against it) but its periodic
    /// duties are not installed and [`run`](Device::run) skips the connect.
    pub fn new(config: DeviceConfig, hardware: Hardware, transport: TransportRef) -> Self {
        let scheduler = Arc::new(Scheduler::new());
        let ticks: Arc<dyn Monotonic> = Arc::new(SystemTicks::new());

        let router = MessageRouter::new(transport, config.bus.prefix.clone(), ticks);
        if config.bus.enabled {
            router.install(&scheduler);
        }

        let alarm_config: SharedAlarmConfig = Arc::new(Mutex::new(config.alarm));
        let alarm = AlarmEngine::new(
            scheduler.clone(),
            alarm_config,
            hardware.display,
            hardware.speaker,
            hardware.apps,
            hardware.clock,
        );
        alarm.install(&router, hardware.buttons.as_ref());

        Self {
            scheduler,
            router,
            alarm,
            bus_enabled: config.bus.enabled,
        }
    }

    /// The shared scheduler, for hosts that add their own tasks (clock
    /// face redraws, sensor polls, ...).
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// The message router, for hosts that publish their own events.
    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    /// The alarm engine.
    pub fn alarm(&self) -> &Arc<AlarmEngine> {
        &self.alarm
    }

    /// Connects the bus (when enabled) and drives the tick loop until
    /// `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) -> Result<(), TransportError> {
        if self.bus_enabled {
            self.router.connect().await?;
        }
        info!(tick_ms = TICK_EVERY.as_millis() as u64, "device running");
        self.scheduler.run(TICK_EVERY, token).await;
        info!("device stopped");
        Ok(())
    }
}
