//! Desk-top simulation of the alarm clock: console hardware, an in-memory
//! transport, and a wall clock that reaches the alarm minute two seconds
//! after startup. Remote configuration arrives through the same transport
//! queue a broker would feed.
//!
//! Run with: `cargo run --example simulator`

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use clockvisor::{
    AppManager, Buttons, Device, DeviceConfig, Display, Inbound, PressCallback, Speaker,
    Transport, TransportError, WallClock, WallTime,
};

/// Transport double: inbound messages are queued by the demo itself,
/// outbound traffic is printed.
#[derive(Default)]
struct LoopbackTransport {
    inbound: Mutex<VecDeque<Inbound>>,
}

impl LoopbackTransport {
    fn inject(&self, topic: &str, payload: &str) {
        println!("[broker] -> {topic} {payload}");
        self.inbound
            .lock()
            .unwrap()
            .push_back(Inbound::new(topic, payload.as_bytes().to_vec()));
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn subscribe(&self, filter: &str) -> Result<(), TransportError> {
        println!("[broker] subscribe {filter}");
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        println!("[broker] <- {topic} {}", String::from_utf8_lossy(payload));
        Ok(())
    }

    async fn ping(&self) -> Result<(), TransportError> {
        println!("[broker] ping");
        Ok(())
    }

    async fn poll(&self) -> Result<Option<Inbound>, TransportError> {
        Ok(self.inbound.lock().unwrap().pop_front())
    }
}

/// Console stand-ins for the clock hardware.
struct ConsoleHw;

impl Display for ConsoleHw {
    fn show_icon(&self, name: &str) {
        println!("[display] icon {name} on");
    }
    fn hide_icon(&self, name: &str) {
        println!("[display] icon {name} off");
    }
    fn show_message(&self, name: &str, text: &str) {
        println!("[display] {name}: {text}");
    }
    fn clear_message(&self, name: &str) {
        println!("[display] {name} cleared");
    }
}

impl Speaker for ConsoleHw {
    fn beep(&self, duration_ms: u32) {
        println!("[speaker] beep {duration_ms}ms");
    }
}

impl AppManager for ConsoleHw {
    fn suspend_current(&self) {
        println!("[apps] foreground suspended");
    }
    fn resume_current(&self) {
        println!("[apps] foreground resumed");
    }
}

/// Buttons whose presses the demo fires by hand.
#[derive(Default)]
struct ScriptedButtons {
    callbacks: Mutex<Vec<(u8, PressCallback)>>,
}

impl ScriptedButtons {
    fn press(&self, index: u8) {
        println!("[buttons] press {index}");
        let callbacks = self.callbacks.lock().unwrap();
        for (i, callback) in callbacks.iter() {
            if *i == index {
                callback();
            }
        }
    }
}

impl Buttons for ScriptedButtons {
    fn on_press(&self, index: u8, callback: PressCallback) {
        self.callbacks.lock().unwrap().push((index, callback));
    }
}

/// Reaches 07:30 two seconds after startup.
struct SimClock {
    start: Instant,
}

impl WallClock for SimClock {
    fn now(&self) -> WallTime {
        let minute = if self.start.elapsed() < Duration::from_secs(2) {
            29
        } else {
            30
        };
        WallTime {
            year: 2025,
            month: 6,
            day: 1,
            hour: 7,
            minute,
            second: 0,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clockvisor=debug".into()),
        )
        .init();

    let config = DeviceConfig::from_toml_str(
        r#"
        [alarm]
        enabled = false
        target_time = "07:30"

        [bus]
        prefix = "clock/demo/"
        "#,
    )?;

    let transport = Arc::new(LoopbackTransport::default());
    let buttons = Arc::new(ScriptedButtons::default());
    let hw = Arc::new(ConsoleHw);
    let device = Device::new(
        config,
        clockvisor::Hardware {
            display: hw.clone(),
            speaker: hw.clone(),
            buttons: buttons.clone(),
            apps: hw,
            clock: Arc::new(SimClock {
                start: Instant::now(),
            }),
        },
        transport.clone(),
    );

    // Remote configuration while the clock shows 07:29.
    transport.inject("clock/demo/alarm/message", "time to get up");
    transport.inject("clock/demo/alarm/enable", "on");

    let token = CancellationToken::new();
    let runner = {
        let token = token.clone();
        tokio::spawn(async move { device.run(token).await })
    };

    // 07:30 arrives at t+2s; let it beep for a while, then hit the button.
    tokio::time::sleep(Duration::from_secs(4)).await;
    buttons.press(2);

    tokio::time::sleep(Duration::from_millis(500)).await;
    token.cancel();
    runner.await??;
    Ok(())
}
