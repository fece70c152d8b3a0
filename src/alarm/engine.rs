//! # AlarmEngine: trigger/cancel state machine.
//!
//! The engine consumes wall-clock time once a second and remote
//! configuration mutations from the bus, and drives a beep/message cadence
//! until cancelled or the beep budget runs out.
//!
//! ## State machine
//! ```text
//!                 1s tick: enabled && time == target && !matched
//!   ┌──────┐ ─────────────────────────────────────────────────► ┌────────┐
//!   │ Idle │                                                    │ Active │
//!   └──────┘ ◄───────────────────────────────────────────────── └────────┘
//!                 button press  |  beep_count > max_beeps
//!
//!   entry: matched=true, beep_count=0, suspend foreground,
//!          stage pending message, schedule "alarm_beep" (200ms)
//!   exit:  remove "alarm_beep", resume foreground, active=false
//! ```
//!
//! ## Rules
//! - `matched_this_minute` is the debounce, not a timer: the match is
//!   evaluated every second but the Idle→Active transition fires exactly
//!   once per calendar minute. The flag clears on the first tick where the
//!   time no longer matches, which re-arms the alarm for the next day.
//! - Cancellation resets the runtime state but NOT the debounce flag;
//!   otherwise a cancelled alarm would re-fire within the same minute.
//! - Beep cadence: on each beep tick the staged message is delivered first
//!   (exactly once), then a beep is emitted unless the tick index is a
//!   multiple of 4 — three beeps, a pause, repeating.
//! - Remote `enable`/`set`/`message` mutations touch configuration only;
//!   disabling does not cancel an already-active alarm.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::{debug, info};

use crate::alarm::time::parse_time;
use crate::bus::MessageRouter;
use crate::config::SharedAlarmConfig;
use crate::hw::{AppManager, Buttons, Display, Speaker, WallClock};
use crate::sched::{ActionFn, Scheduler};

const TASK_TICKER: &str = "alarm_ticker";
const TASK_BEEP: &str = "alarm_beep";

const TICK_EVERY: Duration = Duration::from_secs(1);
const BEEP_EVERY: Duration = Duration::from_millis(200);
const BEEP_MS: u32 = 200;

/// Beep ticks before the alarm gives up on its own.
const DEFAULT_MAX_BEEPS: u32 = 50;

/// Button wired to alarm cancellation.
const CANCEL_BUTTON: u8 = 2;

const ICON_ALARM_ON: &str = "AlarmOn";
const LINE_ALARM: &str = "alarm";
const LINE_STATUS: &str = "status";

const TOPIC_ENABLE: &str = "alarm/enable";
const TOPIC_SET: &str = "alarm/set";
const TOPIC_MESSAGE: &str = "alarm/message";
const STATE_NAME: &str = "alarm";

/// Core-owned runtime state; reset (not destroyed) on cancellation.
#[derive(Debug)]
struct RuntimeState {
    matched_this_minute: bool,
    active: bool,
    beep_count: u32,
    max_beeps: u32,
    pending_message: Option<String>,
}

impl RuntimeState {
    fn new(max_beeps: u32) -> Self {
        Self {
            matched_this_minute: false,
            active: false,
            beep_count: 0,
            max_beeps,
            pending_message: None,
        }
    }
}

/// Debounced once-per-minute alarm over the shared scheduler.
pub struct AlarmEngine {
    /// Self-handle for the beep-task closure; set by [`AlarmEngine::new`].
    weak: Weak<AlarmEngine>,
    scheduler: Arc<Scheduler>,
    config: SharedAlarmConfig,
    display: Arc<dyn Display>,
    speaker: Arc<dyn Speaker>,
    apps: Arc<dyn AppManager>,
    clock: Arc<dyn WallClock>,
    /// Last message received over the bus; staged into the runtime state on
    /// every trigger.
    message: Mutex<Option<String>>,
    state: Mutex<RuntimeState>,
}

impl AlarmEngine {
    /// Creates an engine with the default beep budget.
    pub fn new(
        scheduler: Arc<Scheduler>,
        config: SharedAlarmConfig,
        display: Arc<dyn Display>,
        speaker: Arc<dyn Speaker>,
        apps: Arc<dyn AppManager>,
        clock: Arc<dyn WallClock>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            scheduler,
            config,
            display,
            speaker,
            apps,
            clock,
            message: Mutex::new(None),
            state: Mutex::new(RuntimeState::new(DEFAULT_MAX_BEEPS)),
        })
    }

    /// Wires the engine into the rest of the device: the 1 s evaluation
    /// task, the cancel button, the three configuration topics, and the
    /// `alarm` entry in the state snapshot.
    pub fn install(&self, router: &MessageRouter, buttons: &dyn Buttons) {
        let Some(me) = self.weak.upgrade() else {
            return;
        };

        self.refresh_icon();

        {
            let me = me.clone();
            buttons.on_press(CANCEL_BUTTON, Arc::new(move || me.cancel()));
        }

        {
            let me = me.clone();
            router.register_topic_callback(
                TOPIC_ENABLE,
                Arc::new(move |_t: &str, p: &str| me.apply_enable(p)),
            );
        }
        {
            let me = me.clone();
            router.register_topic_callback(
                TOPIC_SET,
                Arc::new(move |_t: &str, p: &str| me.apply_set(p)),
            );
        }
        {
            let me = me.clone();
            router.register_topic_callback(
                TOPIC_MESSAGE,
                Arc::new(move |_t: &str, p: &str| me.apply_message(p)),
            );
        }

        {
            let me = me.clone();
            router.register_state_callback(STATE_NAME, Arc::new(move || me.state_snapshot()));
        }

        self.scheduler.schedule(
            TASK_TICKER,
            TICK_EVERY,
            ActionFn::arc(move || {
                let me = me.clone();
                async move {
                    me.tick();
                    Ok::<_, crate::error::TaskError>(())
                }
            }),
        );
    }

    /// One evaluation of the match condition; runs once a second.
    pub fn tick(&self) {
        let (enabled, target) = {
            let cfg = self.config.lock().unwrap();
            (cfg.enabled, cfg.target_time.clone())
        };
        let now = self.clock.now();
        let (hour, minute) = parse_time(&target);
        let matches =
            hour == Some(u32::from(now.hour)) && minute == Some(u32::from(now.minute));

        if !matches {
            // The minute rolled over (or the target moved): re-arm.
            self.state.lock().unwrap().matched_this_minute = false;
            return;
        }
        if !enabled {
            return;
        }
        {
            let mut state = self.state.lock().unwrap();
            if state.matched_this_minute {
                return;
            }
            state.matched_this_minute = true;
        }
        info!(hour = now.hour, minute = now.minute, "alarm time matched");
        self.trigger();
    }

    /// Idle → Active. Idempotent while already active.
    pub fn trigger(&self) {
        let Some(me) = self.weak.upgrade() else {
            return;
        };
        {
            let mut state = self.state.lock().unwrap();
            if state.active {
                return;
            }
            state.active = true;
            state.beep_count = 0;
            state.pending_message = self.message.lock().unwrap().clone();
        }

        self.apps.suspend_current();

        self.scheduler.schedule(
            TASK_BEEP,
            BEEP_EVERY,
            ActionFn::arc(move || {
                let me = me.clone();
                async move {
                    me.beep_tick();
                    Ok::<_, crate::error::TaskError>(())
                }
            }),
        );
    }

    /// Active → Idle. Safe to call at any time; only the transition out of
    /// an active alarm has effects, so the foreground activity is resumed
    /// exactly once per trigger.
    pub fn cancel(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if !state.active {
                return;
            }
            state.active = false;
            state.beep_count = 0;
            state.pending_message = None;
        }
        info!("alarm cancelled");
        self.scheduler.remove(TASK_BEEP);
        self.apps.resume_current();
    }

    /// True while the alarm is sounding.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.lock().unwrap().active
    }

    /// One beep-cadence tick; runs every 200 ms while active.
    fn beep_tick(&self) {
        let (message, beep, exhausted) = {
            let mut state = self.state.lock().unwrap();
            if !state.active {
                // Removal of the beep task is deferred; a straggler run
                // after cancellation is a no-op.
                return;
            }
            let message = state.pending_message.take();
            let beep = state.beep_count % 4 != 0;
            state.beep_count += 1;
            (message, beep, state.beep_count > state.max_beeps)
        };

        if let Some(text) = message {
            self.display.show_message(LINE_ALARM, &text);
        }
        if beep {
            self.speaker.beep(BEEP_MS);
        }
        if exhausted {
            debug!("beep budget exhausted");
            self.cancel();
        }
    }

    /// `alarm/enable`: the literals `"true"` and `"on"` enable, anything
    /// else disables. Case-sensitive by contract.
    fn apply_enable(&self, payload: &str) {
        let enabled = payload == "true" || payload == "on";
        self.config.lock().unwrap().enabled = enabled;
        debug!(enabled, "alarm enable updated");
        self.refresh_icon();
    }

    /// `alarm/set`: stores the payload verbatim. Validation happens at
    /// match time; a malformed value simply never matches.
    fn apply_set(&self, payload: &str) {
        self.config.lock().unwrap().target_time = payload.to_string();
        debug!(target = %payload, "alarm target updated");
    }

    /// `alarm/message`: stages the text for the next trigger and mirrors it
    /// to the status line immediately, active or not.
    fn apply_message(&self, payload: &str) {
        *self.message.lock().unwrap() = Some(payload.to_string());
        self.display.show_message(LINE_STATUS, payload);
    }

    fn refresh_icon(&self) {
        if self.config.lock().unwrap().enabled {
            self.display.show_icon(ICON_ALARM_ON);
        } else {
            self.display.hide_icon(ICON_ALARM_ON);
        }
    }

    fn state_snapshot(&self) -> serde_json::Value {
        let cfg = self.config.lock().unwrap();
        serde_json::json!({
            "enabled": cfg.enabled,
            "time": cfg.target_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::config::AlarmConfig;
    use crate::hw::{PressCallback, WallTime};

    #[derive(Default)]
    struct TestDisplay {
        events: Mutex<Vec<String>>,
    }

    impl TestDisplay {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Display for TestDisplay {
        fn show_icon(&self, name: &str) {
            self.events.lock().unwrap().push(format!("icon+{name}"));
        }
        fn hide_icon(&self, name: &str) {
            self.events.lock().unwrap().push(format!("icon-{name}"));
        }
        fn show_message(&self, name: &str, text: &str) {
            self.events.lock().unwrap().push(format!("msg:{name}:{text}"));
        }
        fn clear_message(&self, name: &str) {
            self.events.lock().unwrap().push(format!("clr:{name}"));
        }
    }

    #[derive(Default)]
    struct TestSpeaker {
        beeps: AtomicU32,
    }

    impl Speaker for TestSpeaker {
        fn beep(&self, _duration_ms: u32) {
            self.beeps.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct TestApps {
        suspends: AtomicU32,
        resumes: AtomicU32,
    }

    impl AppManager for TestApps {
        fn suspend_current(&self) {
            self.suspends.fetch_add(1, Ordering::SeqCst);
        }
        fn resume_current(&self) {
            self.resumes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct TestClock {
        time: Mutex<WallTime>,
    }

    impl TestClock {
        fn at(hour: u8, minute: u8) -> Arc<Self> {
            Arc::new(Self {
                time: Mutex::new(WallTime {
                    year: 2025,
                    month: 6,
                    day: 1,
                    hour,
                    minute,
                    second: 0,
                }),
            })
        }

        fn set(&self, hour: u8, minute: u8) {
            let mut time = self.time.lock().unwrap();
            time.hour = hour;
            time.minute = minute;
        }
    }

    impl WallClock for TestClock {
        fn now(&self) -> WallTime {
            *self.time.lock().unwrap()
        }
    }

    struct Rig {
        engine: Arc<AlarmEngine>,
        display: Arc<TestDisplay>,
        speaker: Arc<TestSpeaker>,
        apps: Arc<TestApps>,
        clock: Arc<TestClock>,
        scheduler: Arc<Scheduler>,
    }

    fn rig(enabled: bool, target: &str, clock: Arc<TestClock>) -> Rig {
        let scheduler = Arc::new(Scheduler::new());
        let display = Arc::new(TestDisplay::default());
        let speaker = Arc::new(TestSpeaker::default());
        let apps = Arc::new(TestApps::default());
        let config: SharedAlarmConfig = Arc::new(Mutex::new(AlarmConfig {
            enabled,
            target_time: target.to_string(),
        }));
        let engine = AlarmEngine::new(
            scheduler.clone(),
            config,
            display.clone(),
            speaker.clone(),
            apps.clone(),
            clock.clone(),
        );
        Rig {
            engine,
            display,
            speaker,
            apps,
            clock,
            scheduler,
        }
    }

    #[test]
    fn test_trigger_fires_once_per_matching_minute() {
        let r = rig(true, "07:30", TestClock::at(7, 30));

        r.engine.tick();
        assert!(r.engine.is_active());
        assert!(r.scheduler.contains(TASK_BEEP));
        assert_eq!(r.apps.suspends.load(Ordering::SeqCst), 1);

        // The condition stays true for the rest of the minute; nothing new.
        r.engine.tick();
        r.engine.tick();
        assert_eq!(r.apps.suspends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_matched_flag_clears_when_minute_rolls_over() {
        let r = rig(true, "07:30", TestClock::at(7, 29));

        r.engine.tick();
        assert!(!r.engine.state.lock().unwrap().matched_this_minute);

        r.clock.set(7, 30);
        r.engine.tick();
        assert!(r.engine.state.lock().unwrap().matched_this_minute);

        r.clock.set(7, 31);
        r.engine.tick();
        assert!(!r.engine.state.lock().unwrap().matched_this_minute);
        // The alarm itself keeps sounding until cancelled.
        assert!(r.engine.is_active());
    }

    #[test]
    fn test_retriggers_after_cancel_on_next_match() {
        let r = rig(true, "07:30", TestClock::at(7, 30));

        r.engine.tick();
        r.engine.cancel();
        // Next day, same time: one non-matching tick in between re-arms.
        r.clock.set(7, 31);
        r.engine.tick();
        r.clock.set(7, 30);
        r.engine.tick();
        assert!(r.engine.is_active());
        assert_eq!(r.apps.suspends.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cancel_within_matching_minute_does_not_retrigger() {
        let r = rig(true, "07:30", TestClock::at(7, 30));

        r.engine.tick();
        r.engine.cancel();
        r.engine.tick();
        assert!(!r.engine.is_active());
        assert_eq!(r.apps.suspends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_resumes_foreground_exactly_once() {
        let r = rig(true, "07:30", TestClock::at(7, 30));

        r.engine.tick();
        r.engine.cancel();
        r.engine.cancel();
        r.engine.cancel();
        assert_eq!(r.apps.resumes.load(Ordering::SeqCst), 1);
        assert!(!r.scheduler.contains(TASK_BEEP));
    }

    #[test]
    fn test_cancel_when_idle_is_a_noop() {
        let r = rig(true, "07:30", TestClock::at(6, 0));
        r.engine.cancel();
        assert_eq!(r.apps.resumes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_beep_suppressed_on_every_fourth_tick() {
        let r = rig(true, "07:30", TestClock::at(7, 30));
        r.engine.tick();

        for _ in 0..8 {
            r.engine.beep_tick();
        }
        // Indices 0..8: suppressed at 0 and 4, audible at the other six.
        assert_eq!(r.speaker.beeps.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_pending_message_delivered_exactly_once() {
        let r = rig(true, "07:30", TestClock::at(7, 30));
        r.engine.apply_message("wake up!");
        r.engine.tick();

        r.engine.beep_tick();
        r.engine.beep_tick();

        let deliveries: Vec<_> = r
            .display
            .events()
            .into_iter()
            .filter(|e| e == "msg:alarm:wake up!")
            .collect();
        assert_eq!(deliveries.len(), 1);
    }

    #[test]
    fn test_message_is_mirrored_to_status_line_when_idle() {
        let r = rig(false, "07:30", TestClock::at(6, 0));
        r.engine.apply_message("dentist at nine");
        assert!(r
            .display
            .events()
            .contains(&"msg:status:dentist at nine".to_string()));
        assert!(!r.engine.is_active());
    }

    #[test]
    fn test_beep_budget_cancels_without_external_input() {
        let r = rig(true, "07:30", TestClock::at(7, 30));
        r.engine.tick();
        r.engine.state.lock().unwrap().max_beeps = 5;

        for _ in 0..10 {
            r.engine.beep_tick();
        }
        assert!(!r.engine.is_active());
        assert!(!r.scheduler.contains(TASK_BEEP));
        assert_eq!(r.apps.resumes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_alarm_never_triggers() {
        let r = rig(false, "07:30", TestClock::at(7, 30));
        r.engine.tick();
        assert!(!r.engine.is_active());
    }

    #[test]
    fn test_malformed_target_never_triggers() {
        for target in ["", "0730", "late", "7:"] {
            let r = rig(true, target, TestClock::at(7, 30));
            r.engine.tick();
            assert!(!r.engine.is_active(), "target {target:?} triggered");
        }
    }

    #[test]
    fn test_enable_payload_semantics() {
        let r = rig(false, "07:30", TestClock::at(6, 0));

        for (payload, expect) in [
            ("true", true),
            ("on", true),
            ("True", false),
            ("ON", false),
            ("off", false),
            ("1", false),
        ] {
            r.engine.apply_enable(payload);
            assert_eq!(
                r.engine.config.lock().unwrap().enabled,
                expect,
                "payload {payload:?}"
            );
        }
    }

    #[test]
    fn test_enable_toggles_icon() {
        let r = rig(false, "07:30", TestClock::at(6, 0));
        r.engine.apply_enable("on");
        r.engine.apply_enable("off");
        let events = r.display.events();
        assert!(events.contains(&"icon+AlarmOn".to_string()));
        assert!(events.contains(&"icon-AlarmOn".to_string()));
    }

    #[test]
    fn test_set_stores_verbatim_and_match_uses_it() {
        let r = rig(true, "06:00", TestClock::at(7, 30));
        r.engine.apply_set("07:30");
        assert_eq!(r.engine.config.lock().unwrap().target_time, "07:30");
        r.engine.tick();
        assert!(r.engine.is_active());
    }

    #[test]
    fn test_disable_does_not_cancel_active_alarm() {
        let r = rig(true, "07:30", TestClock::at(7, 30));
        r.engine.tick();
        r.engine.apply_enable("off");
        assert!(r.engine.is_active());
    }

    #[test]
    fn test_state_snapshot_tracks_config() {
        let r = rig(false, "06:00", TestClock::at(6, 0));
        r.engine.apply_enable("true");
        r.engine.apply_set("08:15");
        let snapshot = r.engine.state_snapshot();
        assert_eq!(snapshot["enabled"], true);
        assert_eq!(snapshot["time"], "08:15");
    }

    #[test]
    fn test_install_registers_ticker_and_cancel_button() {
        struct TestButtons {
            registered: Mutex<Vec<(u8, PressCallback)>>,
        }
        impl Buttons for TestButtons {
            fn on_press(&self, index: u8, callback: PressCallback) {
                self.registered.lock().unwrap().push((index, callback));
            }
        }

        let r = rig(true, "07:30", TestClock::at(7, 30));
        let transport = Arc::new(NullTransport);
        let ticks: Arc<dyn crate::ticks::Monotonic> =
            Arc::new(crate::ticks::SystemTicks::new());
        let router = MessageRouter::new(transport, "clock/", ticks);
        let buttons = TestButtons {
            registered: Mutex::new(Vec::new()),
        };

        r.engine.install(&router, &buttons);
        assert!(r.scheduler.contains(TASK_TICKER));

        // The registered button callback cancels an active alarm.
        r.engine.tick();
        assert!(r.engine.is_active());
        let registered = buttons.registered.lock().unwrap();
        assert_eq!(registered[0].0, CANCEL_BUTTON);
        (registered[0].1)();
        assert!(!r.engine.is_active());
    }

    struct NullTransport;

    #[async_trait::async_trait]
    impl crate::bus::Transport for NullTransport {
        async fn subscribe(&self, _filter: &str) -> Result<(), crate::error::TransportError> {
            Ok(())
        }
        async fn publish(
            &self,
            _topic: &str,
            _payload: &[u8],
        ) -> Result<(), crate::error::TransportError> {
            Ok(())
        }
        async fn ping(&self) -> Result<(), crate::error::TransportError> {
            Ok(())
        }
        async fn poll(
            &self,
        ) -> Result<Option<crate::bus::Inbound>, crate::error::TransportError> {
            Ok(None)
        }
    }
}
