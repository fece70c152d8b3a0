//! Alarm trigger/cancel state machine.
//!
//! - [`AlarmEngine`] the debounced once-per-minute match, beep cadence,
//!   foreground preemption, and remote configuration handlers.
//!
//! Time parsing lives in a private submodule; malformed targets never
//! error, they just never match.

mod engine;
mod time;

pub use engine::AlarmEngine;
