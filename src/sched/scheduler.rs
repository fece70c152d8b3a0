//! # Cooperative scheduler over named periodic tasks.
//!
//! The [`Scheduler`] owns a table of named tasks and runs every due task
//! when asked to [`tick`](Scheduler::tick). It has no thread of its own:
//! an external tick source (normally [`Scheduler::run`]) drives it at the
//! device cadence.
//!
//! ## Architecture
//! ```text
//! schedule(name, interval, action) ──► [ task table (registration order) ]
//! remove(name) ────────────────────►         │
//!                                            ▼
//! tick source ── tick(now) ──► collect due, sort by (next_due, position)
//!                                 │
//!                                 ├─► run action #1 to completion
//!                                 ├─► run action #2 to completion
//!                                 └─► ...  (never two at once, never the
//!                                           same name twice concurrently)
//! ```
//!
//! ## Rules
//! - First run of a task is due one full `interval` after registration,
//!   never immediately.
//! - After a run, `next_due` advances by `interval` **relative to the
//!   previous due time**, not the completion time. A slow action therefore
//!   does not drift the cadence; it makes the next run due immediately on
//!   the following tick instead of being skipped.
//! - Registering an existing name replaces its action and interval but
//!   keeps its position in the table (the tie-break order); the schedule
//!   restarts one interval from the replacement.
//! - `remove` of a missing name is a no-op. Removing a task whose action is
//!   currently in flight lets that run finish; only future runs are
//!   cancelled. There is no forcible interruption.
//! - An action that fails or panics is logged at the scheduling boundary
//!   and the task stays registered for its next due tick.
//! - No per-action timeout exists: a hung action stalls the entire tick
//!   loop. That is the accepted risk of the cooperative model.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::TaskError;
use crate::sched::action::ActionRef;

/// One named periodic task.
struct Slot {
    name: Arc<str>,
    interval: Duration,
    next_due: Instant,
    /// Bumped on replacement so an in-flight run of the old action cannot
    /// advance the new schedule.
    epoch: u64,
    action: ActionRef,
}

#[derive(Default)]
struct Table {
    /// Registration order; doubles as the tie-break order for equal due times.
    slots: Vec<Slot>,
    next_epoch: u64,
}

/// Cooperative scheduler over named periodic tasks.
///
/// Cheap to share behind an `Arc`; actions themselves may call
/// [`schedule`](Scheduler::schedule) and [`remove`](Scheduler::remove)
/// re-entrantly (the table lock is never held while an action runs).
pub struct Scheduler {
    table: Mutex<Table>,
}

impl Scheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table::default()),
        }
    }

    /// Registers or replaces the task `name`.
    ///
    /// The first run is due one `interval` from now. Replacing keeps the
    /// slot's table position but restarts its schedule and invalidates any
    /// in-flight run's reschedule.
    pub fn schedule(&self, name: impl Into<Arc<str>>, interval: Duration, action: ActionRef) {
        let name = name.into();
        let now = Instant::now();
        let mut table = self.table.lock().unwrap();
        table.next_epoch += 1;
        let epoch = table.next_epoch;

        if let Some(slot) = table.slots.iter_mut().find(|s| s.name == name) {
            slot.interval = interval;
            slot.next_due = now + interval;
            slot.epoch = epoch;
            slot.action = action;
        } else {
            table.slots.push(Slot {
                name,
                interval,
                next_due: now + interval,
                epoch,
                action,
            });
        }
    }

    /// Cancels future runs of `name`. Missing names are a no-op.
    ///
    /// A currently executing run of this task finishes normally.
    pub fn remove(&self, name: &str) {
        let mut table = self.table.lock().unwrap();
        table.slots.retain(|s| s.name.as_ref() != name);
    }

    /// True if a task named `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        let table = self.table.lock().unwrap();
        table.slots.iter().any(|s| s.name.as_ref() == name)
    }

    /// Returns the registered task names in registration order.
    #[must_use]
    pub fn task_names(&self) -> Vec<String> {
        let table = self.table.lock().unwrap();
        table.slots.iter().map(|s| s.name.to_string()).collect()
    }

    /// Runs every task due at `now`, one at a time, earliest due first
    /// (ties in registration order), then advances each by one interval.
    ///
    /// Each due task runs at most once per tick: a task that fell behind
    /// fires again on the *next* tick rather than looping here, so one
    /// backlogged task cannot starve the rest of the table.
    pub async fn tick(&self, now: Instant) {
        let due: Vec<(Arc<str>, u64)> = {
            let table = self.table.lock().unwrap();
            let mut due: Vec<&Slot> = table.slots.iter().filter(|s| s.next_due <= now).collect();
            // Stable sort: equal due times keep table (registration) order.
            due.sort_by_key(|s| s.next_due);
            due.iter().map(|s| (s.name.clone(), s.epoch)).collect()
        };

        for (name, epoch) in due {
            // Re-resolve at run time: an earlier action this tick may have
            // removed or replaced this task, which cancels this run.
            let action: Option<ActionRef> = {
                let table = self.table.lock().unwrap();
                table
                    .slots
                    .iter()
                    .find(|s| s.name == name && s.epoch == epoch)
                    .map(|s| s.action.clone())
            };
            let Some(action) = action else { continue };

            self.run_boundary(&name, action).await;

            let mut table = self.table.lock().unwrap();
            if let Some(slot) = table
                .slots
                .iter_mut()
                .find(|s| s.name == name && s.epoch == epoch)
            {
                slot.next_due += slot.interval;
            }
        }
    }

    /// Drives [`tick`](Scheduler::tick) from a tokio interval until `token`
    /// is cancelled. This is the external tick source for production use.
    pub async fn run(&self, tick_every: Duration, token: CancellationToken) {
        let mut interval = tokio::time::interval(tick_every);
        // A slow action must not cause a burst of catch-up interval fires;
        // fixed-cadence catch-up is the task table's job.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => self.tick(Instant::now()).await,
            }
        }
    }

    /// Runs one action, containing failures and panics at the boundary.
    async fn run_boundary(&self, name: &str, action: ActionRef) {
        match AssertUnwindSafe(action.run()).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(task = %name, label = e.as_label(), error = %e, "scheduled action failed");
            }
            Err(panic) => {
                let e = TaskError::Panicked {
                    info: panic_info(&panic),
                };
                warn!(task = %name, label = e.as_label(), error = %e, "scheduled action panicked");
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort extraction of a panic payload message.
fn panic_info(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
