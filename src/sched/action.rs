//! # Action abstraction and closure-backed implementation.
//!
//! This module defines the [`Action`] trait (the zero-argument cooperative
//! unit the scheduler runs) and the convenient closure wrapper [`ActionFn`].
//! The common handle type is [`ActionRef`], an `Arc<dyn Action>` suitable
//! for storing in the task table and cloning into an in-flight run.
//!
//! An action may await internally; the scheduler awaits it to completion
//! before touching the next due task, so a single action is never
//! interleaved with itself.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskError;

/// # Zero-argument cooperative unit of work.
///
/// Implementations must be quick or must await at their internal wait
/// points; a run that never completes stalls the whole tick loop (an
/// accepted property of the cooperative model, see the scheduler docs).
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use clockvisor::{Action, TaskError};
///
/// struct Blink;
///
/// #[async_trait]
/// impl Action for Blink {
///     async fn run(&self) -> Result<(), TaskError> {
///         // toggle a pin...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Action: Send + Sync + 'static {
    /// Executes one run of the action.
    async fn run(&self) -> Result<(), TaskError>;
}

/// Shared handle to an action.
pub type ActionRef = Arc<dyn Action>;

/// Closure-backed action.
///
/// Wraps a closure that *creates* a new future per run, so no state is
/// shared between runs unless the closure captures it explicitly.
pub struct ActionFn<F> {
    f: F,
}

impl<F> ActionFn<F> {
    /// Creates a new closure-backed action.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the action and returns it as a shared handle.
    ///
    /// ## Example
    /// ```
    /// use clockvisor::{ActionFn, ActionRef, TaskError};
    ///
    /// let tick: ActionRef = ActionFn::arc(|| async {
    ///     Ok::<_, TaskError>(())
    /// });
    /// ```
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Action for ActionFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    async fn run(&self) -> Result<(), TaskError> {
        (self.f)().await
    }
}
