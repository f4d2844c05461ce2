//! Logical clock and timer service for deferred work.
//!
//! Two implementations share one task queue:
//! [`VirtualScheduler`] advances a simulated clock only when told to, and
//! [`EventLoop`] follows the wall clock and sleeps on a command channel
//! between turns.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::time::Duration;

use crate::limero::RxError;

mod event_loop;
mod executor;
mod queue;
mod virtual_time;

pub use event_loop::{EventLoop, LoopCommand, LoopHandle};
pub use virtual_time::VirtualScheduler;

pub type Task = Box<dyn FnMut() -> Result<(), RxError>>;
pub type LocalFuture = Pin<Box<dyn Future<Output = ()>>>;
pub type SchedulerRef = Rc<dyn Scheduler>;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

pub trait Scheduler {
    /// Time elapsed since the scheduler's epoch.
    fn now(&self) -> Duration;

    fn schedule(&self, delay: Duration, task: Task) -> TaskId;

    /// Runs `task` after `delay`, then every `period`. Periods below the
    /// scheduler's resolution are raised to it.
    fn schedule_periodic(&self, delay: Duration, period: Duration, task: Task) -> TaskId;

    /// Polls `future` on the scheduler's turns until it completes. The
    /// first poll happens on the next turn, never inside this call.
    fn spawn(&self, future: LocalFuture) -> TaskId;

    /// Unregisters a task or future, dropping it. Returns false when it had
    /// already finished or been cancelled.
    fn cancel(&self, id: TaskId) -> bool;

    fn is_pending(&self, id: TaskId) -> bool;

    /// Number of registered timers and futures.
    fn pending(&self) -> usize;
}
