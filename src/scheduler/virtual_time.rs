use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use log::{trace, warn};

use crate::config::SchedulerConfig;
use crate::scheduler::queue::TaskQueue;
use crate::scheduler::{LocalFuture, Scheduler, Task, TaskId};

/// Simulated clock for deterministic tests. Time only moves on
/// [`advance_by`](Self::advance_by) / [`advance_to`](Self::advance_to),
/// and every timer observes `now()` equal to its own due time.
pub struct VirtualScheduler {
    clock: Cell<Duration>,
    queue: TaskQueue,
    max_turns: usize,
}

impl VirtualScheduler {
    pub fn new() -> Rc<Self> {
        Self::with_config(&SchedulerConfig::default())
    }

    pub fn with_config(config: &SchedulerConfig) -> Rc<Self> {
        Rc::new(VirtualScheduler {
            clock: Cell::new(Duration::ZERO),
            queue: TaskQueue::new(config.resolution(), None),
            max_turns: config.max_turns_per_instant.max(1),
        })
    }

    pub fn advance_by(&self, delta: Duration) {
        self.advance_to(self.clock.get() + delta);
    }

    pub fn advance_to(&self, target: Duration) {
        loop {
            if !self.settle() {
                return;
            }
            match self.queue.next_due() {
                Some(due) if due <= target => {
                    trace!("virtual clock {:?} -> {:?}", self.clock.get(), due);
                    self.clock.set(due.max(self.clock.get()));
                }
                _ => break,
            }
        }
        self.clock.set(target.max(self.clock.get()));
        self.settle();
    }

    /// Runs everything due at the current instant, including woken futures.
    pub fn flush(&self) {
        self.settle();
    }

    fn settle(&self) -> bool {
        let now = self.clock.get();
        let quiescent = self.queue.settle(now, self.max_turns);
        if !quiescent {
            warn!("virtual clock stuck at {:?} after {} turns", now, self.max_turns);
        }
        quiescent
    }
}

impl Scheduler for VirtualScheduler {
    fn now(&self) -> Duration {
        self.clock.get()
    }

    fn schedule(&self, delay: Duration, task: Task) -> TaskId {
        self.queue.insert(self.clock.get(), delay, None, task)
    }

    fn schedule_periodic(&self, delay: Duration, period: Duration, task: Task) -> TaskId {
        self.queue.insert(self.clock.get(), delay, Some(period), task)
    }

    fn spawn(&self, future: LocalFuture) -> TaskId {
        self.queue.spawn(future)
    }

    fn cancel(&self, id: TaskId) -> bool {
        self.queue.cancel(id)
    }

    fn is_pending(&self, id: TaskId) -> bool {
        self.queue.contains(id)
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }
}
