use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crossbeam::channel::Sender;
use log::{debug, error, trace};

use crate::limero::error::catch_panic;
use crate::scheduler::event_loop::LoopCommand;
use crate::scheduler::executor::Executor;
use crate::scheduler::{LocalFuture, Task, TaskId};

/// (due time, registration sequence)
type DueKey = (Duration, u64);

struct TimerEntry {
    key: DueKey,
    period: Option<Duration>,
    // None while the task is running
    task: Option<Task>,
}

/// Timers ordered by due time plus the futures executor, shared by both
/// scheduler implementations. Callers supply `now`.
pub(crate) struct TaskQueue {
    next_id: Cell<u64>,
    next_seq: Cell<u64>,
    due: RefCell<BTreeMap<DueKey, TaskId>>,
    timers: RefCell<HashMap<TaskId, TimerEntry>>,
    executor: Executor,
    resolution: Duration,
}

impl TaskQueue {
    pub(crate) fn new(resolution: Duration, notify: Option<Sender<LoopCommand>>) -> Self {
        TaskQueue {
            next_id: Cell::new(1),
            next_seq: Cell::new(0),
            due: RefCell::new(BTreeMap::new()),
            timers: RefCell::new(HashMap::new()),
            executor: Executor::new(notify),
            resolution: resolution.max(Duration::from_nanos(1)),
        }
    }

    fn allocate_id(&self) -> TaskId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        TaskId(id)
    }

    fn key_at(&self, at: Duration) -> DueKey {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        (at, seq)
    }

    pub(crate) fn insert(&self, now: Duration, delay: Duration, period: Option<Duration>, task: Task) -> TaskId {
        let id = self.allocate_id();
        let key = self.key_at(now + delay);
        let period = period.map(|p| p.max(self.resolution));
        self.due.borrow_mut().insert(key, id);
        self.timers.borrow_mut().insert(
            id,
            TimerEntry {
                key,
                period,
                task: Some(task),
            },
        );
        trace!("{:?} scheduled at {:?} period {:?}", id, key.0, period);
        id
    }

    pub(crate) fn spawn(&self, future: LocalFuture) -> TaskId {
        let id = self.allocate_id();
        self.executor.spawn(id, future);
        trace!("{:?} spawned", id);
        id
    }

    pub(crate) fn cancel(&self, id: TaskId) -> bool {
        let entry = self.timers.borrow_mut().remove(&id);
        if let Some(entry) = entry {
            self.due.borrow_mut().remove(&entry.key);
            debug!("{:?} cancelled", id);
            return true;
        }
        self.executor.cancel(id)
    }

    pub(crate) fn contains(&self, id: TaskId) -> bool {
        self.timers.borrow().contains_key(&id) || self.executor.contains(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.timers.borrow().len() + self.executor.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn next_due(&self) -> Option<Duration> {
        self.due.borrow().keys().next().map(|(at, _)| *at)
    }

    pub(crate) fn has_ready_futures(&self) -> bool {
        self.executor.has_ready()
    }

    /// Runs the timers due at `now` when the call starts. Work scheduled
    /// while they run waits for the next turn.
    fn run_due(&self, now: Duration) -> usize {
        let batch: Vec<(DueKey, TaskId)> = {
            let mut due = self.due.borrow_mut();
            let later = due.split_off(&(now, u64::MAX));
            std::mem::replace(&mut *due, later).into_iter().collect()
        };
        let mut ran = 0;
        for (key, id) in batch {
            let task = self
                .timers
                .borrow_mut()
                .get_mut(&id)
                .and_then(|entry| entry.task.take());
            let Some(mut task) = task else {
                continue;
            };
            ran += 1;
            let outcome = match catch_panic(|| task()) {
                Ok(result) => result,
                Err(msg) => {
                    error!("{:?} panicked: {}", id, msg);
                    self.remove_entry(id);
                    continue;
                }
            };
            if let Err(err) = outcome {
                error!("{:?} failed: {}", id, err);
                self.remove_entry(id);
                continue;
            }
            self.rearm(id, key, task);
        }
        ran
    }

    fn rearm(&self, id: TaskId, key: DueKey, task: Task) {
        let mut timers = self.timers.borrow_mut();
        let Some(entry) = timers.get_mut(&id) else {
            trace!("{:?} cancelled while running", id);
            return;
        };
        let Some(period) = entry.period else {
            timers.remove(&id);
            return;
        };
        let next = self.key_at(key.0 + period);
        entry.key = next;
        entry.task = Some(task);
        self.due.borrow_mut().insert(next, id);
    }

    fn remove_entry(&self, id: TaskId) {
        if let Some(entry) = self.timers.borrow_mut().remove(&id) {
            self.due.borrow_mut().remove(&entry.key);
        }
    }

    /// One scheduler turn: due timers, then woken futures.
    pub(crate) fn turn(&self, now: Duration) -> usize {
        self.run_due(now) + self.executor.poll_ready()
    }

    /// Repeats turns at `now` until one does no work. Returns false when
    /// `max_turns` ran out first.
    pub(crate) fn settle(&self, now: Duration, max_turns: usize) -> bool {
        for _ in 0..max_turns {
            if self.turn(now) == 0 {
                return true;
            }
        }
        false
    }
}
