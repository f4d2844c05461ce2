use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use log::{error, trace};

use crate::limero::error::catch_panic;
use crate::scheduler::{Scheduler, SchedulerRef, TaskId};

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Cleanup returned by a producer, run exactly once when the subscription ends.
pub enum Teardown {
    Nil,
    Logic(Box<dyn FnOnce()>),
    Task { scheduler: Weak<dyn Scheduler>, id: TaskId },
    Inner(Subscription),
}

impl Teardown {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Teardown::Logic(Box::new(f))
    }

    /// Cancels `id` on teardown. Holds the scheduler weakly, since the
    /// scheduler owns the task that owns the subscriber.
    pub fn task(scheduler: &SchedulerRef, id: TaskId) -> Self {
        Teardown::Task {
            scheduler: Rc::downgrade(scheduler),
            id,
        }
    }

    fn run(self, subscription_id: u64) {
        match self {
            Teardown::Nil => {}
            Teardown::Logic(f) => {
                if let Err(msg) = catch_panic(f) {
                    error!("teardown of subscription {} panicked: {}", subscription_id, msg);
                }
            }
            Teardown::Task { scheduler, id } => {
                if let Some(scheduler) = scheduler.upgrade() {
                    let removed = scheduler.cancel(id);
                    trace!("subscription {} cancelled {:?} (registered: {})", subscription_id, id, removed);
                }
            }
            Teardown::Inner(inner) => inner.unsubscribe(),
        }
    }
}

impl Default for Teardown {
    fn default() -> Self {
        Teardown::Nil
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Teardown::Nil => write!(f, "Nil"),
            Teardown::Logic(_) => write!(f, "Logic"),
            Teardown::Task { id, .. } => write!(f, "Task({:?})", id),
            Teardown::Inner(inner) => write!(f, "Inner({})", inner.id()),
        }
    }
}

pub(crate) struct SubscriptionState {
    id: u64,
    closed: Cell<bool>,
    teardown: RefCell<Option<Teardown>>,
    // drops the observer callbacks; installed by the subscriber
    release: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl SubscriptionState {
    pub(crate) fn new() -> Rc<Self> {
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        trace!("subscription {} opened", id);
        Rc::new(SubscriptionState {
            id,
            closed: Cell::new(false),
            teardown: RefCell::new(None),
            release: RefCell::new(None),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Flips the flag; true only for the call that actually closed it.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.replace(true)
    }

    /// Stores the producer's teardown, or runs it at once if the
    /// subscription already ended while the producer was running.
    /// `Nil` leaves an earlier teardown in place.
    pub(crate) fn set_teardown(&self, teardown: Teardown) {
        if matches!(teardown, Teardown::Nil) {
            return;
        }
        if self.is_closed() {
            teardown.run(self.id);
            return;
        }
        let previous = self.teardown.borrow_mut().replace(teardown);
        if let Some(previous) = previous {
            previous.run(self.id);
        }
    }

    pub(crate) fn set_release(&self, release: impl FnOnce() + 'static) {
        *self.release.borrow_mut() = Some(Box::new(release));
    }

    /// Releases the observer, then runs the teardown.
    pub(crate) fn run_teardown(&self) {
        let release = self.release.borrow_mut().take();
        if let Some(release) = release {
            release();
        }
        let teardown = self.teardown.borrow_mut().take();
        if let Some(teardown) = teardown {
            teardown.run(self.id);
        }
        trace!("subscription {} closed", self.id);
    }
}

/// Handle on one running execution of an observable.
#[derive(Clone)]
pub struct Subscription {
    state: Rc<SubscriptionState>,
}

impl Subscription {
    pub(crate) fn from_state(state: Rc<SubscriptionState>) -> Self {
        Subscription { state }
    }

    pub fn id(&self) -> u64 {
        self.state.id()
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Stops delivery and releases the producer's resources. Idempotent.
    pub fn unsubscribe(&self) {
        if self.state.mark_closed() {
            trace!("subscription {} unsubscribed", self.state.id());
            self.state.run_teardown();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}
