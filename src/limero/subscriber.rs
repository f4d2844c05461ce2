use std::cell::RefCell;
use std::rc::{Rc, Weak};

use log::{error, warn};

use crate::limero::error::{catch_panic, RxError};
use crate::limero::subscription::{SubscriptionState, Teardown};

/// Callbacks supplied by the consumer of an observable.
pub struct Observer<T> {
    next: Box<dyn FnMut(T)>,
    error: Option<Box<dyn FnOnce(RxError)>>,
    complete: Option<Box<dyn FnOnce()>>,
}

impl<T> Observer<T> {
    pub fn new(next: impl FnMut(T) + 'static) -> Self {
        Observer {
            next: Box::new(next),
            error: None,
            complete: None,
        }
    }

    pub fn on_error(mut self, error: impl FnOnce(RxError) + 'static) -> Self {
        self.error = Some(Box::new(error));
        self
    }

    pub fn on_complete(mut self, complete: impl FnOnce() + 'static) -> Self {
        self.complete = Some(Box::new(complete));
        self
    }
}

struct SubscriberInner<T> {
    observer: RefCell<Option<Observer<T>>>,
    state: Rc<SubscriptionState>,
}

impl<T> SubscriberInner<T> {
    /// Drops the callbacks unless one of them is running right now; `next`
    /// picks that case up once the callback returns.
    fn release(&self) {
        let released = match self.observer.try_borrow_mut() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        drop(released);
    }
}

/// The producer's side of one subscription.
///
/// Clones refer to the same subscription, so a producer may hand copies to
/// scheduled callbacks. Once `complete` or `error` has fired, or the
/// subscription was unsubscribed, every further call is ignored and the
/// observer callbacks are dropped.
pub struct Subscriber<T> {
    inner: Rc<SubscriberInner<T>>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Subscriber {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Subscriber<T> {
    pub(crate) fn new(observer: Observer<T>, state: Rc<SubscriptionState>) -> Self {
        let inner = Rc::new(SubscriberInner {
            observer: RefCell::new(Some(observer)),
            state,
        });
        let weak: Weak<SubscriberInner<T>> = Rc::downgrade(&inner);
        inner.state.set_release(move || {
            if let Some(inner) = weak.upgrade() {
                inner.release();
            }
        });
        Subscriber { inner }
    }
}

impl<T> Subscriber<T> {
    pub fn id(&self) -> u64 {
        self.inner.state.id()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.is_closed()
    }

    /// Registers cleanup on this subscription right away, before the
    /// producer returns. Runs at once if the subscription already ended.
    pub(crate) fn add_teardown(&self, teardown: Teardown) {
        self.inner.state.set_teardown(teardown);
    }

    pub fn next(&self, value: T) {
        if self.is_closed() {
            return;
        }
        let released = match self.inner.observer.try_borrow_mut() {
            Ok(mut slot) => {
                if let Some(observer) = slot.as_mut() {
                    (observer.next)(value);
                }
                // unsubscribed from inside the callback
                if self.is_closed() {
                    slot.take()
                } else {
                    None
                }
            }
            Err(_) => {
                warn!("subscription {}: re-entrant emission dropped", self.id());
                None
            }
        };
        drop(released);
    }

    pub fn error(&self, err: RxError) {
        if !self.inner.state.mark_closed() {
            return;
        }
        match self.take_observer() {
            Some(Observer { error: Some(on_error), .. }) => {
                if let Err(msg) = catch_panic(move || on_error(err)) {
                    error!("subscription {}: error callback panicked: {}", self.id(), msg);
                }
            }
            _ => error!("subscription {}: unhandled error: {}", self.id(), err),
        }
        self.inner.state.run_teardown();
    }

    pub fn complete(&self) {
        if !self.inner.state.mark_closed() {
            return;
        }
        if let Some(Observer { complete: Some(on_complete), .. }) = self.take_observer() {
            if let Err(msg) = catch_panic(on_complete) {
                error!("subscription {}: complete callback panicked: {}", self.id(), msg);
            }
        }
        self.inner.state.run_teardown();
    }

    fn take_observer(&self) -> Option<Observer<T>> {
        match self.inner.observer.try_borrow_mut() {
            Ok(mut slot) => slot.take(),
            Err(_) => {
                warn!("subscription {}: terminated from inside its own callback", self.id());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limero::subscription::Subscription;
    use std::cell::Cell;

    fn recording() -> (Rc<RefCell<Vec<String>>>, Observer<i32>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (n, e, c) = (log.clone(), log.clone(), log.clone());
        let observer = Observer::new(move |v: i32| n.borrow_mut().push(format!("next {v}")))
            .on_error(move |err| e.borrow_mut().push(format!("error {err}")))
            .on_complete(move || c.borrow_mut().push("complete".to_string()));
        (log, observer)
    }

    #[test]
    fn nothing_after_complete() {
        let (log, observer) = recording();
        let subscriber = Subscriber::new(observer, SubscriptionState::new());
        subscriber.next(1);
        subscriber.complete();
        subscriber.next(2);
        subscriber.error(RxError::producer("late"));
        subscriber.complete();
        assert_eq!(*log.borrow(), vec!["next 1", "complete"]);
    }

    #[test]
    fn error_is_terminal() {
        let (log, observer) = recording();
        let subscriber = Subscriber::new(observer, SubscriptionState::new());
        subscriber.error(RxError::adapter("rejected"));
        subscriber.next(1);
        subscriber.complete();
        assert_eq!(*log.borrow(), vec!["error adapted source failed: rejected"]);
        assert!(subscriber.is_closed());
    }

    #[test]
    fn unhandled_error_does_not_panic() {
        let seen = Rc::new(Cell::new(0));
        let counter = seen.clone();
        let subscriber = Subscriber::new(
            Observer::new(move |_: i32| counter.set(counter.get() + 1)),
            SubscriptionState::new(),
        );
        subscriber.error(RxError::scheduler("tick failed"));
        subscriber.next(3);
        assert_eq!(seen.get(), 0);
    }

    #[test]
    fn terminating_releases_callbacks() {
        let token = Rc::new(());
        let held = token.clone();
        let subscriber = Subscriber::new(
            Observer::new(move |_: i32| {
                let _ = &held;
            }),
            SubscriptionState::new(),
        );
        assert_eq!(Rc::strong_count(&token), 2);
        subscriber.complete();
        assert_eq!(Rc::strong_count(&token), 1);
    }

    #[test]
    fn unsubscribe_releases_callbacks_of_a_kept_subscriber() {
        let token = Rc::new(());
        let held = token.clone();
        let state = SubscriptionState::new();
        let subscriber = Subscriber::new(
            Observer::new(move |_: i32| {
                let _ = &held;
            }),
            state.clone(),
        );
        let subscription = Subscription::from_state(state);
        assert_eq!(Rc::strong_count(&token), 2);
        subscription.unsubscribe();
        assert_eq!(Rc::strong_count(&token), 1);
        subscriber.next(1);
    }

    #[test]
    fn unsubscribe_from_inside_next_releases_after_the_callback() {
        let token = Rc::new(());
        let held = token.clone();
        let state = SubscriptionState::new();
        let subscription = Subscription::from_state(state.clone());
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let subscriber = Subscriber::new(
            Observer::new(move |_: i32| {
                let _ = &held;
                counter.set(counter.get() + 1);
                subscription.unsubscribe();
            }),
            state,
        );
        subscriber.next(1);
        assert!(subscriber.is_closed());
        assert_eq!(Rc::strong_count(&token), 1);
        subscriber.next(2);
        assert_eq!(calls.get(), 1);
    }
}
