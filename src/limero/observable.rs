use std::rc::Rc;

use log::trace;

use crate::limero::error::{catch_panic, RxError};
use crate::limero::subscriber::{Observer, Subscriber};
use crate::limero::subscription::{Subscription, SubscriptionState, Teardown};

type Producer<T> = dyn Fn(Subscriber<T>) -> Result<Teardown, RxError>;

/// Re-runnable description of a push sequence.
///
/// Nothing happens until [`subscribe`](Self::subscribe); every subscription
/// invokes the producer again with its own [`Subscriber`]. Clones share the
/// producer.
pub struct Observable<T> {
    producer: Rc<Producer<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Observable {
            producer: self.producer.clone(),
        }
    }
}

impl<T: 'static> Observable<T> {
    pub fn create<F>(producer: F) -> Self
    where
        F: Fn(Subscriber<T>) -> Result<Teardown, RxError> + 'static,
    {
        Observable {
            producer: Rc::new(producer),
        }
    }

    /// Runs the producer for a new subscription. Producer failures,
    /// including panics, arrive on the observer's error callback.
    pub fn subscribe(&self, observer: Observer<T>) -> Subscription {
        self.subscribe_with(|_| observer)
    }

    /// Like [`subscribe`](Self::subscribe), but the observer is built with
    /// its own subscription in hand, so a callback can unsubscribe while a
    /// synchronous producer is still emitting.
    pub fn subscribe_with<F>(&self, build: F) -> Subscription
    where
        F: FnOnce(&Subscription) -> Observer<T>,
    {
        let state = SubscriptionState::new();
        let subscription = Subscription::from_state(state.clone());
        let subscriber = Subscriber::new(build(&subscription), state.clone());
        trace!("subscription {} starting producer", state.id());
        match catch_panic(|| (self.producer)(subscriber.clone())) {
            Ok(Ok(teardown)) => state.set_teardown(teardown),
            Ok(Err(err)) => subscriber.error(err),
            Err(msg) => subscriber.error(RxError::Producer(msg)),
        }
        subscription
    }

    pub fn subscribe_next(&self, next: impl FnMut(T) + 'static) -> Subscription {
        self.subscribe(Observer::new(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn producer_is_lazy_and_rerun_per_subscription() {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let observable = Observable::create(move |subscriber: Subscriber<u32>| {
            counter.set(counter.get() + 1);
            subscriber.next(counter.get());
            subscriber.complete();
            Ok(Teardown::Nil)
        });
        assert_eq!(runs.get(), 0);
        let got = Rc::new(RefCell::new(Vec::new()));
        for _ in 0..2 {
            let sink = got.clone();
            observable.subscribe_next(move |v| sink.borrow_mut().push(v));
        }
        assert_eq!(*got.borrow(), vec![1, 2]);
    }

    #[test]
    fn producer_error_reaches_observer() {
        let observable = Observable::<u8>::create(|_| Err(RxError::producer("no source")));
        let err = Rc::new(RefCell::new(None));
        let slot = err.clone();
        let subscription =
            observable.subscribe(Observer::new(|_| {}).on_error(move |e| *slot.borrow_mut() = Some(e)));
        assert!(subscription.is_closed());
        assert_eq!(*err.borrow(), Some(RxError::producer("no source")));
    }

    #[test]
    fn producer_panic_becomes_producer_error() {
        let observable = Observable::<u8>::create(|_| panic!("exploded"));
        let err = Rc::new(RefCell::new(None));
        let slot = err.clone();
        observable.subscribe(Observer::new(|_| {}).on_error(move |e| *slot.borrow_mut() = Some(e)));
        assert_eq!(*err.borrow(), Some(RxError::Producer("exploded".to_string())));
    }

    #[test]
    fn teardown_of_synchronously_completed_producer_runs_at_once() {
        let cleaned = Rc::new(Cell::new(false));
        let flag = cleaned.clone();
        let observable = Observable::create(move |subscriber: Subscriber<u8>| {
            subscriber.complete();
            let flag = flag.clone();
            Ok(Teardown::new(move || flag.set(true)))
        });
        let subscription = observable.subscribe_next(|_| {});
        assert!(cleaned.get());
        assert!(subscription.is_closed());
    }

    #[test]
    fn unsubscribe_runs_teardown_once() {
        let cleaned = Rc::new(Cell::new(0));
        let counter = cleaned.clone();
        let observable = Observable::create(move |_: Subscriber<u8>| {
            let counter = counter.clone();
            Ok(Teardown::new(move || counter.set(counter.get() + 1)))
        });
        let subscription = observable.subscribe_next(|_| {});
        assert!(!subscription.is_closed());
        subscription.unsubscribe();
        subscription.unsubscribe();
        assert_eq!(cleaned.get(), 1);
    }
}
