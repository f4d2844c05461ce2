use log::trace;

use crate::limero::error::RxError;
use crate::limero::observable::Observable;
use crate::limero::subscriber::Observer;
use crate::limero::subscription::Teardown;

/// Emits a clone of `value` and completes, on every subscription.
///
/// The value is computed by the caller before `of` runs, so all subscribers
/// see the same result.
pub fn of<T: Clone + 'static>(value: T) -> Observable<T> {
    Observable::create(move |subscriber| {
        subscriber.next(value.clone());
        subscriber.complete();
        Ok(Teardown::Nil)
    })
}

/// Calls `factory` once per subscription and subscribes to what it returns.
pub fn defer<T, F>(factory: F) -> Observable<T>
where
    T: 'static,
    F: Fn() -> Observable<T> + 'static,
{
    Observable::create(move |subscriber| {
        let inner = factory();
        let (next, error, complete) = (subscriber.clone(), subscriber.clone(), subscriber.clone());
        trace!("subscription {} deferred to a fresh observable", subscriber.id());
        // linked before the inner producer runs, so an unsubscribe during a
        // synchronous inner emission stops the inner source too
        inner.subscribe_with(|inner_subscription| {
            subscriber.add_teardown(Teardown::Inner(inner_subscription.clone()));
            Observer::new(move |value| next.next(value))
                .on_error(move |err| error.error(err))
                .on_complete(move || complete.complete())
        });
        Ok(Teardown::Nil)
    })
}

/// Emits `count` consecutive integers starting at `start`, then completes.
pub fn range(start: i64, count: u64) -> Observable<i64> {
    Observable::create(move |subscriber| {
        if count > 0 {
            let last = i64::try_from(count - 1)
                .ok()
                .and_then(|offset| start.checked_add(offset));
            if last.is_none() {
                return Err(RxError::Producer(format!(
                    "range({start}, {count}) overflows i64"
                )));
            }
        }
        let mut value = start;
        for emitted in 0..count {
            if subscriber.is_closed() {
                trace!("subscription {} closed after {} of {}", subscriber.id(), emitted, count);
                return Ok(Teardown::Nil);
            }
            subscriber.next(value);
            if emitted + 1 < count {
                value += 1;
            }
        }
        subscriber.complete();
        Ok(Teardown::Nil)
    })
}

/// `range(0, count)`.
pub fn range_n(count: u64) -> Observable<i64> {
    range(0, count)
}

pub fn empty<T: 'static>() -> Observable<T> {
    Observable::create(|subscriber| {
        subscriber.complete();
        Ok(Teardown::Nil)
    })
}

/// Never emits and never terminates.
pub fn never<T: 'static>() -> Observable<T> {
    Observable::create(|_| Ok(Teardown::Nil))
}

pub fn throw_error<T: 'static>(err: RxError) -> Observable<T> {
    Observable::create(move |subscriber| {
        subscriber.error(err.clone());
        Ok(Teardown::Nil)
    })
}
