//! Adapters from futures and async streams. Each subscription builds its
//! own future or stream and spawns it on the scheduler, so emission always
//! happens on a later turn.

use std::fmt::Display;
use std::future::Future;
use std::pin::{pin, Pin};
use std::task::{Context, Poll};

use log::debug;
use tokio_stream::{Stream, StreamExt};

use crate::limero::error::{catch_panic, RxError};
use crate::limero::observable::Observable;
use crate::limero::subscriber::Subscriber;
use crate::limero::subscription::Teardown;
use crate::scheduler::SchedulerRef;

/// Resolves to `Err(message)` instead of unwinding when `inner` panics.
struct CatchPanic<F> {
    inner: Pin<Box<F>>,
}

impl<F: Future> Future for CatchPanic<F> {
    type Output = Result<F::Output, String>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = self.inner.as_mut();
        match catch_panic(move || inner.poll(cx)) {
            Ok(Poll::Ready(value)) => Poll::Ready(Ok(value)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(msg) => Poll::Ready(Err(msg)),
        }
    }
}

fn spawn_driver<T, D>(scheduler: &SchedulerRef, subscriber: Subscriber<T>, driver: D) -> Teardown
where
    T: 'static,
    D: Future<Output = ()> + 'static,
{
    let guarded = CatchPanic {
        inner: Box::pin(driver),
    };
    let id = scheduler.spawn(Box::pin(async move {
        if let Err(msg) = guarded.await {
            subscriber.error(RxError::Adapter(msg));
        }
    }));
    debug!("async adapter spawned as {:?}", id);
    Teardown::task(scheduler, id)
}

/// `Ok(v)` emits `v` then completes; `Err(e)` becomes an adapter error.
pub fn from_future<T, E, Fut, F>(scheduler: &SchedulerRef, factory: F) -> Observable<T>
where
    T: 'static,
    E: Display,
    Fut: Future<Output = Result<T, E>> + 'static,
    F: Fn() -> Fut + 'static,
{
    let scheduler = scheduler.clone();
    Observable::create(move |subscriber: Subscriber<T>| {
        let future = factory();
        let emitter = subscriber.clone();
        Ok(spawn_driver(&scheduler, subscriber, async move {
            match future.await {
                Ok(value) => {
                    emitter.next(value);
                    emitter.complete();
                }
                Err(err) => emitter.error(RxError::Adapter(err.to_string())),
            }
        }))
    })
}

/// For futures that cannot fail.
pub fn from_async<T, Fut, F>(scheduler: &SchedulerRef, factory: F) -> Observable<T>
where
    T: 'static,
    Fut: Future<Output = T> + 'static,
    F: Fn() -> Fut + 'static,
{
    let scheduler = scheduler.clone();
    Observable::create(move |subscriber: Subscriber<T>| {
        let future = factory();
        let emitter = subscriber.clone();
        Ok(spawn_driver(&scheduler, subscriber, async move {
            let value = future.await;
            emitter.next(value);
            emitter.complete();
        }))
    })
}

/// Emits every stream item, completing when the stream ends.
pub fn from_stream<T, S, F>(scheduler: &SchedulerRef, factory: F) -> Observable<T>
where
    T: 'static,
    S: Stream<Item = T> + 'static,
    F: Fn() -> S + 'static,
{
    let scheduler = scheduler.clone();
    Observable::create(move |subscriber: Subscriber<T>| {
        let stream = factory();
        let emitter = subscriber.clone();
        Ok(spawn_driver(&scheduler, subscriber, async move {
            let mut stream = pin!(stream);
            while let Some(item) = stream.next().await {
                if emitter.is_closed() {
                    return;
                }
                emitter.next(item);
            }
            emitter.complete();
        }))
    })
}

/// Like [`from_stream`], but the first `Err` item fails the subscription.
pub fn from_try_stream<T, E, S, F>(scheduler: &SchedulerRef, factory: F) -> Observable<T>
where
    T: 'static,
    E: Display,
    S: Stream<Item = Result<T, E>> + 'static,
    F: Fn() -> S + 'static,
{
    let scheduler = scheduler.clone();
    Observable::create(move |subscriber: Subscriber<T>| {
        let stream = factory();
        let emitter = subscriber.clone();
        Ok(spawn_driver(&scheduler, subscriber, async move {
            let mut stream = pin!(stream);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(value) => emitter.next(value),
                    Err(err) => {
                        emitter.error(RxError::Adapter(err.to_string()));
                        return;
                    }
                }
            }
            emitter.complete();
        }))
    })
}
