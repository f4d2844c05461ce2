use std::time::Duration;

use log::debug;

use crate::limero::error::{catch_panic, RxError};
use crate::limero::observable::Observable;
use crate::limero::subscription::Teardown;
use crate::scheduler::{SchedulerRef, Task};

/// Emits `0` after `initial_delay`. Without a period it then completes;
/// with one it keeps emitting `1, 2, 3, …` every `period` and never completes.
pub fn timer(scheduler: &SchedulerRef, initial_delay: Duration, period: Option<Duration>) -> Observable<u64> {
    let scheduler = scheduler.clone();
    Observable::create(move |subscriber| {
        let mut tick: u64 = 0;
        let emitter = subscriber.clone();
        let task: Task = Box::new(move || {
            let value = tick;
            tick += 1;
            if let Err(msg) = catch_panic(|| emitter.next(value)) {
                emitter.error(RxError::Scheduler(msg));
                return Ok(());
            }
            if period.is_none() {
                emitter.complete();
            }
            Ok(())
        });
        let id = match period {
            Some(period) => scheduler.schedule_periodic(initial_delay, period, task),
            None => scheduler.schedule(initial_delay, task),
        };
        debug!(
            "subscription {} timer {:?} delay {:?} period {:?}",
            subscriber.id(),
            id,
            initial_delay,
            period
        );
        Ok(Teardown::task(&scheduler, id))
    })
}

/// `timer(scheduler, period, Some(period))`: `0, 1, 2, …` every `period`.
pub fn interval(scheduler: &SchedulerRef, period: Duration) -> Observable<u64> {
    timer(scheduler, period, Some(period))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limero::Observer;
    use crate::scheduler::{Scheduler, VirtualScheduler};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn nothing_happens_inside_subscribe() {
        let virtual_time = VirtualScheduler::new();
        let scheduler: SchedulerRef = virtual_time.clone();
        let got = Rc::new(RefCell::new(Vec::new()));
        let sink = got.clone();
        timer(&scheduler, Duration::ZERO, None).subscribe_next(move |v| sink.borrow_mut().push(v));
        assert!(got.borrow().is_empty());
        virtual_time.flush();
        assert_eq!(*got.borrow(), vec![0]);
    }

    #[test]
    fn panicking_observer_becomes_scheduler_error() {
        let virtual_time = VirtualScheduler::new();
        let scheduler: SchedulerRef = virtual_time.clone();
        let err = Rc::new(RefCell::new(None));
        let slot = err.clone();
        interval(&scheduler, ms(10)).subscribe(
            Observer::new(|v: u64| {
                if v == 1 {
                    panic!("tick {v} rejected");
                }
            })
            .on_error(move |e| *slot.borrow_mut() = Some(e)),
        );
        virtual_time.advance_by(ms(50));
        assert_eq!(*err.borrow(), Some(RxError::Scheduler("tick 1 rejected".to_string())));
        assert_eq!(virtual_time.pending(), 0);
    }

    #[test]
    fn zero_interval_yields_between_ticks() {
        let virtual_time = VirtualScheduler::new();
        let scheduler: SchedulerRef = virtual_time.clone();
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let sink = ticks.clone();
        interval(&scheduler, Duration::ZERO).subscribe_next(move |v| sink.borrow_mut().push(v));
        let other = Rc::new(RefCell::new(false));
        let flag = other.clone();
        virtual_time.schedule(
            Duration::ZERO,
            Box::new(move || {
                *flag.borrow_mut() = true;
                Ok(())
            }),
        );
        virtual_time.flush();
        assert_eq!(*ticks.borrow(), vec![0]);
        assert!(*other.borrow());
        virtual_time.advance_by(ms(3));
        assert_eq!(*ticks.borrow(), vec![0, 1, 2, 3]);
    }
}
