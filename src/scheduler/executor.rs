use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{error, trace};

use crate::limero::error::catch_panic;
use crate::scheduler::event_loop::LoopCommand;
use crate::scheduler::{LocalFuture, TaskId};

struct TaskWaker {
    id: TaskId,
    ready: Sender<TaskId>,
    notify: Option<Sender<LoopCommand>>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        // the receiver lives as long as the scheduler; a closed channel means it is gone
        let _ = self.ready.send(self.id);
        if let Some(notify) = &self.notify {
            let _ = notify.try_send(LoopCommand::WakeUp);
        }
    }
}

/// Single-threaded executor for the futures behind async adapters.
///
/// A slot holds `None` while its future is being polled, so a future may
/// cancel itself from inside `poll` without a double borrow.
pub(crate) struct Executor {
    futures: RefCell<HashMap<TaskId, Option<LocalFuture>>>,
    ready_tx: Sender<TaskId>,
    ready_rx: Receiver<TaskId>,
    notify: Option<Sender<LoopCommand>>,
}

impl Executor {
    pub(crate) fn new(notify: Option<Sender<LoopCommand>>) -> Self {
        let (ready_tx, ready_rx) = unbounded();
        Executor {
            futures: RefCell::new(HashMap::new()),
            ready_tx,
            ready_rx,
            notify,
        }
    }

    pub(crate) fn spawn(&self, id: TaskId, future: LocalFuture) {
        self.futures.borrow_mut().insert(id, Some(future));
        let _ = self.ready_tx.send(id);
    }

    pub(crate) fn cancel(&self, id: TaskId) -> bool {
        self.futures.borrow_mut().remove(&id).is_some()
    }

    pub(crate) fn contains(&self, id: TaskId) -> bool {
        self.futures.borrow().contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.futures.borrow().len()
    }

    pub(crate) fn has_ready(&self) -> bool {
        !self.ready_rx.is_empty()
    }

    /// Polls every future woken before this call. Returns how many were polled.
    pub(crate) fn poll_ready(&self) -> usize {
        let mut seen = HashSet::new();
        let woken: Vec<TaskId> = self.ready_rx.try_iter().filter(|id| seen.insert(*id)).collect();
        let mut polled = 0;
        for id in woken {
            let future = match self.futures.borrow_mut().get_mut(&id) {
                Some(slot) => slot.take(),
                None => None,
            };
            let Some(mut future) = future else {
                continue;
            };
            polled += 1;
            let waker = Waker::from(Arc::new(TaskWaker {
                id,
                ready: self.ready_tx.clone(),
                notify: self.notify.clone(),
            }));
            let mut cx = Context::from_waker(&waker);
            match catch_panic(|| future.as_mut().poll(&mut cx)) {
                Ok(Poll::Pending) => {
                    if let Some(slot) = self.futures.borrow_mut().get_mut(&id) {
                        *slot = Some(future);
                    } else {
                        trace!("{:?} cancelled while polling", id);
                    }
                }
                Ok(Poll::Ready(())) => {
                    trace!("{:?} finished", id);
                    self.futures.borrow_mut().remove(&id);
                }
                Err(msg) => {
                    error!("{:?} panicked while polling: {}", id, msg);
                    self.futures.borrow_mut().remove(&id);
                }
            }
        }
        polled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn polls_only_after_spawn_turn() {
        let executor = Executor::new(None);
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        executor.spawn(TaskId(1), Box::pin(async move { flag.set(true) }));
        assert!(!ran.get());
        assert_eq!(executor.poll_ready(), 1);
        assert!(ran.get());
        assert_eq!(executor.len(), 0);
    }

    #[test]
    fn pending_future_waits_for_wake() {
        let executor = Executor::new(None);
        let (tx, rx) = tokio::sync::oneshot::channel::<u8>();
        let got = Rc::new(Cell::new(0));
        let sink = got.clone();
        executor.spawn(
            TaskId(2),
            Box::pin(async move {
                if let Ok(v) = rx.await {
                    sink.set(v);
                }
            }),
        );
        executor.poll_ready();
        assert!(executor.contains(TaskId(2)));
        assert!(!executor.has_ready());
        tx.send(9).unwrap();
        assert!(executor.has_ready());
        executor.poll_ready();
        assert_eq!(got.get(), 9);
        assert!(!executor.contains(TaskId(2)));
    }

    #[test]
    fn panicking_future_is_dropped() {
        let executor = Executor::new(None);
        executor.spawn(TaskId(3), Box::pin(async { panic!("bad poll"); }));
        executor.poll_ready();
        assert_eq!(executor.len(), 0);
    }
}
