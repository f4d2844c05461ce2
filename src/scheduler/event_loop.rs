use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, SendError, Sender};
use log::{debug, error, info, trace};

use crate::config::SchedulerConfig;
use crate::limero::error::catch_panic;
use crate::scheduler::queue::TaskQueue;
use crate::scheduler::{LocalFuture, Scheduler, Task, TaskId};

pub enum LoopCommand {
    WakeUp,                            // re-check timers and woken futures
    Terminate,                         // leave the run loop
    Execute(Box<dyn FnOnce() + Send>), // run a closure on the loop thread
}

/// Cloneable, `Send` handle for talking to an [`EventLoop`] from other threads.
///
/// `wake` and `terminate` never block. `send` and `execute` block while the
/// command channel is full, so they belong on other threads only.
#[derive(Clone)]
pub struct LoopHandle {
    sender: Sender<LoopCommand>,
    please_stop: Arc<AtomicBool>,
}

impl LoopHandle {
    pub fn send(&self, command: LoopCommand) -> Result<(), SendError<LoopCommand>> {
        self.sender.send(command)
    }

    pub fn wake(&self) {
        let _ = self.sender.try_send(LoopCommand::WakeUp);
    }

    /// Stops the running loop, or the next one to start.
    pub fn terminate(&self) {
        self.please_stop.store(true, Ordering::SeqCst);
        // a full channel already wakes the loop
        let _ = self.sender.try_send(LoopCommand::WakeUp);
    }

    pub fn execute(&self, f: impl FnOnce() + Send + 'static) -> Result<(), SendError<LoopCommand>> {
        self.sender.send(LoopCommand::Execute(Box::new(f)))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum StopWhen {
    Terminated,
    Idle,
    Deadline(Instant),
}

/// Wall-clock, single-threaded event loop.
///
/// Each turn runs the due timers and the woken futures; between turns the
/// loop blocks on its command channel until the next timer is due.
pub struct EventLoop {
    queue: TaskQueue,
    epoch: Instant,
    sender: Sender<LoopCommand>,
    receiver: Receiver<LoopCommand>,
    idle_timeout: Duration,
    please_stop: Arc<AtomicBool>,
}

impl EventLoop {
    pub fn new() -> Rc<Self> {
        Self::with_config(&SchedulerConfig::default())
    }

    pub fn with_config(config: &SchedulerConfig) -> Rc<Self> {
        let (sender, receiver) = bounded(config.command_capacity.max(1));
        Rc::new(EventLoop {
            queue: TaskQueue::new(config.resolution(), Some(sender.clone())),
            epoch: Instant::now(),
            sender,
            receiver,
            idle_timeout: Duration::from_millis(config.idle_timeout_ms.max(1)),
            please_stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            sender: self.sender.clone(),
            please_stop: self.please_stop.clone(),
        }
    }

    /// Runs until a `Terminate` command arrives.
    pub fn run(&self) {
        self.run_loop(StopWhen::Terminated);
    }

    /// Runs until no timers or futures remain, or until terminated.
    pub fn run_until_idle(&self) {
        self.run_loop(StopWhen::Idle);
    }

    pub fn run_for(&self, duration: Duration) {
        self.run_loop(StopWhen::Deadline(Instant::now() + duration));
    }

    fn run_loop(&self, stop: StopWhen) {
        info!("event loop started");
        loop {
            self.queue.turn(self.now());
            if self.stop_requested() {
                break;
            }
            if stop == StopWhen::Idle && self.queue.is_empty() {
                break;
            }
            let mut wait = self.time_to_next_work();
            if let StopWhen::Deadline(deadline) = stop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                wait = wait.min(deadline - now);
            }
            self.wait_for_command(wait);
            if self.stop_requested() {
                break;
            }
        }
        info!("event loop stopped");
    }

    /// Consumes a pending terminate request.
    fn stop_requested(&self) -> bool {
        self.please_stop.swap(false, Ordering::SeqCst)
    }

    fn time_to_next_work(&self) -> Duration {
        if self.queue.has_ready_futures() {
            return Duration::ZERO;
        }
        match self.queue.next_due() {
            Some(due) => due.saturating_sub(self.now()).min(self.idle_timeout),
            None => self.idle_timeout,
        }
    }

    fn wait_for_command(&self, timeout: Duration) {
        match self.receiver.recv_timeout(timeout) {
            Ok(LoopCommand::WakeUp) => trace!("event loop woken"),
            Ok(LoopCommand::Terminate) => {
                debug!("event loop terminate requested");
                self.please_stop.store(true, Ordering::SeqCst);
            }
            Ok(LoopCommand::Execute(callback)) => {
                if let Err(msg) = catch_panic(callback) {
                    error!("posted callback panicked: {}", msg);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            // we hold a sender ourselves, so the channel never disconnects
            Err(RecvTimeoutError::Disconnected) => {}
        }
    }
}

impl Scheduler for EventLoop {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn schedule(&self, delay: Duration, task: Task) -> TaskId {
        self.queue.insert(self.now(), delay, None, task)
    }

    fn schedule_periodic(&self, delay: Duration, period: Duration, task: Task) -> TaskId {
        self.queue.insert(self.now(), delay, Some(period), task)
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::thread;

    #[test]
    fn run_until_idle_drains_timers() {
        let event_loop = EventLoop::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for (ms, label) in [(20u64, "late"), (5, "early")] {
            let seen = seen.clone();
            event_loop.schedule(
                Duration::from_millis(ms),
                Box::new(move || {
                    seen.borrow_mut().push(label);
                    Ok(())
                }),
            );
        }
        let started = Instant::now();
        event_loop.run_until_idle();
        assert_eq!(*seen.borrow(), vec!["early", "late"]);
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn terminate_from_another_thread() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.terminate();
        });
        event_loop.run();
        worker.join().unwrap();
    }

    #[test]
    fn executes_posted_closures() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let (tx, rx) = crossbeam::channel::unbounded();
        handle
            .execute(move || {
                let _ = tx.send(thread::current().id());
            })
            .unwrap();
        event_loop.run_for(Duration::from_millis(50));
        assert_eq!(rx.try_recv().unwrap(), thread::current().id());
    }

    #[test]
    fn terminate_from_a_task_does_not_block_on_a_full_channel() {
        let config = SchedulerConfig {
            command_capacity: 1,
            ..SchedulerConfig::default()
        };
        let event_loop = EventLoop::with_config(&config);
        let handle = event_loop.handle();
        handle.wake();
        handle.wake();
        let from_task = handle.clone();
        event_loop.schedule_periodic(
            Duration::ZERO,
            Duration::from_millis(1),
            Box::new(move || {
                from_task.terminate();
                Ok(())
            }),
        );
        event_loop.run();
        assert_eq!(event_loop.pending(), 1);
    }
}
