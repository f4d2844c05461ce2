//! A small push-based observable core.
//!
//! Observables are inert descriptions of a sequence; every `subscribe` runs
//! the producer afresh against a new [`Subscriber`](limero::Subscriber).
//! Time-based and async creators run on a [`Scheduler`](scheduler::Scheduler),
//! either the simulated [`VirtualScheduler`](scheduler::VirtualScheduler) or
//! the wall-clock [`EventLoop`](scheduler::EventLoop).

pub mod config;
pub mod limero;
pub mod logger;
pub mod scheduler;

pub use limero::*;
pub use scheduler::{EventLoop, LoopHandle, Scheduler, SchedulerRef, TaskId, VirtualScheduler};
