use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

/// Terminal error delivered on a subscription's error channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RxError {
    /// Raised while building or running a producer.
    #[error("producer failed: {0}")]
    Producer(String),
    /// An adapted future, stream or sequence failed.
    #[error("adapted source failed: {0}")]
    Adapter(String),
    /// A scheduled callback failed while executing.
    #[error("scheduled callback failed: {0}")]
    Scheduler(String),
}

impl RxError {
    pub fn producer(msg: impl Into<String>) -> Self {
        RxError::Producer(msg.into())
    }

    pub fn adapter(msg: impl Into<String>) -> Self {
        RxError::Adapter(msg.into())
    }

    pub fn scheduler(msg: impl Into<String>) -> Self {
        RxError::Scheduler(msg.into())
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Runs `f`, turning a panic into its message.
pub(crate) fn catch_panic<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        assert_eq!(catch_panic(|| 7), Ok(7));
        assert_eq!(catch_panic(|| -> () { panic!("boom") }), Err("boom".to_string()));
        let owned = catch_panic(|| -> () { panic!("code {}", 42) });
        assert_eq!(owned, Err("code 42".to_string()));
    }

    #[test]
    fn display_names_the_category() {
        assert_eq!(RxError::adapter("rejected").to_string(), "adapted source failed: rejected");
        assert_eq!(RxError::producer("x").to_string(), "producer failed: x");
    }
}
