//! The observable core: producers, subscribers, subscriptions and the
//! creation functions built on them.

pub(crate) mod error;
mod creators;
mod future;
mod observable;
mod sequence;
mod subscriber;
mod subscription;
mod timer;

pub use creators::{defer, empty, never, of, range, range_n, throw_error};
pub use error::RxError;
pub use future::{from_async, from_future, from_stream, from_try_stream};
pub use observable::Observable;
pub use sequence::{
    from_entries, from_iter, from_sequence, from_source, from_try_iter, CharSource, IterSource,
    MapSource, Pull, Sequence, SequenceSource, SliceSource, TryIterSource,
};
pub use subscriber::{Observer, Subscriber};
pub use subscription::{Subscription, Teardown};
pub use timer::{interval, timer};
