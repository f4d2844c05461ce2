//! Adapters from synchronous sequences to observables.
//!
//! Every source shape gets its own cursor behind [`SequenceSource`]; the
//! observable opens a fresh cursor per subscription and drains it inside
//! `subscribe`.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::marker::PhantomData;
use std::ops::Bound;
use std::rc::Rc;

use log::trace;

use crate::limero::error::{catch_panic, RxError};
use crate::limero::observable::Observable;
use crate::limero::subscription::Teardown;

/// One step of a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pull<T> {
    Next(T),
    Done,
    Failed(RxError),
}

pub trait SequenceSource {
    type Item;

    fn pull(&mut self) -> Pull<Self::Item>;
}

/// A stored sequence that can hand out independent cursors.
pub trait Sequence: 'static {
    type Item: 'static;
    type Cursor: SequenceSource<Item = Self::Item>;

    fn cursor(this: &Rc<Self>) -> Self::Cursor;
}

/// Index cursor over shared slice storage (vectors and arrays).
pub struct SliceSource<C, T> {
    items: Rc<C>,
    index: usize,
    _item: PhantomData<T>,
}

impl<C: AsRef<[T]>, T: Clone> SequenceSource for SliceSource<C, T> {
    type Item = T;

    fn pull(&mut self) -> Pull<T> {
        let items: &[T] = (*self.items).as_ref();
        match items.get(self.index) {
            Some(item) => {
                self.index += 1;
                Pull::Next(item.clone())
            }
            None => Pull::Done,
        }
    }
}

impl<T: Clone + 'static> Sequence for Vec<T> {
    type Item = T;
    type Cursor = SliceSource<Vec<T>, T>;

    fn cursor(this: &Rc<Self>) -> Self::Cursor {
        SliceSource {
            items: this.clone(),
            index: 0,
            _item: PhantomData,
        }
    }
}

impl<T: Clone + 'static, const N: usize> Sequence for [T; N] {
    type Item = T;
    type Cursor = SliceSource<[T; N], T>;

    fn cursor(this: &Rc<Self>) -> Self::Cursor {
        SliceSource {
            items: this.clone(),
            index: 0,
            _item: PhantomData,
        }
    }
}

/// Character cursor over a string, tracking a byte offset.
pub struct CharSource<S> {
    text: Rc<S>,
    offset: usize,
}

impl<S: AsRef<str>> SequenceSource for CharSource<S> {
    type Item = char;

    fn pull(&mut self) -> Pull<char> {
        let text: &str = (*self.text).as_ref();
        let rest = &text[self.offset..];
        match rest.chars().next() {
            Some(c) => {
                self.offset += c.len_utf8();
                Pull::Next(c)
            }
            None => Pull::Done,
        }
    }
}

impl Sequence for String {
    type Item = char;
    type Cursor = CharSource<String>;

    fn cursor(this: &Rc<Self>) -> Self::Cursor {
        CharSource {
            text: this.clone(),
            offset: 0,
        }
    }
}

impl Sequence for &'static str {
    type Item = char;
    type Cursor = CharSource<&'static str>;

    fn cursor(this: &Rc<Self>) -> Self::Cursor {
        CharSource {
            text: this.clone(),
            offset: 0,
        }
    }
}

/// Key cursor over an ordered map, yielding `(key, value)` in key order.
pub struct MapSource<K, V> {
    map: Rc<BTreeMap<K, V>>,
    last: Option<K>,
}

impl<K: Ord + Clone, V: Clone> SequenceSource for MapSource<K, V> {
    type Item = (K, V);

    fn pull(&mut self) -> Pull<(K, V)> {
        let lower = match &self.last {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        let next = self
            .map
            .range::<K, _>((lower, Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()));
        match next {
            Some((key, value)) => {
                self.last = Some(key.clone());
                Pull::Next((key, value))
            }
            None => Pull::Done,
        }
    }
}

impl<K: Ord + Clone + 'static, V: Clone + 'static> Sequence for BTreeMap<K, V> {
    type Item = (K, V);
    type Cursor = MapSource<K, V>;

    fn cursor(this: &Rc<Self>) -> Self::Cursor {
        MapSource {
            map: this.clone(),
            last: None,
        }
    }
}

/// Cursor over an externally supplied iterator.
pub struct IterSource<I>(I);

impl<I: Iterator> SequenceSource for IterSource<I> {
    type Item = I::Item;

    fn pull(&mut self) -> Pull<I::Item> {
        match self.0.next() {
            Some(item) => Pull::Next(item),
            None => Pull::Done,
        }
    }
}

/// Cursor over an iterator of results; the first `Err` fails the sequence.
pub struct TryIterSource<I>(I);

impl<I, T, E> SequenceSource for TryIterSource<I>
where
    I: Iterator<Item = Result<T, E>>,
    E: Display,
{
    type Item = T;

    fn pull(&mut self) -> Pull<T> {
        match self.0.next() {
            Some(Ok(item)) => Pull::Next(item),
            Some(Err(err)) => Pull::Failed(RxError::Adapter(err.to_string())),
            None => Pull::Done,
        }
    }
}

/// Drains a fresh cursor from `open` for every subscription.
pub fn from_source<S, F>(open: F) -> Observable<S::Item>
where
    S: SequenceSource,
    S::Item: 'static,
    F: Fn() -> S + 'static,
{
    Observable::create(move |subscriber| {
        let mut source = open();
        let mut emitted = 0usize;
        loop {
            if subscriber.is_closed() {
                trace!("subscription {} closed after {} items", subscriber.id(), emitted);
                break;
            }
            match catch_panic(|| source.pull()) {
                Ok(Pull::Next(item)) => {
                    emitted += 1;
                    subscriber.next(item);
                }
                Ok(Pull::Done) => {
                    subscriber.complete();
                    break;
                }
                Ok(Pull::Failed(err)) => {
                    subscriber.error(err);
                    break;
                }
                Err(msg) => {
                    subscriber.error(RxError::Adapter(msg));
                    break;
                }
            }
        }
        Ok(Teardown::Nil)
    })
}

/// Emits every element of `sequence` in iteration order, then completes.
pub fn from_sequence<Q: Sequence>(sequence: Q) -> Observable<Q::Item> {
    let sequence = Rc::new(sequence);
    from_source(move || Q::cursor(&sequence))
}

/// Snapshots the entries of any map-like collection at construction time.
pub fn from_entries<K, V, M>(entries: M) -> Observable<(K, V)>
where
    K: Clone + 'static,
    V: Clone + 'static,
    M: IntoIterator<Item = (K, V)>,
{
    from_sequence(entries.into_iter().collect::<Vec<_>>())
}

/// Iterators are single-use, so `open` builds a new one per subscription.
pub fn from_iter<I, F>(open: F) -> Observable<I::Item>
where
    I: Iterator,
    I::Item: 'static,
    F: Fn() -> I + 'static,
{
    from_source(move || IterSource(open()))
}

pub fn from_try_iter<I, T, E, F>(open: F) -> Observable<T>
where
    I: Iterator<Item = Result<T, E>>,
    T: 'static,
    E: Display,
    F: Fn() -> I + 'static,
{
    from_source(move || TryIterSource(open()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limero::Observer;
    use std::cell::RefCell;
    use std::collections::HashMap;

    fn events<T: std::fmt::Debug + 'static>(observable: &Observable<T>) -> Vec<String> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (n, e, c) = (log.clone(), log.clone(), log.clone());
        observable.subscribe(
            Observer::new(move |v: T| n.borrow_mut().push(format!("{v:?}")))
                .on_error(move |err| e.borrow_mut().push(format!("error: {err}")))
                .on_complete(move || c.borrow_mut().push("done".to_string())),
        );
        let out = log.borrow().clone();
        out
    }

    #[test]
    fn vector_in_order() {
        assert_eq!(events(&from_sequence(vec!["a", "b", "c"])), vec!["\"a\"", "\"b\"", "\"c\"", "done"]);
    }

    #[test]
    fn array_and_empty_vector() {
        assert_eq!(events(&from_sequence([10, 20])), vec!["10", "20", "done"]);
        assert_eq!(events(&from_sequence(Vec::<u8>::new())), vec!["done"]);
    }

    #[test]
    fn string_as_characters() {
        assert_eq!(events(&from_sequence("hé!")), vec!["'h'", "'é'", "'!'", "done"]);
        assert_eq!(events(&from_sequence(String::from("ab"))), vec!["'a'", "'b'", "done"]);
    }

    #[test]
    fn ordered_map_entries() {
        let mut map = BTreeMap::new();
        map.insert(2, "two");
        map.insert(1, "one");
        assert_eq!(events(&from_sequence(map)), vec!["(1, \"one\")", "(2, \"two\")", "done"]);
    }

    #[test]
    fn hash_map_snapshot_is_stable_across_subscriptions() {
        let map: HashMap<_, _> = (0..16).map(|k| (k, k * k)).collect();
        let observable = from_entries(map);
        let first = events(&observable);
        assert_eq!(first.len(), 17);
        assert_eq!(first, events(&observable));
    }

    #[test]
    fn external_iterator_restarts_per_subscription() {
        let observable = from_iter(|| (1..=3).map(|n| n * 10));
        assert_eq!(events(&observable), vec!["10", "20", "30", "done"]);
        assert_eq!(events(&observable), vec!["10", "20", "30", "done"]);
    }

    #[test]
    fn failing_iterator_stops_with_adapter_error() {
        let observable = from_try_iter(|| vec![Ok(1), Err("disk gone"), Ok(3)].into_iter());
        assert_eq!(events(&observable), vec!["1", "error: adapted source failed: disk gone"]);
    }

    #[test]
    fn panicking_cursor_is_adapter_error() {
        let observable = from_iter(|| (0..5).map(|n| if n == 2 { panic!("cursor broke") } else { n }));
        assert_eq!(events(&observable), vec!["0", "1", "error: adapted source failed: cursor broke"]);
    }
}
