//! Cursors and iterators over the live entries of a map.
//!
//! All traversal shares one cursor shape ([`CursorState`]): a bucket index
//! walked from the top of the table downwards plus an *anchor* cell whose key
//! the cursor holds strongly. Because the anchor's key cannot die, the
//! expunger can never unlink the anchor, and its successor is always found by
//! following the live chain. Cells whose key has died are skipped.
//!
//! [`Cursor`] is the detached, fail-fast form: it does not borrow the map
//! between steps, so the caller may interleave other map calls. A structural
//! modification between steps is reported as
//! [`IterError::ConcurrentModification`]. The borrowing iterators ([`Iter`],
//! [`Keys`], [`Values`]) reuse the same state under a shared borrow, where no
//! modification can happen.

use crate::error::IterError;
use crate::key::Key;
use crate::slot_table::{Cell, CellId, LogicalKey, SlotTable};
use crate::weak_identity_hash_map::{MapId, WeakIdentityHashMap};
use core::fmt;
use core::hash::{BuildHasher, Hash, Hasher};
use core::marker::PhantomData;

pub(crate) struct CursorState<T> {
    // Buckets below `index` are unvisited; the anchor lives in bucket `index`.
    index: usize,
    anchor: Option<CellId>,
    // Found by `has_next`, key held until it is yielded.
    pending: Option<(CellId, LogicalKey<T>)>,
    // Last yielded cell, key held until the next step or `remove`.
    current: Option<(CellId, LogicalKey<T>)>,
    expected_mod_count: u64,
}

impl<T> CursorState<T> {
    pub(crate) fn new<V, S>(table: &SlotTable<T, V, S>) -> Self {
        Self {
            index: if table.len() != 0 {
                table.bucket_count()
            } else {
                0
            },
            anchor: None,
            pending: None,
            current: None,
            expected_mod_count: table.mod_count(),
        }
    }

    /// Find the next cell whose key still resolves and hold that key.
    pub(crate) fn has_next<V, S>(&mut self, table: &SlotTable<T, V, S>) -> bool {
        if self.pending.is_some() {
            return true;
        }
        let mut e = self.anchor.and_then(|a| table.next_of(a));
        loop {
            while e.is_none() && self.index > 0 {
                self.index -= 1;
                e = table.head(self.index);
            }
            let Some(id) = e else {
                self.anchor = None;
                return false;
            };
            match table.resolve(id) {
                Some(key) => {
                    self.anchor = Some(id);
                    self.pending = Some((id, key));
                    return true;
                }
                None => e = table.next_of(id),
            }
        }
    }

    /// Yield the pending cell, finding one first if needed.
    pub(crate) fn advance<V, S>(
        &mut self,
        table: &SlotTable<T, V, S>,
    ) -> Result<(CellId, LogicalKey<T>), IterError> {
        if table.mod_count() != self.expected_mod_count {
            return Err(IterError::ConcurrentModification);
        }
        self.has_next(table);
        let Some((id, key)) = self.pending.take() else {
            return Err(IterError::NoSuchElement);
        };
        self.current = Some((id, key.clone()));
        Ok((id, key))
    }

    /// Release the last yielded cell for removal and return its key. The
    /// successor is pinned first, since the anchor is about to disappear.
    pub(crate) fn take_current<V, S>(
        &mut self,
        table: &SlotTable<T, V, S>,
    ) -> Result<LogicalKey<T>, IterError> {
        if self.current.is_none() {
            return Err(IterError::IllegalState);
        }
        if table.mod_count() != self.expected_mod_count {
            return Err(IterError::ConcurrentModification);
        }
        self.has_next(table);
        let Some((_, key)) = self.current.take() else {
            return Err(IterError::IllegalState);
        };
        Ok(key)
    }

    pub(crate) fn resync(&mut self, mod_count: u64) {
        self.expected_mod_count = mod_count;
    }
}

/// Turns a visited cell into the item a [`Cursor`] yields.
pub trait Projection<T, V> {
    type Item<'m>
    where
        V: 'm;

    fn project<'m>(key: Option<Key<T>>, value: &'m mut V) -> Self::Item<'m>;
}

/// Yields keys (`None` is the null key).
#[derive(Debug, Clone, Copy)]
pub struct KeyProjection;

/// Yields shared references to values.
#[derive(Debug, Clone, Copy)]
pub struct ValueProjection;

/// Yields [`EntryMut`]s.
#[derive(Debug, Clone, Copy)]
pub struct EntryProjection;

impl<T, V> Projection<T, V> for KeyProjection {
    type Item<'m>
        = Option<Key<T>>
    where
        V: 'm;

    fn project<'m>(key: Option<Key<T>>, _value: &'m mut V) -> Self::Item<'m> {
        key
    }
}

impl<T, V> Projection<T, V> for ValueProjection {
    type Item<'m>
        = &'m V
    where
        V: 'm;

    fn project<'m>(_key: Option<Key<T>>, value: &'m mut V) -> Self::Item<'m> {
        value
    }
}

impl<T, V> Projection<T, V> for EntryProjection {
    type Item<'m>
        = EntryMut<'m, T, V>
    where
        V: 'm;

    fn project<'m>(key: Option<Key<T>>, value: &'m mut V) -> Self::Item<'m> {
        EntryMut { key, value }
    }
}

/// A live entry yielded by an entry cursor.
///
/// Holds the entry's key strongly. Valid until the next structural change to
/// the map; [`EntryMut::set_value`] is not a structural change.
pub struct EntryMut<'m, T, V> {
    key: LogicalKey<T>,
    value: &'m mut V,
}

impl<'m, T, V> EntryMut<'m, T, V> {
    /// The entry's key, `None` for the null key.
    pub fn key(&self) -> Option<&Key<T>> {
        self.key.as_ref()
    }

    pub fn value(&self) -> &V {
        self.value
    }

    pub fn value_mut(&mut self) -> &mut V {
        self.value
    }

    /// Replace the value in place and return the previous one.
    pub fn set_value(&mut self, value: V) -> V {
        core::mem::replace(self.value, value)
    }

    pub fn into_value_mut(self) -> &'m mut V {
        self.value
    }
}

/// Entries are equal when their keys are the same handle (or both null) and
/// their values are equal.
impl<'b, T, V: PartialEq> PartialEq<EntryMut<'b, T, V>> for EntryMut<'_, T, V> {
    fn eq(&self, other: &EntryMut<'b, T, V>) -> bool {
        self.key == other.key && *self.value == *other.value
    }
}

impl<T, V: Eq> Eq for EntryMut<'_, T, V> {}

impl<T, V: Hash> Hash for EntryMut<'_, T, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.value.hash(state);
    }
}

impl<T: fmt::Debug, V: fmt::Debug> fmt::Debug for EntryMut<'_, T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(k) => write!(f, "{:?}={:?}", k, self.value),
            None => write!(f, "null={:?}", self.value),
        }
    }
}

/// Detached fail-fast cursor over a map, generic over what it yields.
///
/// ```
/// use weak_identity_hashmap::{Key, WeakIdentityHashMap};
///
/// let a = Key::new("a");
/// let b = Key::new("b");
/// let mut map = WeakIdentityHashMap::new();
/// map.insert(&a, 1);
/// map.insert(&b, 2);
///
/// let mut cursor = map.entry_cursor();
/// while cursor.has_next(&map).unwrap() {
///     let mut entry = cursor.next(&mut map).unwrap();
///     let doubled = *entry.value() * 2;
///     entry.set_value(doubled);
/// }
/// assert_eq!(map.get(&a), Some(&2));
/// assert_eq!(map.get(&b), Some(&4));
/// ```
pub struct Cursor<T, P> {
    state: CursorState<T>,
    owner: MapId,
    _projection: PhantomData<fn() -> P>,
}

impl<T, P> Cursor<T, P> {
    pub(crate) fn new<V, S>(map: &WeakIdentityHashMap<T, V, S>) -> Self {
        Self {
            state: CursorState::new(map.table()),
            owner: map.id(),
            _projection: PhantomData,
        }
    }

    #[inline]
    fn check_owner<V, S>(&self, map: &WeakIdentityHashMap<T, V, S>) -> Result<(), IterError> {
        if map.id() == self.owner {
            Ok(())
        } else {
            Err(IterError::WrongMap)
        }
    }

    /// Whether another live entry remains. A found entry's key is held until
    /// the following [`Cursor::next`], so it cannot be reclaimed in between.
    pub fn has_next<V, S>(&mut self, map: &WeakIdentityHashMap<T, V, S>) -> Result<bool, IterError> {
        self.check_owner(map)?;
        Ok(self.state.has_next(map.table()))
    }

    /// Yield the next live entry.
    pub fn next<'m, V, S>(
        &mut self,
        map: &'m mut WeakIdentityHashMap<T, V, S>,
    ) -> Result<P::Item<'m>, IterError>
    where
        P: Projection<T, V>,
    {
        self.check_owner(map)?;
        let (id, key) = self.state.advance(map.table())?;
        let cell = map
            .table_mut()
            .cell_mut(id)
            .ok_or(IterError::ConcurrentModification)?;
        Ok(P::project(key, &mut cell.value))
    }

    /// Remove the entry last yielded by [`Cursor::next`] from the map.
    pub fn remove<V, S>(&mut self, map: &mut WeakIdentityHashMap<T, V, S>) -> Result<(), IterError>
    where
        S: BuildHasher,
    {
        self.check_owner(map)?;
        let key = self.state.take_current(map.table())?;
        let _ = map.remove(&key);
        self.state.resync(map.table().mod_count());
        Ok(())
    }
}

/// Iterator over live `(key, &value)` pairs.
pub struct Iter<'a, T, V, S> {
    table: &'a SlotTable<T, V, S>,
    state: CursorState<T>,
}

impl<'a, T, V, S> Iter<'a, T, V, S> {
    pub(crate) fn new(table: &'a SlotTable<T, V, S>) -> Self {
        Self {
            table,
            state: CursorState::new(table),
        }
    }
}

impl<'a, T, V, S> Iterator for Iter<'a, T, V, S> {
    type Item = (Option<Key<T>>, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let (id, key) = self.state.advance(self.table).ok()?;
        let cell = self.table.cell(id)?;
        Some((key, &cell.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.table.len()))
    }
}

/// Iterator over live keys.
pub struct Keys<'a, T, V, S>(pub(crate) Iter<'a, T, V, S>);

impl<'a, T, V, S> Iterator for Keys<'a, T, V, S> {
    type Item = Option<Key<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

/// Iterator over the values of live entries.
pub struct Values<'a, T, V, S>(pub(crate) Iter<'a, T, V, S>);

impl<'a, T, V, S> Iterator for Values<'a, T, V, S> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

/// Iterator over live `(key, &mut value)` pairs, in arena order.
pub struct IterMut<'a, T, V> {
    base: slotmap::basic::IterMut<'a, CellId, Cell<T, V>>,
}

impl<'a, T, V> IterMut<'a, T, V> {
    pub(crate) fn new(base: slotmap::basic::IterMut<'a, CellId, Cell<T, V>>) -> Self {
        Self { base }
    }
}

impl<'a, T, V> Iterator for IterMut<'a, T, V> {
    type Item = (Option<Key<T>>, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        for (_, cell) in self.base.by_ref() {
            if let Some(key) = cell.key().resolve() {
                return Some((key, &mut cell.value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.base.size_hint().1)
    }
}

/// Iterator over mutable values of live entries.
pub struct ValuesMut<'a, T, V>(pub(crate) IterMut<'a, T, V>);

impl<'a, T, V> Iterator for ValuesMut<'a, T, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyRef;
    use std::collections::hash_map::RandomState;
    use std::collections::HashSet;

    type Table = SlotTable<u32, u32, RandomState>;

    fn filled(keys: &[Key<u32>]) -> Table {
        let mut t = SlotTable::new(4, 0.75, RandomState::new()).unwrap();
        let mut dead = Vec::new();
        for k in keys {
            let _ = t.insert(KeyRef::from(k), **k, &mut dead);
        }
        t
    }

    fn drain(state: &mut CursorState<u32>, t: &Table) -> Vec<u32> {
        let mut out = Vec::new();
        while let Ok((id, _)) = state.advance(t) {
            out.push(t.cell(id).unwrap().value);
        }
        out
    }

    #[test]
    fn visits_each_live_cell_once() {
        let keys: Vec<_> = (0..20).map(Key::new).collect();
        let t = filled(&keys);
        let mut s = CursorState::new(&t);
        let seen = drain(&mut s, &t);
        assert_eq!(seen.len(), 20);
        assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 20);
        assert!(!s.has_next(&t));
    }

    #[test]
    fn skips_cells_whose_key_died() {
        let mut keys: Vec<_> = (0..6).map(Key::new).collect();
        let t = filled(&keys);
        keys.retain(|k| **k % 2 == 0);
        let mut s = CursorState::new(&t);
        let mut seen = drain(&mut s, &t);
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 2, 4]);
    }

    /// Invariant: has_next pins the found key, so dropping every other
    /// handle before the next step cannot make it vanish.
    #[test]
    fn pending_key_is_held_strongly() {
        let keys: Vec<_> = (0..1).map(Key::new).collect();
        let t = filled(&keys);
        let mut s = CursorState::new(&t);
        assert!(s.has_next(&t));
        drop(keys);
        let (id, key) = s.advance(&t).unwrap();
        assert_eq!(key.as_deref(), Some(&0));
        assert!(t.cell(id).unwrap().key().is_live());
    }

    #[test]
    fn take_current_without_advance_is_illegal() {
        let keys: Vec<_> = (0..3).map(Key::new).collect();
        let t = filled(&keys);
        let mut s = CursorState::new(&t);
        assert_eq!(s.take_current(&t).err(), Some(IterError::IllegalState));
        s.advance(&t).unwrap();
        assert!(s.take_current(&t).is_ok());
        assert_eq!(s.take_current(&t).err(), Some(IterError::IllegalState));
    }

    #[test]
    fn empty_table_has_nothing() {
        let t = filled(&[]);
        let mut s = CursorState::new(&t);
        assert!(!s.has_next(&t));
        assert_eq!(s.advance(&t).err(), Some(IterError::NoSuchElement));
    }

    #[test]
    fn entries_compare_by_key_identity_and_value() {
        let a = Key::new("same");
        let b = Key::new("same");
        let (mut v1, mut v2, mut v3, mut v4) = (1, 1, 1, 2);
        let e1: EntryMut<'_, &str, i32> = EntryProjection::project(Some(a.clone()), &mut v1);
        let e2: EntryMut<'_, &str, i32> = EntryProjection::project(Some(a.clone()), &mut v2);
        let e3: EntryMut<'_, &str, i32> = EntryProjection::project(Some(b), &mut v3);
        let e4: EntryMut<'_, &str, i32> = EntryProjection::project(Some(a), &mut v4);
        assert_eq!(e1, e2);
        assert_ne!(e1, e3, "equal payloads, distinct handles");
        assert_ne!(e1, e4);

        let s = RandomState::new();
        assert_eq!(s.hash_one(&e1), s.hash_one(&e2));

        let (mut n1, mut n2) = (5, 5);
        let null1: EntryMut<'_, &str, i32> = EntryProjection::project(None, &mut n1);
        let null2: EntryMut<'_, &str, i32> = EntryProjection::project(None, &mut n2);
        assert_eq!(null1, null2);
        assert_ne!(null1, e1);
    }

    #[test]
    fn entry_debug_formats_as_pair() {
        let k = Key::new("k");
        let mut v = 3;
        let e: EntryMut<'_, &str, i32> = EntryProjection::project(Some(k), &mut v);
        assert_eq!(format!("{:?}", e), "\"k\"=3");
        let mut w = 4;
        let n: EntryMut<'_, &str, i32> = EntryProjection::project(None, &mut w);
        assert_eq!(format!("{:?}", n), "null=4");
    }
}
