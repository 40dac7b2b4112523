//! Key, value and entry views borrowed from a map.
//!
//! A view is a thin `&mut` wrapper: every call goes through the map, so the
//! view always reflects the current contents (after expunging). Views can
//! remove entries and clear the map but never add.

use crate::cursor::{Cursor, EntryProjection, Iter, KeyProjection, Keys, ValueProjection, Values};
use crate::key::{Key, KeyRef};
use crate::WeakIdentityHashMap;
use core::hash::BuildHasher;

/// View of a map's live keys.
pub struct KeySet<'a, T, V, S> {
    map: &'a mut WeakIdentityHashMap<T, V, S>,
}

impl<'a, T, V, S> KeySet<'a, T, V, S> {
    pub(crate) fn new(map: &'a mut WeakIdentityHashMap<T, V, S>) -> Self {
        Self { map }
    }

    pub fn len(&mut self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear()
    }

    pub fn iter(&mut self) -> Keys<'_, T, V, S> {
        self.map.keys()
    }

    pub fn cursor(&mut self) -> Cursor<T, KeyProjection> {
        self.map.key_cursor()
    }

    /// Strong handles to every live key; `None` is the null key.
    pub fn to_vec(&mut self) -> Vec<Option<Key<T>>> {
        self.iter().collect()
    }
}

impl<'a, T, V, S: BuildHasher> KeySet<'a, T, V, S> {
    pub fn contains<'k, K>(&mut self, key: K) -> bool
    where
        K: Into<KeyRef<'k, T>>,
        T: 'k,
    {
        self.map.contains_key(key)
    }

    /// Remove `key`'s entry; true if it was present.
    pub fn remove<'k, K>(&mut self, key: K) -> bool
    where
        K: Into<KeyRef<'k, T>>,
        T: 'k,
    {
        self.map.remove(key).is_some()
    }
}

/// View of the values of a map's live entries.
pub struct ValueCollection<'a, T, V, S> {
    map: &'a mut WeakIdentityHashMap<T, V, S>,
}

impl<'a, T, V, S> ValueCollection<'a, T, V, S> {
    pub(crate) fn new(map: &'a mut WeakIdentityHashMap<T, V, S>) -> Self {
        Self { map }
    }

    pub fn len(&mut self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&mut self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.map.contains_value(value)
    }

    pub fn clear(&mut self) {
        self.map.clear()
    }

    pub fn iter(&mut self) -> Values<'_, T, V, S> {
        self.map.values()
    }

    pub fn cursor(&mut self) -> Cursor<T, ValueProjection> {
        self.map.value_cursor()
    }

    pub fn to_vec(&mut self) -> Vec<V>
    where
        V: Clone,
    {
        self.iter().cloned().collect()
    }
}

/// View of a map's live entries.
pub struct EntrySet<'a, T, V, S> {
    map: &'a mut WeakIdentityHashMap<T, V, S>,
}

impl<'a, T, V, S> EntrySet<'a, T, V, S> {
    pub(crate) fn new(map: &'a mut WeakIdentityHashMap<T, V, S>) -> Self {
        Self { map }
    }

    pub fn len(&mut self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear()
    }

    pub fn iter(&mut self) -> Iter<'_, T, V, S> {
        self.map.iter()
    }

    pub fn cursor(&mut self) -> Cursor<T, EntryProjection> {
        self.map.entry_cursor()
    }

    pub fn to_vec(&mut self) -> Vec<(Option<Key<T>>, V)>
    where
        V: Clone,
    {
        self.iter().map(|(k, v)| (k, v.clone())).collect()
    }
}

impl<'a, T, V, S: BuildHasher> EntrySet<'a, T, V, S> {
    /// True if `key` is present with a value equal to `value`.
    pub fn contains<'k, K>(&mut self, key: K, value: &V) -> bool
    where
        K: Into<KeyRef<'k, T>>,
        T: 'k,
        V: PartialEq,
    {
        self.map.get(key) == Some(value)
    }

    /// Remove the entry if `key` maps to a value equal to `value`.
    pub fn remove<'k, K>(&mut self, key: K, value: &V) -> bool
    where
        K: Into<KeyRef<'k, T>>,
        T: 'k,
        V: PartialEq,
    {
        self.map.remove_entry_if(key, value)
    }
}
