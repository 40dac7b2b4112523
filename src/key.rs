//! Identity keys with drop notification.
//!
//! A [`Key<T>`] is a cloneable strong handle, like `Arc<T>`, whose
//! allocation remembers which map cells watch it. The map itself only keeps
//! the weak half. When the last strong handle is dropped, every watcher gets
//! its cell id sent to the owning map's retirement channel, and the map
//! unlinks the cell on its next operation.
//!
//! Equality and hashing of `Key` are by identity: two keys are equal iff
//! they are clones of the same handle, regardless of `T`'s own `Eq`.

use crate::retirement::Notifier;
use crate::slot_table::CellId;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::ops::Deref;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

struct Watcher {
    notifier: Notifier,
    cell: CellId,
}

struct Tracked<T> {
    watchers: Mutex<Vec<Watcher>>,
    value: T,
}

impl<T> Drop for Tracked<T> {
    fn drop(&mut self) {
        // Strong count is already zero here, so every watched cell's weak
        // reference is cleared before its retirement is queued.
        for w in self.watchers.get_mut().drain(..) {
            w.notifier.notify(w.cell);
        }
    }
}

/// Strong handle to an identity key.
pub struct Key<T> {
    inner: Arc<Tracked<T>>,
}

impl<T> Key<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Tracked {
                watchers: Mutex::new(Vec::new()),
                value,
            }),
        }
    }

    /// True iff both handles denote the same key instance.
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }

    /// Number of live strong handles to this key.
    pub fn strong_count(this: &Self) -> usize {
        Arc::strong_count(&this.inner)
    }

    /// Address of the key allocation; stable for the key's lifetime.
    #[inline]
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner).cast::<()>() as usize
    }

    pub(crate) fn downgrade(&self) -> WeakKey<T> {
        WeakKey(Arc::downgrade(&self.inner))
    }

    /// Register `cell` to be announced on `notifier` when this key dies.
    pub(crate) fn watch(&self, notifier: &Notifier, cell: CellId) {
        self.inner.watchers.lock().push(Watcher {
            notifier: notifier.clone(),
            cell,
        });
    }

    /// Drop a registration made by [`Key::watch`]. No-op if absent.
    pub(crate) fn unwatch(&self, notifier: &Notifier, cell: CellId) {
        self.inner
            .watchers
            .lock()
            .retain(|w| !(w.cell == cell && w.notifier.same_channel(notifier)));
    }

    #[cfg(test)]
    pub(crate) fn watcher_count(&self) -> usize {
        self.inner.watchers.lock().len()
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Deref for Key<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.value
    }
}

impl<T> AsRef<T> for Key<T> {
    fn as_ref(&self) -> &T {
        &self.inner.value
    }
}

impl<T> From<T> for Key<T> {
    fn from(value: T) -> Self {
        Key::new(value)
    }
}

impl<T> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        Key::ptr_eq(self, other)
    }
}

impl<T> Eq for Key<T> {}

impl<T> Hash for Key<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner.value, f)
    }
}

/// Non-owning half stored in map cells.
pub(crate) struct WeakKey<T>(Weak<Tracked<T>>);

impl<T> WeakKey<T> {
    #[inline]
    pub(crate) fn upgrade(&self) -> Option<Key<T>> {
        self.0.upgrade().map(|inner| Key { inner })
    }

    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        self.0.strong_count() > 0
    }

    /// Identity match against a strong handle; a cleared reference never matches.
    #[inline]
    pub(crate) fn is(&self, key: &Key<T>) -> bool {
        core::ptr::eq(self.0.as_ptr(), Arc::as_ptr(&key.inner)) && self.is_live()
    }
}

/// Borrowed name of a logical key: a live [`Key`] or the null key.
///
/// Map operations accept anything convertible into a `KeyRef`, so both
/// `&key` and `Option<&Key<T>>` work; `KeyRef::null()` names the null key.
pub struct KeyRef<'k, T>(Option<&'k Key<T>>);

impl<'k, T> KeyRef<'k, T> {
    /// The null key.
    pub const fn null() -> Self {
        KeyRef(None)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    #[inline]
    pub(crate) fn get(&self) -> Option<&'k Key<T>> {
        self.0
    }
}

impl<T> Clone for KeyRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for KeyRef<'_, T> {}

impl<'k, T> From<&'k Key<T>> for KeyRef<'k, T> {
    fn from(key: &'k Key<T>) -> Self {
        KeyRef(Some(key))
    }
}

impl<'k, T> From<Option<&'k Key<T>>> for KeyRef<'k, T> {
    fn from(key: Option<&'k Key<T>>) -> Self {
        KeyRef(key)
    }
}

impl<'k, T> From<&'k Option<Key<T>>> for KeyRef<'k, T> {
    fn from(key: &'k Option<Key<T>>) -> Self {
        KeyRef(key.as_ref())
    }
}

/// Owned forms of a logical key, accepted by bulk insertion and collection.
///
/// Implemented for `Key<T>` and for `Option<Key<T>>`, where `None` is the
/// null key, so the items yielded by a map's own iterators can be fed
/// straight back into another map.
pub trait AsKeyRef<T> {
    fn as_key_ref(&self) -> KeyRef<'_, T>;
}

impl<T> AsKeyRef<T> for Key<T> {
    fn as_key_ref(&self) -> KeyRef<'_, T> {
        KeyRef(Some(self))
    }
}

impl<T> AsKeyRef<T> for Option<Key<T>> {
    fn as_key_ref(&self) -> KeyRef<'_, T> {
        KeyRef(self.as_ref())
    }
}

impl<T: fmt::Debug> fmt::Debug for KeyRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(k) => fmt::Debug::fmt(k, f),
            None => f.write_str("null"),
        }
    }
}
