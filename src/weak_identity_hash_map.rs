use crate::builder::Builder;
use crate::cursor::{
    Cursor, EntryProjection, Iter, IterMut, KeyProjection, Keys, ValueProjection, Values,
    ValuesMut,
};
use crate::error::ConfigError;
use crate::key::{AsKeyRef, Key, KeyRef};
use crate::retirement::Retirements;
use crate::slot_table::{
    capacity_for, Insertion, LogicalKey, SlotTable, DEFAULT_INITIAL_CAPACITY,
    DEFAULT_LOAD_FACTOR,
};
use crate::views::{EntrySet, KeySet, ValueCollection};
use core::fmt;
use core::hash::BuildHasher;
use core::sync::atomic::{AtomicU64, Ordering};
use std::collections::hash_map::RandomState;

/// Process-unique identity of a map instance, checked by detached cursors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct MapId(u64);

impl MapId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        MapId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Hash map with weakly held keys compared by identity.
///
/// The map stores only the weak half of each [`Key`]; an entry disappears
/// once every strong handle of its key has been dropped. Reclamation is
/// observed lazily: the next call into the map drains the retirement channel
/// and unlinks the dead cells. The null key (`KeyRef::null()`, or `None` in
/// `Option<&Key<T>>` position) is an ordinary, never-retiring key.
///
/// Methods that report on contents take `&mut self` because they expunge
/// retired entries first.
///
/// ```
/// use weak_identity_hashmap::{Key, KeyRef, WeakIdentityHashMap};
///
/// let mut map = WeakIdentityHashMap::new();
/// let a = Key::new("a");
/// let twin = Key::new("a");
/// map.insert(&a, 1);
/// map.insert(KeyRef::null(), 0);
///
/// assert_eq!(map.get(&a), Some(&1));
/// assert_eq!(map.get(&twin), None);
/// assert_eq!(map.len(), 2);
///
/// drop(a);
/// assert_eq!(map.len(), 1);
/// ```
pub struct WeakIdentityHashMap<T, V, S = RandomState> {
    table: SlotTable<T, V, S>,
    retirements: Retirements,
    id: MapId,
}

impl<T, V> WeakIdentityHashMap<T, V, RandomState> {
    /// Empty map with capacity 16 and load factor 0.75.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INITIAL_CAPACITY)
    }

    /// Empty map with room for `capacity` buckets (rounded up to a power of
    /// two, capped at `1 << 30`) and load factor 0.75.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::new())
    }

    pub fn with_capacity_and_load_factor(
        capacity: usize,
        load_factor: f32,
    ) -> Result<Self, ConfigError> {
        Self::with_config(capacity, load_factor, RandomState::new())
    }

    /// Returns a [`Builder`] for configuring a map.
    pub fn builder() -> Builder<T, V> {
        Builder::default()
    }

    /// Map holding every live entry of `entries`, sized so the copy does
    /// not grow during insertion.
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsKeyRef<T>,
    {
        entries.into_iter().collect()
    }
}

impl<T, V, S> WeakIdentityHashMap<T, V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(DEFAULT_INITIAL_CAPACITY, hasher)
    }

    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self::from_table(SlotTable::with_default_load_factor(capacity, hasher))
    }

    pub(crate) fn with_config(
        capacity: usize,
        load_factor: f32,
        hasher: S,
    ) -> Result<Self, ConfigError> {
        SlotTable::new(capacity, load_factor, hasher).map(Self::from_table)
    }

    fn from_table(table: SlotTable<T, V, S>) -> Self {
        Self {
            table,
            retirements: Retirements::new(),
            id: MapId::next(),
        }
    }

    #[inline]
    pub(crate) fn table(&self) -> &SlotTable<T, V, S> {
        &self.table
    }

    #[inline]
    pub(crate) fn table_mut(&mut self) -> &mut SlotTable<T, V, S> {
        &mut self.table
    }

    #[inline]
    pub(crate) fn id(&self) -> MapId {
        self.id
    }

    /// Unlink every cell whose key has been announced dead.
    pub(crate) fn expunge_stale_entries(&mut self) {
        #[cfg(feature = "logging")]
        let (mut drained, mut unlinked) = (0usize, 0usize);
        while let Some(id) = self.retirements.poll() {
            // The cell is unlinked before its value is dropped here.
            let cell = self.table.unlink_retired(id);
            #[cfg(feature = "logging")]
            {
                drained += 1;
                unlinked += usize::from(cell.is_some());
            }
            drop(cell);
        }
        #[cfg(feature = "logging")]
        if drained > 0 {
            log::trace!(
                "expunged {} of {} retired cells; {} remain",
                unlinked,
                drained,
                self.table.len()
            );
        }
    }

    /// Number of entries, after expunging retired keys.
    pub fn len(&mut self) -> usize {
        if self.table.len() == 0 {
            return 0;
        }
        self.expunge_stale_entries();
        self.table.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Current bucket-array length.
    pub fn capacity(&mut self) -> usize {
        self.expunge_stale_entries();
        self.table.bucket_count()
    }

    pub fn load_factor(&self) -> f32 {
        self.table.load_factor()
    }

    pub fn hasher(&self) -> &S {
        self.table.hasher()
    }

    /// True if some live entry holds a value equal to `value`.
    pub fn contains_value(&mut self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.expunge_stale_entries();
        self.table.contains_value(value)
    }

    /// Remove every entry. Retirements queued before or caused by the wipe
    /// are discarded.
    pub fn clear(&mut self) {
        self.retirements.discard_pending();
        let notifier = self.retirements.notifier();
        for (id, key) in self.table.live_keys() {
            key.unwatch(notifier, id);
        }
        let cells = self.table.clear();
        #[cfg(feature = "logging")]
        log::trace!("cleared weak identity map of {} cells", cells.len());
        drop(cells);
        self.retirements.discard_pending();
    }

    /// Iterate over live `(key, &value)` pairs. `None` is the null key.
    pub fn iter(&mut self) -> Iter<'_, T, V, S> {
        self.expunge_stale_entries();
        Iter::new(&self.table)
    }

    pub fn keys(&mut self) -> Keys<'_, T, V, S> {
        Keys(self.iter())
    }

    pub fn values(&mut self) -> Values<'_, T, V, S> {
        Values(self.iter())
    }

    /// Iterate over live entries with mutable access to their values.
    /// Updating a value is not a structural modification.
    pub fn iter_mut(&mut self) -> IterMut<'_, T, V> {
        self.expunge_stale_entries();
        IterMut::new(self.table.cells_mut())
    }

    pub fn values_mut(&mut self) -> ValuesMut<'_, T, V> {
        ValuesMut(self.iter_mut())
    }

    /// Detached cursor over keys; see [`Cursor`].
    pub fn key_cursor(&mut self) -> Cursor<T, KeyProjection> {
        self.expunge_stale_entries();
        Cursor::new(self)
    }

    /// Detached cursor over values; see [`Cursor`].
    pub fn value_cursor(&mut self) -> Cursor<T, ValueProjection> {
        self.expunge_stale_entries();
        Cursor::new(self)
    }

    /// Detached cursor over entries; see [`Cursor`].
    pub fn entry_cursor(&mut self) -> Cursor<T, EntryProjection> {
        self.expunge_stale_entries();
        Cursor::new(self)
    }

    pub fn key_set(&mut self) -> KeySet<'_, T, V, S> {
        self.expunge_stale_entries();
        KeySet::new(self)
    }

    pub fn value_collection(&mut self) -> ValueCollection<'_, T, V, S> {
        self.expunge_stale_entries();
        ValueCollection::new(self)
    }

    pub fn entry_set(&mut self) -> EntrySet<'_, T, V, S> {
        self.expunge_stale_entries();
        EntrySet::new(self)
    }
}

impl<T, V, S> WeakIdentityHashMap<T, V, S>
where
    S: BuildHasher,
{
    pub fn get<'k, K>(&mut self, key: K) -> Option<&V>
    where
        K: Into<KeyRef<'k, T>>,
        T: 'k,
    {
        self.expunge_stale_entries();
        let id = self.table.find(key.into())?;
        self.table.cell(id).map(|c| &c.value)
    }

    /// Mutable access to a value. Not a structural modification.
    pub fn get_mut<'k, K>(&mut self, key: K) -> Option<&mut V>
    where
        K: Into<KeyRef<'k, T>>,
        T: 'k,
    {
        self.expunge_stale_entries();
        let id = self.table.find(key.into())?;
        self.table.cell_mut(id).map(|c| &mut c.value)
    }

    pub fn contains_key<'k, K>(&mut self, key: K) -> bool
    where
        K: Into<KeyRef<'k, T>>,
        T: 'k,
    {
        self.expunge_stale_entries();
        self.table.find(key.into()).is_some()
    }

    /// Associate `value` with `key`, returning the previous value if the key
    /// was present. The map does not keep `key` alive.
    pub fn insert<'k, K>(&mut self, key: K, value: V) -> Option<V>
    where
        K: Into<KeyRef<'k, T>>,
        T: 'k,
    {
        self.expunge_stale_entries();
        let key = key.into();
        let mut dead = Vec::new();
        match self.table.insert(key, value, &mut dead) {
            Insertion::Replaced(old) => Some(old),
            Insertion::Added(id) => {
                if let Some(k) = key.get() {
                    k.watch(self.retirements.notifier(), id);
                }
                drop(dead);
                None
            }
        }
    }

    /// Remove `key`'s entry and return its value.
    pub fn remove<'k, K>(&mut self, key: K) -> Option<V>
    where
        K: Into<KeyRef<'k, T>>,
        T: 'k,
    {
        self.expunge_stale_entries();
        let key = key.into();
        let (id, cell) = self.table.remove(key)?;
        if let Some(k) = key.get() {
            k.unwatch(self.retirements.notifier(), id);
        }
        Some(cell.into_value())
    }

    /// Remove `key`'s entry only if its value equals `value`.
    pub fn remove_entry_if<'k, K>(&mut self, key: K, value: &V) -> bool
    where
        K: Into<KeyRef<'k, T>>,
        T: 'k,
        V: PartialEq,
    {
        self.expunge_stale_entries();
        let key = key.into();
        let Some((id, cell)) = self.table.remove_if(key, |v| v == value) else {
            return false;
        };
        if let Some(k) = key.get() {
            k.unwatch(self.retirements.notifier(), id);
        }
        drop(cell);
        true
    }

    /// Insert every pair of `entries`. When the iterator reports more
    /// entries than the current threshold admits, the table is grown once up
    /// front instead of doubling repeatedly.
    ///
    /// That up-front growth is never reverted, even if most existing entries
    /// turn out to be dead; growth triggered by the insertions themselves is.
    pub fn insert_all<I, K>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsKeyRef<T>,
    {
        let entries = entries.into_iter();
        let incoming = entries.size_hint().0;
        if incoming > self.table.threshold() {
            self.expunge_stale_entries();
            self.reserve_for(incoming);
        }
        for (key, value) in entries {
            self.insert(key.as_key_ref(), value);
        }
    }

    fn reserve_for(&mut self, incoming: usize) {
        let target = capacity_for(incoming, self.table.load_factor());
        let mut length = self.table.bucket_count();
        while length < target {
            length <<= 1;
        }
        if length > self.table.bucket_count() {
            drop(self.table.reserve(length));
        }
    }
}

impl<T, V, S> Drop for WeakIdentityHashMap<T, V, S> {
    fn drop(&mut self) {
        let notifier = self.retirements.notifier();
        for (id, key) in self.table.live_keys() {
            key.unwatch(notifier, id);
        }
    }
}

impl<T, V> Default for WeakIdentityHashMap<T, V, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, V, S, K> FromIterator<(K, V)> for WeakIdentityHashMap<T, V, S>
where
    K: AsKeyRef<T>,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries = iter.into_iter();
        let sized = capacity_for(entries.size_hint().0, DEFAULT_LOAD_FACTOR);
        let mut map = Self::with_capacity_and_hasher(
            sized.max(DEFAULT_INITIAL_CAPACITY),
            S::default(),
        );
        map.insert_all(entries);
        map
    }
}

impl<T, V, S, K> Extend<(K, V)> for WeakIdentityHashMap<T, V, S>
where
    K: AsKeyRef<T>,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.insert_all(iter);
    }
}

impl<'a, T, V, S> IntoIterator for &'a mut WeakIdentityHashMap<T, V, S> {
    type Item = (Option<Key<T>>, &'a mut V);
    type IntoIter = IterMut<'a, T, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

struct DebugKey<T>(LogicalKey<T>);

impl<T: fmt::Debug> fmt::Debug for DebugKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(k) => fmt::Debug::fmt(k, f),
            None => f.write_str("null"),
        }
    }
}

impl<T: fmt::Debug, V: fmt::Debug, S> fmt::Debug for WeakIdentityHashMap<T, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.table
                    .cells()
                    .filter_map(|(_, c)| c.key().resolve().map(|k| (DebugKey(k), &c.value))),
            )
            .finish()
    }
}
