//! SlotTable: structural layer of the map.
//!
//! Buckets are singly-linked chains of cells; the bucket array and the
//! chain links hold [`CellId`] handles into a generational arena, so
//! unlinking is a handle rewrite and a stale handle can never alias a newer
//! cell. This layer knows nothing about the retirement channel: it answers
//! lookups, links and unlinks cells, and resizes. Callers decide when to
//! expunge.
//!
//! Cells removed from the arena are handed back to the caller instead of
//! being dropped in place, so user `Drop` code only ever runs against a
//! consistent structure.

use crate::error::ConfigError;
use crate::key::{Key, KeyRef, WeakKey};
use core::hash::BuildHasher;
use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Stable handle of a cell in the arena.
    pub(crate) struct CellId;
}

pub(crate) const DEFAULT_INITIAL_CAPACITY: usize = 16;
pub(crate) const MAXIMUM_CAPACITY: usize = 1 << 30;
pub(crate) const DEFAULT_LOAD_FACTOR: f32 = 0.75;

/// A grown table is kept only if at least `1 / SHRINK_DIVISOR` of its new
/// threshold is occupied by live cells after transfer.
const SHRINK_DIVISOR: usize = 2;

/// Sentinel whose address stands in for the null key's identity.
static NULL_KEY: u8 = 0;

/// Strong form of a cell's key: `None` is the null key.
pub(crate) type LogicalKey<T> = Option<Key<T>>;

pub(crate) enum CellKey<T> {
    Null,
    Weak(WeakKey<T>),
}

impl<T> CellKey<T> {
    fn new(key: KeyRef<'_, T>) -> Self {
        match key.get() {
            None => CellKey::Null,
            Some(k) => CellKey::Weak(k.downgrade()),
        }
    }

    /// Strong view of the key, or `None` once it has been reclaimed.
    #[inline]
    pub(crate) fn resolve(&self) -> Option<LogicalKey<T>> {
        match self {
            CellKey::Null => Some(None),
            CellKey::Weak(w) => w.upgrade().map(Some),
        }
    }

    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        match self {
            CellKey::Null => true,
            CellKey::Weak(w) => w.is_live(),
        }
    }

    #[inline]
    fn is(&self, key: KeyRef<'_, T>) -> bool {
        match (self, key.get()) {
            (CellKey::Null, None) => true,
            (CellKey::Weak(w), Some(k)) => w.is(k),
            _ => false,
        }
    }
}

pub(crate) struct Cell<T, V> {
    key: CellKey<T>,
    // Identity hash at insertion; never recomputed, so a dead cell still
    // locates its bucket.
    hash: u64,
    pub(crate) value: V,
    next: Option<CellId>,
}

impl<T, V> Cell<T, V> {
    #[inline]
    pub(crate) fn key(&self) -> &CellKey<T> {
        &self.key
    }

    pub(crate) fn into_value(self) -> V {
        self.value
    }
}

/// Outcome of [`SlotTable::insert`].
pub(crate) enum Insertion<V> {
    /// The key was present; its previous value is returned.
    Replaced(V),
    /// A new cell was linked.
    Added(CellId),
}

pub(crate) struct SlotTable<T, V, S> {
    hasher: S,
    buckets: Box<[Option<CellId>]>,
    cells: SlotMap<CellId, Cell<T, V>>,
    threshold: usize,
    load_factor: f32,
    // Growth stops at this many buckets; lowered only by tests.
    max_capacity: usize,
    mod_count: u64,
}

/// Smallest power-of-two table length able to hold `capacity` buckets.
pub(crate) fn table_length_for(capacity: usize) -> usize {
    capacity.clamp(1, MAXIMUM_CAPACITY).next_power_of_two()
}

/// Bucket count that admits `entries` cells at `load_factor` without
/// growing, capped at `MAXIMUM_CAPACITY`.
pub(crate) fn capacity_for(entries: usize, load_factor: f32) -> usize {
    ((entries as f64 / f64::from(load_factor)) as usize)
        .saturating_add(1)
        .min(MAXIMUM_CAPACITY)
}

fn threshold_for(length: usize, load_factor: f32) -> usize {
    // Float-to-int casts saturate, so absurd load factors pin at usize::MAX.
    (length as f64 * f64::from(load_factor)) as usize
}

#[inline]
fn index_for(hash: u64, length: usize) -> usize {
    (hash as usize) & (length - 1)
}

fn empty_buckets(length: usize) -> Box<[Option<CellId>]> {
    vec![None; length].into_boxed_slice()
}

impl<T, V, S> SlotTable<T, V, S> {
    pub(crate) fn new(capacity: usize, load_factor: f32, hasher: S) -> Result<Self, ConfigError> {
        // Also rejects NaN.
        if !(load_factor > 0.0) {
            return Err(ConfigError::InvalidLoadFactor(load_factor));
        }
        Ok(Self::build(capacity, load_factor, hasher))
    }

    pub(crate) fn with_default_load_factor(capacity: usize, hasher: S) -> Self {
        Self::build(capacity, DEFAULT_LOAD_FACTOR, hasher)
    }

    fn build(capacity: usize, load_factor: f32, hasher: S) -> Self {
        let length = table_length_for(capacity);
        Self {
            hasher,
            buckets: empty_buckets(length),
            cells: SlotMap::with_key(),
            threshold: threshold_for(length, load_factor),
            load_factor,
            max_capacity: MAXIMUM_CAPACITY,
            mod_count: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_max_capacity(mut self, max_capacity: usize) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Cells in the arena, including dead ones not yet expunged.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn threshold(&self) -> usize {
        self.threshold
    }

    pub(crate) fn load_factor(&self) -> f32 {
        self.load_factor
    }

    pub(crate) fn hasher(&self) -> &S {
        &self.hasher
    }

    #[inline]
    pub(crate) fn mod_count(&self) -> u64 {
        self.mod_count
    }

    fn bump_mod_count(&mut self) {
        self.mod_count = self.mod_count.wrapping_add(1);
    }

    #[inline]
    pub(crate) fn cell(&self, id: CellId) -> Option<&Cell<T, V>> {
        self.cells.get(id)
    }

    #[inline]
    pub(crate) fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell<T, V>> {
        self.cells.get_mut(id)
    }

    /// First cell of bucket `index`; out-of-range indices read as empty.
    #[inline]
    pub(crate) fn head(&self, index: usize) -> Option<CellId> {
        self.buckets.get(index).copied().flatten()
    }

    /// Chain successor of `id`, or `None` if `id` is last or no longer linked.
    #[inline]
    pub(crate) fn next_of(&self, id: CellId) -> Option<CellId> {
        self.cells.get(id).and_then(|c| c.next)
    }

    /// Strong view of `id`'s key, or `None` if the cell is gone or its key died.
    #[inline]
    pub(crate) fn resolve(&self, id: CellId) -> Option<LogicalKey<T>> {
        self.cells.get(id).and_then(|c| c.key.resolve())
    }

    /// Arena-order traversal of every cell, dead or alive.
    pub(crate) fn cells(&self) -> slotmap::basic::Iter<'_, CellId, Cell<T, V>> {
        self.cells.iter()
    }

    pub(crate) fn cells_mut(&mut self) -> slotmap::basic::IterMut<'_, CellId, Cell<T, V>> {
        self.cells.iter_mut()
    }

    /// Live non-null keys with the cell they occupy.
    pub(crate) fn live_keys(&self) -> impl Iterator<Item = (CellId, Key<T>)> + '_ {
        self.cells.iter().filter_map(|(id, c)| match &c.key {
            CellKey::Weak(w) => w.upgrade().map(|k| (id, k)),
            CellKey::Null => None,
        })
    }

    pub(crate) fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.cells
            .values()
            .any(|c| c.key.is_live() && c.value == *value)
    }

    /// Detach `id` from its chain and the arena. Does not count as a
    /// structural modification; explicit removals bump the counter themselves.
    pub(crate) fn unlink(&mut self, id: CellId) -> Option<Cell<T, V>> {
        let hash = self.cells.get(id)?.hash;
        let i = index_for(hash, self.buckets.len());
        let mut prev: Option<CellId> = None;
        let mut e = self.buckets[i];
        while let Some(cur) = e {
            let next = self.cells[cur].next;
            if cur == id {
                match prev {
                    None => self.buckets[i] = next,
                    Some(p) => self.cells[p].next = next,
                }
                let mut cell = self.cells.remove(id)?;
                cell.next = None;
                return Some(cell);
            }
            prev = e;
            e = next;
        }
        None
    }

    /// Unlink a cell named by the retirement channel. Ignores ids that no
    /// longer exist and cells whose key is still reachable.
    pub(crate) fn unlink_retired(&mut self, id: CellId) -> Option<Cell<T, V>> {
        if self.cells.get(id)?.key.is_live() {
            return None;
        }
        self.unlink(id)
    }

    /// Remove every cell. The counter is bumped once.
    pub(crate) fn clear(&mut self) -> Vec<Cell<T, V>> {
        self.bump_mod_count();
        self.buckets.iter_mut().for_each(|b| *b = None);
        self.cells.drain().map(|(_, c)| c).collect()
    }

    /// Grow to `new_capacity` buckets, or revert if transfer found the table
    /// mostly dead. Returns the dead cells dropped during transfer.
    pub(crate) fn resize(&mut self, new_capacity: usize) -> Vec<Cell<T, V>> {
        self.rehash(new_capacity, true)
    }

    /// Grow to `new_capacity` buckets ahead of a bulk insertion; never reverts.
    pub(crate) fn reserve(&mut self, new_capacity: usize) -> Vec<Cell<T, V>> {
        self.rehash(new_capacity, false)
    }

    fn rehash(&mut self, new_capacity: usize, may_revert: bool) -> Vec<Cell<T, V>> {
        let old_capacity = self.buckets.len();
        if old_capacity >= self.max_capacity {
            self.threshold = usize::MAX;
            return Vec::new();
        }

        let mut dead = Vec::new();
        let mut new_buckets = empty_buckets(new_capacity);
        transfer(&mut self.cells, &mut self.buckets, &mut new_buckets, &mut dead);
        let new_threshold = threshold_for(new_capacity, self.load_factor);

        if !may_revert || self.cells.len() >= new_threshold / SHRINK_DIVISOR {
            self.buckets = new_buckets;
            self.threshold = new_threshold;
            #[cfg(feature = "logging")]
            log::debug!(
                "resized weak identity table {} -> {} buckets ({} live, {} dropped)",
                old_capacity,
                new_capacity,
                self.cells.len(),
                dead.len()
            );
        } else {
            // The old array was emptied by the first transfer; refill it.
            transfer(&mut self.cells, &mut new_buckets, &mut self.buckets, &mut dead);
            #[cfg(feature = "logging")]
            log::debug!(
                "kept weak identity table at {} buckets ({} live after dropping {})",
                old_capacity,
                self.cells.len(),
                dead.len()
            );
        }
        self.bump_mod_count();
        dead
    }
}

/// Move every live cell of `src` into `dest`, prepending to its new chain.
/// Cells whose key has died are taken out of the arena and pushed on `dead`.
fn transfer<T, V>(
    cells: &mut SlotMap<CellId, Cell<T, V>>,
    src: &mut [Option<CellId>],
    dest: &mut [Option<CellId>],
    dead: &mut Vec<Cell<T, V>>,
) {
    let length = dest.len();
    for head in src.iter_mut() {
        let mut e = head.take();
        while let Some(id) = e {
            let cell = &mut cells[id];
            e = cell.next.take();
            if cell.key.is_live() {
                let i = index_for(cell.hash, length);
                cell.next = dest[i];
                dest[i] = Some(id);
            } else if let Some(c) = cells.remove(id) {
                dead.push(c);
            }
        }
    }
}

impl<T, V, S> SlotTable<T, V, S>
where
    S: BuildHasher,
{
    /// Identity hash of a logical key.
    #[inline]
    pub(crate) fn hash_of(&self, key: KeyRef<'_, T>) -> u64 {
        let addr = match key.get() {
            Some(k) => k.addr(),
            None => core::ptr::addr_of!(NULL_KEY) as usize,
        };
        self.hasher.hash_one(addr)
    }

    fn scan(&self, index: usize, hash: u64, key: KeyRef<'_, T>) -> Option<CellId> {
        let mut e = self.buckets[index];
        while let Some(id) = e {
            let cell = &self.cells[id];
            if cell.hash == hash && cell.key.is(key) {
                return Some(id);
            }
            e = cell.next;
        }
        None
    }

    pub(crate) fn find(&self, key: KeyRef<'_, T>) -> Option<CellId> {
        let hash = self.hash_of(key);
        self.scan(index_for(hash, self.buckets.len()), hash, key)
    }

    /// Insert or replace. A new cell may trigger growth; the dead cells
    /// dropped by that growth are pushed on `dead`.
    pub(crate) fn insert(
        &mut self,
        key: KeyRef<'_, T>,
        value: V,
        dead: &mut Vec<Cell<T, V>>,
    ) -> Insertion<V> {
        let hash = self.hash_of(key);
        let i = index_for(hash, self.buckets.len());
        if let Some(id) = self.scan(i, hash, key) {
            let old = core::mem::replace(&mut self.cells[id].value, value);
            return Insertion::Replaced(old);
        }

        self.bump_mod_count();
        let id = self.cells.insert(Cell {
            key: CellKey::new(key),
            hash,
            value,
            next: self.buckets[i],
        });
        self.buckets[i] = Some(id);
        if self.cells.len() >= self.threshold {
            dead.extend(self.resize(self.buckets.len() * 2));
        }
        Insertion::Added(id)
    }

    /// Remove `key`'s cell, bumping the counter, if `matches` accepts its value.
    pub(crate) fn remove_if<F>(&mut self, key: KeyRef<'_, T>, matches: F) -> Option<(CellId, Cell<T, V>)>
    where
        F: FnOnce(&V) -> bool,
    {
        let id = self.find(key)?;
        if !matches(&self.cells[id].value) {
            return None;
        }
        let cell = self.unlink(id)?;
        self.bump_mod_count();
        Some((id, cell))
    }

    pub(crate) fn remove(&mut self, key: KeyRef<'_, T>) -> Option<(CellId, Cell<T, V>)> {
        self.remove_if(key, |_| true)
    }
}
