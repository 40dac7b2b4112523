//! weak-identity-hashmap: a hash map whose keys are held weakly and compared
//! by identity, with lazy reclamation of entries whose key has died.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a map that never keeps its keys alive, where an entry vanishes
//!   once the last strong handle of its key is dropped, without callers
//!   polling or locking.
//! - Layers:
//!   - SlotTable<T, V, S>: structural layer. Power-of-two array of bucket
//!     chains whose links are generational `CellId` handles into a slotmap
//!     arena. Lookup, link, unlink and resize; knows nothing of retirement.
//!   - Retirements: the map's unbounded crossbeam channel. Dropping the
//!     last `Key` sends the ids of the cells it was stored in.
//!   - WeakIdentityHashMap<T, V, S>: public API. Drains the channel at the
//!     start of every operation, then works on a consistent table.
//!   - Cursor / views: one cursor shape for keys, values and entries,
//!     fail-fast through the table's structural-modification counter.
//!
//! Constraints
//! - Identity, not equality: two `Key`s match iff they are clones of the
//!   same handle. `T` needs neither `Eq` nor `Hash`.
//! - The map holds only `Weak` halves; it never extends a key's life.
//! - Reclamation is deterministic (on the last drop) but observed lazily:
//!   the next call into the map unlinks the cell, never the drop itself.
//! - Single-threaded map (`&mut self` for everything that expunges); keys
//!   may be dropped on any thread.
//!
//! Cell lifecycle
//! - Created on insert of an absent key; the key records a watcher
//!   `(notifier, CellId)`.
//! - Value replaced in place on repeated insert; not a structural change.
//! - Unlinked by the expunger after retirement, by resize transfer when
//!   its key is found dead, by explicit removal or by `clear`. Explicit
//!   removal and `clear` also deregister the watcher from the live key.
//! - Unlinked cells are returned to the caller and dropped only after the
//!   table is consistent again, so `Drop` of a value may reenter the map's
//!   keys safely.
//!
//! Hasher and rehashing invariants
//! - Each cell stores the `u64` identity hash computed at insertion from the
//!   key allocation's address; transfer and unlinking always use the stored
//!   hash, so a dead cell still finds its bucket.
//! - The null key hashes through the address of a private static sentinel.
//!
//! Resize
//! - Double when the cell count reaches the threshold. If transfer dropped
//!   enough dead cells that the survivors fill less than half of the new
//!   threshold, the table is transferred back and keeps its old length.
//! - At `1 << 30` buckets growth stops and the threshold is pinned.
//!
//! Stale ids
//! - A retirement naming a cell that was already removed is ignored: the
//!   arena's generational handles never alias a newer cell.
//!
//! Notes and non-goals
//! - No ordering guarantee; any structural change may reorder iteration.
//! - No persistence, no internal synchronization.
//! - The `logging` feature emits `log` records on resize, expunge and clear.

mod builder;
mod cursor;
mod error;
mod key;
mod retirement;
mod slot_table;
mod slot_table_proptest;
mod views;
mod weak_identity_hash_map;

// Public surface
pub use builder::Builder;
pub use cursor::{
    Cursor, EntryMut, EntryProjection, Iter, IterMut, KeyProjection, Keys, Projection,
    ValueProjection, Values, ValuesMut,
};
pub use error::{ConfigError, IterError};
pub use key::{AsKeyRef, Key, KeyRef};
pub use views::{EntrySet, KeySet, ValueCollection};
pub use weak_identity_hash_map::WeakIdentityHashMap;
