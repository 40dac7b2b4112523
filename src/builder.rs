use crate::error::ConfigError;
use crate::slot_table::{DEFAULT_INITIAL_CAPACITY, DEFAULT_LOAD_FACTOR};
use crate::WeakIdentityHashMap;

use std::{collections::hash_map::RandomState, marker::PhantomData};

/// Builds a [`WeakIdentityHashMap`] with various configuration knobs.
///
/// # Examples
///
/// ```rust
/// use weak_identity_hashmap::{ConfigError, Key, WeakIdentityHashMap};
///
/// let mut map = WeakIdentityHashMap::builder()
///     // Start with 64 buckets.
///     .initial_capacity(64)
///     // Grow once the table is half full.
///     .load_factor(0.5)
///     .build()?;
///
/// let k = Key::new("k");
/// map.insert(&k, 1);
/// assert_eq!(map.capacity(), 64);
///
/// let bad = WeakIdentityHashMap::<&str, i32>::builder().load_factor(0.0).build();
/// assert_eq!(bad.err(), Some(ConfigError::InvalidLoadFactor(0.0)));
/// # Ok::<(), ConfigError>(())
/// ```
pub struct Builder<T, V> {
    initial_capacity: Option<usize>,
    load_factor: Option<f32>,
    map_type: PhantomData<fn() -> (T, V)>,
}

impl<T, V> Default for Builder<T, V> {
    fn default() -> Self {
        Self {
            initial_capacity: None,
            load_factor: None,
            map_type: PhantomData,
        }
    }
}

impl<T, V> Builder<T, V> {
    /// Sets the initial number of buckets. Rounded up to a power of two and
    /// capped at `1 << 30`.
    pub fn initial_capacity(self, capacity: usize) -> Self {
        Self {
            initial_capacity: Some(capacity),
            ..self
        }
    }

    /// Sets the fraction of buckets that may be filled before the table
    /// doubles. Must be positive.
    pub fn load_factor(self, load_factor: f32) -> Self {
        Self {
            load_factor: Some(load_factor),
            ..self
        }
    }

    /// Builds a `WeakIdentityHashMap<T, V>`.
    ///
    /// Fails with [`ConfigError::InvalidLoadFactor`] if the load factor is
    /// zero, negative or NaN.
    pub fn build(self) -> Result<WeakIdentityHashMap<T, V, RandomState>, ConfigError> {
        self.build_with_hasher(RandomState::default())
    }

    /// Builds a `WeakIdentityHashMap<T, V, S>` with the given `hasher`.
    pub fn build_with_hasher<S>(self, hasher: S) -> Result<WeakIdentityHashMap<T, V, S>, ConfigError> {
        WeakIdentityHashMap::with_config(
            self.initial_capacity.unwrap_or(DEFAULT_INITIAL_CAPACITY),
            self.load_factor.unwrap_or(DEFAULT_LOAD_FACTOR),
            hasher,
        )
    }
}
