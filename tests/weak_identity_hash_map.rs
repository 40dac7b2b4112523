// WeakIdentityHashMap integration test suite.
//
// Each test documents what behavior is being verified and which
// invariants are assumed or asserted. The core invariants exercised:
// - Identity: keys match iff they are clones of the same handle.
// - Weakness: the map never keeps a key alive; an entry disappears once
//   the key's last strong handle drops, observed by the next call.
// - Null key: an ordinary key that never retires.
// - Growth: power-of-two lengths; thresholds follow the load factor.
// - Drop ordering: values are dropped after their cell is unlinked, so a
//   value's drop may release keys of the same map.
use std::cell::RefCell;
use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::rc::Rc;
use weak_identity_hashmap::{ConfigError, Key, KeyRef, WeakIdentityHashMap};

// Test: basic insert/get/replace/remove.
// Assumes: insert returns the previous value when the key was present.
// Verifies: get reflects the latest value; remove returns it once.
#[test]
fn insert_get_replace_remove() {
    let mut m = WeakIdentityHashMap::new();
    let k = Key::new("k");
    assert_eq!(m.insert(&k, 1), None);
    assert_eq!(m.insert(&k, 2), Some(1));
    assert_eq!(m.get(&k), Some(&2));
    assert!(m.contains_key(&k));
    assert_eq!(m.len(), 1);

    assert_eq!(m.remove(&k), Some(2));
    assert_eq!(m.remove(&k), None);
    assert!(!m.contains_key(&k));
    assert!(m.is_empty());
}

// Test: identity rather than value equality.
// Assumes: T's own PartialEq is never consulted.
// Verifies: equal-valued but distinct keys are distinct entries; clones hit.
#[test]
fn identity_semantics() {
    let mut m = WeakIdentityHashMap::new();
    let a = Key::new(String::from("same"));
    let b = Key::new(String::from("same"));
    m.insert(&a, 1);
    m.insert(&b, 2);
    assert_eq!(m.len(), 2);
    assert_eq!(m.get(&a.clone()), Some(&1));
    assert_eq!(m.get(&b), Some(&2));
}

// Test: null key round trip.
// Assumes: KeyRef::null() and None both name the null key.
// Verifies: null key stores, replaces and removes like any other key.
#[test]
fn null_key_round_trip() {
    let mut m: WeakIdentityHashMap<u8, &str> = WeakIdentityHashMap::new();
    assert_eq!(m.insert(KeyRef::null(), "n"), None);
    assert_eq!(m.get(None::<&Key<u8>>), Some(&"n"));
    assert_eq!(m.insert(&None::<Key<u8>>, "m"), Some("n"));
    assert!(m.contains_key(KeyRef::null()));
    assert_eq!(m.len(), 1);
    assert_eq!(m.remove(KeyRef::null()), Some("m"));
    assert!(m.is_empty());
}

// Test: "null" values are ordinary values.
// Verifies: Option-valued entries are stored and found by contains_value.
#[test]
fn none_values_are_stored() {
    let mut m = WeakIdentityHashMap::new();
    let k = Key::new(1);
    m.insert(&k, None::<i32>);
    assert_eq!(m.get(&k), Some(&None));
    assert!(m.contains_value(&None));
    assert!(!m.contains_value(&Some(0)));
}

// Test: reclamation on last drop.
// Assumes: the map holds no strong handle.
// Verifies: entry survives while a clone lives; gone after the last drop.
#[test]
fn entry_disappears_after_last_handle() {
    let mut m = WeakIdentityHashMap::new();
    let k = Key::new(7u64);
    let k2 = k.clone();
    m.insert(&k, "v");
    assert_eq!(Key::strong_count(&k), 2, "map holds no strong handle");

    drop(k);
    assert!(m.contains_key(&k2));
    drop(k2);
    assert_eq!(m.len(), 0);
    assert!(!m.contains_value(&"v"));
}

// Test: keys dropped on another thread.
// Assumes: Key is Send + Sync when T is.
// Verifies: the retirement reaches the map and is observed by the next call.
#[test]
fn key_dropped_on_other_thread() {
    let mut m = WeakIdentityHashMap::new();
    let keep = Key::new(1u32);
    let k = Key::new(2u32);
    m.insert(&keep, 'a');
    m.insert(&k, 'b');
    std::thread::spawn(move || drop(k)).join().unwrap();
    assert_eq!(m.len(), 1);
    assert_eq!(m.get(&keep), Some(&'a'));
}

// Test: growth keeps everything reachable.
// Assumes: doubling at threshold with load factor 0.75.
// Verifies: power-of-two length large enough for N entries; all found.
#[test]
fn growth_preserves_entries() {
    let mut m = WeakIdentityHashMap::with_capacity_and_load_factor(4, 0.75).unwrap();
    let keys: Vec<_> = (0..1000).map(Key::new).collect();
    for k in &keys {
        m.insert(k, **k * 3);
    }
    // 1024 buckets admit 768 entries; the next doubling admits 1536.
    assert_eq!(m.capacity(), 2048);
    assert_eq!(m.len(), 1000);
    for k in &keys {
        assert_eq!(m.get(k), Some(&(**k * 3)));
    }
}

// Test: short-lived keys do not inflate the table.
// Assumes: every insert expunges before it links its cell.
// Verifies: churn of keys dropped right after insertion stays at the
// initial length.
#[test]
fn churn_of_short_lived_keys_stays_small() {
    let mut m = WeakIdentityHashMap::with_capacity(16);
    let keep = Key::new(usize::MAX);
    m.insert(&keep, 0);
    for i in 0..10_000 {
        let k = Key::new(i);
        m.insert(&k, i);
    }
    assert_eq!(m.len(), 1);
    assert_eq!(m.capacity(), 16);
}

// Test: construction parameters.
// Verifies: invalid load factors rejected; capacity rounding and clamping.
#[test]
fn construction_parameters() {
    for lf in [0.0f32, -0.5, f32::NAN] {
        let r = WeakIdentityHashMap::<u8, u8>::with_capacity_and_load_factor(8, lf);
        assert!(matches!(r, Err(ConfigError::InvalidLoadFactor(_))));
    }
    let mut m: WeakIdentityHashMap<u8, u8> = WeakIdentityHashMap::with_capacity(17);
    assert_eq!(m.capacity(), 32);
    let mut d: WeakIdentityHashMap<u8, u8> = WeakIdentityHashMap::default();
    assert_eq!(d.capacity(), 16);
    assert_eq!(d.load_factor(), 0.75);
}

// Test: custom hasher is used and exposed.
#[test]
fn with_hasher_exposes_hasher() {
    let s = RandomState::new();
    let probe = s.hash_one(42u64);
    let mut m: WeakIdentityHashMap<u8, u8, _> = WeakIdentityHashMap::with_hasher(s);
    assert_eq!(m.hasher().hash_one(42u64), probe);
    let k = Key::new(0u8);
    m.insert(&k, 1);
    assert_eq!(m.get(&k), Some(&1));
}

// Test: clear.
// Assumes: clear discards queued retirements and deregisters live keys.
// Verifies: empty afterwards; later drops of formerly stored keys are harmless.
#[test]
fn clear_discards_everything() {
    let mut m = WeakIdentityHashMap::new();
    let a = Key::new(1);
    let b = Key::new(2);
    m.insert(&a, 1);
    m.insert(&b, 2);
    m.insert(KeyRef::null(), 0);
    drop(b);
    m.clear();
    assert!(m.is_empty());
    drop(a);
    assert_eq!(m.len(), 0);

    let c = Key::new(3);
    m.insert(&c, 3);
    assert_eq!(m.len(), 1);
}

// Test: bulk construction and extension.
// Verifies: from_entries/collect/extend copy live entries, including null.
#[test]
fn bulk_insertion() {
    let keys: Vec<_> = (0..50).map(Key::new).collect();
    let mut src = WeakIdentityHashMap::new();
    for k in &keys {
        src.insert(k, **k);
    }
    src.insert(KeyRef::null(), -1);

    let mut copy = WeakIdentityHashMap::from_entries(src.iter().map(|(k, v)| (k, *v)));
    assert_eq!(copy.len(), 51);
    assert_eq!(copy.get(&keys[10]), Some(&10));
    assert_eq!(copy.get(KeyRef::null()), Some(&-1));

    let mut ext: WeakIdentityHashMap<i32, i32> = keys[..5].iter().map(|k| (k.clone(), 0)).collect();
    ext.extend(keys[5..].iter().map(|k| (k.clone(), 1)));
    assert_eq!(ext.len(), 50);
    assert_eq!(ext.get(&keys[4]), Some(&0));
    assert_eq!(ext.get(&keys[5]), Some(&1));
}

// Test: iter_mut/values_mut.
// Verifies: in-place updates visible through get; dead keys skipped.
#[test]
fn mutable_iteration() {
    let mut m = WeakIdentityHashMap::new();
    let a = Key::new('a');
    let b = Key::new('b');
    m.insert(&a, 1);
    m.insert(&b, 2);
    for (_, v) in &mut m {
        *v += 10;
    }
    drop(b);
    for v in m.values_mut() {
        *v *= 2;
    }
    assert_eq!(m.get(&a), Some(&22));
    assert_eq!(m.values().copied().collect::<Vec<_>>(), vec![22]);
}

// Value that holds the last handle of another key of the same map.
struct Holder {
    _key: Option<Key<u32>>,
    log: Rc<RefCell<Vec<u32>>>,
    id: u32,
}

impl Drop for Holder {
    fn drop(&mut self) {
        self.log.borrow_mut().push(self.id);
    }
}

// Test: cascading reclamation through values.
// Assumes: a dead cell's value is dropped after the cell is unlinked.
// Verifies: dropping a value that owns the last handle of another key
// retires that key too, and the map reaches a consistent empty state.
#[test]
fn value_drop_cascades() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut m = WeakIdentityHashMap::new();
    let inner = Key::new(2u32);
    let outer = Key::new(1u32);
    m.insert(
        &inner,
        Holder {
            _key: None,
            log: log.clone(),
            id: 2,
        },
    );
    m.insert(
        &outer,
        Holder {
            _key: Some(inner),
            log: log.clone(),
            id: 1,
        },
    );
    assert_eq!(m.len(), 2);

    drop(outer);
    assert!(log.borrow().is_empty(), "nothing dropped before the next call");
    // Expunging outer drops its value, which retires inner; the same pass
    // drains that retirement too.
    assert_eq!(m.len(), 0);
    assert_eq!(*log.borrow(), vec![1, 2]);
}

// Test: Debug output.
#[test]
fn debug_format() {
    let mut m = WeakIdentityHashMap::new();
    let k = Key::new(5);
    m.insert(&k, "five");
    assert_eq!(format!("{:?}", m), "{5: \"five\"}");
}
