#![cfg(test)]

// Property tests for the map kept inside the crate so they can inspect the
// slot table (bucket count, raw cell count, modification counter).

use crate::key::{Key, KeyRef};
use crate::WeakIdentityHashMap;
use proptest::prelude::*;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hasher};

const POOL: usize = 8;
// Pool index standing for the null key.
const NULL: usize = POOL;

// Pool-indexed operations: indices shrink to earlier slots, op lists shrink
// in length.
#[derive(Clone, Debug)]
enum Op {
    Insert(usize, i32),
    Remove(usize),
    RemoveIf(usize, i32),
    Get(usize),
    DropKey(usize),
    ContainsValue(i32),
    Clear,
    Iterate,
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    let idx = 0..=NULL;
    let val = -4i32..4;
    let op = prop_oneof![
        4 => (idx.clone(), val.clone()).prop_map(|(i, v)| Op::Insert(i, v)),
        1 => idx.clone().prop_map(Op::Remove),
        1 => (idx.clone(), val.clone()).prop_map(|(i, v)| Op::RemoveIf(i, v)),
        2 => idx.clone().prop_map(Op::Get),
        2 => (0..POOL).prop_map(Op::DropKey),
        1 => val.prop_map(Op::ContainsValue),
        1 => Just(Op::Clear),
        1 => Just(Op::Iterate),
    ];
    proptest::collection::vec(op, 1..80)
}

struct Pool {
    keys: Vec<Option<Key<u32>>>,
    minted: u32,
}

impl Pool {
    fn new() -> Self {
        Self {
            keys: (0..POOL).map(|_| None).collect(),
            minted: 0,
        }
    }

    // Live key at slot `i`, minting a fresh identity if the slot is empty.
    fn key(&mut self, i: usize) -> KeyRef<'_, u32> {
        if i == NULL {
            return KeyRef::null();
        }
        if self.keys[i].is_none() {
            self.minted += 1;
            self.keys[i] = Some(Key::new(self.minted));
        }
        KeyRef::from(&self.keys[i])
    }

    fn slot_of(&self, key: &Option<Key<u32>>) -> usize {
        match key {
            None => NULL,
            Some(k) => self
                .keys
                .iter()
                .position(|s| s.as_ref().is_some_and(|p| Key::ptr_eq(p, k)))
                .expect("yielded key must be held by the pool"),
        }
    }
}

// State-machine equivalence against a HashMap keyed by pool slot.
// Invariants exercised:
// - insert/get/remove parity, including the null key;
// - dropping a key's last handle removes its entry by the next call;
// - iteration yields each live entry exactly once;
// - the bucket count stays a power of two and the raw cell count never
//   falls below the live count;
// - value-only updates never move the modification counter.
fn run_state_machine<S: BuildHasher>(
    mut sut: WeakIdentityHashMap<u32, i32, S>,
    ops: Vec<Op>,
) -> Result<(), TestCaseError> {
    let mut pool = Pool::new();
    let mut model: HashMap<usize, i32> = HashMap::new();

    for op in ops {
        match op {
            Op::Insert(i, v) => {
                let before = sut.table().mod_count();
                let present = model.contains_key(&i);
                let prev = sut.insert(pool.key(i), v);
                prop_assert_eq!(prev, model.insert(i, v));
                if present {
                    prop_assert_eq!(sut.table().mod_count(), before);
                }
            }
            Op::Remove(i) => {
                let got = sut.remove(pool.key(i));
                prop_assert_eq!(got, model.remove(&i));
            }
            Op::RemoveIf(i, v) => {
                let expect = model.get(&i) == Some(&v);
                prop_assert_eq!(sut.remove_entry_if(pool.key(i), &v), expect);
                if expect {
                    model.remove(&i);
                }
            }
            Op::Get(i) => {
                let got = sut.get(pool.key(i)).copied();
                prop_assert_eq!(got, model.get(&i).copied());
            }
            Op::DropKey(i) => {
                pool.keys[i] = None;
                model.remove(&i);
            }
            Op::ContainsValue(v) => {
                let expect = model.values().any(|x| *x == v);
                prop_assert_eq!(sut.contains_value(&v), expect);
            }
            Op::Clear => {
                sut.clear();
                model.clear();
            }
            Op::Iterate => {
                let mut seen: HashMap<usize, i32> = HashMap::new();
                for (k, v) in sut.iter() {
                    let prev = seen.insert(pool.slot_of(&k), *v);
                    prop_assert!(prev.is_none(), "entry yielded twice");
                }
                prop_assert_eq!(&seen, &model);
            }
        }
        prop_assert!(sut.table().bucket_count().is_power_of_two());
        prop_assert!(sut.table().len() >= model.len());
        prop_assert_eq!(sut.len(), model.len());
    }
    Ok(())
}

#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> ConstHasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine(ops in arb_ops(), capacity in 0usize..20) {
        run_state_machine(WeakIdentityHashMap::with_capacity(capacity), ops)?;
    }

    // Every key lands in bucket 0, so all unlinking happens inside one chain.
    #[test]
    fn prop_state_machine_collisions(ops in arb_ops()) {
        run_state_machine(WeakIdentityHashMap::with_capacity_and_hasher(4, ConstBuildHasher), ops)?;
    }

    // Property: a cursor visits every live key exactly once even when keys it
    // has not reached yet are dropped between steps.
    #[test]
    fn prop_cursor_survives_retirement(n in 1usize..40, drops in proptest::collection::vec(any::<bool>(), 40)) {
        let mut sut = WeakIdentityHashMap::with_capacity(4);
        let mut keys: Vec<Option<Key<usize>>> = (0..n).map(|i| Some(Key::new(i))).collect();
        for k in keys.iter().flatten() {
            sut.insert(k, **k);
        }
        let mut cursor = sut.key_cursor();
        let mut seen = Vec::new();
        let mut step = 0;
        while cursor.has_next(&sut).unwrap() {
            let k = cursor.next(&mut sut).unwrap();
            let id = **k.as_ref().unwrap();
            seen.push(id);
            // Retire some other, not yet visited key.
            if drops[step % drops.len()] {
                if let Some(victim) = keys.iter().position(|s| s.as_ref().is_some_and(|v| !seen.contains(&**v))) {
                    keys[victim] = None;
                }
            }
            step += 1;
        }
        let mut sorted = seen.clone();
        sorted.sort_unstable();
        sorted.dedup();
        prop_assert_eq!(sorted.len(), seen.len(), "no duplicates");
        for k in keys.iter().flatten() {
            prop_assert!(seen.contains(&**k), "surviving key {} was skipped", **k);
        }
    }
}
