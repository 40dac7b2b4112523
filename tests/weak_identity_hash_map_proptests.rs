// WeakIdentityHashMap property tests.
//
// Property 1: liveness matches outstanding key handles.
//  - Model: per-slot stack of strong handles plus an "inserted" flag.
//  - Invariant: len() == count(slots inserted with >=1 handle);
//               contains_key(slot) iff inserted.
//  - Operations: insert, clone, drop-one, get, remove.
//
// Property 2: cascading liveness with values holding keys.
//  - Model: each node's value may hold a handle to one later node's key;
//    external handles are the roots.
//  - Invariant: live entries == nodes reachable from nodes with an external
//    handle, observed by the first call after each drop.
//  - Safety: edges go from i to some j > i, so there are no cycles.
use proptest::prelude::*;
use weak_identity_hashmap::{Key, WeakIdentityHashMap};

proptest! {
    #[test]
    fn prop_liveness_tracks_handles(slots in 1usize..=5, ops in proptest::collection::vec((0u8..=4u8, 0usize..100usize), 1..100)) {
        let mut m: WeakIdentityHashMap<usize, usize> = WeakIdentityHashMap::new();
        let mut live: Vec<Vec<Key<usize>>> = vec![Vec::new(); slots];
        let mut inserted = vec![false; slots];

        for (op, raw) in ops {
            let s = raw % slots;
            match op {
                // Insert, minting a key for the slot if it has none.
                0 => {
                    if live[s].is_empty() {
                        live[s].push(Key::new(s));
                    }
                    let prev = m.insert(&live[s][0], s);
                    prop_assert_eq!(prev.is_some(), inserted[s]);
                    inserted[s] = true;
                }
                // Clone one handle.
                1 => {
                    if let Some(k) = live[s].last().cloned() {
                        live[s].push(k);
                    }
                }
                // Drop one handle; the last one retires the entry.
                2 => {
                    live[s].pop();
                    if live[s].is_empty() {
                        inserted[s] = false;
                    }
                }
                // Lookup.
                3 => {
                    if let Some(k) = live[s].last() {
                        prop_assert_eq!(m.get(k).copied(), inserted[s].then_some(s));
                    }
                }
                // Explicit removal.
                _ => {
                    if let Some(k) = live[s].last() {
                        prop_assert_eq!(m.remove(k), inserted[s].then_some(s));
                        inserted[s] = false;
                    }
                }
            }
            let expected = inserted.iter().filter(|b| **b).count();
            prop_assert_eq!(m.len(), expected);
            for (i, handles) in live.iter().enumerate() {
                if let Some(k) = handles.last() {
                    prop_assert_eq!(m.contains_key(k), inserted[i]);
                }
            }
        }
    }
}

struct Node {
    _child: Option<Key<usize>>,
}

fn arb_graph() -> impl Strategy<Value = (Vec<Option<usize>>, Vec<usize>)> {
    (1usize..10).prop_flat_map(|n| {
        let edges = (0..n)
            .map(|i| {
                if i + 1 < n {
                    proptest::option::of(i + 1..n).boxed()
                } else {
                    Just(None).boxed()
                }
            })
            .collect::<Vec<_>>();
        let drops = proptest::collection::vec(0..n, 0..2 * n);
        (edges, drops)
    })
}

fn reachable(external: &[Option<Key<usize>>], child: &[Option<usize>]) -> Vec<bool> {
    let mut alive: Vec<bool> = external.iter().map(Option::is_some).collect();
    // Parents always precede children.
    for i in 0..child.len() {
        if alive[i] {
            if let Some(j) = child[i] {
                alive[j] = true;
            }
        }
    }
    alive
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_cascading_reclamation((child, drops) in arb_graph()) {
        let n = child.len();
        let keys: Vec<Key<usize>> = (0..n).map(Key::new).collect();
        let mut m = WeakIdentityHashMap::with_capacity(2);
        for (i, k) in keys.iter().enumerate() {
            m.insert(k, Node { _child: child[i].map(|j| keys[j].clone()) });
        }
        let mut external: Vec<Option<Key<usize>>> = keys.into_iter().map(Some).collect();
        prop_assert_eq!(m.len(), n);

        for d in drops {
            external[d] = None;
            let alive = reachable(&external, &child);
            prop_assert_eq!(m.len(), alive.iter().filter(|a| **a).count());
            for (i, k) in external.iter().enumerate() {
                if let Some(k) = k {
                    prop_assert!(alive[i]);
                    prop_assert!(m.contains_key(k));
                }
            }
        }
    }
}
