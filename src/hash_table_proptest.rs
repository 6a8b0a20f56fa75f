#![cfg(test)]

// Property tests for HashTable kept inside the crate so they can check
// bucket placement alongside the public operations.

use crate::hash_table::HashTable;
use crate::value::Value;
use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap, VecDeque};

// Pool-indexed operations to improve shrinking: indices shrink to earlier keys,
// pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Insert(usize, Value),
    Lookup(usize),
    Delete(usize),
    Iterate,
    Clear,
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Integer),
        "[a-z \"|:]{0,6}".prop_map(Value::Text),
    ]
}

// Small multiples keep many keys colliding at small capacities.
fn arb_scenario() -> impl Strategy<Value = (usize, Vec<i64>, Vec<OpI>)> {
    let pool = proptest::collection::vec(
        prop_oneof![-40i64..40, (-5i64..5).prop_map(|k| k * 16), any::<i64>()],
        1..=10,
    );
    (1usize..=8, pool).prop_flat_map(|(capacity, pool)| {
        let idx = 0..pool.len();
        let op = prop_oneof![
            4 => (idx.clone(), arb_value()).prop_map(|(i, v)| OpI::Insert(i, v)),
            2 => idx.clone().prop_map(OpI::Lookup),
            2 => idx.prop_map(OpI::Delete),
            1 => Just(OpI::Iterate),
            1 => Just(OpI::Clear),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (capacity, pool.clone(), ops))
    })
}

fn model_len(model: &HashMap<i64, VecDeque<Value>>) -> usize {
    model.values().map(VecDeque::len).sum()
}

// Property: State-machine equivalence against a FIFO multimap.
// Invariants exercised across random operation sequences:
// - Duplicate keys accumulate; lookup returns the oldest, delete removes it.
// - `len` equals the number of reachable entries and the model's total.
// - After every insert the load factor is below 0.7.
// - Every entry sits in the bucket its key hashes to, including after resizes.
// - Capacity never shrinks.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((capacity, pool, ops) in arb_scenario()) {
        let mut sut = HashTable::with_capacity(capacity).unwrap();
        let mut model: HashMap<i64, VecDeque<Value>> = HashMap::new();
        let mut last_capacity = sut.capacity();

        for op in ops {
            match op {
                OpI::Insert(i, v) => {
                    let k = pool[i];
                    sut.insert(k, v.clone());
                    model.entry(k).or_default().push_back(v);
                    prop_assert!(sut.load_factor() < 0.7, "load factor {} after insert", sut.load_factor());
                }
                OpI::Lookup(i) => {
                    let k = pool[i];
                    let expected = model.get(&k).and_then(|q| q.front());
                    prop_assert_eq!(sut.lookup(k), expected);
                    prop_assert_eq!(sut.contains_key(k), expected.is_some());
                    let all: Vec<&Value> = sut.lookup_all(k).collect();
                    let model_all: Vec<&Value> = model.get(&k).map(|q| q.iter().collect()).unwrap_or_default();
                    prop_assert_eq!(all, model_all);
                }
                OpI::Delete(i) => {
                    let k = pool[i];
                    let before = sut.len();
                    let expected = model.get_mut(&k).and_then(|q| q.pop_front());
                    let got = sut.delete(k);
                    prop_assert_eq!(&got, &expected);
                    let removed = usize::from(got.is_some());
                    prop_assert_eq!(sut.len(), before - removed);
                }
                OpI::Iterate => {
                    let mut seen: BTreeMap<i64, Vec<Value>> = BTreeMap::new();
                    for (b, k, v) in sut.iter() {
                        seen.entry(k).or_default().push(v.clone());
                        prop_assert_eq!(b, sut.bucket_index(k));
                    }
                    let expected: BTreeMap<i64, Vec<Value>> = model
                        .iter()
                        .filter(|(_, q)| !q.is_empty())
                        .map(|(k, q)| (*k, q.iter().cloned().collect()))
                        .collect();
                    prop_assert_eq!(seen, expected);
                }
                OpI::Clear => {
                    sut.clear();
                    model.clear();
                }
            }

            // Post-conditions after each op
            prop_assert!(sut.capacity() >= last_capacity, "capacity shrank");
            last_capacity = sut.capacity();
            prop_assert_eq!(sut.len(), model_len(&model));
            prop_assert_eq!(sut.is_empty(), model_len(&model) == 0);
            prop_assert_eq!(sut.iter().count(), sut.len());
        }
    }
}

// Property: a written snapshot reads back to the same multiset of
// (key, value) pairs, with per-key order intact, whatever capacity it
// regrows to.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_snapshot_round_trip(
        capacity in 1usize..=16,
        items in proptest::collection::vec((-50i64..50, arb_value()), 0..60),
    ) {
        let mut sut = HashTable::with_capacity(capacity).unwrap();
        for (k, v) in &items {
            sut.insert(*k, v.clone());
        }

        let mut buf = Vec::new();
        sut.write_snapshot(&mut buf).unwrap();
        let (restored, report) = HashTable::read_snapshot(buf.as_slice()).unwrap();

        prop_assert!(report.is_complete());
        prop_assert_eq!(report.records, items.len());
        prop_assert_eq!(restored.len(), sut.len());
        for (k, _) in &items {
            let a: Vec<&Value> = sut.lookup_all(*k).collect();
            let b: Vec<&Value> = restored.lookup_all(*k).collect();
            prop_assert_eq!(a, b);
        }
    }
}
