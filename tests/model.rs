//! Randomized write/delete/compact sequences checked against a `HashMap`
//! reference model (last-write-wins, delete removes).

use std::collections::HashMap;

use logkvs::{KvStore, MemoryBackend, StoreConfig};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Write(usize, Vec<u8>),
    Delete(usize),
    Compact,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..4, prop::collection::vec(any::<u8>(), 0..12))
            .prop_map(|(k, v)| Op::Write(k, v)),
        (0usize..4).prop_map(Op::Delete),
        Just(Op::Compact),
    ]
}

fn key_for(index: usize) -> Vec<u8> {
    format!("/k{index}").into_bytes()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn matches_hashmap_reference_model(ops in prop::collection::vec(op_strategy(), 0..200)) {
        let backend = MemoryBackend::new(512 * 8);
        let config = StoreConfig {
            block_size: 512,
            block_count: 8,
            spare_count: 2,
            program_granularity: 4,
            cookie: vec![0xAB, 0xCD],
        };
        let mut store = KvStore::new(backend, config).unwrap();
        store.mount().unwrap();

        let mut model: HashMap<usize, Vec<u8>> = HashMap::new();

        for op in ops {
            match op {
                Op::Write(k, v) => {
                    store.write(&key_for(k), &v).unwrap();
                    // An empty value is indistinguishable from a delete on
                    // disk (key_length > 0, value_length == 0 is a
                    // tombstone), so the reference model must agree.
                    if v.is_empty() {
                        model.remove(&k);
                    } else {
                        model.insert(k, v);
                    }
                }
                Op::Delete(k) => {
                    store.delete(&key_for(k)).unwrap();
                    model.remove(&k);
                }
                Op::Compact => {
                    store.compact().unwrap();
                }
            }

            for k in 0..4 {
                let mut buf = vec![0u8; model.get(&k).map(|v| v.len()).unwrap_or(0)];
                let result = store.read(&key_for(k), &mut buf);
                match model.get(&k) {
                    Some(expected) => {
                        result.unwrap();
                        prop_assert_eq!(&buf, expected);
                    }
                    None => {
                        prop_assert!(result.is_err());
                    }
                }
            }
        }
    }
}
