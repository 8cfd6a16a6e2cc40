//! Property-based invariant tests for the reactive store.
//!
//! 1. Two different writes notify once with `(new, old)`.
//! 2. Repeating a write never notifies.
//! 3. Notifications equal the number of changing writes, and the last one
//!    carries the final value.
//! 4. A computed sum tracks its inputs and recomputes once per change.
//! 5. Watchers always run in subscription order.
//! 6. `reset_all` leaves every key undefined and every watcher silent.
//! 7. `serialize` is valid JSON with one entry per plain key.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bww_core::Value;
use bww_runtime::{ReactiveStore, WatchOptions, WriteOutcome};
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────────

fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (-1.0e6f64..1.0e6).prop_map(Value::from),
        (-1000i32..1000).prop_map(Value::from),
        "[a-z]{0,6}".prop_map(Value::from),
    ]
}

fn key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![Just("a"), Just("b"), Just("c"), Just("d")].prop_map(String::from)
}

type Log = Rc<RefCell<Vec<(Value, Value)>>>;

fn record(store: &ReactiveStore, key: &str) -> Log {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let _handle = store.watch(
        key,
        move |new, old| sink.borrow_mut().push((new.clone(), old.clone())),
        WatchOptions::default(),
    );
    log
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Two different writes notify once with (new, old)
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn distinct_writes_notify_once(v1 in scalar_strategy(), v2 in scalar_strategy()) {
        prop_assume!(!v1.strict_eq(&v2));
        let store = ReactiveStore::with_initial([("k", Value::Undefined)]);
        let log = record(&store, "k");

        store.write("k", v1.clone());
        log.borrow_mut().clear();
        prop_assert_eq!(store.write("k", v2.clone()), WriteOutcome::Changed);
        prop_assert_eq!(log.borrow().clone(), vec![(v2, v1)]);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Repeating a write never notifies
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn repeated_write_is_silent(v in scalar_strategy()) {
        let store = ReactiveStore::new();
        store.define("k", v.clone());
        let log = record(&store, "k");

        prop_assert_eq!(store.write("k", v.clone()), WriteOutcome::Unchanged);
        prop_assert_eq!(store.write("k", v), WriteOutcome::Unchanged);
        prop_assert!(log.borrow().is_empty());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Notification count equals changing writes
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn notifications_match_changes(
        initial in scalar_strategy(),
        writes in proptest::collection::vec(scalar_strategy(), 0..32),
    ) {
        let store = ReactiveStore::with_initial([("k", initial.clone())]);
        let log = record(&store, "k");

        let mut current = initial;
        let mut expected = 0usize;
        for value in writes {
            let outcome = store.write("k", value.clone());
            if current.strict_eq(&value) {
                prop_assert_eq!(outcome, WriteOutcome::Unchanged);
            } else {
                prop_assert_eq!(outcome, WriteOutcome::Changed);
                expected += 1;
            }
            current = value;
        }

        prop_assert_eq!(log.borrow().len(), expected);
        if let Some((last_new, _)) = log.borrow().last() {
            prop_assert_eq!(last_new, &store.read("k"));
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Computed sum tracks its inputs
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn computed_sum_tracks_inputs(
        writes in proptest::collection::vec((key_strategy(), -50i32..50), 0..24),
    ) {
        let store = ReactiveStore::with_initial([("a", 0), ("b", 0), ("c", 0), ("d", 0)]);
        let runs = Rc::new(Cell::new(0u32));
        let runs_clone = Rc::clone(&runs);
        store
            .computed("sum", move |s| {
                runs_clone.set(runs_clone.get() + 1);
                let total: f64 = ["a", "b", "c"]
                    .iter()
                    .map(|k| s.read(k).as_f64().unwrap_or(0.0))
                    .sum();
                Ok(Value::from(total))
            })
            .expect("sum");

        let mut model = [0i32; 4];
        let mut changes = 0u32;
        for (key, value) in writes {
            let slot = (key.as_bytes()[0] - b'a') as usize;
            if model[slot] != value {
                model[slot] = value;
                // "d" is not a dependency.
                if slot < 3 {
                    changes += 1;
                }
            }
            store.write(&key, value);
        }

        let expected = f64::from(model[0] + model[1] + model[2]);
        prop_assert_eq!(store.read("sum"), Value::from(expected));
        prop_assert_eq!(runs.get(), 1 + changes);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Watchers run in subscription order
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn watchers_run_in_subscription_order(count in 1usize..12, removed in proptest::collection::vec(any::<bool>(), 12)) {
        let store = ReactiveStore::with_initial([("k", 0)]);
        let order = Rc::new(RefCell::new(Vec::new()));
        let handles: Vec<_> = (0..count)
            .map(|i| {
                let order = Rc::clone(&order);
                store.watch("k", move |_, _| order.borrow_mut().push(i), WatchOptions::default())
            })
            .collect();
        for (handle, remove) in handles.iter().zip(&removed) {
            if *remove {
                handle.unsubscribe();
            }
        }

        store.write("k", 1);
        let expected: Vec<usize> = (0..count).filter(|i| !removed[*i]).collect();
        prop_assert_eq!(order.borrow().clone(), expected);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. reset_all leaves nothing behind
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn reset_all_forgets_everything(
        entries in proptest::collection::vec((key_strategy(), scalar_strategy()), 1..8),
        next in scalar_strategy(),
    ) {
        let store = ReactiveStore::new();
        let mut logs = Vec::new();
        for (key, value) in &entries {
            store.define(key.clone(), value.clone());
            logs.push(record(&store, key));
        }

        store.reset_all();
        for (key, _) in &entries {
            prop_assert!(store.read(key).is_undefined());
            store.define(key.clone(), Value::Undefined);
            store.write(key, next.clone());
        }
        prop_assert!(logs.iter().all(|log| log.borrow().is_empty()));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 7. serialize is valid JSON with one entry per key
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn serialize_is_valid_json(entries in proptest::collection::vec((key_strategy(), scalar_strategy()), 0..8)) {
        let store = ReactiveStore::new();
        for (key, value) in &entries {
            store.define(key.clone(), value.clone());
        }

        let parsed: serde_json::Value =
            serde_json::from_str(&store.serialize()).expect("valid json");
        let object = parsed.as_object().expect("json object");
        prop_assert_eq!(object.len(), store.len());
        let keys: Vec<&String> = object.keys().collect();
        let mut sorted = store.keys();
        sorted.sort();
        let mut got: Vec<String> = keys.into_iter().cloned().collect();
        got.sort();
        prop_assert_eq!(got, sorted);
    }
}
