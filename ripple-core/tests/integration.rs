//! Integration Tests for the State Engine
//!
//! These tests drive signals, computeds, effects, channels and containers
//! together through the crate's public surface.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use ripple_core::{
    batch, cell, channel, channel_with, collection, composite, derive, react, untracked,
    Computed, Field, Signal, StateArray, StateError, StateObject,
};

#[test]
fn cell_reads_back_initial_value() {
    for v in [0, -3, i32::MAX] {
        let c = cell(v);
        assert_eq!(c.get(), v);
        assert_eq!(c.peek(), v);
    }
}

/// a = cell(5); b = derive(a * 2)
#[test]
fn derivation_follows_cell() {
    let a = cell(5);
    let b = {
        let a = a.clone();
        derive(move || a.get() * 2)
    };

    assert_eq!(b.get(), 10);
    a.set(7);
    assert_eq!(b.get(), 14);
}

#[test]
fn collection_push_and_pop() {
    let arr = collection(Signal::<i32>::default);
    arr.set(vec![1, 2, 3]);
    arr.push(4);
    assert_eq!(arr.get(), vec![1, 2, 3, 4]);

    assert_eq!(arr.pop(), Some(4));
    assert_eq!(arr.get(), vec![1, 2, 3]);
}

#[test]
fn channel_delivers_only_to_current_subscribers() {
    let events = channel::<i32>();
    let log = Arc::new(Mutex::new(Vec::new()));

    let first = {
        let log = log.clone();
        events.subscribe(move |v| log.lock().push(("first", *v)))
    };
    events.emit(&1);

    let _second = {
        let log = log.clone();
        events.subscribe(move |v| log.lock().push(("second", *v)))
    };
    events.emit(&2);

    first.unsubscribe();
    events.emit(&3);

    assert_eq!(
        *log.lock(),
        vec![("first", 1), ("first", 2), ("second", 2), ("second", 3)]
    );
}

#[test]
fn peek_only_derivation_never_recomputes() {
    let source = cell(1);
    let runs = Arc::new(AtomicI32::new(0));

    let frozen = {
        let (source, runs) = (source.clone(), runs.clone());
        derive(move || {
            runs.fetch_add(1, Ordering::SeqCst);
            source.peek() * 10
        })
    };

    assert_eq!(frozen.get(), 10);
    source.set(2);
    source.set(3);
    assert_eq!(frozen.get(), 10);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn untracked_reads_do_not_subscribe() {
    let tracked = cell(1);
    let ignored = cell(100);
    let sum = Arc::new(AtomicI32::new(0));

    let effect = {
        let (tracked, ignored, sum) = (tracked.clone(), ignored.clone(), sum.clone());
        react(move || {
            let extra = untracked(|| ignored.get());
            sum.store(tracked.get() + extra, Ordering::SeqCst);
        })
    };

    ignored.set(200);
    assert_eq!(sum.load(Ordering::SeqCst), 101);
    tracked.set(2);
    assert_eq!(sum.load(Ordering::SeqCst), 202);
    effect.dispose();
}

#[test]
fn binding_is_transitive() {
    let a = cell(0);
    let b = Signal::bound(&a);
    let c = Signal::bound(&b);

    a.set(42);
    assert_eq!(b.get(), 42);
    assert_eq!(c.get(), 42);

    c.set(7);
    assert_eq!(a.get(), 7);
}

#[test]
fn rebinding_releases_previous_source() {
    let s1 = cell(1);
    let s2 = cell(2);
    let t = cell(0);

    t.bind(&s1).unwrap();
    assert_eq!(t.get(), 1);
    t.bind(&s2).unwrap();
    assert_eq!(t.get(), 2);

    s1.set(99);
    assert_eq!(t.get(), 2);
    s2.set(5);
    assert_eq!(t.get(), 5);
}

#[test]
fn derived_binding_is_one_way() {
    let base = cell(3);
    let squared = {
        let base = base.clone();
        derive(move || base.get() * base.get())
    };
    let target = Signal::bound(&squared);
    assert_eq!(target.get(), 9);

    target.set(0);
    assert_eq!(squared.get(), 9);
    assert_eq!(base.get(), 3);

    base.set(4);
    assert_eq!(target.get(), 16);
}

#[test]
fn mutual_binding_is_rejected() {
    let a = cell(1);
    let b = Signal::bound(&a);

    let err = a.bind(&b).unwrap_err();
    assert!(matches!(err, StateError::BindingCycle));
    assert!(!a.is_bound());

    a.set(8);
    assert_eq!(b.get(), 8);
}

#[test]
fn collection_preserves_slot_identity() {
    let arr = collection(Signal::<i32>::default);
    arr.set(vec![1, 2, 3]);
    let original = arr.slots();

    arr.set(vec![10, 20, 30]);
    assert_eq!(arr.slots(), original);
    assert_eq!(original[0].get(), 10);

    arr.set(vec![10, 20]);
    assert_eq!(arr.len(), 2);

    arr.set(vec![10, 20, 30, 40]);
    let grown = arr.slots();
    assert!(grown[0].ptr_eq(&original[0]));
    assert!(grown[1].ptr_eq(&original[1]));
    assert!(!grown[2].ptr_eq(&original[2]));
    assert_eq!(arr.get(), vec![10, 20, 30, 40]);
}

#[test]
fn keyed_collection_survives_reorder() {
    let arr: StateArray<Value> = StateArray::keyed(
        || Signal::new(Value::Null),
        |item: &Value| item["id"].to_string(),
    );
    arr.set_value(json!([{ "id": 1, "n": "a" }, { "id": 2, "n": "b" }]))
        .unwrap();
    let before = arr.slots();

    arr.set_value(json!([{ "id": 2, "n": "b" }, { "id": 1, "n": "a" }]))
        .unwrap();
    let after = arr.slots();
    assert!(after[0].ptr_eq(&before[1]));
    assert!(after[1].ptr_eq(&before[0]));
}

#[test]
fn collection_rejects_non_sequence() {
    let arr: StateArray<Value> = collection(|| Signal::new(Value::Null));
    arr.set_value(json!([1])).unwrap();

    let err = arr.set_value(json!("nope")).unwrap_err();
    assert!(matches!(err, StateError::Shape { .. }));
    assert_eq!(arr.get(), vec![json!(1)]);
}

#[test]
fn composite_partial_update() {
    let obj = composite([
        ("x", Field::from(cell(json!(1)))),
        ("y", Field::from(cell(json!(2)))),
    ]);

    obj.set(&json!({ "x": 10 })).unwrap();
    assert_eq!(Value::Object(obj.get()), json!({ "x": 10, "y": 2 }));
}

#[test]
fn composite_readonly_write_is_all_or_nothing() {
    let x = cell(json!(1));
    let doubled: Computed<Value> = {
        let x = x.clone();
        derive(move || json!(x.get().as_i64().unwrap_or(0) * 2))
    };
    let obj = composite([
        ("x", Field::from(x.clone())),
        ("doubled", Field::from(doubled)),
    ]);

    let err = obj.set(&json!({ "x": 5, "doubled": 0 })).unwrap_err();
    assert!(matches!(err, StateError::ReadOnlyField(_)));
    assert_eq!(x.get(), json!(1));

    let err = obj.set(&json!([1, 2])).unwrap_err();
    assert!(matches!(err, StateError::Shape { expected: "object", .. }));
}

#[test]
fn effect_sees_composite_write_once() {
    let obj = composite([
        ("a", Field::from(cell(json!(0)))),
        ("b", Field::from(cell(json!(0)))),
    ]);
    let runs = Arc::new(AtomicI32::new(0));

    let effect = {
        let (obj, runs) = (obj.clone(), runs.clone());
        react(move || {
            obj.get();
            runs.fetch_add(1, Ordering::SeqCst);
        })
    };

    obj.set(&json!({ "a": 1, "b": 2 })).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    effect.dispose();
}

#[test]
fn nested_batches_flush_once() {
    let a = cell(0);
    let b = cell(0);
    let runs = Arc::new(AtomicI32::new(0));

    let effect = {
        let (a, b, runs) = (a.clone(), b.clone(), runs.clone());
        react(move || {
            a.get();
            b.get();
            runs.fetch_add(1, Ordering::SeqCst);
        })
    };

    batch(|| {
        a.set(1);
        batch(|| b.set(2));
        a.set(3);
    });
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    effect.dispose();
}

#[test]
fn effects_run_in_subscription_order() {
    let source = cell(0);
    let log = Arc::new(Mutex::new(Vec::new()));

    let effects: Vec<_> = ["e1", "e2", "e3"]
        .into_iter()
        .map(|name| {
            let (source, log) = (source.clone(), log.clone());
            react(move || log.lock().push((name, source.get())))
        })
        .collect();
    log.lock().clear();

    source.set(1);
    assert_eq!(*log.lock(), vec![("e1", 1), ("e2", 1), ("e3", 1)]);

    for effect in &effects {
        effect.dispose();
    }
}

#[test]
fn channel_with_handler_receives_events() {
    let seen = Arc::new(AtomicI32::new(0));
    let events = {
        let seen = seen.clone();
        channel_with(move |v: &i32| {
            seen.fetch_add(*v, Ordering::SeqCst);
        })
    };
    events.emit(&2);
    events.emit(&3);
    assert_eq!(seen.load(Ordering::SeqCst), 5);
}

fn todo_item() -> StateObject {
    composite([
        ("title", Field::from(cell(json!("")))),
        ("done", Field::from(cell(json!(false)))),
    ])
}

#[test]
fn composite_holds_list_of_composites() {
    let items: StateArray<Value, StateObject> = collection(todo_item);
    let board = composite([
        ("name", Field::from(cell(json!("inbox")))),
        ("items", Field::from(items.clone())),
    ]);

    board
        .set(&json!({ "items": [{ "title": "write" }, { "title": "ship" }] }))
        .unwrap();
    assert_eq!(
        Value::Object(board.get()),
        json!({
            "name": "inbox",
            "items": [
                { "title": "write", "done": false },
                { "title": "ship", "done": false },
            ],
        })
    );

    let renders = Arc::new(AtomicI32::new(0));
    let effect = {
        let (board, renders) = (board.clone(), renders.clone());
        react(move || {
            board.get();
            renders.fetch_add(1, Ordering::SeqCst);
        })
    };

    // A write deep inside reaches the outer snapshot.
    let first = items.slot(0).unwrap();
    first.set(&json!({ "done": true })).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 2);
    assert_eq!(board.get()["items"][0]["done"], json!(true));

    let err = board
        .set(&json!({ "name": "done", "items": [{ "title": 1 }, "oops"] }))
        .unwrap_err();
    assert!(matches!(err, StateError::Shape { expected: "object", found: "string" }));
    assert_eq!(board.get()["name"], json!("inbox"));
    assert_eq!(items.len(), 2);
    effect.dispose();
}
