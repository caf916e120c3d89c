//! Named-field composite.
//!
//! A [`StateObject`] groups named reactive fields and exposes them as one
//! JSON object snapshot. Partial writes are validated up front and then
//! applied as a single batch.
//!
//! Composites and collections nest: a field can hold another
//! [`StateObject`] or a [`StateArray`], and a `StateObject` can be the slot
//! type of a collection. Validation walks the whole nested write before any
//! of it is applied.

use std::ops::Index;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::array::StateArray;
use crate::emitter::Emitter;
use crate::error::{Result, StateError};
use crate::reactive::{batch, Computed, Readable, Signal, Writable};

/// One member of a [`StateObject`].
#[derive(Clone, PartialEq, Debug)]
pub enum Field {
    /// Read and written through the composite.
    Writable(Signal<Value>),
    /// Appears in snapshots; writes are rejected.
    Readonly(Computed<Value>),
    /// Writes emit; never part of a snapshot.
    Event(Emitter<Value>),
    /// Nested composite. Writes are partial updates of it.
    Object(StateObject),
    /// Nested collection of plain values.
    Array(StateArray<Value>),
    /// Nested collection of composites.
    ObjectArray(StateArray<Value, StateObject>),
}

impl Field {
    /// Tracked read, `None` for event fields.
    pub fn get(&self) -> Option<Value> {
        match self {
            Field::Writable(signal) => Some(signal.get()),
            Field::Readonly(computed) => Some(computed.get()),
            Field::Event(_) => None,
            Field::Object(_) | Field::Array(_) | Field::ObjectArray(_) => {
                self.nested().map(|child| child.get())
            }
        }
    }

    pub fn peek(&self) -> Option<Value> {
        match self {
            Field::Writable(signal) => Some(signal.peek()),
            Field::Readonly(computed) => Some(computed.peek()),
            Field::Event(_) => None,
            Field::Object(_) | Field::Array(_) | Field::ObjectArray(_) => {
                self.nested().map(|child| child.peek())
            }
        }
    }

    /// The container behind a nested field.
    fn nested(&self) -> Option<&dyn Writable<Value>> {
        match self {
            Field::Object(object) => Some(object),
            Field::Array(array) => Some(array),
            Field::ObjectArray(array) => Some(array),
            _ => None,
        }
    }

    pub fn is_readonly(&self) -> bool {
        matches!(self, Field::Readonly(_))
    }
}

impl From<Signal<Value>> for Field {
    fn from(signal: Signal<Value>) -> Self {
        Field::Writable(signal)
    }
}

impl From<Computed<Value>> for Field {
    fn from(computed: Computed<Value>) -> Self {
        Field::Readonly(computed)
    }
}

impl From<Emitter<Value>> for Field {
    fn from(emitter: Emitter<Value>) -> Self {
        Field::Event(emitter)
    }
}

impl From<StateObject> for Field {
    fn from(object: StateObject) -> Self {
        Field::Object(object)
    }
}

impl From<StateArray<Value>> for Field {
    fn from(array: StateArray<Value>) -> Self {
        Field::Array(array)
    }
}

impl From<StateArray<Value, StateObject>> for Field {
    fn from(array: StateArray<Value, StateObject>) -> Self {
        Field::ObjectArray(array)
    }
}

/// A fixed set of named reactive fields.
///
/// # Example
///
/// ```rust
/// use ripple_core::{Computed, Field, Signal, StateObject};
/// use serde_json::json;
///
/// let price = Signal::new(json!(3));
/// let total = {
///     let price = price.clone();
///     Computed::new(move || json!(price.get().as_i64().unwrap_or(0) * 2))
/// };
/// let order = StateObject::new([
///     ("price", Field::from(price)),
///     ("total", Field::from(total)),
/// ]);
///
/// order.set(&json!({ "price": 5 })).unwrap();
/// assert_eq!(order.get()["total"], json!(10));
/// assert!(order.set(&json!({ "total": 1 })).is_err());
/// ```
#[derive(Clone)]
pub struct StateObject {
    fields: Arc<IndexMap<String, Field>>,
    snapshot: Computed<Map<String, Value>>,
}

impl StateObject {
    pub fn new<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Field)>,
        K: Into<String>,
    {
        let fields: Arc<IndexMap<String, Field>> = Arc::new(
            fields
                .into_iter()
                .map(|(name, field)| (name.into(), field))
                .collect(),
        );

        let snapshot = {
            let fields = Arc::clone(&fields);
            Computed::new(move || {
                fields
                    .iter()
                    .filter_map(|(name, field)| field.get().map(|value| (name.clone(), value)))
                    .collect()
            })
        };

        Self { fields, snapshot }
    }

    /// Snapshot of every non-event field, tracked.
    pub fn get(&self) -> Map<String, Value> {
        self.snapshot.get()
    }

    pub fn peek(&self) -> Map<String, Value> {
        self.snapshot.peek()
    }

    /// Apply a partial update.
    ///
    /// `partial` must be a JSON object. Keys naming writable fields are
    /// written, keys naming event fields are emitted, keys naming nested
    /// containers are forwarded to them, unknown keys are ignored. If any
    /// key names a readonly field, here or in a nested composite, the call
    /// fails and nothing is applied.
    pub fn set(&self, partial: &Value) -> Result<()> {
        let partial = Self::as_object(partial)?;
        self.check(partial)?;

        let unknown: Vec<&str> = partial
            .keys()
            .map(String::as_str)
            .filter(|key| !self.fields.contains_key(*key))
            .collect();
        if !unknown.is_empty() {
            tracing::debug!(?unknown, "ignoring unknown fields in partial update");
        }

        batch(|| {
            for (name, field) in self.fields.iter() {
                let Some(value) = partial.get(name) else {
                    continue;
                };
                match field {
                    Field::Writable(signal) => signal.set(value.clone()),
                    Field::Event(emitter) => emitter.emit(value),
                    Field::Readonly(_) => {}
                    Field::Object(_) | Field::Array(_) | Field::ObjectArray(_) => {
                        if let Some(child) = field.nested() {
                            child.set(value.clone());
                        }
                    }
                }
            }
        });
        Ok(())
    }

    fn as_object(value: &Value) -> Result<&Map<String, Value>> {
        match value {
            Value::Object(map) => Ok(map),
            other => Err(StateError::shape("object", other)),
        }
    }

    /// Reject `partial` if it writes a readonly field or a nested container
    /// rejects its part.
    fn check(&self, partial: &Map<String, Value>) -> Result<()> {
        for (name, field) in self.fields.iter() {
            let Some(value) = partial.get(name) else {
                continue;
            };
            if field.is_readonly() {
                return Err(StateError::ReadOnlyField(name.clone()));
            }
            if let Some(child) = field.nested() {
                child.validate(value)?;
            }
        }
        Ok(())
    }

    /// Deserialize the current snapshot into `D`.
    pub fn get_as<D: DeserializeOwned>(&self) -> Result<D> {
        Ok(serde_json::from_value(Value::Object(self.get()))?)
    }

    /// Serialize `value` and apply it as a partial update.
    pub fn set_from<S: Serialize>(&self, value: &S) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set(&value)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn writable(&self, name: &str) -> Option<&Signal<Value>> {
        match self.fields.get(name)? {
            Field::Writable(signal) => Some(signal),
            _ => None,
        }
    }

    pub fn readonly(&self, name: &str) -> Option<&Computed<Value>> {
        match self.fields.get(name)? {
            Field::Readonly(computed) => Some(computed),
            _ => None,
        }
    }

    pub fn event(&self, name: &str) -> Option<&Emitter<Value>> {
        match self.fields.get(name)? {
            Field::Event(emitter) => Some(emitter),
            _ => None,
        }
    }

    pub fn object(&self, name: &str) -> Option<&StateObject> {
        match self.fields.get(name)? {
            Field::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn array(&self, name: &str) -> Option<&StateArray<Value>> {
        match self.fields.get(name)? {
            Field::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn object_array(&self, name: &str) -> Option<&StateArray<Value, StateObject>> {
        match self.fields.get(name)? {
            Field::ObjectArray(array) => Some(array),
            _ => None,
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.fields, &other.fields)
    }

    /// Field names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Readable<Map<String, Value>> for StateObject {
    fn get(&self) -> Map<String, Value> {
        StateObject::get(self)
    }

    fn peek(&self) -> Map<String, Value> {
        StateObject::peek(self)
    }
}

impl Readable<Value> for StateObject {
    fn get(&self) -> Value {
        Value::Object(StateObject::get(self))
    }

    fn peek(&self) -> Value {
        Value::Object(StateObject::peek(self))
    }
}

/// Lets a composite be the slot of a collection or the child of another
/// composite. Writes are partial updates.
impl Writable<Value> for StateObject {
    fn set(&self, value: Value) {
        if let Err(err) = StateObject::set(self, &value) {
            tracing::warn!(%err, "rejected write to composite");
        }
    }

    fn validate(&self, value: &Value) -> Result<()> {
        self.check(Self::as_object(value)?)
    }
}

impl PartialEq for StateObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Index<&str> for StateObject {
    type Output = Field;

    fn index(&self, name: &str) -> &Field {
        match self.fields.get(name) {
            Some(field) => field,
            None => panic!("no field named `{name}`"),
        }
    }
}

impl std::fmt::Debug for StateObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateObject")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("snapshot", &self.peek())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use parking_lot::Mutex;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn person() -> (StateObject, Signal<Value>, Signal<Value>) {
        let first = Signal::new(json!("Ada"));
        let last = Signal::new(json!("Lovelace"));
        let full = {
            let (first, last) = (first.clone(), last.clone());
            Computed::new(move || {
                json!(format!(
                    "{} {}",
                    first.get().as_str().unwrap_or_default(),
                    last.get().as_str().unwrap_or_default()
                ))
            })
        };
        let object = StateObject::new([
            ("first", Field::from(first.clone())),
            ("last", Field::from(last.clone())),
            ("full", Field::from(full)),
        ]);
        (object, first, last)
    }

    #[test]
    fn snapshot_contains_readable_fields_in_order() {
        let (object, _, _) = person();
        let snapshot = object.get();
        let keys: Vec<&String> = snapshot.keys().collect();
        assert_eq!(keys, ["first", "last", "full"]);
        assert_eq!(snapshot["full"], json!("Ada Lovelace"));
    }

    #[test]
    fn partial_update_leaves_other_fields() {
        let (object, first, last) = person();
        object.set(&json!({ "last": "Byron" })).unwrap();

        assert_eq!(first.get(), json!("Ada"));
        assert_eq!(last.get(), json!("Byron"));
        assert_eq!(object.get()["full"], json!("Ada Byron"));
    }

    #[test]
    fn readonly_write_applies_nothing() {
        let (object, first, _) = person();
        let err = object
            .set(&json!({ "first": "Grace", "full": "x" }))
            .unwrap_err();

        assert!(matches!(err, StateError::ReadOnlyField(ref name) if name == "full"));
        assert_eq!(first.get(), json!("Ada"));
    }

    #[test]
    fn non_object_input_is_shape_error() {
        let (object, _, _) = person();
        let err = object.set(&json!(42)).unwrap_err();
        assert!(matches!(err, StateError::Shape { expected: "object", found: "number" }));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let (object, _, _) = person();
        object.set(&json!({ "age": 36 })).unwrap();
        assert!(!object.get().contains_key("age"));
    }

    #[test]
    fn multi_field_update_runs_effect_once() {
        let (object, _, _) = person();
        let runs = Arc::new(AtomicI32::new(0));

        let effect = {
            let (object, runs) = (object.clone(), runs.clone());
            Effect::new(move || {
                object.get();
                runs.fetch_add(1, Ordering::SeqCst);
            })
        };

        object
            .set(&json!({ "first": "Grace", "last": "Hopper" }))
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(object.get()["full"], json!("Grace Hopper"));
        effect.dispose();
    }

    #[test]
    fn event_fields_emit_and_stay_out_of_snapshot() {
        let saved = Emitter::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let log = log.clone();
            saved.subscribe(move |v: &Value| log.lock().push(v.clone()));
        }

        let object = StateObject::new([
            ("name", Field::from(Signal::new(json!("draft")))),
            ("saved", Field::from(saved)),
        ]);

        assert!(!object.get().contains_key("saved"));
        object.set(&json!({ "saved": { "id": 7 } })).unwrap();
        assert_eq!(*log.lock(), vec![json!({ "id": 7 })]);
        assert!(object.event("saved").is_some());
    }

    #[test]
    fn typed_round_trip_through_serde() {
        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Name {
            first: String,
            last: String,
            full: String,
        }

        #[derive(Serialize)]
        struct Rename<'a> {
            first: &'a str,
        }

        let (object, _, _) = person();
        object.set_from(&Rename { first: "Augusta" }).unwrap();

        let name: Name = object.get_as().unwrap();
        assert_eq!(name.full, "Augusta Lovelace");
    }

    #[test]
    fn nested_containers_read_and_write_through_parent() {
        let tags: StateArray<Value> = StateArray::new(|| Signal::new(Value::Null));
        tags.set(vec![json!("a")]);
        let (name, first, _) = person();
        let profile = StateObject::new([
            ("name", Field::from(name)),
            ("tags", Field::from(tags.clone())),
        ]);
        assert_eq!(profile.get()["tags"], json!(["a"]));
        assert_eq!(profile.get()["name"]["full"], json!("Ada Lovelace"));

        profile
            .set(&json!({ "name": { "first": "Grace" }, "tags": ["x", "y"] }))
            .unwrap();
        assert_eq!(first.get(), json!("Grace"));
        assert_eq!(tags.get(), vec![json!("x"), json!("y")]);
        assert_eq!(profile.get()["name"]["full"], json!("Grace Lovelace"));
        assert!(profile.object("name").is_some());
        assert_eq!(profile.array("tags"), Some(&tags));
    }

    #[test]
    fn nested_rejection_applies_nothing() {
        let (name, first, _) = person();
        let title = Signal::new(json!("Countess"));
        let profile = StateObject::new([
            ("title", Field::from(title.clone())),
            ("name", Field::from(name)),
        ]);

        let err = profile
            .set(&json!({ "title": "Dr", "name": { "first": "Grace", "full": "x" } }))
            .unwrap_err();
        assert!(matches!(err, StateError::ReadOnlyField(ref field) if field == "full"));
        assert_eq!(title.get(), json!("Countess"));
        assert_eq!(first.get(), json!("Ada"));

        let err = profile.set(&json!({ "title": "Dr", "name": 3 })).unwrap_err();
        assert!(matches!(err, StateError::Shape { expected: "object", found: "number" }));
        assert_eq!(title.get(), json!("Countess"));
    }

    #[test]
    fn collection_of_composites() {
        let people: StateArray<Value, StateObject> = StateArray::new(|| {
            StateObject::new([
                ("name", Field::from(Signal::new(json!("")))),
                ("age", Field::from(Signal::new(json!(0)))),
            ])
        });

        people
            .set_value(json!([{ "name": "Ada", "age": 36 }, { "name": "Alan" }]))
            .unwrap();
        assert_eq!(
            people.get(),
            vec![json!({ "name": "Ada", "age": 36 }), json!({ "name": "Alan", "age": 0 })]
        );

        let ada = people.slot(0).unwrap();
        people.set_value(json!([{ "age": 37 }])).unwrap();
        assert!(people.slot(0).unwrap().ptr_eq(&ada));
        assert_eq!(ada.get()["name"], json!("Ada"));
        assert_eq!(people.len(), 1);

        let err = people.set_value(json!([{ "age": 1 }, 5])).unwrap_err();
        assert!(matches!(err, StateError::Shape { expected: "object", found: "number" }));
        assert_eq!(ada.get()["age"], json!(37));
    }

    #[test]
    fn composites_compare_by_identity() {
        let (object, _, _) = person();
        let (other, _, _) = person();
        assert_eq!(object, object.clone());
        assert_ne!(object, other);
    }

    #[test]
    fn accessors_match_field_kind() {
        let (object, first, _) = person();
        assert_eq!(object.writable("first"), Some(&first));
        assert!(object.readonly("first").is_none());
        assert!(object.readonly("full").is_some());
        assert!(object["full"].is_readonly());
        assert_eq!(object.names().collect::<Vec<_>>(), ["first", "last", "full"]);
    }
}
