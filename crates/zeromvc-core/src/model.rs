use crate::error::ModelError;
use crate::lock;
use crate::pool::Lifecycle;
use crate::reference::{Owner, Ref};
use crate::tick::Flush;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::type_name;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

/// A reactive state container.
///
/// A model is a plain struct whose fields serialize to a JSON object. The
/// object keys are the model's *fields*: they are what façades read and
/// write by name and what change notifications carry.
///
/// Exactly one instance of each model type lives in a
/// [`Context`](crate::Context) at a time. It is built with [`Default`] on
/// first lookup, then [`init`](Model::init) and [`start`](Model::start) run.
///
/// Writing a field by name round-trips the whole model through serde, so
/// fields marked `#[serde(skip)]` are reset to their default on every named
/// write. Keep such fields out of models that are written by name. The same
/// round trip means a float field holding NaN or an infinity (which
/// serialize as `null`) makes every later named write fail with
/// [`ModelError::InvalidValue`] until the field is set through
/// [`ModelRef::update`]. Per-frame models written by name pay for a full
/// serialization on each write; prefer `update` for them.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use serde_json::Value;
/// use zeromvc_core::{Model, ModelError};
///
/// #[derive(Default, Serialize, Deserialize)]
/// struct Counter {
///     count: i64,
/// }
///
/// impl Model for Counter {
///     fn call(&mut self, method: &str, args: &[Value]) -> Result<Value, ModelError> {
///         match method {
///             "getCount" => Ok(self.count.into()),
///             "reset" => {
///                 self.count = 0;
///                 Ok(Value::Null)
///             }
///             _ => Err(ModelError::UnknownMethod {
///                 model: "Counter",
///                 method: method.to_owned(),
///             }),
///         }
///     }
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Default + Send + 'static {
    /// Batch notifications and deliver them on the next tick.
    ///
    /// Controls of a ticked model get a
    /// [`TrackingView`](crate::access::TrackingView): every changed field
    /// (and every called method) is queued and delivered to subscribers on
    /// the next [`TickQueue::flush`](crate::tick::TickQueue::flush), with the
    /// latest value per field winning.
    const TICKED: bool = false;

    /// Runs once after construction, after [`refs`](Model::refs) are wired.
    fn init(&mut self) {}

    /// Runs after [`init`](Model::init) and again on every restart.
    fn start(&mut self) {}

    /// Fields holding a [`Ref`], with their field names.
    ///
    /// When the model is created, and again after every named write, each
    /// listed [`Ref`] is linked to this model with the field name as its
    /// key path.
    fn refs(&self) -> Vec<(&'static str, &Ref)> {
        Vec::new()
    }

    /// Invoke a named method.
    ///
    /// Views may only call methods whose name starts with `get`. On ticked
    /// models, calling a method not starting with `_` also notifies
    /// subscribers under the method's name, with the call arguments as
    /// payload.
    fn call(&mut self, method: &str, args: &[Value]) -> Result<Value, ModelError> {
        let _ = args;
        Err(ModelError::UnknownMethod {
            model: model_name::<Self>(),
            method: method.to_owned(),
        })
    }
}

/// Short type name used in errors and logs.
pub(crate) fn model_name<M>() -> &'static str {
    let full = type_name::<M>();
    full.rsplit("::").next().unwrap_or(full)
}

type Callback = dyn Fn(&str, &[Value]) + Send + Sync;

/// A change callback, called with `(field, args)`.
///
/// Subscribers compare by identity: clones of one `Subscriber` are equal,
/// two subscribers built from the same closure code are not.
#[derive(Clone)]
pub struct Subscriber(Arc<Callback>);

impl Subscriber {
    /// Wrap a callback.
    pub fn new(callback: impl Fn(&str, &[Value]) + Send + Sync + 'static) -> Self {
        Self(Arc::new(callback))
    }

    pub(crate) fn call(&self, field: &str, args: &[Value]) {
        (self.0)(field, args)
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl Eq for Subscriber {}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscriber")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

pub(crate) struct ModelCell<M> {
    me: Weak<ModelCell<M>>,
    state: Mutex<M>,
    subscribers: Mutex<Vec<Subscriber>>,
    pending: Mutex<IndexMap<String, Vec<Value>>>,
}

impl<M: Model> ModelCell<M> {
    pub(crate) fn new(model: M) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            state: Mutex::new(model),
            subscribers: Mutex::new(Vec::new()),
            pending: Mutex::new(IndexMap::new()),
        })
    }

    fn wire_refs(&self, model: &M) {
        for (field, reference) in model.refs() {
            reference.link(model_name::<M>(), vec![field.to_owned()], self.me.clone());
        }
    }

    fn notify(&self, field: &str, args: &[Value]) {
        for subscriber in self.subscribers() {
            subscriber.call(field, args);
        }
    }
}

impl<M: Model> Lifecycle for ModelCell<M> {
    fn init(&self) {
        let mut state = lock(&self.state);
        self.wire_refs(&state);
        state.init();
    }

    fn start(&self) {
        lock(&self.state).start();
    }
}

impl<M: Model> Flush for ModelCell<M> {
    fn take_pending(&self) -> IndexMap<String, Vec<Value>> {
        std::mem::take(&mut *lock(&self.pending))
    }

    fn subscribers(&self) -> Vec<Subscriber> {
        lock(&self.subscribers).clone()
    }

    fn model_name(&self) -> &'static str {
        model_name::<M>()
    }
}

impl<M: Model> Owner for ModelCell<M> {
    fn notify(&self, field: &str, args: &[Value]) {
        ModelCell::notify(self, field, args)
    }
}

/// Shared handle to a model instance.
///
/// This is the unrestricted façade: it reads, writes and invokes freely and
/// never queues tick notifications on its own. Obtain one from
/// [`Context::model_ref`](crate::Context::model_ref), or wrap a standalone
/// value with [`ModelRef::detached`].
pub struct ModelRef<M: Model> {
    cell: Arc<ModelCell<M>>,
}

impl<M: Model> Clone for ModelRef<M> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<M: Model> fmt::Debug for ModelRef<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRef")
            .field("model", &model_name::<M>())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<M: Model> ModelRef<M> {
    pub(crate) fn from_cell(cell: Arc<ModelCell<M>>) -> Self {
        Self { cell }
    }

    /// Wrap a model that does not live in any context.
    ///
    /// [`Ref`] fields are wired; [`Model::init`] and [`Model::start`] are
    /// not run.
    pub fn detached(model: M) -> Self {
        let cell = ModelCell::new(model);
        cell.wire_refs(&lock(&cell.state));
        Self::from_cell(cell)
    }

    /// Whether both handles point at the same instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    /// Read the model.
    pub fn read<R>(&self, f: impl FnOnce(&M) -> R) -> R {
        f(&lock(&self.cell.state))
    }

    /// Mutate the model directly.
    ///
    /// Nothing is notified; call [`notify`](ModelRef::notify) afterwards
    /// when the change should be observed.
    pub fn update<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        f(&mut lock(&self.cell.state))
    }

    /// Add a subscriber. Returns `false` if it was already subscribed.
    pub fn subscribe(&self, subscriber: Subscriber) -> bool {
        let mut subscribers = lock(&self.cell.subscribers);
        if subscribers.contains(&subscriber) {
            return false;
        }
        subscribers.push(subscriber);
        true
    }

    /// Remove a subscriber. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, subscriber: &Subscriber) -> bool {
        let mut subscribers = lock(&self.cell.subscribers);
        let before = subscribers.len();
        subscribers.retain(|existing| existing != subscriber);
        subscribers.len() != before
    }

    /// Number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.cell.subscribers).len()
    }

    /// Call every subscriber with `(field, args)`, synchronously.
    ///
    /// Subscribers are snapshotted first, so a callback may read the model,
    /// subscribe or unsubscribe without deadlocking.
    pub fn notify(&self, field: &str, args: &[Value]) {
        self.cell.notify(field, args)
    }

    /// All fields as a JSON object.
    pub fn fields(&self) -> Result<Map<String, Value>, ModelError> {
        to_fields(&*lock(&self.cell.state))
    }

    pub(crate) fn get_field(&self, field: &str) -> Result<Value, ModelError> {
        let mut fields = self.fields()?;
        fields
            .remove(field)
            .ok_or_else(|| ModelError::UnknownField {
                model: model_name::<M>(),
                field: field.to_owned(),
            })
    }

    /// Write one field. With `only_if_changed`, an equal value is left alone.
    /// Returns whether the model was written.
    pub(crate) fn write_field(
        &self,
        field: &str,
        value: Value,
        only_if_changed: bool,
    ) -> Result<bool, ModelError> {
        let mut state = lock(&self.cell.state);
        let mut fields = to_fields(&*state)?;
        match fields.get_mut(field) {
            None => {
                return Err(ModelError::UnknownField {
                    model: model_name::<M>(),
                    field: field.to_owned(),
                })
            }
            Some(current) if only_if_changed && *current == value => return Ok(false),
            Some(current) => *current = value,
        }
        *state = from_fields(fields)?;
        self.cell.wire_refs(&state);
        Ok(true)
    }

    pub(crate) fn delete_field(&self, field: &str) -> Result<(), ModelError> {
        let mut state = lock(&self.cell.state);
        let mut fields = to_fields(&*state)?;
        if fields.remove(field).is_none() {
            return Err(ModelError::UnknownField {
                model: model_name::<M>(),
                field: field.to_owned(),
            });
        }
        *state = from_fields(fields)?;
        self.cell.wire_refs(&state);
        Ok(())
    }

    pub(crate) fn call_method(&self, method: &str, args: &[Value]) -> Result<Value, ModelError> {
        lock(&self.cell.state).call(method, args)
    }

    /// Mutate through `f` and report which fields changed, with new values.
    pub(crate) fn update_diff<R>(
        &self,
        f: impl FnOnce(&mut M) -> R,
    ) -> Result<(R, Vec<(String, Value)>), ModelError> {
        let mut state = lock(&self.cell.state);
        let before = to_fields(&*state)?;
        let out = f(&mut state);
        let after = to_fields(&*state)?;
        let changed = after
            .into_iter()
            .filter(|(field, value)| before.get(field) != Some(value))
            .collect();
        Ok((out, changed))
    }

    /// Record a pending tick delivery, replacing any earlier one for `field`.
    pub(crate) fn mark_pending(&self, field: &str, args: Vec<Value>) {
        lock(&self.cell.pending).insert(field.to_owned(), args);
    }

    pub(crate) fn as_flush(&self) -> Arc<dyn Flush> {
        self.cell.clone()
    }
}

fn to_fields<M: Model>(model: &M) -> Result<Map<String, Value>, ModelError> {
    match serde_json::to_value(model) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(ModelError::NotAnObject {
            model: model_name::<M>(),
        }),
        Err(source) => Err(ModelError::InvalidValue {
            model: model_name::<M>(),
            source,
        }),
    }
}

fn from_fields<M: Model>(fields: Map<String, Value>) -> Result<M, ModelError> {
    serde_json::from_value(Value::Object(fields)).map_err(|source| ModelError::InvalidValue {
        model: model_name::<M>(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Default, Serialize, Deserialize)]
    struct Counter {
        count: i64,
        label: Option<String>,
    }

    impl Model for Counter {}

    fn recording() -> (Subscriber, Arc<Mutex<Vec<(String, Vec<Value>)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let subscriber = Subscriber::new(move |field, args| {
            sink.lock().unwrap().push((field.to_owned(), args.to_vec()));
        });
        (subscriber, log)
    }

    #[test]
    fn subscribe_is_idempotent() {
        let model = ModelRef::detached(Counter::default());
        let (subscriber, log) = recording();
        assert!(model.subscribe(subscriber.clone()));
        assert!(!model.subscribe(subscriber.clone()));
        assert_eq!(model.subscriber_count(), 1);

        model.notify("count", &[json!(1)]);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let model = ModelRef::detached(Counter::default());
        let (subscriber, log) = recording();
        model.subscribe(subscriber.clone());
        assert!(model.unsubscribe(&subscriber));
        assert!(!model.unsubscribe(&subscriber));

        model.notify("count", &[json!(1)]);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn notify_passes_field_and_args() {
        let model = ModelRef::detached(Counter::default());
        let (subscriber, log) = recording();
        model.subscribe(subscriber);
        model.notify("count", &[json!(3), json!("x")]);
        assert_eq!(
            log.lock().unwrap().as_slice(),
            &[("count".to_owned(), vec![json!(3), json!("x")])]
        );
    }

    #[test]
    fn distinct_closures_are_distinct_subscribers() {
        let model = ModelRef::detached(Counter::default());
        model.subscribe(Subscriber::new(|_, _| {}));
        model.subscribe(Subscriber::new(|_, _| {}));
        assert_eq!(model.subscriber_count(), 2);
    }

    #[test]
    fn subscriber_may_reenter_model() {
        let model = ModelRef::detached(Counter::default());
        let inner = model.clone();
        let seen = Arc::new(Mutex::new(None));
        let out = seen.clone();
        model.subscribe(Subscriber::new(move |_, _| {
            *out.lock().unwrap() = Some(inner.read(|c| c.count));
        }));
        model.update(|c| c.count = 9);
        model.notify("count", &[]);
        assert_eq!(*seen.lock().unwrap(), Some(9));
    }

    #[test]
    fn update_does_not_notify() {
        let model = ModelRef::detached(Counter::default());
        let (subscriber, log) = recording();
        model.subscribe(subscriber);
        model.update(|c| c.count = 5);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(model.read(|c| c.count), 5);
    }

    #[test]
    fn write_field_by_name() {
        let model = ModelRef::detached(Counter::default());
        assert!(model.write_field("count", json!(4), false).unwrap());
        assert_eq!(model.get_field("count").unwrap(), json!(4));
        assert!(!model.write_field("count", json!(4), true).unwrap());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let model = ModelRef::detached(Counter::default());
        let err = model.write_field("missing", json!(1), false).unwrap_err();
        assert!(matches!(err, ModelError::UnknownField { .. }));
        assert!(model.get_field("missing").is_err());
    }

    #[test]
    fn wrong_type_leaves_model_untouched() {
        let model = ModelRef::detached(Counter::default());
        let err = model.write_field("count", json!("ten"), false).unwrap_err();
        assert!(matches!(err, ModelError::InvalidValue { .. }));
        assert_eq!(model.read(|c| c.count), 0);
    }

    #[test]
    fn delete_optional_field() {
        let model = ModelRef::detached(Counter {
            count: 1,
            label: Some("a".into()),
        });
        model.delete_field("label").unwrap();
        assert_eq!(model.read(|c| c.label.clone()), None);
        assert!(model.delete_field("count").is_err());
        assert_eq!(model.read(|c| c.count), 1);
    }

    #[test]
    fn default_call_is_unknown_method() {
        let model = ModelRef::detached(Counter::default());
        let err = model.call_method("doThing", &[]).unwrap_err();
        assert!(matches!(err, ModelError::UnknownMethod { .. }));
    }

    #[test]
    fn update_diff_reports_changed_fields() {
        let model = ModelRef::detached(Counter::default());
        let (_, changed) = model
            .update_diff(|c| {
                c.count = 2;
            })
            .unwrap();
        assert_eq!(changed, vec![("count".to_owned(), json!(2))]);
    }

    #[derive(Default, Serialize, Deserialize)]
    struct Gauge {
        level: f64,
        label: String,
    }

    impl Model for Gauge {}

    #[test]
    fn nan_field_blocks_named_writes_until_updated() {
        let gauge = ModelRef::detached(Gauge::default());
        gauge.update(|g| g.level = f64::NAN);

        let err = gauge.write_field("label", json!("hot"), false).unwrap_err();
        assert!(matches!(err, ModelError::InvalidValue { .. }));
        assert_eq!(gauge.read(|g| g.label.clone()), "");

        gauge.update(|g| g.level = 1.5);
        assert!(gauge.write_field("label", json!("hot"), false).unwrap());
    }

    #[test]
    fn model_name_is_short() {
        assert_eq!(model_name::<Counter>(), "Counter");
    }
}
