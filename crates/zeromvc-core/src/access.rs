//! Capability façades over a model.
//!
//! Every façade implements [`ModelAccess`], the by-name surface of a model.
//! Which one you get decides what you may do:
//!
//! | Façade | Given to | Writes | Calls | Tick tracking |
//! |--------|----------|--------|-------|---------------|
//! | [`ModelRef`] | [`Context::model_ref`](crate::Context::model_ref) | yes | any | no |
//! | [`TrackingView`] | controls of ticked models | yes | any | yes |
//! | [`ReadOnlyView`] | views | no | `get*` only | no |
//!
//! Controls receive a [`FullAccess`], which is a [`ModelRef`] for plain
//! models and a [`TrackingView`] for ticked ones.

use crate::error::{Access, ModelError};
use crate::model::{model_name, Model, ModelRef, Subscriber};
use crate::tick::TickQueue;
use serde_json::{Map, Value};

/// By-name access to a model's fields and methods.
pub trait ModelAccess {
    /// Read a field.
    fn get(&self, field: &str) -> Result<Value, ModelError>;

    /// Write a field.
    fn set(&self, field: &str, value: Value) -> Result<(), ModelError>;

    /// Remove a field, resetting it to absent. Only optional fields can be
    /// removed.
    fn delete(&self, field: &str) -> Result<(), ModelError>;

    /// Invoke a method through [`Model::call`].
    fn call(&self, method: &str, args: &[Value]) -> Result<Value, ModelError>;

    /// Write every field of `fields`, in order, stopping at the first error.
    fn assign(&self, fields: Map<String, Value>) -> Result<(), ModelError> {
        for (field, value) in fields {
            self.set(&field, value)?;
        }
        Ok(())
    }
}

impl<M: Model> ModelAccess for ModelRef<M> {
    fn get(&self, field: &str) -> Result<Value, ModelError> {
        self.get_field(field)
    }

    fn set(&self, field: &str, value: Value) -> Result<(), ModelError> {
        self.write_field(field, value, false).map(|_| ())
    }

    fn delete(&self, field: &str) -> Result<(), ModelError> {
        self.delete_field(field)
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value, ModelError> {
        self.call_method(method, args)
    }
}

/// The view façade: reads only.
///
/// Writes, deletes and calls to methods not starting with `get` fail with
/// [`ModelError::AccessViolation`] and leave the model untouched. In a
/// non-strict context (see [`Config::strict`](crate::Config::strict)) the
/// guard is off and every operation passes through.
pub struct ReadOnlyView<M: Model> {
    model: ModelRef<M>,
    strict: bool,
}

impl<M: Model> Clone for ReadOnlyView<M> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            strict: self.strict,
        }
    }
}

impl<M: Model> ReadOnlyView<M> {
    /// A strict read-only view of `model`.
    pub fn new(model: ModelRef<M>) -> Self {
        Self::with_strict(model, true)
    }

    pub(crate) fn with_strict(model: ModelRef<M>, strict: bool) -> Self {
        Self { model, strict }
    }

    /// Whether writes are rejected.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Read the model.
    pub fn read<R>(&self, f: impl FnOnce(&M) -> R) -> R {
        self.model.read(f)
    }

    /// Add a change subscriber. Returns `false` if already subscribed.
    pub fn subscribe(&self, subscriber: Subscriber) -> bool {
        self.model.subscribe(subscriber)
    }

    /// Remove a change subscriber.
    pub fn unsubscribe(&self, subscriber: &Subscriber) -> bool {
        self.model.unsubscribe(subscriber)
    }

    /// Whether both views wrap the same instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.model.ptr_eq(&other.model)
    }

    fn deny(&self, member: &str, access: Access) -> ModelError {
        ModelError::AccessViolation {
            model: model_name::<M>(),
            member: member.to_owned(),
            access,
        }
    }
}

impl<M: Model> ModelAccess for ReadOnlyView<M> {
    fn get(&self, field: &str) -> Result<Value, ModelError> {
        self.model.get(field)
    }

    fn set(&self, field: &str, value: Value) -> Result<(), ModelError> {
        if self.strict {
            return Err(self.deny(field, Access::Write));
        }
        self.model.set(field, value)
    }

    fn delete(&self, field: &str) -> Result<(), ModelError> {
        if self.strict {
            return Err(self.deny(field, Access::Delete));
        }
        self.model.delete(field)
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value, ModelError> {
        if self.strict && !method.starts_with("get") {
            return Err(self.deny(method, Access::Call));
        }
        self.model.call(method, args)
    }
}

/// The control façade of a ticked model.
///
/// A write that changes a field queues a delivery of the new value for the
/// next tick. Calling a method queues a delivery under the method's name
/// carrying the call arguments; this lets a method act as a derived field
/// (`setRange(a, b)` notifies subscribers of `"setRange"` with `[a, b]`).
/// Names starting with `_` are never queued.
pub struct TrackingView<M: Model> {
    model: ModelRef<M>,
    queue: TickQueue,
}

impl<M: Model> Clone for TrackingView<M> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            queue: self.queue.clone(),
        }
    }
}

impl<M: Model> TrackingView<M> {
    /// Track writes to `model` on `queue`.
    pub fn new(model: ModelRef<M>, queue: TickQueue) -> Self {
        Self { model, queue }
    }

    /// The underlying handle. Writes through it are not tracked.
    pub fn model(&self) -> &ModelRef<M> {
        &self.model
    }

    /// Read the model.
    pub fn read<R>(&self, f: impl FnOnce(&M) -> R) -> R {
        self.model.read(f)
    }

    /// Mutate the model and queue every field whose value changed.
    pub fn update<R>(&self, f: impl FnOnce(&mut M) -> R) -> Result<R, ModelError> {
        let (out, changed) = self.model.update_diff(f)?;
        for (field, value) in changed {
            self.track(&field, vec![value]);
        }
        Ok(out)
    }

    fn track(&self, name: &str, args: Vec<Value>) {
        if name.starts_with('_') {
            return;
        }
        self.model.mark_pending(name, args);
        self.queue.push(self.model.as_flush());
    }
}

impl<M: Model> ModelAccess for TrackingView<M> {
    fn get(&self, field: &str) -> Result<Value, ModelError> {
        self.model.get(field)
    }

    fn set(&self, field: &str, value: Value) -> Result<(), ModelError> {
        if self.model.write_field(field, value.clone(), true)? {
            self.track(field, vec![value]);
        }
        Ok(())
    }

    fn delete(&self, field: &str) -> Result<(), ModelError> {
        self.model.delete(field)
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value, ModelError> {
        let out = self.model.call(method, args)?;
        self.track(method, args.to_vec());
        Ok(out)
    }
}

/// What a control gets from [`Controller::model`](crate::Controller::model).
pub enum FullAccess<M: Model> {
    /// A plain model, notified explicitly.
    Direct(ModelRef<M>),
    /// A ticked model, notified on the next flush.
    Tracking(TrackingView<M>),
}

impl<M: Model> Clone for FullAccess<M> {
    fn clone(&self) -> Self {
        match self {
            FullAccess::Direct(model) => FullAccess::Direct(model.clone()),
            FullAccess::Tracking(view) => FullAccess::Tracking(view.clone()),
        }
    }
}

impl<M: Model> FullAccess<M> {
    pub(crate) fn new(model: ModelRef<M>, queue: &TickQueue) -> Self {
        if M::TICKED {
            FullAccess::Tracking(TrackingView::new(model, queue.clone()))
        } else {
            FullAccess::Direct(model)
        }
    }

    /// The underlying handle.
    pub fn model(&self) -> &ModelRef<M> {
        match self {
            FullAccess::Direct(model) => model,
            FullAccess::Tracking(view) => view.model(),
        }
    }

    /// Whether writes are tick-tracked.
    pub fn is_tracking(&self) -> bool {
        matches!(self, FullAccess::Tracking(_))
    }

    /// Read the model.
    pub fn read<R>(&self, f: impl FnOnce(&M) -> R) -> R {
        self.model().read(f)
    }

    /// Mutate the model. Ticked models queue the fields that changed; plain
    /// models notify nothing and never fail.
    pub fn update<R>(&self, f: impl FnOnce(&mut M) -> R) -> Result<R, ModelError> {
        match self {
            FullAccess::Direct(model) => Ok(model.update(f)),
            FullAccess::Tracking(view) => view.update(f),
        }
    }

    /// Notify subscribers right away. See [`ModelRef::notify`].
    pub fn notify(&self, field: &str, args: &[Value]) {
        self.model().notify(field, args)
    }

    /// Add a change subscriber.
    pub fn subscribe(&self, subscriber: Subscriber) -> bool {
        self.model().subscribe(subscriber)
    }

    /// Remove a change subscriber.
    pub fn unsubscribe(&self, subscriber: &Subscriber) -> bool {
        self.model().unsubscribe(subscriber)
    }
}

impl<M: Model> ModelAccess for FullAccess<M> {
    fn get(&self, field: &str) -> Result<Value, ModelError> {
        self.model().get(field)
    }

    fn set(&self, field: &str, value: Value) -> Result<(), ModelError> {
        match self {
            FullAccess::Direct(model) => model.set(field, value),
            FullAccess::Tracking(view) => view.set(field, value),
        }
    }

    fn delete(&self, field: &str) -> Result<(), ModelError> {
        self.model().delete(field)
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value, ModelError> {
        match self {
            FullAccess::Direct(model) => model.call(method, args),
            FullAccess::Tracking(view) => view.call(method, args),
        }
    }
}
