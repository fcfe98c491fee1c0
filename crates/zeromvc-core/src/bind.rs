//! Forwarding model changes to consumers.

use crate::lock;
use crate::model::{Model, ModelRef, Subscriber};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Something a binding forwards change notifications to.
///
/// A notification for field `count` on a binding with prefix `on` asks the
/// receiver for its member `onCount` (see [`member_name`]).
pub trait Receiver: Send + Sync + 'static {
    /// Invoke `member` with `args`. Returns `false` if there is no such
    /// member, in which case the notification is dropped.
    fn receive(&self, member: &str, args: &[Value]) -> bool;
}

/// The receiver member a field notification is forwarded to.
///
/// With an empty prefix this is the field name. Otherwise it is the prefix
/// followed by the field name with its first letter upper-cased.
///
/// ```
/// use zeromvc_core::bind::member_name;
///
/// assert_eq!(member_name("on", "count"), "onCount");
/// assert_eq!(member_name("on", "Count"), "onCount");
/// assert_eq!(member_name("", "count"), "count");
/// ```
pub fn member_name(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        return field.to_owned();
    }
    let mut chars = field.chars();
    let mut member = String::with_capacity(prefix.len() + field.len());
    member.push_str(prefix);
    if let Some(first) = chars.next() {
        member.extend(first.to_uppercase());
        member.push_str(chars.as_str());
    }
    member
}

type Slot = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// A [`Receiver`] made of named closures.
///
/// ```
/// use zeromvc_core::bind::{Receiver, Slots};
///
/// let slots = Slots::new().slot("onCount", |args| println!("count = {:?}", args));
/// assert!(slots.receive("onCount", &[1.into()]));
/// assert!(!slots.receive("onOther", &[]));
/// ```
#[derive(Default)]
pub struct Slots {
    slots: Mutex<HashMap<String, Slot>>,
}

impl Slots {
    /// No slots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the slot `member`.
    pub fn slot(self, member: impl Into<String>, f: impl Fn(&[Value]) + Send + Sync + 'static) -> Self {
        self.insert(member, f);
        self
    }

    /// Add (or replace) the slot `member` in place.
    pub fn insert(&self, member: impl Into<String>, f: impl Fn(&[Value]) + Send + Sync + 'static) {
        lock(&self.slots).insert(member.into(), Arc::new(f));
    }

    /// Remove the slot `member`.
    pub fn remove(&self, member: &str) -> bool {
        lock(&self.slots).remove(member).is_some()
    }
}

impl Receiver for Slots {
    fn receive(&self, member: &str, args: &[Value]) -> bool {
        let slot = lock(&self.slots).get(member).cloned();
        match slot {
            Some(slot) => {
                slot(args);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Slots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = lock(&self.slots);
        let mut names: Vec<_> = slots.keys().collect();
        names.sort();
        f.debug_struct("Slots").field("slots", &names).finish()
    }
}

/// Type-erased subscription target.
trait Observable: Send + Sync {
    fn subscribe(&self, subscriber: Subscriber) -> bool;
    fn unsubscribe(&self, subscriber: &Subscriber) -> bool;
}

impl<M: Model> Observable for ModelRef<M> {
    fn subscribe(&self, subscriber: Subscriber) -> bool {
        ModelRef::subscribe(self, subscriber)
    }

    fn unsubscribe(&self, subscriber: &Subscriber) -> bool {
        ModelRef::unsubscribe(self, subscriber)
    }
}

struct Binding {
    model: Box<dyn Observable>,
    forward: Subscriber,
}

/// A set of model-to-receiver bindings, switched on and off together.
///
/// Adding a binding does not activate it; [`show`](Bindings::show) does.
/// Both [`show`](Bindings::show) and [`hide`](Bindings::hide) are idempotent.
#[derive(Default)]
pub struct Bindings {
    entries: Vec<Binding>,
}

impl Bindings {
    /// No bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward changes of `model` to `target`, member names built with
    /// `prefix` (see [`member_name`]).
    pub fn bind<M: Model>(&mut self, model: &ModelRef<M>, target: Arc<dyn Receiver>, prefix: &str) {
        let prefix = prefix.to_owned();
        let forward = Subscriber::new(move |field, args| {
            target.receive(&member_name(&prefix, field), args);
        });
        self.entries.push(Binding {
            model: Box::new(model.clone()),
            forward,
        });
    }

    /// Subscribe every binding.
    pub fn show(&self) {
        for binding in &self.entries {
            binding.model.subscribe(binding.forward.clone());
        }
    }

    /// Unsubscribe every binding.
    pub fn hide(&self) {
        for binding in &self.entries {
            binding.model.unsubscribe(&binding.forward);
        }
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no bindings.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

type FieldCallback = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Per-field callbacks on one model.
///
/// The binder subscribes to the model as soon as it is created. Each
/// notification runs only the callback registered for its field, with the
/// notification's arguments; fields without a callback are ignored. Several
/// binders may watch the same model.
///
/// ```rust,ignore
/// let binder = cx
///     .bind_fields::<Player>()
///     .field("x", |args| println!("x -> {:?}", args))
///     .field("y", |args| println!("y -> {:?}", args));
/// // later
/// binder.unbind();
/// ```
pub struct FieldBinder<M: Model> {
    model: ModelRef<M>,
    fields: Arc<Mutex<HashMap<String, FieldCallback>>>,
    subscriber: Subscriber,
}

impl<M: Model> FieldBinder<M> {
    pub(crate) fn new(model: ModelRef<M>) -> Self {
        let fields: Arc<Mutex<HashMap<String, FieldCallback>>> = Arc::default();
        let lookup = fields.clone();
        let subscriber = Subscriber::new(move |field, args| {
            let callback = lock(&lookup).get(field).cloned();
            if let Some(callback) = callback {
                callback(args);
            }
        });
        model.subscribe(subscriber.clone());
        Self {
            model,
            fields,
            subscriber,
        }
    }

    /// Call `f` with the arguments of every notification for `field`.
    /// Replaces an earlier callback for the same field.
    pub fn field(self, field: impl Into<String>, f: impl Fn(&[Value]) + Send + Sync + 'static) -> Self {
        lock(&self.fields).insert(field.into(), Arc::new(f));
        self
    }

    /// Stop receiving notifications. Returns `false` if already unbound.
    pub fn unbind(&self) -> bool {
        self.model.unsubscribe(&self.subscriber)
    }

    /// Resume after [`unbind`](FieldBinder::unbind). Returns `false` if
    /// already bound.
    pub fn rebind(&self) -> bool {
        self.model.subscribe(self.subscriber.clone())
    }
}
