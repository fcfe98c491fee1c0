//! Back-references from values stored inside a model to the model itself.

use crate::lock;
use crate::model::{Model, ModelCell, ModelRef};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

/// The notifying side of a model, type-erased.
pub(crate) trait Owner: Send + Sync {
    fn notify(&self, field: &str, args: &[Value]);
}

#[derive(Clone)]
struct Link {
    model: &'static str,
    keys: Vec<String>,
    owner: Weak<dyn Owner>,
    cell: Weak<dyn Any + Send + Sync>,
}

/// A slot that learns which model, and which key path inside it, holds it.
///
/// Put a `Ref` in a model field (directly or inside a container) and list
/// it in [`Model::refs`]. When the model is created the framework links it
/// to the model with the field name as key path. A container can pass the
/// link down to its own children with [`link_child`](Ref::link_child), so
/// nested values know their full path and can notify through the owner.
///
/// Clones share the link. A `Ref` holds its model weakly and serializes as
/// `null`; deserializing yields an unlinked `Ref`, which the model relinks
/// after every named write.
///
/// ```rust,ignore
/// #[derive(Default, Serialize, Deserialize)]
/// struct Inventory {
///     slots: Ref,
/// }
///
/// impl Model for Inventory {
///     fn refs(&self) -> Vec<(&'static str, &Ref)> {
///         vec![("slots", &self.slots)]
///     }
/// }
///
/// let inventory = cx.model_ref::<Inventory>();
/// let slots = inventory.read(|i| i.slots.clone());
/// assert_eq!(slots.keys(), ["slots"]);
/// slots.notify(&[json!("changed")]);
/// ```
#[derive(Clone, Default)]
pub struct Ref {
    link: Arc<Mutex<Option<Link>>>,
}

impl Ref {
    /// An unlinked reference.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the reference has been linked to a model.
    pub fn is_linked(&self) -> bool {
        lock(&self.link).is_some()
    }

    /// Name of the owning model type, once linked.
    pub fn model_name(&self) -> Option<&'static str> {
        lock(&self.link).as_ref().map(|link| link.model)
    }

    /// Key path from the owning model to this reference. Empty until linked.
    pub fn keys(&self) -> Vec<String> {
        lock(&self.link)
            .as_ref()
            .map(|link| link.keys.clone())
            .unwrap_or_default()
    }

    /// The owning model, if it is `M` and still alive.
    pub fn owner<M: Model>(&self) -> Option<ModelRef<M>> {
        let cell = lock(&self.link).as_ref()?.cell.upgrade()?;
        cell.downcast::<ModelCell<M>>().ok().map(ModelRef::from_cell)
    }

    /// Link `child` under this reference's path, extended by `key`.
    ///
    /// Returns `false`, leaving `child` untouched, while this reference is
    /// unlinked.
    pub fn link_child(&self, key: impl Into<String>, child: &Ref) -> bool {
        let Some(mut link) = lock(&self.link).clone() else {
            return false;
        };
        link.keys.push(key.into());
        *lock(&child.link) = Some(link);
        true
    }

    /// Notify the owning model's subscribers under the first key of the
    /// path, the model field holding this reference.
    ///
    /// Returns `false` if unlinked or if the model is gone.
    pub fn notify(&self, args: &[Value]) -> bool {
        let Some((field, owner)) = lock(&self.link)
            .as_ref()
            .and_then(|link| Some((link.keys.first()?.clone(), link.owner.upgrade()?)))
        else {
            return false;
        };
        owner.notify(&field, args);
        true
    }

    pub(crate) fn link<M: Model>(
        &self,
        model: &'static str,
        keys: Vec<String>,
        cell: Weak<ModelCell<M>>,
    ) {
        let owner: Weak<dyn Owner> = cell.clone();
        let cell: Weak<dyn Any + Send + Sync> = cell;
        *lock(&self.link) = Some(Link {
            model,
            keys,
            owner,
            cell,
        });
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*lock(&self.link) {
            Some(link) => f
                .debug_struct("Ref")
                .field("model", &link.model)
                .field("keys", &link.keys)
                .finish(),
            None => f.write_str("Ref(unlinked)"),
        }
    }
}

impl Serialize for Ref {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_unit()
    }
}

impl<'de> Deserialize<'de> for Ref {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IgnoredAny::deserialize(deserializer)?;
        Ok(Ref::new())
    }
}
