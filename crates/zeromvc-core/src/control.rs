use crate::access::FullAccess;
use crate::bind::{Bindings, FieldBinder, Receiver};
use crate::command::Command;
use crate::context::Context;
use crate::dispatcher::Zeromvc;
use crate::error::BoxError;
use crate::model::Model;
use serde::Serialize;
use serde_json::Value;
use std::any::type_name;
use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

/// A unit of application logic.
///
/// Controls have unrestricted access to models and register command
/// handlers. They are listed in a [`ControlRegistry`] and started by
/// [`Zeromvc::new`], which keeps them alive until teardown.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct CounterControl;
///
/// impl Control for CounterControl {
///     fn start(&self, cx: &Controller) {
///         let counter = cx.model::<Counter>();
///         cx.on_tag("increment", move |_| {
///             let counter = counter.clone();
///             async move {
///                 let count = counter.update(|c| {
///                     c.count += 1;
///                     c.count
///                 })?;
///                 counter.notify("count", &[count.into()]);
///                 Ok::<_, BoxError>(())
///             }
///         });
///     }
/// }
/// ```
pub trait Control: Send + Sync + 'static {
    /// Wire up handlers and initial state.
    fn start(&self, cx: &Controller);
}

type Factory = Arc<dyn Fn() -> Arc<dyn Control> + Send + Sync>;

/// Ordered list of controls to start with a dispatcher.
#[derive(Clone, Default)]
pub struct ControlRegistry {
    entries: Vec<(&'static str, Factory)>,
}

impl ControlRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `C`, built with [`Default`].
    pub fn register<C: Control + Default>(&mut self) -> &mut Self {
        self.register_with(C::default)
    }

    /// Register `C`, built with `make`.
    pub fn register_with<C: Control>(
        &mut self,
        make: impl Fn() -> C + Send + Sync + 'static,
    ) -> &mut Self {
        let factory: Factory = Arc::new(move || Arc::new(make()) as Arc<dyn Control>);
        self.entries.push((type_name::<C>(), factory));
        self
    }

    /// Number of registered controls.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no control is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&'static str, &Factory)> + '_ {
        self.entries.iter().map(|(name, make)| (*name, make))
    }
}

/// What a [`Control`] works through.
#[derive(Clone)]
pub struct Controller {
    mvc: Zeromvc,
}

impl Controller {
    pub(crate) fn new(mvc: Zeromvc) -> Self {
        Self { mvc }
    }

    /// The dispatcher that started this control.
    pub fn dispatcher(&self) -> &Zeromvc {
        &self.mvc
    }

    /// The shared context.
    pub fn context(&self) -> &Context {
        self.mvc.context()
    }

    /// Full access to model `M`.
    pub fn model<M: Model>(&self) -> FullAccess<M> {
        self.mvc.model()
    }

    /// Register a handler for command type `C`. See [`Zeromvc::on`].
    pub fn on<C, F, Fut, R, E>(&self, handler: F)
    where
        C: Command,
        F: Fn(Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Serialize,
        E: Into<BoxError>,
    {
        self.mvc.on(handler)
    }

    /// Register a handler for the string command `tag`.
    pub fn on_tag<F, Fut, R, E>(&self, tag: impl Into<Cow<'static, str>>, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Serialize,
        E: Into<BoxError>,
    {
        self.mvc.on_tag(tag, handler)
    }

    /// Fire `command` without waiting. Failures are logged.
    pub fn command<C: Command>(&self, command: C) {
        self.mvc.command(command)
    }

    /// Fire the string command `tag` without waiting. Failures are logged.
    pub fn command_tag(&self, tag: impl Into<Cow<'static, str>>, args: Vec<Value>) {
        self.mvc.command_tag(tag, args)
    }

    /// Add a binding of model `M` to `target` in `bindings` and return the
    /// full-access façade it was resolved through.
    pub fn bind<M: Model>(
        &self,
        bindings: &mut Bindings,
        target: Arc<dyn Receiver>,
        prefix: &str,
    ) -> FullAccess<M> {
        let model = self.model::<M>();
        bindings.bind(model.model(), target, prefix);
        model
    }

    /// Per-field callbacks on `M`. See [`FieldBinder`].
    pub fn bind_fields<M: Model>(&self) -> FieldBinder<M> {
        self.context().bind_fields()
    }
}
