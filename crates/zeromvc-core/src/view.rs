use crate::access::ReadOnlyView;
use crate::bind::{Bindings, FieldBinder, Receiver};
use crate::command::{Command, CommandKey};
use crate::context::Context;
use crate::model::{Model, ModelRef};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;

/// A consumer of models.
///
/// A view reads models through [`ReadOnlyView`]s, keeps a list of bindings
/// that forward model changes to a [`Receiver`], and sends commands to the
/// context's active [`Zeromvc`](crate::Zeromvc). Bindings only deliver
/// between [`show`](View::show) and [`hide`](View::hide).
///
/// # Example
///
/// ```rust,ignore
/// let target = Arc::new(Slots::new().slot("onCount", |args| println!("{:?}", args)));
///
/// let mut view = View::new(&cx);
/// view.bind::<Counter>(target, "on");
/// view.show();
/// view.command_tag("increment", vec![]);
/// ```
pub struct View {
    context: Context,
    bindings: Bindings,
    shown: bool,
}

impl View {
    /// A view with no bindings, hidden.
    pub fn new(context: &Context) -> Self {
        Self {
            context: context.clone(),
            bindings: Bindings::new(),
            shown: false,
        }
    }

    /// The shared context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Read-only access to model `M`.
    pub fn model<M: Model>(&self) -> ReadOnlyView<M> {
        self.context.read_only()
    }

    /// Bind model `M` to `target` and return the view façade it was
    /// resolved through.
    ///
    /// The binding starts delivering on the next [`show`](View::show).
    pub fn bind<M: Model>(&mut self, target: Arc<dyn Receiver>, prefix: &str) -> ReadOnlyView<M> {
        let model = self.model::<M>();
        self.bindings.bind(&self.context.model_ref::<M>(), target, prefix);
        model
    }

    /// Bind a model instance the view already holds.
    pub fn bind_model<M: Model>(&mut self, model: &ModelRef<M>, target: Arc<dyn Receiver>, prefix: &str) {
        self.bindings.bind(model, target, prefix);
    }

    /// Start delivering to every binding.
    pub fn show(&mut self) {
        self.bindings.show();
        self.shown = true;
    }

    /// Stop delivering. Safe to call at any time, any number of times.
    pub fn hide(&mut self) {
        self.bindings.hide();
        self.shown = false;
    }

    /// Whether the view is shown.
    pub fn is_shown(&self) -> bool {
        self.shown
    }

    /// Number of bindings.
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Per-field callbacks on `M`. See [`FieldBinder`].
    pub fn bind_fields<M: Model>(&self) -> FieldBinder<M> {
        self.context.bind_fields()
    }

    /// Fire `command` on the active dispatcher without waiting. Failures
    /// are logged.
    pub fn command<C: Command>(&self, command: C) {
        match self.context.active() {
            Some(mvc) => mvc.command(command),
            None => {
                tracing::warn!(command = %CommandKey::of::<C>(), "no active dispatcher, command dropped")
            }
        }
    }

    /// Fire the string command `tag` on the active dispatcher without
    /// waiting. Failures are logged.
    pub fn command_tag(&self, tag: impl Into<Cow<'static, str>>, args: Vec<Value>) {
        match self.context.active() {
            Some(mvc) => mvc.command_tag(tag, args),
            None => {
                tracing::warn!(command = %CommandKey::tag(tag), "no active dispatcher, command dropped")
            }
        }
    }
}
