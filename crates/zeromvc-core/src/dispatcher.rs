use crate::access::FullAccess;
use crate::command::{tag_handler, typed_handler, Command, CommandKey, Handler, Payload};
use crate::context::Context;
use crate::control::{Control, ControlRegistry, Controller};
use crate::error::{BoxError, DispatchError};
use crate::lock;
use crate::model::Model;
use futures::future::{try_join_all, BoxFuture};
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// A pending dispatch. Resolves with one value per handler, in registration
/// order.
pub type Dispatch = BoxFuture<'static, Result<Vec<Value>, DispatchError>>;

struct Inner {
    context: Context,
    handlers: Mutex<HashMap<CommandKey, Vec<Handler>>>,
    controls: Mutex<Vec<Arc<dyn Control>>>,
}

/// The command bus.
///
/// `Zeromvc` routes commands to every handler registered for them, runs
/// the registered controls, and hands out model façades. One dispatcher is
/// active per [`Context`] at a time: building a new one tears the previous
/// one down (handlers cleared, models reset) before the new controls start.
/// The context keeps the active dispatcher alive, so dropping every handle
/// does not uninstall it.
///
/// Cloning yields another handle to the same dispatcher.
///
/// # Example
///
/// ```rust,ignore
/// let cx = Context::new();
/// let mvc = Zeromvc::new(&cx, &ControlRegistry::new());
///
/// mvc.on_tag("ping", |args: Vec<Value>| async move {
///     Ok::<_, BoxError>(args.len())
/// });
/// let results = mvc.dispatch_tag("ping", vec![json!(7)]).await?;
/// assert_eq!(results, vec![json!(1)]);
/// ```
#[derive(Clone)]
pub struct Zeromvc {
    inner: Arc<Inner>,
}

impl Zeromvc {
    /// Build a dispatcher, make it the context's active one, and start every
    /// control in `controls`, in registration order.
    pub fn new(context: &Context, controls: &ControlRegistry) -> Self {
        let mvc = Self {
            inner: Arc::new(Inner {
                context: context.clone(),
                handlers: Mutex::new(HashMap::new()),
                controls: Mutex::new(Vec::new()),
            }),
        };

        if let Some(previous) = context.replace_active(&mvc) {
            tracing::debug!("tearing down previous dispatcher");
            previous.teardown();
        }

        let cx = Controller::new(mvc.clone());
        for (name, make) in controls.iter() {
            let control = make();
            control.start(&cx);
            lock(&mvc.inner.controls).push(control);
            tracing::debug!(control = name, "control started");
        }

        mvc
    }

    /// The context this dispatcher belongs to.
    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    /// Whether both handles point at the same dispatcher.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether this is the context's active dispatcher.
    pub fn is_active(&self) -> bool {
        self.inner
            .context
            .active()
            .is_some_and(|active| active.ptr_eq(self))
    }

    /// The control façade of model `M`.
    pub fn model<M: Model>(&self) -> FullAccess<M> {
        self.inner.context.full_access()
    }

    /// Register a handler for command type `C`.
    ///
    /// Handlers run concurrently; the value they resolve with is collected
    /// by [`dispatch`](Zeromvc::dispatch). Registering the same handler
    /// twice runs it twice.
    pub fn on<C, F, Fut, R, E>(&self, handler: F)
    where
        C: Command,
        F: Fn(Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Serialize,
        E: Into<BoxError>,
    {
        self.subscribe(CommandKey::of::<C>(), typed_handler(handler));
    }

    /// Register a handler for the string command `tag`.
    pub fn on_tag<F, Fut, R, E>(&self, tag: impl Into<Cow<'static, str>>, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Serialize,
        E: Into<BoxError>,
    {
        self.subscribe(CommandKey::tag(tag), tag_handler(handler));
    }

    fn subscribe(&self, key: CommandKey, handler: Handler) {
        lock(&self.inner.handlers).entry(key).or_default().push(handler);
    }

    /// Number of handlers registered under `key`.
    pub fn handler_count(&self, key: &CommandKey) -> usize {
        lock(&self.inner.handlers).get(key).map_or(0, Vec::len)
    }

    /// Send `command` to every handler registered for its type.
    ///
    /// See [`dispatch_tag`](Zeromvc::dispatch_tag) for the execution model.
    pub fn dispatch<C: Command>(&self, command: C) -> Dispatch {
        self.run(CommandKey::of::<C>(), Payload::Typed(Arc::new(command)))
    }

    /// Send `args` to every handler registered for `tag`.
    ///
    /// The handler list is captured now. When the returned future is first
    /// polled, every handler is spawned as a tokio task, in registration
    /// order, and the future resolves once all of them succeed. The first
    /// failure resolves it with a [`DispatchError`] instead; handlers still
    /// running keep running, nothing is cancelled. With no handlers it
    /// resolves immediately with an empty list.
    pub fn dispatch_tag(&self, tag: impl Into<Cow<'static, str>>, args: Vec<Value>) -> Dispatch {
        self.run(CommandKey::tag(tag), Payload::Args(args.into()))
    }

    fn run(&self, key: CommandKey, payload: Payload) -> Dispatch {
        let handlers = lock(&self.inner.handlers)
            .get(&key)
            .cloned()
            .unwrap_or_default();
        tracing::trace!(command = %key, handlers = handlers.len(), "dispatch");

        Box::pin(async move {
            if handlers.is_empty() {
                return Ok(Vec::new());
            }
            let tasks: Vec<_> = handlers
                .iter()
                .map(|handler| tokio::spawn(handler(payload.clone())))
                .collect();
            let command = key.to_string();
            try_join_all(tasks.into_iter().map(|task| {
                let command = command.clone();
                async move {
                    match task.await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(source)) => Err(DispatchError::Handler { command, source }),
                        Err(source) => Err(DispatchError::Join { command, source }),
                    }
                }
            }))
            .await
        })
    }

    /// Dispatch `command` in the background. Failures are logged.
    pub fn command<C: Command>(&self, command: C) {
        detach(CommandKey::of::<C>(), self.dispatch(command));
    }

    /// Dispatch the string command `tag` in the background. Failures are
    /// logged.
    pub fn command_tag(&self, tag: impl Into<Cow<'static, str>>, args: Vec<Value>) {
        let key = CommandKey::tag(tag);
        let dispatch = self.run(key.clone(), Payload::Args(args.into()));
        detach(key, dispatch);
    }

    /// Drop every handler and control, reset the context's models and
    /// pending tick changes, and uninstall this dispatcher if it is active.
    pub fn teardown(&self) {
        self.inner.context.release_active(self);
        lock(&self.inner.handlers).clear();
        let controls = std::mem::take(&mut *lock(&self.inner.controls));
        self.inner.context.reset();
        tracing::debug!(controls = controls.len(), "dispatcher torn down");
    }

    /// Run [`Model::start`] again on every live model.
    pub fn restart(&self) {
        self.inner.context.models().restart_all();
    }
}

/// Run `dispatch` on the current tokio runtime without awaiting it.
pub(crate) fn detach(key: CommandKey, dispatch: Dispatch) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::error!(command = %key, "command dropped: no tokio runtime");
        return;
    };
    runtime.spawn(async move {
        if let Err(error) = dispatch.await {
            tracing::error!(command = %key, %error, "command failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct Rename {
        name: String,
    }

    impl Command for Rename {}

    #[derive(Default, Serialize, Deserialize)]
    struct Journal {
        entries: Vec<String>,
        starts: u32,
    }

    impl Model for Journal {
        fn start(&mut self) {
            self.starts += 1;
        }
    }

    fn bare() -> (Context, Zeromvc) {
        let cx = Context::new();
        let mvc = Zeromvc::new(&cx, &ControlRegistry::new());
        (cx, mvc)
    }

    #[tokio::test]
    async fn fan_out_waits_for_every_handler() {
        let (_, mvc) = bare();
        let done = Arc::new(AtomicUsize::new(0));
        for delay in [30u64, 10, 20] {
            let done = done.clone();
            mvc.on_tag("ping", move |args: Vec<Value>| {
                let done = done.clone();
                async move {
                    assert_eq!(args, vec![json!(7)]);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(delay)
                }
            });
        }

        let results = mvc.dispatch_tag("ping", vec![json!(7)]).await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(results, vec![json!(30), json!(10), json!(20)]);
    }

    #[tokio::test]
    async fn no_handlers_resolves_empty() {
        let (_, mvc) = bare();
        assert!(mvc.dispatch_tag("nobody", vec![]).await.unwrap().is_empty());
        assert!(mvc.dispatch(Rename { name: "x".into() }).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn typed_handler_sees_command_fields() {
        let (_, mvc) = bare();
        mvc.on(|cmd: Arc<Rename>| async move { Ok::<_, BoxError>(cmd.name.clone()) });
        let results = mvc.dispatch(Rename { name: "ada".into() }).await.unwrap();
        assert_eq!(results, vec![json!("ada")]);
    }

    #[tokio::test]
    async fn tags_and_types_do_not_collide() {
        let (_, mvc) = bare();
        mvc.on(|_: Arc<Rename>| async { Ok::<_, BoxError>(()) });
        assert_eq!(mvc.handler_count(&CommandKey::of::<Rename>()), 1);
        assert_eq!(mvc.handler_count(&CommandKey::tag("Rename")), 0);
    }

    #[tokio::test]
    async fn first_failure_fails_dispatch_without_cancelling() {
        let (_, mvc) = bare();
        let finished = Arc::new(AtomicBool::new(false));
        mvc.on_tag("save", |_| async { Err::<(), _>("disk full") });
        let flag = finished.clone();
        mvc.on_tag("save", move |_| {
            let flag = flag.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                flag.store(true, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            }
        });

        let err = mvc.dispatch_tag("save", vec![]).await.unwrap_err();
        assert!(matches!(err, DispatchError::Handler { .. }));
        assert!(err.to_string().contains("disk full"));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panicking_handler_is_a_join_error() {
        let (_, mvc) = bare();
        mvc.on_tag("crash", |args: Vec<Value>| async move {
            if args.is_empty() {
                panic!("handler bug");
            }
            Ok::<(), BoxError>(())
        });
        let err = mvc.dispatch_tag("crash", vec![]).await.unwrap_err();
        assert!(matches!(err, DispatchError::Join { .. }));
    }

    #[tokio::test]
    async fn new_dispatcher_tears_down_previous() {
        let cx = Context::new();
        let first = Zeromvc::new(&cx, &ControlRegistry::new());
        first.on_tag("x", |_| async { Ok::<_, BoxError>(()) });
        let journal = first.model::<Journal>();
        journal.update(|j| j.entries.push("old".into())).unwrap();
        assert!(first.is_active());

        let second = Zeromvc::new(&cx, &ControlRegistry::new());
        assert!(second.is_active());
        assert!(!first.is_active());
        assert_eq!(first.handler_count(&CommandKey::tag("x")), 0);

        let fresh = second.model::<Journal>();
        assert!(!fresh.model().ptr_eq(journal.model()));
        assert!(fresh.read(|j| j.entries.is_empty()));
    }

    #[test]
    fn restart_reruns_model_start() {
        let (_, mvc) = bare();
        let journal = mvc.model::<Journal>();
        mvc.restart();
        assert_eq!(journal.read(|j| j.starts), 2);
    }

    #[tokio::test]
    async fn detached_command_logs_failure() {
        let (_, mvc) = bare();
        let ran = Arc::new(AtomicUsize::new(0));
        mvc.on_tag("boom", |_| async { Err::<(), _>("nope") });
        let counter = ran.clone();
        mvc.on_tag("boom", move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            }
        });

        mvc.command_tag("boom", vec![]);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detached_command_without_runtime_is_dropped() {
        let (_, mvc) = bare();
        mvc.on_tag("x", |_| async { Ok::<_, BoxError>(()) });
        mvc.command_tag("x", vec![]);
        mvc.command(Rename { name: "y".into() });
    }
}
