//! Process-wide framework state.

use crate::access::{FullAccess, ReadOnlyView};
use crate::bind::FieldBinder;
use crate::config::Config;
use crate::dispatcher::Zeromvc;
use crate::lock;
use crate::model::{Model, ModelCell, ModelRef};
use crate::pool::InstancePool;
use crate::tick::{TickQueue, Ticker};
use std::sync::{Arc, Mutex, OnceLock};

static GLOBAL: OnceLock<Context> = OnceLock::new();

struct Inner {
    config: Config,
    models: InstancePool,
    ticks: TickQueue,
    active: Mutex<Option<Zeromvc>>,
}

/// The state a running application shares: the model registry, the tick
/// queue, the configuration and the currently active [`Zeromvc`].
///
/// Cloning yields another handle to the same state. Applications usually
/// use [`Context::global`]; tests build a fresh context each so they do not
/// interfere.
///
/// The context keeps its active dispatcher alive, and the dispatcher holds
/// the context. Call [`shutdown`](Context::shutdown) to release both when a
/// non-global context is done.
///
/// # Example
///
/// ```rust,ignore
/// let cx = Context::new();
/// let mut controls = ControlRegistry::new();
/// controls.register::<CounterControl>();
/// let mvc = Zeromvc::new(&cx, &controls);
/// let _ticker = cx.spawn_ticker();
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// A context with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// A context with custom configuration.
    pub fn with_config(config: Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                models: InstancePool::new(),
                ticks: TickQueue::new(),
                active: Mutex::new(None),
            }),
        }
    }

    /// The process-wide default context, created on first use with
    /// [`Config::default`].
    pub fn global() -> &'static Context {
        GLOBAL.get_or_init(Context::new)
    }

    /// Configuration this context was built with.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Registry of model singletons.
    pub fn models(&self) -> &InstancePool {
        &self.inner.models
    }

    /// The dirty queue of ticked models.
    pub fn ticks(&self) -> &TickQueue {
        &self.inner.ticks
    }

    /// Whether both handles share the same state.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The unrestricted handle to the singleton of `M`, creating it on first
    /// use.
    pub fn model_ref<M: Model>(&self) -> ModelRef<M> {
        let cell = self
            .inner
            .models
            .get_or_create_shared(|| ModelCell::new(M::default()));
        ModelRef::from_cell(cell)
    }

    /// The control façade of `M`.
    pub fn full_access<M: Model>(&self) -> FullAccess<M> {
        FullAccess::new(self.model_ref(), &self.inner.ticks)
    }

    /// The view façade of `M`. Strict unless [`Config::strict`] is off.
    pub fn read_only<M: Model>(&self) -> ReadOnlyView<M> {
        ReadOnlyView::with_strict(self.model_ref(), self.inner.config.strict)
    }

    /// Start a per-field subscription on `M`. See [`FieldBinder`].
    pub fn bind_fields<M: Model>(&self) -> FieldBinder<M> {
        FieldBinder::new(self.model_ref())
    }

    /// The active dispatcher, if one is installed.
    pub fn active(&self) -> Option<Zeromvc> {
        lock(&self.inner.active).clone()
    }

    /// Install `mvc` as active and hand back the one it replaces.
    pub(crate) fn replace_active(&self, mvc: &Zeromvc) -> Option<Zeromvc> {
        lock(&self.inner.active).replace(mvc.clone())
    }

    /// Uninstall `mvc` if it is the active dispatcher.
    pub(crate) fn release_active(&self, mvc: &Zeromvc) {
        let mut active = lock(&self.inner.active);
        if active.as_ref().is_some_and(|current| current.ptr_eq(mvc)) {
            *active = None;
        }
    }

    /// Tear down the active dispatcher, if any, and leave the context
    /// without one. Models and pending tick changes are dropped.
    pub fn shutdown(&self) {
        let active = lock(&self.inner.active).take();
        match active {
            Some(mvc) => mvc.teardown(),
            None => self.reset(),
        }
    }

    /// Deliver pending tick changes now. See [`TickQueue::flush`].
    pub fn flush(&self) -> usize {
        self.inner.ticks.flush()
    }

    /// Flush the tick queue every [`Config::tick_interval`] until the
    /// returned [`Ticker`] is dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn_ticker(&self) -> Ticker {
        Ticker::spawn(self.inner.ticks.clone(), self.inner.config.tick_interval)
    }

    /// Drop every model singleton and every undelivered tick change.
    pub fn reset(&self) {
        self.inner.models.reset();
        self.inner.ticks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::ModelAccess;
    use crate::control::ControlRegistry;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Default, Serialize, Deserialize)]
    struct Settings {
        volume: i64,
    }

    impl Model for Settings {}

    #[derive(Default, Serialize, Deserialize)]
    struct Hooked {
        inits: u32,
        starts: u32,
    }

    impl Model for Hooked {
        fn init(&mut self) {
            self.inits += 1;
        }

        fn start(&mut self) {
            self.starts += 1;
        }
    }

    #[test]
    fn model_is_a_singleton() {
        let cx = Context::new();
        let a = cx.model_ref::<Settings>();
        let b = cx.model_ref::<Settings>();
        assert!(a.ptr_eq(&b));
        assert!(cx.full_access::<Settings>().model().ptr_eq(&a));
    }

    #[test]
    fn model_hooks_run_on_creation_and_restart() {
        let cx = Context::new();
        let model = cx.model_ref::<Hooked>();
        assert_eq!(model.read(|m| (m.inits, m.starts)), (1, 1));

        cx.models().restart_all();
        assert_eq!(model.read(|m| (m.inits, m.starts)), (1, 2));
    }

    #[test]
    fn reset_rebuilds_models() {
        let cx = Context::new();
        let old = cx.model_ref::<Settings>();
        old.update(|s| s.volume = 11);

        cx.reset();
        let new = cx.model_ref::<Settings>();
        assert!(!old.ptr_eq(&new));
        assert_eq!(new.read(|s| s.volume), 0);
    }

    #[test]
    fn contexts_are_isolated() {
        let a = Context::new();
        let b = Context::new();
        a.model_ref::<Settings>().update(|s| s.volume = 3);
        assert_eq!(b.model_ref::<Settings>().read(|s| s.volume), 0);
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn read_only_follows_strict_flag() {
        let strict = Context::new();
        assert!(strict.read_only::<Settings>().set("volume", json!(1)).is_err());

        let lenient = Context::with_config(Config {
            strict: false,
            ..Config::default()
        });
        lenient.read_only::<Settings>().set("volume", json!(1)).unwrap();
        assert_eq!(lenient.model_ref::<Settings>().read(|s| s.volume), 1);
    }

    #[test]
    fn global_is_shared() {
        assert!(Context::global().ptr_eq(Context::global()));
    }

    #[test]
    fn no_active_dispatcher_by_default() {
        assert!(Context::new().active().is_none());
    }

    #[derive(Default, Serialize, Deserialize)]
    struct Pointer {
        x: i64,
    }

    impl Model for Pointer {
        const TICKED: bool = true;
    }

    #[test]
    fn reset_drops_pending_ticks() {
        let cx = Context::new();
        let pointer = cx.full_access::<Pointer>();
        let recorder = crate::testing::Recorder::new();
        pointer.subscribe(recorder.subscriber());
        pointer.set("x", json!(4)).unwrap();
        assert_eq!(cx.ticks().len(), 1);

        cx.reset();
        assert!(cx.ticks().is_empty());
        assert_eq!(cx.flush(), 0);
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn replacing_dispatcher_drops_pending_ticks() {
        let cx = Context::new();
        let _first = Zeromvc::new(&cx, &ControlRegistry::new());
        cx.full_access::<Pointer>().set("x", json!(1)).unwrap();
        assert_eq!(cx.ticks().len(), 1);

        let _second = Zeromvc::new(&cx, &ControlRegistry::new());
        assert!(cx.ticks().is_empty());
        assert_eq!(cx.model_ref::<Pointer>().read(|p| p.x), 0);
    }

    #[test]
    fn active_dispatcher_outlives_its_handle() {
        let cx = Context::new();
        {
            let mvc = Zeromvc::new(&cx, &ControlRegistry::new());
            mvc.on_tag("x", |_| async { Ok::<_, crate::BoxError>(()) });
        }
        let active = cx.active().unwrap();
        assert!(active.is_active());
        assert_eq!(active.handler_count(&crate::CommandKey::tag("x")), 1);
    }

    #[test]
    fn dropped_dispatcher_is_still_torn_down_on_replacement() {
        let cx = Context::new();
        {
            let mvc = Zeromvc::new(&cx, &ControlRegistry::new());
            mvc.model::<Settings>().update(|s| s.volume = 42).unwrap();
        }
        Zeromvc::new(&cx, &ControlRegistry::new());
        assert_eq!(cx.model_ref::<Settings>().read(|s| s.volume), 0);
    }

    #[test]
    fn shutdown_uninstalls_and_resets() {
        let cx = Context::new();
        let mvc = Zeromvc::new(&cx, &ControlRegistry::new());
        mvc.on_tag("x", |_| async { Ok::<_, crate::BoxError>(()) });
        cx.model_ref::<Settings>().update(|s| s.volume = 7);

        cx.shutdown();
        assert!(cx.active().is_none());
        assert!(!mvc.is_active());
        assert_eq!(mvc.handler_count(&crate::CommandKey::tag("x")), 0);
        assert_eq!(cx.model_ref::<Settings>().read(|s| s.volume), 0);
    }
}
