//! Core of the **zeromvc** framework.
//!
//! `zeromvc-core` is a small Model-View-Control binding layer: models hold
//! state, controls change it and handle commands, views read it and get
//! told when it changes.
//!
//! # Key types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Model`] | A state container with named fields |
//! | [`ModelRef`] | Shared handle to a model; unrestricted |
//! | [`ReadOnlyView`] | What views get: reads and `get*` calls only |
//! | [`FullAccess`] / [`TrackingView`] | What controls get; tick-tracked for ticked models |
//! | [`Control`] | Logic unit started by the dispatcher |
//! | [`View`] | Binds models to a [`Receiver`](bind::Receiver), shows and hides |
//! | [`Zeromvc`] | Command bus with concurrent handler fan-out |
//! | [`Context`] | Model registry, tick queue and active dispatcher |
//! | [`Ref`] | Back-reference from a value inside a model to its owner |
//! | [`Recorder`](testing::Recorder) | Headless receiver for tests |
//!
//! # Architecture
//!
//! 1. **register** -- controls are listed in a [`ControlRegistry`].
//! 2. **start** -- [`Zeromvc::new`] becomes the context's active dispatcher
//!    and starts each control, which registers command handlers.
//! 3. **command** -- views and controls send commands; every handler for a
//!    command runs concurrently.
//! 4. **mutate** -- handlers change models through [`FullAccess`] and call
//!    [`notify`](ModelRef::notify), or, for ticked models, let the next
//!    tick flush deliver the coalesced changes.
//! 5. **forward** -- shown view bindings forward each change to the
//!    matching receiver member (`count` -> `onCount`).
//!
//! # Quick example
//!
//! ```ignore
//! use serde::{Deserialize, Serialize};
//! use zeromvc_core::*;
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct Counter { count: i64 }
//! impl Model for Counter {}
//!
//! #[derive(Default)]
//! struct CounterControl;
//! impl Control for CounterControl {
//!     fn start(&self, cx: &Controller) {
//!         let counter = cx.model::<Counter>();
//!         cx.on_tag("increment", move |_| {
//!             let counter = counter.clone();
//!             async move {
//!                 let count = counter.update(|c| { c.count += 1; c.count })?;
//!                 counter.notify("count", &[count.into()]);
//!                 Ok::<_, BoxError>(())
//!             }
//!         });
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let cx = Context::new();
//!     let mut controls = ControlRegistry::new();
//!     controls.register::<CounterControl>();
//!     let _mvc = Zeromvc::new(&cx, &controls);
//!
//!     let mut view = View::new(&cx);
//!     let target = Slots::new().slot("onCount", |args| println!("count = {}", args[0]));
//!     view.bind::<Counter>(std::sync::Arc::new(target), "on");
//!     view.show();
//!     view.command_tag("increment", vec![]);
//! }
//! ```

pub mod access;
pub mod bind;
pub mod command;
pub mod config;
pub mod context;
pub mod control;
pub mod dispatcher;
pub mod error;
pub mod model;
pub mod pool;
pub mod reference;
pub mod testing;
pub mod tick;
pub mod view;

pub use access::{FullAccess, ModelAccess, ReadOnlyView, TrackingView};
pub use bind::{member_name, Bindings, FieldBinder, Receiver, Slots};
pub use command::{Command, CommandKey};
pub use config::Config;
pub use context::Context;
pub use control::{Control, ControlRegistry, Controller};
pub use dispatcher::{Dispatch, Zeromvc};
pub use error::{Access, BoxError, DispatchError, ModelError};
pub use model::{Model, ModelRef, Subscriber};
pub use pool::{InstancePool, Lifecycle};
pub use reference::Ref;
pub use tick::{TickQueue, Ticker};
pub use view::View;

use std::sync::{Mutex, MutexGuard};

/// Lock, recovering the data if a previous holder panicked.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
