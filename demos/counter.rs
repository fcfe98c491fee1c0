//! # Counter Example
//!
//! A minimal app walking through the zeromvc loop:
//! - A plain [`Model`] notified explicitly and a ticked one coalesced per tick
//! - A [`Control`] registering typed and string command handlers
//! - A [`View`] bound to both models with [`Slots`], shown and hidden
//!
//! Run with: `cargo run --example counter`
//! (`RUST_LOG=zeromvc_core=debug` shows the dispatcher's logging.)

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use zeromvc::serde_json::Value;
use zeromvc::*;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Counter {
    count: i64,
}

impl Model for Counter {}

/// Position of a cursor moved many times per tick; only the last value of
/// each field reaches the view.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Cursor {
    x: i64,
    y: i64,
}

impl Model for Cursor {
    const TICKED: bool = true;
}

/// Add `by` to the counter.
struct Add {
    by: i64,
}

impl Command for Add {}

#[derive(Default)]
struct CounterControl;

impl Control for CounterControl {
    fn start(&self, cx: &Controller) {
        let counter = cx.model::<Counter>();
        cx.on(move |cmd: Arc<Add>| {
            let counter = counter.clone();
            async move {
                let count = counter.update(|c| {
                    c.count += cmd.by;
                    c.count
                })?;
                counter.notify("count", &[count.into()]);
                Ok::<_, BoxError>(count)
            }
        });

        cx.on_tag("fail", |_| async { Err::<(), _>("this handler always fails") });
    }
}

#[derive(Default)]
struct CursorControl;

impl Control for CursorControl {
    fn start(&self, cx: &Controller) {
        let cursor = cx.model::<Cursor>();
        cx.on_tag("wiggle", move |args: Vec<Value>| {
            let cursor = cursor.clone();
            async move {
                let steps = args.first().and_then(Value::as_i64).unwrap_or(1);
                for step in 1..=steps {
                    cursor.set("x", step.into())?;
                    cursor.set("y", (-step).into())?;
                }
                Ok::<_, BoxError>(())
            }
        });
    }
}

#[tokio::main]
async fn main() -> Result<(), DispatchError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cx = Context::global();
    let mut controls = ControlRegistry::new();
    controls
        .register::<CounterControl>()
        .register::<CursorControl>();
    let mvc = Zeromvc::new(cx, &controls);
    let _ticker = cx.spawn_ticker();

    let target = Arc::new(
        Slots::new()
            .slot("onCount", |args| println!("count -> {}", args[0]))
            .slot("onX", |args| println!("cursor x -> {}", args[0]))
            .slot("onY", |args| println!("cursor y -> {}", args[0])),
    );
    let mut view = View::new(cx);
    let counter = view.bind::<Counter>(target.clone(), "on");
    view.bind::<Cursor>(target, "on");
    view.show();

    let results = mvc.dispatch(Add { by: 2 }).await?;
    println!("handlers returned {:?}", results);

    view.command(Add { by: 3 });
    view.command_tag("wiggle", vec![10.into()]);
    view.command_tag("fail", vec![]);
    tokio::time::sleep(Duration::from_millis(50)).await;

    if let Err(err) = counter.set("count", 0.into()) {
        println!("view write rejected: {}", err);
    }

    view.hide();
    mvc.dispatch(Add { by: 100 }).await?;
    println!("hidden view missed it; count is {}", counter.read(|c| c.count));

    Ok(())
}
