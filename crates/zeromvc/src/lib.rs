//! **zeromvc** -- a minimal Model-View-Control binding framework.
//!
//! This is the umbrella crate that re-exports everything you need to build a
//! zeromvc application from a single dependency:
//!
//! ```toml
//! [dependencies]
//! zeromvc = "0.1"
//! ```
//!
//! # Re-exports
//!
//! * All public items from [`zeromvc_core`] are available at the crate root
//!   ([`Model`], [`Control`], [`View`], [`Zeromvc`], [`Context`], etc.).
//! * [`serde`], [`serde_json`] and [`tokio`] are re-exported so downstream
//!   crates do not need to depend on them directly.
//!
//! # Quick start
//!
//! ```ignore
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//! use zeromvc::*;
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct Greeting { text: String }
//! impl Model for Greeting {}
//!
//! #[tokio::main]
//! async fn main() {
//!     let cx = Context::new();
//!     let _mvc = Zeromvc::new(&cx, &ControlRegistry::new());
//!
//!     let mut view = View::new(&cx);
//!     let target = Slots::new().slot("onText", |args| println!("{}", args[0]));
//!     view.bind::<Greeting>(Arc::new(target), "on");
//!     view.show();
//!
//!     cx.model_ref::<Greeting>().notify("text", &["Hello, zeromvc!".into()]);
//! }
//! ```

pub use zeromvc_core::*;

// Re-export dependencies for use in demos and downstream crates
pub use serde;
pub use serde_json;
pub use tokio;
