use crate::error::BoxError;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::any::{type_name, Any, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A typed message routed to every handler registered for its type.
///
/// Commands are ephemeral: built, dispatched, handled, dropped. Handlers
/// receive the command behind an [`Arc`].
///
/// # Example
///
/// ```rust,ignore
/// struct AddTodo {
///     title: String,
/// }
///
/// impl Command for AddTodo {}
///
/// mvc.on(|cmd: Arc<AddTodo>| async move {
///     println!("adding {}", cmd.title);
///     Ok::<_, BoxError>(())
/// });
/// mvc.dispatch(AddTodo { title: "milk".into() }).await?;
/// ```
pub trait Command: Any + Send + Sync {}

/// Identity a handler is registered under.
///
/// Typed commands are keyed by their Rust type; string commands by their
/// tag. The two never collide.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CommandKey {
    /// A [`Command`] type.
    Type { id: TypeId, name: &'static str },
    /// A string tag.
    Tag(Cow<'static, str>),
}

impl CommandKey {
    /// Key of a command type.
    pub fn of<C: Command>() -> Self {
        CommandKey::Type {
            id: TypeId::of::<C>(),
            name: type_name::<C>(),
        }
    }

    /// Key of a string-tagged command.
    pub fn tag(tag: impl Into<Cow<'static, str>>) -> Self {
        CommandKey::Tag(tag.into())
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKey::Type { name, .. } => f.write_str(name),
            CommandKey::Tag(tag) => write!(f, "{tag:?}"),
        }
    }
}

/// What a handler is invoked with.
#[derive(Clone)]
pub(crate) enum Payload {
    Typed(Arc<dyn Any + Send + Sync>),
    Args(Arc<[Value]>),
}

pub(crate) type Handler =
    Arc<dyn Fn(Payload) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
#[error("payload does not match handler for {expected}")]
struct PayloadMismatch {
    expected: &'static str,
}

fn mismatch(expected: &'static str) -> BoxFuture<'static, Result<Value, BoxError>> {
    Box::pin(async move { Err(Box::new(PayloadMismatch { expected }) as BoxError) })
}

fn finish<Fut, R, E>(fut: Fut) -> BoxFuture<'static, Result<Value, BoxError>>
where
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Serialize,
    E: Into<BoxError>,
{
    Box::pin(async move {
        let out = fut.await.map_err(Into::<BoxError>::into)?;
        Ok(serde_json::to_value(out)?)
    })
}

pub(crate) fn typed_handler<C, F, Fut, R, E>(handler: F) -> Handler
where
    C: Command,
    F: Fn(Arc<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Serialize,
    E: Into<BoxError>,
{
    Arc::new(move |payload: Payload| match payload {
        Payload::Typed(command) => match command.downcast::<C>() {
            Ok(command) => finish(handler(command)),
            Err(_) => mismatch(type_name::<C>()),
        },
        Payload::Args(_) => mismatch(type_name::<C>()),
    })
}

pub(crate) fn tag_handler<F, Fut, R, E>(handler: F) -> Handler
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Serialize,
    E: Into<BoxError>,
{
    Arc::new(move |payload: Payload| match payload {
        Payload::Args(args) => finish(handler(args.to_vec())),
        Payload::Typed(_) => mismatch("a tagged command"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Ping;
    impl Command for Ping {}

    struct Pong;
    impl Command for Pong {}

    #[test]
    fn key_equality() {
        assert_eq!(CommandKey::of::<Ping>(), CommandKey::of::<Ping>());
        assert_ne!(CommandKey::of::<Ping>(), CommandKey::of::<Pong>());
        assert_eq!(CommandKey::tag("ping"), CommandKey::tag(String::from("ping")));
        assert_ne!(CommandKey::tag("ping"), CommandKey::tag("pong"));
    }

    #[test]
    fn key_display() {
        assert_eq!(CommandKey::tag("ping").to_string(), "\"ping\"");
        assert!(CommandKey::of::<Ping>().to_string().ends_with("Ping"));
    }

    #[tokio::test]
    async fn typed_handler_serializes_result() {
        let handler = typed_handler(|_: Arc<Ping>| async { Ok::<_, BoxError>(5) });
        let out = handler(Payload::Typed(Arc::new(Ping))).await.unwrap();
        assert_eq!(out, json!(5));
    }

    #[tokio::test]
    async fn tag_handler_receives_args() {
        let handler = tag_handler(|args: Vec<Value>| async move { Ok::<_, BoxError>(args) });
        let out = handler(Payload::Args(vec![json!(7)].into())).await.unwrap();
        assert_eq!(out, json!([7]));
    }

    #[tokio::test]
    async fn wrong_payload_is_an_error() {
        let handler = typed_handler(|_: Arc<Ping>| async { Ok::<_, BoxError>(()) });
        assert!(handler(Payload::Typed(Arc::new(Pong))).await.is_err());
        assert!(handler(Payload::Args(Vec::new().into())).await.is_err());
    }
}
