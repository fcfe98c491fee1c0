use crate::bind::Receiver;
use crate::lock;
use crate::model::Subscriber;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// A recorded call: member (or field) name and arguments.
pub type Call = (String, Vec<Value>);

/// A headless stand-in for a view target.
///
/// `Recorder` implements [`Receiver`] and remembers every member call it
/// accepts, so tests can assert on what a binding forwarded without
/// building a real consumer. It can also hand out a [`Subscriber`] that
/// records raw `(field, args)` notifications.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use zeromvc_core::bind::Receiver;
/// use zeromvc_core::testing::Recorder;
///
/// let target = Recorder::accepting(["onCount"]);
/// assert!(target.receive("onCount", &[json!(1)]));
/// assert!(!target.receive("onOther", &[]));
/// assert_eq!(target.calls_to("onCount"), vec![vec![json!(1)]]);
/// ```
#[derive(Debug, Default)]
pub struct Recorder {
    accept: Option<HashSet<String>>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Recorder {
    /// Accept and record every member.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept only the listed members; others are reported missing.
    pub fn accepting<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accept: Some(members.into_iter().map(Into::into).collect()),
            calls: Arc::default(),
        }
    }

    /// Every accepted call so far, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    /// Arguments of every call to `member`, oldest first.
    pub fn calls_to(&self, member: &str) -> Vec<Vec<Value>> {
        lock(&self.calls)
            .iter()
            .filter(|(name, _)| name == member)
            .map(|(_, args)| args.clone())
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        lock(&self.calls).clear();
    }

    /// A subscriber that records `(field, args)` into this recorder,
    /// bypassing the accept list.
    pub fn subscriber(&self) -> Subscriber {
        let calls = self.calls.clone();
        Subscriber::new(move |field, args| {
            lock(&calls).push((field.to_owned(), args.to_vec()));
        })
    }
}

impl Receiver for Recorder {
    fn receive(&self, member: &str, args: &[Value]) -> bool {
        if let Some(accept) = &self.accept {
            if !accept.contains(member) {
                return false;
            }
        }
        lock(&self.calls).push((member.to_owned(), args.to_vec()));
        true
    }
}
