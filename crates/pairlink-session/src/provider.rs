//! Content hook for answering a peer's `REQUEST`.
//!
//! The coordinator doesn't know what resources a game exposes. It asks a
//! [`ContentProvider`]; if the provider knows the id, the `RESPONSE` goes
//! back automatically. Otherwise the request surfaces as
//! [`SessionEvent::Request`](crate::SessionEvent::Request) and the caller
//! answers with [`SessionHandle::respond`](crate::SessionHandle::respond).

use std::collections::HashMap;
use std::future::Future;

/// Resolves resource ids requested by the peer.
///
/// # Example
///
/// ```rust
/// use pairlink_session::ContentProvider;
///
/// struct Rules;
///
/// impl ContentProvider for Rules {
///     async fn resolve(&self, resource_id: &str) -> Option<String> {
///         (resource_id == "rules").then(|| "first to three".to_owned())
///     }
/// }
/// ```
pub trait ContentProvider: Send + Sync + 'static {
    /// Returns the payload for `resource_id`, or `None` to let the caller
    /// decide.
    fn resolve(&self, resource_id: &str) -> impl Future<Output = Option<String>> + Send;
}

/// Answers nothing; every request goes to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContent;

impl ContentProvider for NoContent {
    async fn resolve(&self, _resource_id: &str) -> Option<String> {
        None
    }
}

/// A fixed table of resources.
#[derive(Debug, Clone, Default)]
pub struct StaticContent {
    entries: HashMap<String, String>,
}

impl StaticContent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces one entry.
    pub fn with(mut self, resource_id: impl Into<String>, payload: impl Into<String>) -> Self {
        self.entries.insert(resource_id.into(), payload.into());
        self
    }
}

impl ContentProvider for StaticContent {
    async fn resolve(&self, resource_id: &str) -> Option<String> {
        self.entries.get(resource_id).cloned()
    }
}
