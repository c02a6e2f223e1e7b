//! Build-time method tables and outgoing-call classification.
//!
//! The build pipeline of the surrounding framework emits two name sets, one
//! per call style. The runtime never guesses: a name found in neither set is
//! rejected locally before any frame is produced.

use std::collections::HashSet;
use std::fmt;

/// The two call styles a fully qualified method can have.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    /// One request, one terminal response.
    Request,
    /// One request, an open stream of server-pushed items.
    Subscription,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("request"),
            Self::Subscription => f.write_str("subscription"),
        }
    }
}

/// The externally supplied method-name tables.
///
/// The sets are produced at build time and are mutually exclusive; when a
/// name somehow appears in both, the request set wins.
#[derive(Clone, Debug, Default)]
pub struct MethodSets {
    requests: HashSet<String>,
    subscriptions: HashSet<String>,
}

impl MethodSets {
    /// Build the tables from the two generated name lists.
    pub fn new<R, S>(requests: R, subscriptions: S) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        Self {
            requests: requests.into_iter().map(Into::into).collect(),
            subscriptions: subscriptions.into_iter().map(Into::into).collect(),
        }
    }

    /// Join a namespace and a method name into the wire form.
    #[must_use]
    pub fn qualify(namespace: &str, name: &str) -> String {
        format!("{namespace}.{name}")
    }

    /// Classify a fully qualified method, or `None` when it is unknown.
    #[must_use]
    pub fn classify(&self, method: &str) -> Option<CallKind> {
        if self.requests.contains(method) {
            return Some(CallKind::Request);
        }
        if self.subscriptions.contains(method) {
            return Some(CallKind::Subscription);
        }
        None
    }
}

#[cfg(test)]
#[path = "methods_test.rs"]
mod tests;
