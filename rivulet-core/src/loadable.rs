//! Values that may not be available yet.
//!
//! A computation that depends on data which has not arrived returns
//! [`Loadable::Pending`] instead of unwinding. Readers match on the result,
//! and the usual combinators let a pending input flow through derived values
//! without special cases.

use serde::{Deserialize, Serialize};

/// Either a ready value or a marker that it is still loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Loadable<T> {
    Ready(T),
    #[default]
    Pending,
}

impl<T> Loadable<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Loadable::Ready(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Loadable::Pending)
    }

    /// The value, if ready.
    pub fn ready(self) -> Option<T> {
        match self {
            Loadable::Ready(value) => Some(value),
            Loadable::Pending => None,
        }
    }

    pub fn as_ref(&self) -> Loadable<&T> {
        match self {
            Loadable::Ready(value) => Loadable::Ready(value),
            Loadable::Pending => Loadable::Pending,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Loadable<U> {
        match self {
            Loadable::Ready(value) => Loadable::Ready(f(value)),
            Loadable::Pending => Loadable::Pending,
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> Loadable<U>) -> Loadable<U> {
        match self {
            Loadable::Ready(value) => f(value),
            Loadable::Pending => Loadable::Pending,
        }
    }

    /// Ready only when both are ready.
    pub fn zip<U>(self, other: Loadable<U>) -> Loadable<(T, U)> {
        match (self, other) {
            (Loadable::Ready(a), Loadable::Ready(b)) => Loadable::Ready((a, b)),
            _ => Loadable::Pending,
        }
    }

    pub fn unwrap_or(self, default: T) -> T {
        self.ready().unwrap_or(default)
    }

    pub fn unwrap_or_else(self, f: impl FnOnce() -> T) -> T {
        self.ready().unwrap_or_else(f)
    }
}

impl<T> From<Option<T>> for Loadable<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Loadable::Ready(value),
            None => Loadable::Pending,
        }
    }
}

impl<T> From<Loadable<T>> for Option<T> {
    fn from(value: Loadable<T>) -> Self {
        value.ready()
    }
}

impl<T> FromIterator<Loadable<T>> for Loadable<Vec<T>> {
    /// Ready with every value when all items are ready, pending otherwise.
    fn from_iter<I: IntoIterator<Item = Loadable<T>>>(iter: I) -> Self {
        iter.into_iter()
            .map(Loadable::ready)
            .collect::<Option<Vec<T>>>()
            .into()
    }
}
