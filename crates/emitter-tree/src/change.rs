//! Immutable change records delivered to subscribers.
//!
//! Each emitter kind has its own record shape:
//!
//! - [`ValueChange`]: old/new pair for a scalar replacement.
//! - [`ListChange`] / [`ListModification`]: ordered atomic edits of a list.
//! - [`MapChange`] / [`MapModification`]: keyed atomic edits of a map.
//! - [`ContainerChange`] / [`ChildChange`]: dependency changes re-wrapped by
//!   an aggregating container, with the originating emitter attached.
//!
//! A replace is encoded as a modification carrying both the removed and the
//! inserted payload; an insert carries only the inserted one and a remove
//! only the removed one.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::node::DynEmitter;

// ── Scalar ─────────────────────────────────────────────────────────────────

/// One scalar replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueChange<T> {
    pub old: T,
    pub new: T,
    /// Quiet changes still reach the emitter's own subscribers but are
    /// skipped by aggregating containers.
    pub quiet: bool,
}

// ── Ordered container ──────────────────────────────────────────────────────

/// One atomic edit of an ordered container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListModification<T> {
    pub index: usize,
    pub removed: Option<T>,
    pub inserted: Option<T>,
}

impl<T> ListModification<T> {
    pub fn insert(index: usize, value: T) -> Self {
        Self {
            index,
            removed: None,
            inserted: Some(value),
        }
    }

    pub fn remove(index: usize, value: T) -> Self {
        Self {
            index,
            removed: Some(value),
            inserted: None,
        }
    }

    pub fn replace(index: usize, old: T, new: T) -> Self {
        Self {
            index,
            removed: Some(old),
            inserted: Some(new),
        }
    }

    pub fn is_insert(&self) -> bool {
        self.inserted.is_some()
    }

    pub fn is_remove(&self) -> bool {
        self.removed.is_some()
    }

    pub fn is_replace(&self) -> bool {
        self.is_insert() && self.is_remove()
    }
}

/// One flush of an ordered container: every modification recorded since the
/// previous flush, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListChange<T> {
    pub modifications: Rc<[ListModification<T>]>,
    /// `false` when the emitter was configured without detailed changes; the
    /// modification list is then a shared empty sentinel.
    pub detailed: bool,
}

// ── Associative container ──────────────────────────────────────────────────

/// One atomic edit of an associative container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapModification<K, V> {
    pub key: K,
    pub removed: Option<V>,
    pub inserted: Option<V>,
}

impl<K, V> MapModification<K, V> {
    pub fn insert(key: K, value: V) -> Self {
        Self {
            key,
            removed: None,
            inserted: Some(value),
        }
    }

    pub fn remove(key: K, value: V) -> Self {
        Self {
            key,
            removed: Some(value),
            inserted: None,
        }
    }

    pub fn replace(key: K, old: V, new: V) -> Self {
        Self {
            key,
            removed: Some(old),
            inserted: Some(new),
        }
    }

    pub fn is_insert(&self) -> bool {
        self.inserted.is_some()
    }

    pub fn is_remove(&self) -> bool {
        self.removed.is_some()
    }

    pub fn is_replace(&self) -> bool {
        self.is_insert() && self.is_remove()
    }
}

/// One flush of an associative container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapChange<K, V> {
    pub modifications: Rc<[MapModification<K, V>]>,
    pub detailed: bool,
}

// ── Container aggregation ──────────────────────────────────────────────────

/// A change of one dependency as seen by an aggregating container.
///
/// The payload is the dependency's own change record, type-erased; downcast
/// with [`ChildChange::payload_as`] when the detail is needed.
#[derive(Clone)]
pub struct ChildChange {
    pub source: DynEmitter,
    pub payload: Rc<dyn Any>,
    pub quiet: bool,
}

impl ChildChange {
    pub(crate) fn new(source: DynEmitter, payload: Rc<dyn Any>, quiet: bool) -> Self {
        Self {
            source,
            payload,
            quiet,
        }
    }

    /// Downcast the payload to a concrete change record.
    pub fn payload_as<P: 'static>(&self) -> Option<&P> {
        self.payload.downcast_ref::<P>()
    }
}

impl fmt::Debug for ChildChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildChange")
            .field("source", &self.source)
            .field("quiet", &self.quiet)
            .finish()
    }
}

/// One notification of an aggregating container.
///
/// Outside a transaction every dependency change produces its own
/// single-entry record; inside a transaction all buffered changes arrive as
/// one batch. An empty list marks a directly-triggered notification with no
/// contributing dependency.
#[derive(Debug, Clone)]
pub struct ContainerChange {
    pub changes: Vec<ChildChange>,
}

impl ContainerChange {
    /// `true` for a notification raised by an explicit `emit()` call rather
    /// than by a dependency.
    pub fn is_self_triggered(&self) -> bool {
        self.changes.is_empty()
    }
}
