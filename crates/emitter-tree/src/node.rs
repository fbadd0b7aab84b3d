//! Shared per-node machinery: subscriber registries, the erased emitter
//! handle, parent links and ancestor lookup.
//!
//! Every concrete emitter owns a [`NodeCore`] and implements the crate-private
//! [`ErasedEmitter`] trait; [`DynEmitter`] is the cheap-`Clone` type-erased
//! handle built from that trait object. Nodes are single-threaded
//! `Rc`/`RefCell` values; the parent link is a `Weak` back-reference so a
//! container and its children never form an ownership cycle.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::change::ChildChange;
use crate::container::{Compose, Container, ContainerInner};
use crate::error::EmitterError;

// ── Listeners ──────────────────────────────────────────────────────────────

/// Multicast subscriber registry for one change-record type.
///
/// Ids are handed out monotonically; delivery snapshots the current entries
/// and re-checks membership per callback, so a subscriber removed while a
/// notification is in flight is not invoked, and one added mid-notification
/// only sees the next one.
pub(crate) struct Listeners<C: 'static> {
    next_id: Cell<u64>,
    entries: RefCell<BTreeMap<u64, Rc<RefCell<dyn FnMut(&C)>>>>,
}

impl<C: 'static> Listeners<C> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: Cell::new(1),
            entries: RefCell::new(BTreeMap::new()),
        }
    }

    pub(crate) fn add(&self, callback: impl FnMut(&C) + 'static) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id.saturating_add(1));
        let cb: Rc<RefCell<dyn FnMut(&C)>> = Rc::new(RefCell::new(callback));
        self.entries.borrow_mut().insert(id, cb);
        id
    }

    pub(crate) fn remove(&self, id: u64) -> bool {
        self.entries.borrow_mut().remove(&id).is_some()
    }

    pub(crate) fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    pub(crate) fn emit(&self, change: &C) {
        if self.entries.borrow().is_empty() {
            return;
        }
        let snapshot: Vec<(u64, Rc<RefCell<dyn FnMut(&C)>>)> = self
            .entries
            .borrow()
            .iter()
            .map(|(id, cb)| (*id, Rc::clone(cb)))
            .collect();
        for (id, cb) in snapshot {
            // Skip entries cancelled by an earlier callback of this round.
            if !self.entries.borrow().contains_key(&id) {
                continue;
            }
            // A callback still running further down the stack (a subscriber
            // whose own mutation re-entered delivery) is not invoked twice.
            if let Ok(mut cb) = cb.try_borrow_mut() {
                (&mut *cb)(change);
            }
        }
    }
}

// ── Subscription ───────────────────────────────────────────────────────────

/// RAII guard for one subscription; dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancel explicitly. Equivalent to dropping the guard.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ── NodeCore ───────────────────────────────────────────────────────────────

/// State shared by every emitter kind: disposal flag, parent back-reference,
/// the exact-type facet used for ancestor lookup, and the erased propagation
/// channel tapped by aggregating containers.
pub(crate) struct NodeCore {
    disposed: Cell<bool>,
    parent: RefCell<Option<Weak<dyn ErasedEmitter>>>,
    facet: RefCell<Option<(TypeId, Weak<dyn Any>)>>,
    pub(crate) forwarders: Listeners<ChildChange>,
}

impl NodeCore {
    pub(crate) fn new() -> Self {
        Self {
            disposed: Cell::new(false),
            parent: RefCell::new(None),
            facet: RefCell::new(None),
            forwarders: Listeners::new(),
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Flip the disposal flag. A second disposal is a contract violation and
    /// fails fast in debug builds.
    pub(crate) fn mark_disposed(&self) {
        debug_assert!(!self.disposed.get(), "emitter disposed twice");
        self.disposed.set(true);
        self.forwarders.clear();
        *self.parent.borrow_mut() = None;
    }

    pub(crate) fn ensure_alive(&self) -> Result<(), EmitterError> {
        if self.disposed.get() {
            Err(EmitterError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Development-time guard for read paths.
    pub(crate) fn debug_alive(&self) {
        debug_assert!(!self.disposed.get(), "use of disposed emitter");
    }

    pub(crate) fn set_parent(&self, parent: Option<Weak<dyn ErasedEmitter>>) {
        *self.parent.borrow_mut() = parent;
    }

    pub(crate) fn parent_node(&self) -> Option<Rc<dyn ErasedEmitter>> {
        self.parent.borrow().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set_facet(&self, ty: TypeId, instance: Weak<dyn Any>) {
        *self.facet.borrow_mut() = Some((ty, instance));
    }

    pub(crate) fn facet_instance(&self, ty: TypeId) -> Option<Rc<dyn Any>> {
        match &*self.facet.borrow() {
            Some((facet_ty, instance)) if *facet_ty == ty => instance.upgrade(),
            _ => None,
        }
    }

    /// Push an erased change to whoever aggregates this node.
    pub(crate) fn forward(&self, change: &ChildChange) {
        self.forwarders.emit(change);
    }
}

// ── Erased emitter ─────────────────────────────────────────────────────────

/// Object-safe view of an emitter used by the tree machinery.
pub(crate) trait ErasedEmitter: 'static {
    fn core(&self) -> &NodeCore;

    /// Dispose this node and everything it owns.
    fn dispose_erased(&self);

    /// Set the parent back-reference and cascade registration through any
    /// owned children. `this` is the handle of the node itself (needed so
    /// children can point back at it).
    fn register_erased(&self, this: &DynEmitter, parent: Option<&DynEmitter>) {
        self.core()
            .set_parent(parent.map(DynEmitter::downgrade));
        let _ = this;
    }
}

/// Type-erased handle to any emitter in a tree.
#[derive(Clone)]
pub struct DynEmitter {
    pub(crate) inner: Rc<dyn ErasedEmitter>,
}

impl DynEmitter {
    pub(crate) fn new(inner: Rc<dyn ErasedEmitter>) -> Self {
        Self { inner }
    }

    pub(crate) fn core(&self) -> &NodeCore {
        self.inner.core()
    }

    pub(crate) fn downgrade(&self) -> Weak<dyn ErasedEmitter> {
        Rc::downgrade(&self.inner)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.core().is_disposed()
    }

    pub fn dispose(&self) {
        self.inner.dispose_erased();
    }

    /// Attach this node (and its owned subtree) under `parent`.
    ///
    /// A node has at most one parent at a time; calling this again moves the
    /// back-reference, which is only legal as part of an explicit move
    /// between containers.
    pub fn register(&self, parent: &DynEmitter) {
        self.inner.register_erased(self, Some(parent));
    }

    pub(crate) fn register_root(&self) {
        self.inner.register_erased(self, None);
    }

    /// Identity comparison: two handles are the same when they point at the
    /// same node.
    pub fn same(&self, other: &DynEmitter) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.inner), Rc::as_ptr(&other.inner))
    }

    /// Walk the parent chain and return the nearest container whose state is
    /// exactly `C`.
    ///
    /// Matching is by exact type identity, not by any subtype notion: each
    /// container registers the `TypeId` of its state type, and the walk
    /// compares against that.
    pub fn find_ancestor<C: Compose>(&self) -> Option<Container<C>> {
        let mut current = self.core().parent_node();
        while let Some(node) = current {
            if let Some(instance) = node.core().facet_instance(TypeId::of::<C>()) {
                if let Ok(inner) = instance.downcast::<ContainerInner<C>>() {
                    return Some(Container::from_inner(inner));
                }
            }
            current = node.core().parent_node();
        }
        None
    }
}

impl PartialEq for DynEmitter {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for DynEmitter {}

impl fmt::Debug for DynEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynEmitter")
            .field("node", &Rc::as_ptr(&self.inner))
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Subscribe to a node's erased propagation channel.
pub(crate) fn subscribe_forward(
    dep: &DynEmitter,
    callback: impl FnMut(&ChildChange) + 'static,
) -> Subscription {
    let id = dep.core().forwarders.add(callback);
    let weak = dep.downgrade();
    Subscription::new(move || {
        if let Some(node) = weak.upgrade() {
            node.core().forwarders.remove(id);
        }
    })
}
