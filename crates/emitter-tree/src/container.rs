//! Composite emitter: a node aggregating a declared set of child emitters.
//!
//! The state type implements [`Compose`] to declare its children (owned,
//! disposed with the container) and its dependencies (the subset whose
//! changes make the container re-emit; defaults to the children). The
//! container merges the dependencies' propagation channels into its own
//! change stream, dropping changes tagged quiet, and coalesces everything
//! arriving inside an open transaction into a single notification.
//!
//! [`Container::root`] runs the recursive registration pass immediately, so
//! ancestor lookups are valid as soon as the tree is built.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::change::{ChildChange, ContainerChange};
use crate::emitter::Emitter;
use crate::node::{subscribe_forward, DynEmitter, ErasedEmitter, Listeners, NodeCore, Subscription};

/// Declared shape of a composite node.
pub trait Compose: 'static {
    /// Every emitter this node owns. Disposing the container disposes each
    /// of these.
    fn children(&self) -> Vec<DynEmitter>;

    /// The children whose changes this node re-emits. Override to own an
    /// emitter without listening to it.
    fn dependencies(&self) -> Vec<DynEmitter> {
        self.children()
    }

    /// Called after this node's registration pass completes: the parent link
    /// is set and every declared child is registered, so ancestor lookups
    /// resolve from inside the hook.
    fn did_register(&self, container: &Container<Self>)
    where
        Self: Sized,
    {
        let _ = container;
    }
}

pub(crate) struct ContainerInner<C: Compose> {
    node: NodeCore,
    state: C,
    txn: Cell<bool>,
    buffer: RefCell<Vec<ChildChange>>,
    listeners: Listeners<ContainerChange>,
    // Subscriptions to the dependencies' propagation channels; dropped on
    // dispose so dependencies stop feeding this node.
    dep_subs: RefCell<Vec<Subscription>>,
}

impl<C: Compose> ErasedEmitter for ContainerInner<C> {
    fn core(&self) -> &NodeCore {
        &self.node
    }

    fn dispose_erased(&self) {
        self.node.mark_disposed();
        self.dep_subs.borrow_mut().clear();
        for child in self.state.children() {
            if !child.is_disposed() {
                child.dispose();
            }
        }
        self.buffer.borrow_mut().clear();
        self.listeners.clear();
    }

    fn register_erased(&self, this: &DynEmitter, parent: Option<&DynEmitter>) {
        // Parent first, children second: the full ancestor chain exists
        // before any registration hook runs.
        self.node.set_parent(parent.map(DynEmitter::downgrade));
        for child in self.state.children() {
            child.register(this);
        }
        if let Some(instance) = self.node.facet_instance(TypeId::of::<C>()) {
            if let Ok(inner) = instance.downcast::<ContainerInner<C>>() {
                self.state.did_register(&Container { inner });
            }
        }
    }
}

/// A composite node over a [`Compose`] state.
pub struct Container<C: Compose> {
    inner: Rc<ContainerInner<C>>,
}

impl<C: Compose> Container<C> {
    /// Build the container without registering it; it becomes part of a tree
    /// when a parent registers it (or stays standalone).
    pub fn new(state: C) -> Self {
        let inner = Rc::new(ContainerInner {
            node: NodeCore::new(),
            state,
            txn: Cell::new(false),
            buffer: RefCell::new(Vec::new()),
            listeners: Listeners::new(),
            dep_subs: RefCell::new(Vec::new()),
        });
        let any: Rc<dyn Any> = Rc::clone(&inner) as Rc<dyn Any>;
        inner
            .node
            .set_facet(TypeId::of::<C>(), Rc::downgrade(&any));

        let container = Self { inner };
        container.wire_dependencies();
        container
    }

    /// Build a tree root: runs the recursive child-registration pass
    /// immediately instead of waiting for a parent.
    pub fn root(state: C) -> Self {
        let container = Self::new(state);
        container.handle().register_root();
        container
    }

    pub(crate) fn from_inner(inner: Rc<ContainerInner<C>>) -> Self {
        Self { inner }
    }

    fn wire_dependencies(&self) {
        let mut subs = Vec::new();
        for dep in self.inner.state.dependencies() {
            let weak = Rc::downgrade(&self.inner);
            subs.push(subscribe_forward(&dep, move |change: &ChildChange| {
                let Some(inner) = weak.upgrade() else { return };
                // Quiet changes stay local to the dependency's own
                // subscribers.
                if change.quiet {
                    return;
                }
                if inner.txn.get() {
                    inner.buffer.borrow_mut().push(change.clone());
                } else {
                    Self::deliver(&inner, vec![change.clone()]);
                }
            }));
        }
        *self.inner.dep_subs.borrow_mut() = subs;
    }

    fn deliver(inner: &Rc<ContainerInner<C>>, changes: Vec<ChildChange>) {
        if inner.node.is_disposed() {
            return;
        }
        let change = ContainerChange { changes };
        inner.listeners.emit(&change);
        let source = DynEmitter::new(Rc::clone(inner) as Rc<dyn ErasedEmitter>);
        inner
            .node
            .forward(&ChildChange::new(source, Rc::new(change), false));
    }

    /// The declared state. Still readable after disposal; the child
    /// emitters inside guard their own entry points.
    pub fn state(&self) -> &C {
        &self.inner.state
    }

    /// Notify subscribers directly, with no contributing dependency. The
    /// delivered change is self-triggered (empty change list).
    pub fn emit(&self) {
        self.inner.node.debug_alive();
        Self::deliver(&self.inner, Vec::new());
    }

    /// Begin buffering dependency changes. Starting while a transaction is
    /// already open has no further effect.
    pub fn start_transaction(&self) {
        self.inner.node.debug_alive();
        self.inner.txn.set(true);
    }

    /// Close the transaction synchronously: everything buffered since
    /// [`Container::start_transaction`] goes out as one notification, or
    /// none at all when nothing was buffered.
    pub fn end_transaction(&self) {
        self.inner.node.debug_alive();
        if !self.inner.txn.replace(false) {
            return;
        }
        let buffered = std::mem::take(&mut *self.inner.buffer.borrow_mut());
        if !buffered.is_empty() {
            Self::deliver(&self.inner, buffered);
        }
    }

    pub fn subscribe(&self, callback: impl FnMut(&ContainerChange) + 'static) -> Subscription {
        self.inner.node.debug_alive();
        let id = self.inner.listeners.add(callback);
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.remove(id);
            }
        })
    }
}

impl<C: Compose> Emitter for Container<C> {
    fn handle(&self) -> DynEmitter {
        DynEmitter::new(Rc::clone(&self.inner) as Rc<dyn ErasedEmitter>)
    }
}

impl<C: Compose> Clone for Container<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<C: Compose> PartialEq for Container<C> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<C: Compose> Eq for Container<C> {}

impl<C: Compose> fmt::Debug for Container<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("state", &std::any::type_name::<C>())
            .field("disposed", &self.inner.node.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ValueChange;
    use crate::value::ValueEmitter;
    use std::cell::Cell;

    struct Pair {
        left: ValueEmitter<i32>,
        right: ValueEmitter<i32>,
    }

    impl Pair {
        fn new() -> Self {
            Self {
                left: ValueEmitter::new(0),
                right: ValueEmitter::new(0),
            }
        }
    }

    impl Compose for Pair {
        fn children(&self) -> Vec<DynEmitter> {
            vec![self.left.handle(), self.right.handle()]
        }
    }

    #[test]
    fn each_dependency_change_re_emits_once_outside_a_transaction() {
        let pair = Container::root(Pair::new());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = pair.subscribe(move |c: &ContainerChange| {
            sink.borrow_mut().push(c.changes.len());
        });

        pair.state().left.set(1).unwrap();
        pair.state().right.set(2).unwrap();
        assert_eq!(&*seen.borrow(), &[1, 1], "two separate notifications");
    }

    #[test]
    fn notification_attributes_the_originating_dependency() {
        let pair = Container::root(Pair::new());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let left = pair.state().left.handle();
        let _sub = pair.subscribe(move |c: &ContainerChange| {
            for child in &c.changes {
                sink.borrow_mut().push(child.source.same(&left));
            }
        });

        pair.state().left.set(1).unwrap();
        pair.state().right.set(2).unwrap();
        assert_eq!(&*seen.borrow(), &[true, false]);
    }

    #[test]
    fn transaction_collapses_dependency_changes_into_one_batch() {
        let pair = Container::root(Pair::new());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = pair.subscribe(move |c: &ContainerChange| {
            sink.borrow_mut().push(c.changes.len());
        });

        pair.start_transaction();
        pair.start_transaction(); // idempotent
        pair.state().left.set(1).unwrap();
        pair.state().right.set(2).unwrap();
        pair.state().left.set(3).unwrap();
        assert!(seen.borrow().is_empty());
        pair.end_transaction();

        assert_eq!(&*seen.borrow(), &[3], "one batch with all three changes");
    }

    #[test]
    fn empty_transaction_delivers_nothing() {
        let pair = Container::root(Pair::new());
        let count = Rc::new(Cell::new(0u32));
        let sink = Rc::clone(&count);
        let _sub = pair.subscribe(move |_| sink.set(sink.get() + 1));

        pair.start_transaction();
        pair.end_transaction();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn quiet_child_changes_do_not_reach_the_container() {
        let pair = Container::root(Pair::new());
        let count = Rc::new(Cell::new(0u32));
        let sink = Rc::clone(&count);
        let _sub = pair.subscribe(move |_| sink.set(sink.get() + 1));

        pair.state().left.quiet_set(5).unwrap();
        assert_eq!(count.get(), 0, "quiet changes stay local");
        assert_eq!(pair.state().left.get(), 5);

        pair.state().left.set(6).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn child_payload_downcasts_to_the_concrete_change() {
        let pair = Container::root(Pair::new());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = pair.subscribe(move |c: &ContainerChange| {
            for child in &c.changes {
                if let Some(v) = child.payload_as::<ValueChange<i32>>() {
                    sink.borrow_mut().push((v.old, v.new));
                }
            }
        });

        pair.state().left.set(4).unwrap();
        assert_eq!(&*seen.borrow(), &[(0, 4)]);
    }

    #[test]
    fn explicit_emit_is_self_triggered() {
        let pair = Container::root(Pair::new());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = pair.subscribe(move |c: &ContainerChange| {
            sink.borrow_mut().push(c.is_self_triggered());
        });

        pair.emit();
        pair.state().left.set(1).unwrap();
        assert_eq!(&*seen.borrow(), &[true, false]);
    }

    #[test]
    fn dispose_cascades_to_children() {
        let pair = Container::root(Pair::new());
        let left = pair.state().left.clone();
        let right = pair.state().right.clone();

        pair.dispose();
        assert!(pair.is_disposed());
        assert!(left.is_disposed());
        assert!(right.is_disposed());
    }

    #[test]
    fn registration_hook_sees_ancestors() {
        struct Leaf {
            value: ValueEmitter<i32>,
            root_found: Rc<Cell<bool>>,
        }

        impl Compose for Leaf {
            fn children(&self) -> Vec<DynEmitter> {
                vec![self.value.handle()]
            }

            fn did_register(&self, container: &Container<Self>) {
                self.root_found
                    .set(container.find_ancestor::<App>().is_some());
            }
        }

        struct App {
            leaf: Container<Leaf>,
        }

        impl Compose for App {
            fn children(&self) -> Vec<DynEmitter> {
                vec![self.leaf.handle()]
            }
        }

        let root_found = Rc::new(Cell::new(false));
        let app = Container::root(App {
            leaf: Container::new(Leaf {
                value: ValueEmitter::new(0),
                root_found: Rc::clone(&root_found),
            }),
        });

        assert!(root_found.get(), "hook runs after the chain is in place");
        drop(app);
    }
}
