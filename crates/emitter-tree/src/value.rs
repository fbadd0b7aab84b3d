//! Scalar value emitter.
//!
//! [`ValueEmitter`] holds one value and notifies subscribers when it is
//! replaced by a different one (`PartialEq` decides). Three flavors share the
//! type:
//!
//! - a plain writable holder ([`ValueEmitter::new`]);
//! - a computed, read-only value derived from upstream emitters
//!   ([`ValueEmitter::computed`]);
//! - a read-only view mirroring another scalar
//!   ([`ValueEmitter::unmodifiable`]).
//!
//! [`ValueEmitter::quiet_set`] performs a normal update whose change record
//! is tagged quiet: local subscribers still see it, but an aggregating
//! container will not re-emit on account of it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::change::{ChildChange, ValueChange};
use crate::emitter::Emitter;
use crate::error::EmitterError;
use crate::node::{subscribe_forward, DynEmitter, ErasedEmitter, Listeners, NodeCore, Subscription};

#[derive(Clone, Copy, PartialEq, Eq)]
enum WriteAccess {
    Writable,
    Computed,
    View,
}

pub(crate) struct ValueInner<T: Clone + PartialEq + 'static> {
    node: NodeCore,
    value: RefCell<T>,
    previous: RefCell<Option<T>>,
    keep_history: bool,
    access: WriteAccess,
    listeners: Listeners<ValueChange<T>>,
    compute: RefCell<Option<Box<dyn Fn() -> T>>>,
    // Subscriptions binding a computed/view emitter to its sources; dropped
    // on dispose so the sources stop feeding it.
    upstream_subs: RefCell<Vec<Subscription>>,
}

impl<T: Clone + PartialEq + 'static> ErasedEmitter for ValueInner<T> {
    fn core(&self) -> &NodeCore {
        &self.node
    }

    fn dispose_erased(&self) {
        self.node.mark_disposed();
        self.listeners.clear();
        self.compute.borrow_mut().take();
        self.upstream_subs.borrow_mut().clear();
    }
}

/// A scalar holder that broadcasts `{old, new}` on replacement.
pub struct ValueEmitter<T: Clone + PartialEq + 'static> {
    inner: Rc<ValueInner<T>>,
}

impl<T: Clone + PartialEq + 'static> ValueEmitter<T> {
    /// A writable scalar with `value` as the initial content.
    pub fn new(value: T) -> Self {
        Self::build(value, false, WriteAccess::Writable)
    }

    /// Like [`ValueEmitter::new`], but retains the previously held value for
    /// [`ValueEmitter::previous`].
    pub fn with_history(value: T) -> Self {
        Self::build(value, true, WriteAccess::Writable)
    }

    fn build(value: T, keep_history: bool, access: WriteAccess) -> Self {
        Self {
            inner: Rc::new(ValueInner {
                node: NodeCore::new(),
                value: RefCell::new(value),
                previous: RefCell::new(None),
                keep_history,
                access,
                listeners: Listeners::new(),
                compute: RefCell::new(None),
                upstream_subs: RefCell::new(Vec::new()),
            }),
        }
    }

    /// A read-only scalar recomputed from `upstreams`.
    ///
    /// `recompute` is evaluated once up front and again on every upstream
    /// emission (quiet or not). The result goes through the same change
    /// detection as a plain `set`, so an upstream firing without changing the
    /// computed value emits nothing.
    pub fn computed(upstreams: Vec<DynEmitter>, recompute: impl Fn() -> T + 'static) -> Self {
        let compute: Box<dyn Fn() -> T> = Box::new(recompute);
        let initial = compute();
        let emitter = Self::build(initial, false, WriteAccess::Computed);
        *emitter.inner.compute.borrow_mut() = Some(compute);

        let mut subs = Vec::with_capacity(upstreams.len());
        for upstream in &upstreams {
            let weak = Rc::downgrade(&emitter.inner);
            subs.push(subscribe_forward(upstream, move |_| {
                if let Some(inner) = weak.upgrade() {
                    Self::recompute_now(&inner);
                }
            }));
        }
        *emitter.inner.upstream_subs.borrow_mut() = subs;
        emitter
    }

    /// A read-only view that mirrors every change of `self` (including quiet
    /// ones, with the tag preserved) and rejects direct writes.
    pub fn unmodifiable(&self) -> Self {
        let view = Self::build(self.get(), false, WriteAccess::View);
        let weak = Rc::downgrade(&view.inner);
        let sub = self.subscribe(move |change: &ValueChange<T>| {
            if let Some(inner) = weak.upgrade() {
                Self::apply(&inner, change.new.clone(), change.quiet);
            }
        });
        view.inner.upstream_subs.borrow_mut().push(sub);
        view
    }

    /// Current value (cloned).
    pub fn get(&self) -> T {
        self.inner.node.debug_alive();
        self.inner.value.borrow().clone()
    }

    /// Read the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.node.debug_alive();
        f(&self.inner.value.borrow())
    }

    /// The value held before the latest replacement. Always `None` unless
    /// constructed with [`ValueEmitter::with_history`].
    pub fn previous(&self) -> Option<T> {
        self.inner.node.debug_alive();
        self.inner.previous.borrow().clone()
    }

    /// Replace the value, emitting `{old, new}` iff it actually changed.
    pub fn set(&self, value: T) -> Result<(), EmitterError> {
        self.set_with_quiet(value, false)
    }

    /// Like [`ValueEmitter::set`], but the emitted change is tagged quiet so
    /// an aggregating container skips it. Local subscribers still see it.
    pub fn quiet_set(&self, value: T) -> Result<(), EmitterError> {
        self.set_with_quiet(value, true)
    }

    fn set_with_quiet(&self, value: T, quiet: bool) -> Result<(), EmitterError> {
        self.inner.node.ensure_alive()?;
        if self.inner.access != WriteAccess::Writable {
            return Err(EmitterError::ReadOnly);
        }
        Self::apply(&self.inner, value, quiet);
        Ok(())
    }

    /// `true` for computed and view emitters, which reject external writes.
    pub fn is_read_only(&self) -> bool {
        self.inner.access != WriteAccess::Writable
    }

    pub fn subscribe(&self, callback: impl FnMut(&ValueChange<T>) + 'static) -> Subscription {
        self.inner.node.debug_alive();
        let id = self.inner.listeners.add(callback);
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.remove(id);
            }
        })
    }

    fn recompute_now(inner: &Rc<ValueInner<T>>) {
        if inner.node.is_disposed() {
            return;
        }
        let value = {
            let compute = inner.compute.borrow();
            let Some(f) = compute.as_ref() else { return };
            f()
        };
        Self::apply(inner, value, false);
    }

    /// Internal write path shared by every flavor; bypasses the access
    /// check but keeps the change detection.
    fn apply(inner: &Rc<ValueInner<T>>, value: T, quiet: bool) {
        if inner.node.is_disposed() {
            return;
        }
        if *inner.value.borrow() == value {
            return;
        }
        let old = inner.value.replace(value.clone());
        if inner.keep_history {
            *inner.previous.borrow_mut() = Some(old.clone());
        }
        let change = ValueChange {
            old,
            new: value,
            quiet,
        };
        inner.listeners.emit(&change);
        let source = DynEmitter::new(Rc::clone(inner) as Rc<dyn ErasedEmitter>);
        inner
            .node
            .forward(&ChildChange::new(source, Rc::new(change), quiet));
    }
}

impl<T: Clone + PartialEq + 'static> Emitter for ValueEmitter<T> {
    fn handle(&self) -> DynEmitter {
        DynEmitter::new(Rc::clone(&self.inner) as Rc<dyn ErasedEmitter>)
    }
}

impl<T: Clone + PartialEq + 'static> Clone for ValueEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + 'static> PartialEq for ValueEmitter<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone + PartialEq + 'static> Eq for ValueEmitter<T> {}

impl<T: Clone + PartialEq + fmt::Debug + 'static> fmt::Debug for ValueEmitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueEmitter")
            .field("value", &*self.inner.value.borrow())
            .field("disposed", &self.inner.node.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn set_emits_old_and_new() {
        let value = ValueEmitter::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = value.subscribe(move |c| sink.borrow_mut().push((c.old, c.new)));

        value.set(2).unwrap();
        value.set(3).unwrap();
        assert_eq!(&*seen.borrow(), &[(1, 2), (2, 3)]);
    }

    #[test]
    fn equal_value_set_is_silent() {
        let value = ValueEmitter::new("a".to_string());
        let fired = Rc::new(Cell::new(0u32));
        let sink = Rc::clone(&fired);
        let _sub = value.subscribe(move |_| sink.set(sink.get() + 1));

        value.set("a".to_string()).unwrap();
        assert_eq!(fired.get(), 0);
        value.set("b".to_string()).unwrap();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn quiet_set_reaches_local_subscribers_with_tag() {
        let value = ValueEmitter::new(0);
        let quiet_seen = Rc::new(Cell::new(false));
        let sink = Rc::clone(&quiet_seen);
        let _sub = value.subscribe(move |c| sink.set(c.quiet));

        value.quiet_set(1).unwrap();
        assert!(quiet_seen.get());
        assert_eq!(value.get(), 1);
    }

    #[test]
    fn history_tracks_previous_value() {
        let value = ValueEmitter::with_history(10);
        assert_eq!(value.previous(), None);
        value.set(20).unwrap();
        assert_eq!(value.previous(), Some(10));
        value.set(30).unwrap();
        assert_eq!(value.previous(), Some(20));
    }

    #[test]
    fn plain_emitter_has_no_history() {
        let value = ValueEmitter::new(1);
        value.set(2).unwrap();
        assert_eq!(value.previous(), None);
    }

    #[test]
    fn computed_dedupes_unchanged_results() {
        let a = ValueEmitter::new(false);
        let b = ValueEmitter::new(false);
        let (a2, b2) = (a.clone(), b.clone());
        let both = ValueEmitter::computed(vec![a.handle(), b.handle()], move || {
            a2.get() && b2.get()
        });

        let fired = Rc::new(Cell::new(0u32));
        let sink = Rc::clone(&fired);
        let _sub = both.subscribe(move |_| sink.set(sink.get() + 1));

        a.set(true).unwrap();
        assert_eq!(fired.get(), 0, "a && b is still false");
        assert!(!both.get());

        b.set(true).unwrap();
        assert_eq!(fired.get(), 1);
        assert!(both.get());
    }

    #[test]
    fn computed_rejects_external_writes() {
        let a = ValueEmitter::new(1);
        let a2 = a.clone();
        let doubled = ValueEmitter::computed(vec![a.handle()], move || a2.get() * 2);
        assert_eq!(doubled.set(99), Err(EmitterError::ReadOnly));
        assert_eq!(doubled.get(), 2);
    }

    #[test]
    fn unmodifiable_view_mirrors_and_rejects_writes() {
        let source = ValueEmitter::new(5);
        let view = source.unmodifiable();
        assert_eq!(view.get(), 5);
        assert_eq!(view.set(6), Err(EmitterError::ReadOnly));

        source.set(7).unwrap();
        assert_eq!(view.get(), 7);
    }

    #[test]
    fn set_after_dispose_is_rejected() {
        let value = ValueEmitter::new(1);
        value.dispose();
        assert!(value.is_disposed());
        assert_eq!(value.set(2), Err(EmitterError::Disposed));
    }
}
