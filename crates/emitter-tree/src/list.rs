//! Ordered container emitter.
//!
//! Every mutating operation runs under a depth guard: the guard increments a
//! reentrancy counter on entry and decrements it on exit (including error
//! paths), and the pending modification buffer is flushed only when the
//! counter returns to zero with no transaction open. Composite operations
//! ([`ListEmitter::extend`], [`ListEmitter::remove_where`],
//! [`ListEmitter::replace_range`], ...) are built from the single-element
//! primitives under one outer guard, so the whole operation produces exactly
//! one notification.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::change::{ChildChange, ListChange, ListModification};
use crate::emitter::Emitter;
use crate::error::EmitterError;
use crate::node::{DynEmitter, ErasedEmitter, Listeners, NodeCore, Subscription};

/// Construction-time options for [`ListEmitter`].
#[derive(Debug, Clone, Copy)]
pub struct ListOptions {
    /// When `false`, flushed changes carry a shared empty modification slice
    /// instead of per-edit records. Subscribers that only re-read the list on
    /// notification avoid the record allocations.
    pub detailed_changes: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            detailed_changes: true,
        }
    }
}

/// Ownership callbacks installed by an emitter-element list: `attach`
/// registers a newly inserted element under the list, `release` disposes an
/// element the list no longer holds.
pub(crate) struct OwnershipHooks<T> {
    pub(crate) attach: Box<dyn Fn(&T, &DynEmitter)>,
    pub(crate) release: Box<dyn Fn(&T)>,
}

pub(crate) struct ListInner<T: Clone + PartialEq + 'static> {
    node: NodeCore,
    items: RefCell<Vec<T>>,
    pending: RefCell<Vec<ListModification<T>>>,
    depth: Cell<u32>,
    txn: Cell<bool>,
    flushing: Cell<bool>,
    detailed: bool,
    fill: RefCell<Option<Box<dyn Fn() -> T>>>,
    hooks: RefCell<Option<OwnershipHooks<T>>>,
    listeners: Listeners<ListChange<T>>,
    // Cached empty record slice reused by every non-detailed flush.
    coarse: RefCell<Option<Rc<[ListModification<T>]>>>,
}

impl<T: Clone + PartialEq + 'static> ListInner<T> {
    fn coarse_records(&self) -> Rc<[ListModification<T>]> {
        let mut cached = self.coarse.borrow_mut();
        if let Some(records) = cached.as_ref() {
            return Rc::clone(records);
        }
        let records: Rc<[ListModification<T>]> = Vec::new().into();
        *cached = Some(Rc::clone(&records));
        records
    }
}

impl<T: Clone + PartialEq + 'static> ErasedEmitter for ListInner<T> {
    fn core(&self) -> &NodeCore {
        &self.node
    }

    fn dispose_erased(&self) {
        self.node.mark_disposed();
        let owned = if self.hooks.borrow().is_some() {
            self.items.borrow().clone()
        } else {
            Vec::new()
        };
        if let Some(hooks) = self.hooks.borrow().as_ref() {
            // Elements are disposed in index order.
            for item in &owned {
                (hooks.release)(item);
            }
        }
        self.items.borrow_mut().clear();
        self.pending.borrow_mut().clear();
        self.listeners.clear();
        *self.hooks.borrow_mut() = None;
    }

    fn register_erased(&self, this: &DynEmitter, parent: Option<&DynEmitter>) {
        // Parent first, then the cascade: every current element re-registers
        // under the list, so composite elements run their registration hooks
        // with the chain above the list already in place.
        self.node.set_parent(parent.map(DynEmitter::downgrade));
        let items = self.items.borrow().clone();
        if let Some(hooks) = self.hooks.borrow().as_ref() {
            for item in &items {
                (hooks.attach)(item, this);
            }
        }
    }
}

/// Guard covering one public mutating call. Dropping it flushes the pending
/// buffer once the outermost call completes, unless a transaction is open.
struct DepthGuard<T: Clone + PartialEq + 'static> {
    inner: Rc<ListInner<T>>,
}

impl<T: Clone + PartialEq + 'static> DepthGuard<T> {
    fn enter(inner: &Rc<ListInner<T>>) -> Self {
        inner.depth.set(inner.depth.get() + 1);
        Self {
            inner: Rc::clone(inner),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Drop for DepthGuard<T> {
    fn drop(&mut self) {
        let depth = self.inner.depth.get() - 1;
        self.inner.depth.set(depth);
        if depth == 0 && !self.inner.txn.get() {
            flush(&self.inner);
        }
    }
}

fn flush<T: Clone + PartialEq + 'static>(inner: &Rc<ListInner<T>>) {
    // A subscriber mutating this list during delivery lands here with a
    // notification already in flight; the mutation stays in the pending
    // buffer and the outer loop delivers it as the next batch.
    if inner.node.is_disposed() || inner.flushing.get() {
        return;
    }
    inner.flushing.set(true);
    loop {
        if inner.txn.get() {
            break;
        }
        let mods = mem::take(&mut *inner.pending.borrow_mut());
        if mods.is_empty() {
            break;
        }
        let records: Rc<[ListModification<T>]> = if inner.detailed {
            mods.clone().into()
        } else {
            inner.coarse_records()
        };
        let change = ListChange {
            modifications: records,
            detailed: inner.detailed,
        };
        inner.listeners.emit(&change);
        let source = DynEmitter::new(Rc::clone(inner) as Rc<dyn ErasedEmitter>);
        inner
            .node
            .forward(&ChildChange::new(source, Rc::new(change), false));
        release_true_removals(inner, &mods);
    }
    inner.flushing.set(false);
}

/// Dispose elements whose removal survived the whole flush window. A value
/// removed and re-inserted (or still present at another index after a
/// reorder) is not a true removal and stays alive.
fn release_true_removals<T: Clone + PartialEq + 'static>(
    inner: &Rc<ListInner<T>>,
    mods: &[ListModification<T>],
) {
    let hooks = inner.hooks.borrow();
    let Some(hooks) = hooks.as_ref() else {
        return;
    };
    let mut to_release = Vec::new();
    {
        let items = inner.items.borrow();
        for m in mods {
            if let (Some(removed), None) = (&m.removed, &m.inserted) {
                if !items.iter().any(|v| v == removed) && !to_release.contains(removed) {
                    to_release.push(removed.clone());
                }
            }
        }
    }
    for value in &to_release {
        (hooks.release)(value);
    }
}

/// Ordered sequence that broadcasts batched modification records.
pub struct ListEmitter<T: Clone + PartialEq + 'static> {
    inner: Rc<ListInner<T>>,
}

impl<T: Clone + PartialEq + 'static> ListEmitter<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self::with_options(items, ListOptions::default())
    }

    pub fn with_options(items: Vec<T>, options: ListOptions) -> Self {
        Self {
            inner: Rc::new(ListInner {
                node: NodeCore::new(),
                items: RefCell::new(items),
                pending: RefCell::new(Vec::new()),
                depth: Cell::new(0),
                txn: Cell::new(false),
                flushing: Cell::new(false),
                detailed: options.detailed_changes,
                fill: RefCell::new(None),
                hooks: RefCell::new(None),
                listeners: Listeners::new(),
                coarse: RefCell::new(None),
            }),
        }
    }

    /// Configure the factory used to pad the list when [`ListEmitter::set_len`]
    /// grows it. Without one, growing is rejected.
    pub fn with_fill(self, fill: impl Fn() -> T + 'static) -> Self {
        *self.inner.fill.borrow_mut() = Some(Box::new(fill));
        self
    }

    pub(crate) fn install_hooks(&self, hooks: OwnershipHooks<T>) {
        let handle = self.handle();
        for item in self.inner.items.borrow().iter() {
            (hooks.attach)(item, &handle);
        }
        *self.inner.hooks.borrow_mut() = Some(hooks);
    }

    // ── Reads ──────────────────────────────────────────────────────────────

    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.node.debug_alive();
        self.inner.items.borrow().get(index).cloned()
    }

    pub fn first(&self) -> Option<T> {
        self.get(0)
    }

    pub fn last(&self) -> Option<T> {
        self.inner.node.debug_alive();
        self.inner.items.borrow().last().cloned()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.inner.node.debug_alive();
        self.inner.items.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.node.debug_alive();
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, value: &T) -> bool {
        self.index_of(value).is_some()
    }

    pub fn index_of(&self, value: &T) -> Option<usize> {
        self.inner.node.debug_alive();
        self.inner.items.borrow().iter().position(|v| v == value)
    }

    // ── Single-element mutations ───────────────────────────────────────────

    /// Overwrite the element at `index`, recording a replace.
    pub fn set(&self, index: usize, value: T) -> Result<(), EmitterError> {
        self.inner.node.ensure_alive()?;
        let len = self.inner.items.borrow().len();
        if index >= len {
            return Err(EmitterError::IndexOutOfBounds { index, len });
        }
        let _guard = DepthGuard::enter(&self.inner);
        self.attach(&value);
        let old = mem::replace(&mut self.inner.items.borrow_mut()[index], value.clone());
        self.inner
            .pending
            .borrow_mut()
            .push(ListModification::replace(index, old, value));
        Ok(())
    }

    /// Insert at `index`, shifting later elements up. `index == len` appends.
    pub fn insert(&self, index: usize, value: T) -> Result<(), EmitterError> {
        self.inner.node.ensure_alive()?;
        let len = self.inner.items.borrow().len();
        if index > len {
            return Err(EmitterError::IndexOutOfBounds { index, len });
        }
        let _guard = DepthGuard::enter(&self.inner);
        self.attach(&value);
        self.inner.items.borrow_mut().insert(index, value.clone());
        self.inner
            .pending
            .borrow_mut()
            .push(ListModification::insert(index, value));
        Ok(())
    }

    pub fn push(&self, value: T) -> Result<(), EmitterError> {
        let len = self.inner.items.borrow().len();
        self.insert(len, value)
    }

    /// Remove and return the element at `index`.
    pub fn remove_at(&self, index: usize) -> Result<T, EmitterError> {
        self.inner.node.ensure_alive()?;
        let len = self.inner.items.borrow().len();
        if index >= len {
            return Err(EmitterError::IndexOutOfBounds { index, len });
        }
        let _guard = DepthGuard::enter(&self.inner);
        let value = self.inner.items.borrow_mut().remove(index);
        self.inner
            .pending
            .borrow_mut()
            .push(ListModification::remove(index, value.clone()));
        Ok(value)
    }

    /// Remove the first occurrence of `value`. Returns whether one was found.
    pub fn remove(&self, value: &T) -> Result<bool, EmitterError> {
        self.inner.node.ensure_alive()?;
        match self.index_of(value) {
            Some(index) => {
                self.remove_at(index)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn pop(&self) -> Result<Option<T>, EmitterError> {
        self.inner.node.ensure_alive()?;
        let len = self.inner.items.borrow().len();
        if len == 0 {
            return Ok(None);
        }
        self.remove_at(len - 1).map(Some)
    }

    // ── Composite mutations (one notification each) ────────────────────────

    pub fn extend(&self, values: impl IntoIterator<Item = T>) -> Result<(), EmitterError> {
        self.inner.node.ensure_alive()?;
        let _guard = DepthGuard::enter(&self.inner);
        for value in values {
            self.push(value)?;
        }
        Ok(())
    }

    pub fn insert_all(
        &self,
        index: usize,
        values: impl IntoIterator<Item = T>,
    ) -> Result<(), EmitterError> {
        self.inner.node.ensure_alive()?;
        let len = self.inner.items.borrow().len();
        if index > len {
            return Err(EmitterError::IndexOutOfBounds { index, len });
        }
        let _guard = DepthGuard::enter(&self.inner);
        for (offset, value) in values.into_iter().enumerate() {
            self.insert(index + offset, value)?;
        }
        Ok(())
    }

    /// Remove every element matching `pred`. Returns the number removed.
    pub fn remove_where(&self, mut pred: impl FnMut(&T) -> bool) -> Result<usize, EmitterError> {
        self.inner.node.ensure_alive()?;
        let _guard = DepthGuard::enter(&self.inner);
        let mut removed = 0;
        let mut index = 0;
        while index < self.inner.items.borrow().len() {
            let matched = pred(&self.inner.items.borrow()[index]);
            if matched {
                self.remove_at(index)?;
                removed += 1;
            } else {
                index += 1;
            }
        }
        Ok(removed)
    }

    /// Keep only the elements matching `pred`.
    pub fn retain(&self, mut pred: impl FnMut(&T) -> bool) -> Result<usize, EmitterError> {
        self.remove_where(move |v| !pred(v))
    }

    /// Remove the elements in `start..end`.
    pub fn remove_range(&self, start: usize, end: usize) -> Result<(), EmitterError> {
        self.inner.node.ensure_alive()?;
        let len = self.inner.items.borrow().len();
        if start > end || end > len {
            return Err(EmitterError::InvalidRange { start, end, len });
        }
        let _guard = DepthGuard::enter(&self.inner);
        for _ in start..end {
            self.remove_at(start)?;
        }
        Ok(())
    }

    /// Replace `start..end` with `values`: overlapping prefix is overwritten
    /// in place, then surplus new elements are inserted or surplus old ones
    /// removed. Net effect equals remove-then-insert with fewer records.
    pub fn replace_range(
        &self,
        start: usize,
        end: usize,
        values: Vec<T>,
    ) -> Result<(), EmitterError> {
        self.inner.node.ensure_alive()?;
        let len = self.inner.items.borrow().len();
        if start > end || end > len {
            return Err(EmitterError::InvalidRange { start, end, len });
        }
        let _guard = DepthGuard::enter(&self.inner);
        let old_count = end - start;
        let overlap = old_count.min(values.len());
        let mut values = values.into_iter();
        for i in 0..overlap {
            let value = values.next();
            if let Some(value) = value {
                self.set(start + i, value)?;
            }
        }
        if old_count > overlap {
            for _ in overlap..old_count {
                self.remove_at(start + overlap)?;
            }
        } else {
            for (offset, value) in values.enumerate() {
                self.insert(start + overlap + offset, value)?;
            }
        }
        Ok(())
    }

    /// Resize to `len`: shrinking removes from the tail, growing pads with
    /// the configured fill factory (see [`ListEmitter::with_fill`]).
    pub fn set_len(&self, len: usize) -> Result<(), EmitterError> {
        self.inner.node.ensure_alive()?;
        let current = self.inner.items.borrow().len();
        if len > current && self.inner.fill.borrow().is_none() {
            return Err(EmitterError::MissingFillValue);
        }
        let _guard = DepthGuard::enter(&self.inner);
        if len < current {
            for _ in len..current {
                self.pop()?;
            }
        } else {
            for _ in current..len {
                let value = {
                    let fill = self.inner.fill.borrow();
                    match fill.as_ref() {
                        Some(f) => f(),
                        None => return Err(EmitterError::MissingFillValue),
                    }
                };
                self.push(value)?;
            }
        }
        Ok(())
    }

    /// Remove every element, recording one removal per element.
    pub fn clear(&self) -> Result<(), EmitterError> {
        self.inner.node.ensure_alive()?;
        let _guard = DepthGuard::enter(&self.inner);
        while !self.inner.items.borrow().is_empty() {
            self.remove_at(0)?;
        }
        Ok(())
    }

    /// Shuffle in place with the caller's RNG, recording a replace for every
    /// index whose value changed.
    pub fn shuffle(&self, rng: &mut impl Rng) -> Result<(), EmitterError> {
        self.inner.node.ensure_alive()?;
        let _guard = DepthGuard::enter(&self.inner);
        let old = self.inner.items.borrow().clone();
        self.inner.items.borrow_mut().shuffle(rng);
        let new = self.inner.items.borrow().clone();
        let mut pending = self.inner.pending.borrow_mut();
        for (index, (before, after)) in old.into_iter().zip(new).enumerate() {
            if before != after {
                pending.push(ListModification::replace(index, before, after));
            }
        }
        Ok(())
    }

    // ── Transactions ───────────────────────────────────────────────────────

    /// Begin buffering: flushes become no-ops until the transaction ends.
    /// Starting while one is already open has no further effect.
    pub fn start_transaction(&self) {
        self.inner.node.debug_alive();
        self.inner.txn.set(true);
    }

    /// End the transaction and flush the accumulated buffer synchronously,
    /// emitting at most one notification.
    pub fn end_transaction(&self) {
        self.inner.node.debug_alive();
        if self.inner.txn.replace(false) {
            flush(&self.inner);
        }
    }

    pub fn subscribe(&self, callback: impl FnMut(&ListChange<T>) + 'static) -> Subscription {
        self.inner.node.debug_alive();
        let id = self.inner.listeners.add(callback);
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.remove(id);
            }
        })
    }

    fn attach(&self, value: &T) {
        if let Some(hooks) = self.inner.hooks.borrow().as_ref() {
            (hooks.attach)(value, &self.handle());
        }
    }
}

impl<T: Clone + PartialEq + 'static> Emitter for ListEmitter<T> {
    fn handle(&self) -> DynEmitter {
        DynEmitter::new(Rc::clone(&self.inner) as Rc<dyn ErasedEmitter>)
    }
}

impl<T: Clone + PartialEq + 'static> Clone for ListEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + 'static> PartialEq for ListEmitter<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone + PartialEq + 'static> Eq for ListEmitter<T> {}

impl<T: Clone + PartialEq + fmt::Debug + 'static> fmt::Debug for ListEmitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListEmitter")
            .field("items", &*self.inner.items.borrow())
            .field("disposed", &self.inner.node.is_disposed())
            .finish()
    }
}
