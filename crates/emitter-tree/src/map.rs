//! Associative container emitter.
//!
//! Same dirty-tracking discipline as the ordered container: mutations run
//! under a depth guard, records accumulate in a pending buffer, and one
//! notification per flush carries the whole batch. Entries keep insertion
//! order, so removal records of [`MapEmitter::clear`] and the iteration
//! order of [`MapEmitter::entries`] are deterministic.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::Hash;
use std::mem;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::change::{ChildChange, MapChange, MapModification};
use crate::emitter::Emitter;
use crate::error::EmitterError;
use crate::node::{DynEmitter, ErasedEmitter, Listeners, NodeCore, Subscription};

/// Construction-time options for [`MapEmitter`].
#[derive(Debug, Clone, Copy)]
pub struct MapOptions {
    /// When `false`, flushed changes carry a shared empty modification slice.
    pub detailed_changes: bool,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            detailed_changes: true,
        }
    }
}

pub(crate) struct MapInner<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    node: NodeCore,
    entries: RefCell<IndexMap<K, V>>,
    pending: RefCell<Vec<MapModification<K, V>>>,
    depth: Cell<u32>,
    txn: Cell<bool>,
    flushing: Cell<bool>,
    detailed: bool,
    listeners: Listeners<MapChange<K, V>>,
    coarse: RefCell<Option<Rc<[MapModification<K, V>]>>>,
}

impl<K, V> MapInner<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn coarse_records(&self) -> Rc<[MapModification<K, V>]> {
        let mut cached = self.coarse.borrow_mut();
        if let Some(records) = cached.as_ref() {
            return Rc::clone(records);
        }
        let records: Rc<[MapModification<K, V>]> = Vec::new().into();
        *cached = Some(Rc::clone(&records));
        records
    }
}

impl<K, V> ErasedEmitter for MapInner<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn core(&self) -> &NodeCore {
        &self.node
    }

    fn dispose_erased(&self) {
        self.node.mark_disposed();
        self.entries.borrow_mut().clear();
        self.pending.borrow_mut().clear();
        self.listeners.clear();
    }
}

struct DepthGuard<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    inner: Rc<MapInner<K, V>>,
}

impl<K, V> DepthGuard<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn enter(inner: &Rc<MapInner<K, V>>) -> Self {
        inner.depth.set(inner.depth.get() + 1);
        Self {
            inner: Rc::clone(inner),
        }
    }
}

impl<K, V> Drop for DepthGuard<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn drop(&mut self) {
        let depth = self.inner.depth.get() - 1;
        self.inner.depth.set(depth);
        if depth == 0 && !self.inner.txn.get() {
            flush(&self.inner);
        }
    }
}

fn flush<K, V>(inner: &Rc<MapInner<K, V>>)
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    // Mutations performed by subscribers during delivery accumulate in the
    // pending buffer and go out as the next batch of this loop.
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
        let records: Rc<[MapModification<K, V>]> = if inner.detailed {
            mods.into()
        } else {
            inner.coarse_records()
        };
        let change = MapChange {
            modifications: records,
            detailed: inner.detailed,
        };
        inner.listeners.emit(&change);
        let source = DynEmitter::new(Rc::clone(inner) as Rc<dyn ErasedEmitter>);
        inner
            .node
            .forward(&ChildChange::new(source, Rc::new(change), false));
    }
    inner.flushing.set(false);
}

/// Key-value container that broadcasts batched modification records.
pub struct MapEmitter<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    inner: Rc<MapInner<K, V>>,
}

impl<K, V> MapEmitter<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    pub fn new(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::with_options(entries, MapOptions::default())
    }

    pub fn with_options(
        entries: impl IntoIterator<Item = (K, V)>,
        options: MapOptions,
    ) -> Self {
        Self {
            inner: Rc::new(MapInner {
                node: NodeCore::new(),
                entries: RefCell::new(entries.into_iter().collect()),
                pending: RefCell::new(Vec::new()),
                depth: Cell::new(0),
                txn: Cell::new(false),
                flushing: Cell::new(false),
                detailed: options.detailed_changes,
                listeners: Listeners::new(),
                coarse: RefCell::new(None),
            }),
        }
    }

    // ── Reads ──────────────────────────────────────────────────────────────

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.node.debug_alive();
        self.inner.entries.borrow().get(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.node.debug_alive();
        self.inner.entries.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.node.debug_alive();
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<K> {
        self.inner.node.debug_alive();
        self.inner.entries.borrow().keys().cloned().collect()
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.inner.node.debug_alive();
        self.inner
            .entries
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // ── Mutations ──────────────────────────────────────────────────────────

    /// Set `key` to `value`. An absent key records an insert, a differing
    /// value a replace; assigning the value already held records nothing and
    /// triggers no flush. Returns the previous value, if any.
    pub fn insert(&self, key: K, value: V) -> Result<Option<V>, EmitterError> {
        self.inner.node.ensure_alive()?;
        let _guard = DepthGuard::enter(&self.inner);
        let old = self.inner.entries.borrow().get(&key).cloned();
        match &old {
            Some(existing) if *existing == value => return Ok(old),
            Some(existing) => {
                self.inner
                    .pending
                    .borrow_mut()
                    .push(MapModification::replace(
                        key.clone(),
                        existing.clone(),
                        value.clone(),
                    ));
            }
            None => {
                self.inner
                    .pending
                    .borrow_mut()
                    .push(MapModification::insert(key.clone(), value.clone()));
            }
        }
        self.inner.entries.borrow_mut().insert(key, value);
        Ok(old)
    }

    /// Remove `key`, preserving the insertion order of the rest.
    pub fn remove(&self, key: &K) -> Result<Option<V>, EmitterError> {
        self.inner.node.ensure_alive()?;
        let _guard = DepthGuard::enter(&self.inner);
        let removed = self.inner.entries.borrow_mut().shift_remove(key);
        if let Some(value) = &removed {
            self.inner
                .pending
                .borrow_mut()
                .push(MapModification::remove(key.clone(), value.clone()));
        }
        Ok(removed)
    }

    /// Remove every entry, recording one removal per entry in insertion
    /// order.
    pub fn clear(&self) -> Result<(), EmitterError> {
        self.inner.node.ensure_alive()?;
        let _guard = DepthGuard::enter(&self.inner);
        let drained: Vec<(K, V)> = self.inner.entries.borrow_mut().drain(..).collect();
        let mut pending = self.inner.pending.borrow_mut();
        for (key, value) in drained {
            pending.push(MapModification::remove(key, value));
        }
        Ok(())
    }

    /// Insert every entry of `other` under one notification.
    pub fn extend(&self, other: impl IntoIterator<Item = (K, V)>) -> Result<(), EmitterError> {
        self.inner.node.ensure_alive()?;
        let _guard = DepthGuard::enter(&self.inner);
        for (key, value) in other {
            self.insert(key, value)?;
        }
        Ok(())
    }

    /// Rewrite the value under `key` with `f`. Rejects absent keys; writing
    /// back an equal value records nothing.
    pub fn update(&self, key: &K, f: impl FnOnce(&V) -> V) -> Result<V, EmitterError> {
        self.inner.node.ensure_alive()?;
        let current = self
            .inner
            .entries
            .borrow()
            .get(key)
            .cloned()
            .ok_or(EmitterError::MissingKey)?;
        let next = f(&current);
        self.insert(key.clone(), next.clone())?;
        Ok(next)
    }

    /// Rewrite every value with `f` under one notification. Unchanged values
    /// record nothing.
    pub fn update_all(&self, mut f: impl FnMut(&K, &V) -> V) -> Result<(), EmitterError> {
        self.inner.node.ensure_alive()?;
        let _guard = DepthGuard::enter(&self.inner);
        let keys = self.keys();
        for key in keys {
            let current = self.inner.entries.borrow().get(&key).cloned();
            if let Some(current) = current {
                let next = f(&key, &current);
                self.insert(key, next)?;
            }
        }
        Ok(())
    }

    /// Remove every entry matching `pred`. Returns the number removed.
    pub fn remove_where(
        &self,
        mut pred: impl FnMut(&K, &V) -> bool,
    ) -> Result<usize, EmitterError> {
        self.inner.node.ensure_alive()?;
        let _guard = DepthGuard::enter(&self.inner);
        let doomed: Vec<K> = self
            .inner
            .entries
            .borrow()
            .iter()
            .filter(|(k, v)| pred(k, v))
            .map(|(k, _)| k.clone())
            .collect();
        let count = doomed.len();
        for key in &doomed {
            self.remove(key)?;
        }
        Ok(count)
    }

    // ── Transactions ───────────────────────────────────────────────────────

    pub fn start_transaction(&self) {
        self.inner.node.debug_alive();
        self.inner.txn.set(true);
    }

    pub fn end_transaction(&self) {
        self.inner.node.debug_alive();
        if self.inner.txn.replace(false) {
            flush(&self.inner);
        }
    }

    pub fn subscribe(&self, callback: impl FnMut(&MapChange<K, V>) + 'static) -> Subscription {
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

impl<K, V> Emitter for MapEmitter<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn handle(&self) -> DynEmitter {
        DynEmitter::new(Rc::clone(&self.inner) as Rc<dyn ErasedEmitter>)
    }
}

impl<K, V> Clone for MapEmitter<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K, V> PartialEq for MapEmitter<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<K, V> Eq for MapEmitter<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
}

impl<K, V> fmt::Debug for MapEmitter<K, V>
where
    K: Clone + Eq + Hash + fmt::Debug + 'static,
    V: Clone + PartialEq + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapEmitter")
            .field("entries", &*self.inner.entries.borrow())
            .field("disposed", &self.inner.node.is_disposed())
            .finish()
    }
}
