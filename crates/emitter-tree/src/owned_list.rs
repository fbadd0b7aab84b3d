//! Ordered container owning emitter elements.
//!
//! [`EmitterList`] is the list surface restricted to emitter-typed elements,
//! with two ownership rules on top:
//!
//! - every inserted element is registered under the list (cascading through
//!   composite descendants) at the moment of insertion;
//! - an element removed from the list is disposed at the next flush, unless
//!   the same element is still present somewhere in the list by then (a
//!   reorder is not a removal).
//!
//! Disposing the list disposes every current element in index order.

use std::fmt;

use rand::Rng;

use crate::change::ListChange;
use crate::emitter::Emitter;
use crate::error::EmitterError;
use crate::list::{ListEmitter, ListOptions, OwnershipHooks};
use crate::node::{DynEmitter, Subscription};

/// A [`ListEmitter`] whose elements are emitters owned by the list.
pub struct EmitterList<E>
where
    E: Emitter + Clone + PartialEq + 'static,
{
    list: ListEmitter<E>,
}

impl<E> EmitterList<E>
where
    E: Emitter + Clone + PartialEq + 'static,
{
    pub fn new(items: Vec<E>) -> Self {
        Self::with_options(items, ListOptions::default())
    }

    pub fn with_options(items: Vec<E>, options: ListOptions) -> Self {
        let list = ListEmitter::with_options(items, options);
        list.install_hooks(OwnershipHooks {
            attach: Box::new(|element: &E, parent: &DynEmitter| {
                element.register(parent);
            }),
            release: Box::new(|element: &E| {
                if !element.is_disposed() {
                    element.dispose();
                }
            }),
        });
        Self { list }
    }

    // ── Reads ──────────────────────────────────────────────────────────────

    pub fn get(&self, index: usize) -> Option<E> {
        self.list.get(index)
    }

    pub fn first(&self) -> Option<E> {
        self.list.first()
    }

    pub fn last(&self) -> Option<E> {
        self.list.last()
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.list.to_vec()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn contains(&self, element: &E) -> bool {
        self.list.contains(element)
    }

    pub fn index_of(&self, element: &E) -> Option<usize> {
        self.list.index_of(element)
    }

    // ── Mutations ──────────────────────────────────────────────────────────

    pub fn set(&self, index: usize, element: E) -> Result<(), EmitterError> {
        self.list.set(index, element)
    }

    pub fn insert(&self, index: usize, element: E) -> Result<(), EmitterError> {
        self.list.insert(index, element)
    }

    pub fn push(&self, element: E) -> Result<(), EmitterError> {
        self.list.push(element)
    }

    pub fn extend(&self, elements: impl IntoIterator<Item = E>) -> Result<(), EmitterError> {
        self.list.extend(elements)
    }

    pub fn insert_all(
        &self,
        index: usize,
        elements: impl IntoIterator<Item = E>,
    ) -> Result<(), EmitterError> {
        self.list.insert_all(index, elements)
    }

    pub fn remove_at(&self, index: usize) -> Result<E, EmitterError> {
        self.list.remove_at(index)
    }

    pub fn remove(&self, element: &E) -> Result<bool, EmitterError> {
        self.list.remove(element)
    }

    pub fn remove_where(&self, pred: impl FnMut(&E) -> bool) -> Result<usize, EmitterError> {
        self.list.remove_where(pred)
    }

    pub fn retain(&self, pred: impl FnMut(&E) -> bool) -> Result<usize, EmitterError> {
        self.list.retain(pred)
    }

    pub fn pop(&self) -> Result<Option<E>, EmitterError> {
        self.list.pop()
    }

    pub fn remove_range(&self, start: usize, end: usize) -> Result<(), EmitterError> {
        self.list.remove_range(start, end)
    }

    pub fn replace_range(
        &self,
        start: usize,
        end: usize,
        elements: Vec<E>,
    ) -> Result<(), EmitterError> {
        self.list.replace_range(start, end, elements)
    }

    /// Shrink to `len`, disposing the removed tail elements. Growing is
    /// rejected with [`EmitterError::MissingFillValue`]: the list cannot
    /// fabricate owned elements.
    pub fn set_len(&self, len: usize) -> Result<(), EmitterError> {
        self.list.set_len(len)
    }

    pub fn clear(&self) -> Result<(), EmitterError> {
        self.list.clear()
    }

    pub fn shuffle(&self, rng: &mut impl Rng) -> Result<(), EmitterError> {
        self.list.shuffle(rng)
    }

    // ── Transactions ───────────────────────────────────────────────────────

    pub fn start_transaction(&self) {
        self.list.start_transaction();
    }

    pub fn end_transaction(&self) {
        self.list.end_transaction();
    }

    pub fn subscribe(&self, callback: impl FnMut(&ListChange<E>) + 'static) -> Subscription {
        self.list.subscribe(callback)
    }
}

impl<E> Emitter for EmitterList<E>
where
    E: Emitter + Clone + PartialEq + 'static,
{
    fn handle(&self) -> DynEmitter {
        self.list.handle()
    }
}

impl<E> Clone for EmitterList<E>
where
    E: Emitter + Clone + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            list: self.list.clone(),
        }
    }
}

impl<E> PartialEq for EmitterList<E>
where
    E: Emitter + Clone + PartialEq + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        self.list == other.list
    }
}

impl<E> Eq for EmitterList<E> where E: Emitter + Clone + PartialEq + 'static {}

impl<E> fmt::Debug for EmitterList<E>
where
    E: Emitter + Clone + PartialEq + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmitterList")
            .field("list", &self.list)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueEmitter;

    #[test]
    fn removed_element_is_disposed_after_flush() {
        let a = ValueEmitter::new(1);
        let b = ValueEmitter::new(2);
        let list = EmitterList::new(vec![a.clone(), b.clone()]);

        list.remove_at(0).unwrap();
        assert!(a.is_disposed());
        assert!(!b.is_disposed());
    }

    #[test]
    fn reorder_within_one_transaction_does_not_dispose() {
        let a = ValueEmitter::new(1);
        let b = ValueEmitter::new(2);
        let list = EmitterList::new(vec![a.clone(), b.clone()]);

        list.start_transaction();
        list.remove_at(0).unwrap();
        list.push(a.clone()).unwrap();
        list.end_transaction();

        assert!(!a.is_disposed(), "net reorder keeps the element alive");
        assert_eq!(list.index_of(&a), Some(1));
    }

    #[test]
    fn reorder_within_one_composite_mutation_does_not_dispose() {
        let a = ValueEmitter::new(1);
        let b = ValueEmitter::new(2);
        let list = EmitterList::new(vec![a.clone(), b.clone()]);

        // One flush window covers both records.
        list.replace_range(0, 2, vec![b.clone(), a.clone()]).unwrap();
        assert!(!a.is_disposed());
        assert!(!b.is_disposed());
        assert_eq!(list.to_vec(), vec![b, a]);
    }

    #[test]
    fn disposing_the_list_disposes_every_element() {
        let a = ValueEmitter::new(1);
        let b = ValueEmitter::new(2);
        let list = EmitterList::new(vec![a.clone(), b.clone()]);

        list.dispose();
        assert!(list.is_disposed());
        assert!(a.is_disposed());
        assert!(b.is_disposed());
    }

    #[test]
    fn cleared_list_disposes_all_former_elements() {
        let a = ValueEmitter::new(1);
        let b = ValueEmitter::new(2);
        let list = EmitterList::new(vec![a.clone(), b.clone()]);

        list.clear().unwrap();
        assert!(list.is_empty());
        assert!(a.is_disposed());
        assert!(b.is_disposed());
        assert!(!list.is_disposed());
    }

    #[test]
    fn set_len_shrinks_from_the_tail_and_disposes_removals() {
        let a = ValueEmitter::new(1);
        let b = ValueEmitter::new(2);
        let c = ValueEmitter::new(3);
        let list = EmitterList::new(vec![a.clone(), b.clone(), c.clone()]);

        list.set_len(1).unwrap();
        assert_eq!(list.to_vec(), vec![a.clone()]);
        assert!(!a.is_disposed());
        assert!(b.is_disposed());
        assert!(c.is_disposed());

        assert_eq!(list.set_len(4), Err(EmitterError::MissingFillValue));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn inserted_element_points_back_at_the_list() {
        let list = EmitterList::new(Vec::new());
        let element = ValueEmitter::new(7);
        list.push(element.clone()).unwrap();

        // The parent back-reference is live: removing through identity works
        // and the element is found in the list.
        assert_eq!(list.index_of(&element), Some(0));
    }
}
