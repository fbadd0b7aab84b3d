//! Owned emitter list with a tracked selection.
//!
//! [`SelectableList`] composes an [`EmitterList`] with a nullable
//! selected-index scalar and a derived selection scalar (the element at the
//! selected index, or `None`). The compound operations
//! ([`SelectableList::add_and_select`],
//! [`SelectableList::remove_and_select_previous`]) run inside one
//! transaction, so outside subscribers see a single notification for the
//! whole list-plus-selection update.

use std::fmt;

use crate::change::{ContainerChange, ValueChange};
use crate::container::{Compose, Container};
use crate::emitter::Emitter;
use crate::error::EmitterError;
use crate::node::{DynEmitter, Subscription};
use crate::owned_list::EmitterList;
use crate::value::ValueEmitter;

pub(crate) struct SelectableParts<E>
where
    E: Emitter + Clone + PartialEq + 'static,
{
    items: EmitterList<E>,
    selected_index: ValueEmitter<Option<usize>>,
    selection: ValueEmitter<Option<E>>,
}

impl<E> Compose for SelectableParts<E>
where
    E: Emitter + Clone + PartialEq + 'static,
{
    fn children(&self) -> Vec<DynEmitter> {
        vec![
            self.items.handle(),
            self.selected_index.handle(),
            self.selection.handle(),
        ]
    }
}

/// An [`EmitterList`] plus selection state.
pub struct SelectableList<E>
where
    E: Emitter + Clone + PartialEq + 'static,
{
    container: Container<SelectableParts<E>>,
}

impl<E> SelectableList<E>
where
    E: Emitter + Clone + PartialEq + 'static,
{
    pub fn new(elements: Vec<E>) -> Self {
        let items = EmitterList::new(elements);
        let selected_index = ValueEmitter::new(None::<usize>);

        // Out-of-range transients (between a removal and the index fixup)
        // resolve to None rather than failing.
        let selection = {
            let items = items.clone();
            let selected_index = selected_index.clone();
            ValueEmitter::computed(
                vec![items.handle(), selected_index.handle()],
                move || selected_index.get().and_then(|i| items.get(i)),
            )
        };

        Self {
            container: Container::new(SelectableParts {
                items,
                selected_index,
                selection,
            }),
        }
    }

    /// The underlying owned list.
    pub fn items(&self) -> EmitterList<E> {
        self.container.state().items.clone()
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.container.state().selected_index.get()
    }

    /// The element at the selected index, or `None` with no selection.
    pub fn selection(&self) -> Option<E> {
        self.container.state().selection.get()
    }

    /// Select the element at `index`.
    pub fn select(&self, index: usize) -> Result<(), EmitterError> {
        let len = self.container.state().items.len();
        if index >= len {
            return Err(EmitterError::InvalidSelection { index, len });
        }
        self.container.state().selected_index.set(Some(index))
    }

    pub fn clear_selection(&self) -> Result<(), EmitterError> {
        self.container.state().selected_index.set(None)
    }

    /// Append `element` and select it, as one notification.
    pub fn add_and_select(&self, element: E) -> Result<(), EmitterError> {
        self.container.start_transaction();
        let result = (|| {
            let state = self.container.state();
            state.items.push(element)?;
            state.selected_index.set(Some(state.items.len() - 1))
        })();
        self.container.end_transaction();
        result
    }

    /// Remove `element` if present and move the selection to its
    /// predecessor, as one notification. Returns whether the element was
    /// found.
    ///
    /// Selection adjustment: a removal below the selection shifts it down by
    /// one so the same element stays selected; removing the selected element
    /// selects its predecessor, or the element now at index 0 when there is
    /// none; an emptied list clears the selection.
    pub fn remove_and_select_previous(&self, element: &E) -> Result<bool, EmitterError> {
        let Some(index) = self.container.state().items.index_of(element) else {
            return Ok(false);
        };
        self.container.start_transaction();
        let result = (|| {
            let state = self.container.state();
            state.items.remove_at(index)?;
            let len = state.items.len();
            match state.selected_index.get() {
                Some(_) if len == 0 => state.selected_index.set(None)?,
                Some(selected) if index < selected => {
                    state.selected_index.set(Some(selected - 1))?
                }
                Some(selected) if index == selected => {
                    state.selected_index.set(Some(index.saturating_sub(1)))?
                }
                _ => {}
            }
            Ok(true)
        })();
        self.container.end_transaction();
        result
    }

    /// Subscribe to the merged change stream of the list and the selection
    /// scalars.
    pub fn subscribe(&self, callback: impl FnMut(&ContainerChange) + 'static) -> Subscription {
        self.container.subscribe(callback)
    }

    /// Subscribe to selection changes only.
    pub fn subscribe_selection(
        &self,
        callback: impl FnMut(&ValueChange<Option<E>>) + 'static,
    ) -> Subscription {
        self.container.state().selection.subscribe(callback)
    }
}

impl<E> Emitter for SelectableList<E>
where
    E: Emitter + Clone + PartialEq + 'static,
{
    fn handle(&self) -> DynEmitter {
        self.container.handle()
    }
}

impl<E> Clone for SelectableList<E>
where
    E: Emitter + Clone + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            container: self.container.clone(),
        }
    }
}

impl<E> PartialEq for SelectableList<E>
where
    E: Emitter + Clone + PartialEq + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        self.container == other.container
    }
}

impl<E> Eq for SelectableList<E> where E: Emitter + Clone + PartialEq + 'static {}

impl<E> fmt::Debug for SelectableList<E>
where
    E: Emitter + Clone + PartialEq + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectableList")
            .field("selected_index", &self.selected_index())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
