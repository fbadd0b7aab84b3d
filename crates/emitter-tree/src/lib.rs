//! Observable-state core: a tree of mutable containers that broadcast
//! fine-grained change notifications.
//!
//! The building blocks are emitters. [`ValueEmitter`] holds one comparable
//! value, [`ListEmitter`] an ordered sequence, [`MapEmitter`] a keyed
//! collection; [`Container`] aggregates a declared set of child emitters into
//! one merged change stream. [`EmitterList`] and [`SelectableList`] add
//! ownership and selection semantics on top of the ordered container.
//!
//! Mutations record modification batches and notify synchronously;
//! transactions coalesce any number of mutations into a single notification.
//! Disposal cascades through ownership, and any node can look up a typed
//! ancestor through its registration chain.
//!
//! ```
//! use emitter_tree::{Compose, Container, DynEmitter, Emitter, ValueEmitter};
//!
//! struct Counter {
//!     count: ValueEmitter<i32>,
//! }
//!
//! impl Compose for Counter {
//!     fn children(&self) -> Vec<DynEmitter> {
//!         vec![self.count.handle()]
//!     }
//! }
//!
//! let root = Container::root(Counter { count: ValueEmitter::new(0) });
//! let sub = root.subscribe(|change| {
//!     assert_eq!(change.changes.len(), 1);
//! });
//! root.state().count.set(1).unwrap();
//! drop(sub);
//! ```

pub mod change;
pub mod container;
pub mod emitter;
pub mod error;
pub mod list;
pub mod map;
pub mod node;
pub mod owned_list;
pub mod selectable;
pub mod value;

pub use change::{
    ChildChange, ContainerChange, ListChange, ListModification, MapChange, MapModification,
    ValueChange,
};
pub use container::{Compose, Container};
pub use emitter::Emitter;
pub use error::EmitterError;
pub use list::{ListEmitter, ListOptions};
pub use map::{MapEmitter, MapOptions};
pub use node::{DynEmitter, Subscription};
pub use owned_list::EmitterList;
pub use selectable::SelectableList;
pub use value::ValueEmitter;

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
