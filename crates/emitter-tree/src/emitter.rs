//! The base emitter capability.

use crate::container::{Compose, Container};
use crate::node::DynEmitter;

/// Common surface of every node in an emitter tree.
///
/// Concrete emitters are cheap-`Clone` handles; [`Emitter::handle`] erases
/// the concrete type for storage in heterogeneous child/dependency lists.
/// Equality on handles is node identity, never value equality.
pub trait Emitter {
    /// Type-erased handle to this node.
    fn handle(&self) -> DynEmitter;

    fn is_disposed(&self) -> bool {
        self.handle().is_disposed()
    }

    /// Close the change stream and release everything this node owns.
    ///
    /// Disposal is terminal: a second call is a contract violation that
    /// fails fast in debug builds and is ignored in release builds.
    fn dispose(&self) {
        self.handle().dispose();
    }

    /// Attach this node under `parent`, establishing the ancestor chain for
    /// [`Emitter::find_ancestor`]. Containers cascade this through their
    /// declared children.
    fn register(&self, parent: &DynEmitter) {
        self.handle().register(parent);
    }

    /// Nearest ancestor container whose state type is exactly `C`.
    fn find_ancestor<C: Compose>(&self) -> Option<Container<C>> {
        self.handle().find_ancestor::<C>()
    }
}

impl Emitter for DynEmitter {
    fn handle(&self) -> DynEmitter {
        self.clone()
    }
}
