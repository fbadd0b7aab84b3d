//! Typed ancestor lookup through the registration chain.

use emitter_tree::{Compose, Container, DynEmitter, Emitter, EmitterList, ValueEmitter};

struct Leaf {
    value: ValueEmitter<i32>,
}

impl Leaf {
    fn new(value: i32) -> Container<Leaf> {
        Container::new(Leaf {
            value: ValueEmitter::new(value),
        })
    }
}

impl Compose for Leaf {
    fn children(&self) -> Vec<DynEmitter> {
        vec![self.value.handle()]
    }
}

struct Branch {
    leaves: EmitterList<Container<Leaf>>,
}

impl Compose for Branch {
    fn children(&self) -> Vec<DynEmitter> {
        vec![self.leaves.handle()]
    }
}

struct Root {
    branch: Container<Branch>,
}

impl Compose for Root {
    fn children(&self) -> Vec<DynEmitter> {
        vec![self.branch.handle()]
    }
}

struct Unrelated;

impl Compose for Unrelated {
    fn children(&self) -> Vec<DynEmitter> {
        Vec::new()
    }
}

fn build() -> Container<Root> {
    Container::root(Root {
        branch: Container::new(Branch {
            leaves: EmitterList::new(vec![Leaf::new(1), Leaf::new(2)]),
        }),
    })
}

#[test]
fn leaf_finds_every_ancestor_by_exact_state_type() {
    let root = build();
    let leaf = root.state().branch.state().leaves.get(0).unwrap();

    let found_root = leaf.find_ancestor::<Root>().expect("root reachable");
    assert_eq!(found_root, root);

    let found_branch = leaf.find_ancestor::<Branch>().expect("branch reachable");
    assert_eq!(found_branch, root.state().branch);
}

#[test]
fn lookup_of_an_absent_type_returns_none() {
    let root = build();
    let leaf = root.state().branch.state().leaves.get(0).unwrap();
    assert!(leaf.find_ancestor::<Unrelated>().is_none());
}

#[test]
fn lookup_starts_at_the_parent_not_at_the_node_itself() {
    let root = build();
    let branch = &root.state().branch;
    // A branch looking for a branch skips itself and finds nothing above.
    assert!(branch.find_ancestor::<Branch>().is_none());
    assert!(branch.find_ancestor::<Root>().is_some());
}

#[test]
fn element_pushed_after_construction_is_wired_into_the_chain() {
    let root = build();
    let late = Leaf::new(99);
    root.state().branch.state().leaves.push(late.clone()).unwrap();

    assert_eq!(late.find_ancestor::<Root>(), Some(root.clone()));
}

#[test]
fn scalar_children_resolve_ancestors_through_their_composite() {
    let root = build();
    let leaf = root.state().branch.state().leaves.get(1).unwrap();
    let scalar = leaf.state().value.clone();

    assert_eq!(scalar.find_ancestor::<Leaf>(), Some(leaf));
    assert_eq!(scalar.find_ancestor::<Root>(), Some(root));
}

#[test]
fn list_element_hook_fires_once_the_chain_is_complete() {
    use std::cell::Cell;
    use std::rc::Rc;

    struct Entry {
        value: ValueEmitter<i32>,
        saw_registry: Rc<Cell<bool>>,
    }

    impl Compose for Entry {
        fn children(&self) -> Vec<DynEmitter> {
            vec![self.value.handle()]
        }

        fn did_register(&self, container: &Container<Entry>) {
            if container.find_ancestor::<Registry>().is_some() {
                self.saw_registry.set(true);
            }
        }
    }

    struct Registry {
        entries: EmitterList<Container<Entry>>,
    }

    impl Compose for Registry {
        fn children(&self) -> Vec<DynEmitter> {
            vec![self.entries.handle()]
        }
    }

    let saw = Rc::new(Cell::new(false));
    let entry = Container::new(Entry {
        value: ValueEmitter::new(0),
        saw_registry: Rc::clone(&saw),
    });

    // The element joins the list before any root exists; the root pass must
    // re-register it so the hook runs with the full chain in place.
    let registry = Container::root(Registry {
        entries: EmitterList::new(vec![entry]),
    });

    assert!(saw.get());
    assert!(registry.state().entries.get(0).unwrap().find_ancestor::<Registry>().is_some());
}

#[test]
fn unregistered_standalone_node_has_no_ancestors() {
    let lonely = ValueEmitter::new(0);
    assert!(lonely.find_ancestor::<Root>().is_none());
}
