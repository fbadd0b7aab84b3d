//! Transaction semantics across the container kinds: exactly one
//! notification per transaction, no notification for an empty one, and
//! synchronous delivery at the close call.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use emitter_tree::{
    Compose, Container, ContainerChange, DynEmitter, Emitter, ListEmitter, MapEmitter,
    ValueEmitter,
};

struct Document {
    title: ValueEmitter<String>,
    tags: ListEmitter<String>,
    attrs: MapEmitter<String, String>,
}

impl Document {
    fn new() -> Self {
        Self {
            title: ValueEmitter::new(String::new()),
            tags: ListEmitter::new(Vec::new()),
            attrs: MapEmitter::new([]),
        }
    }
}

impl Compose for Document {
    fn children(&self) -> Vec<DynEmitter> {
        vec![self.title.handle(), self.tags.handle(), self.attrs.handle()]
    }
}

#[test]
fn one_notification_for_many_mutations_of_many_kinds() {
    let doc = Container::root(Document::new());
    let batches = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&batches);
    let _sub = doc.subscribe(move |c: &ContainerChange| {
        sink.borrow_mut().push(c.changes.len());
    });

    doc.start_transaction();
    doc.state().title.set("draft".into()).unwrap();
    doc.state().tags.push("a".into()).unwrap();
    doc.state().tags.push("b".into()).unwrap();
    doc.state().attrs.insert("lang".into(), "en".into()).unwrap();
    doc.state().title.set("final".into()).unwrap();
    assert!(batches.borrow().is_empty(), "nothing leaves an open transaction");
    doc.end_transaction();

    // Five mutations, five buffered child changes, one notification.
    assert_eq!(&*batches.borrow(), &[5]);
}

#[test]
fn subscriber_added_during_the_transaction_sees_the_batch() {
    // Transactions close synchronously, so a subscriber attached between a
    // buffered mutation and the close still observes the batch.
    let doc = Container::root(Document::new());

    doc.start_transaction();
    doc.state().title.set("early".into()).unwrap();

    let count = Rc::new(Cell::new(0u32));
    let sink = Rc::clone(&count);
    let _sub = doc.subscribe(move |_| sink.set(sink.get() + 1));

    doc.end_transaction();
    assert_eq!(count.get(), 1);
}

#[test]
fn list_transaction_state_is_independent_of_the_container() {
    let doc = Container::root(Document::new());
    let count = Rc::new(Cell::new(0u32));
    let sink = Rc::clone(&count);
    let _sub = doc.subscribe(move |_| sink.set(sink.get() + 1));

    // The list batches its own records; the container still re-emits once
    // per list flush when no container transaction is open.
    doc.state().tags.start_transaction();
    doc.state().tags.push("a".into()).unwrap();
    doc.state().tags.push("b".into()).unwrap();
    doc.state().tags.end_transaction();
    assert_eq!(count.get(), 1);
}

#[test]
fn unsubscribing_during_delivery_suppresses_the_in_flight_notification() {
    let doc = Container::root(Document::new());

    let late_fired = Rc::new(Cell::new(false));
    let victim: Rc<RefCell<Option<emitter_tree::Subscription>>> =
        Rc::new(RefCell::new(None));

    let killer = Rc::clone(&victim);
    let _first = doc.subscribe(move |_| {
        if let Some(sub) = killer.borrow_mut().take() {
            sub.unsubscribe();
        }
    });
    let flag = Rc::clone(&late_fired);
    *victim.borrow_mut() = Some(doc.subscribe(move |_| flag.set(true)));

    doc.state().title.set("x".into()).unwrap();
    assert!(!late_fired.get(), "cancelled mid-delivery, must not fire");
}

#[test]
fn scalar_changes_arrive_in_mutation_order_inside_the_batch() {
    let doc = Container::root(Document::new());
    let order = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&order);
    let title = doc.state().title.handle();
    let tags = doc.state().tags.handle();
    let _sub = doc.subscribe(move |c: &ContainerChange| {
        for child in &c.changes {
            if child.source.same(&title) {
                sink.borrow_mut().push("title");
            } else if child.source.same(&tags) {
                sink.borrow_mut().push("tags");
            }
        }
    });

    doc.start_transaction();
    doc.state().tags.push("t".into()).unwrap();
    doc.state().title.set("after".into()).unwrap();
    doc.end_transaction();

    assert_eq!(&*order.borrow(), &["tags", "title"]);
}
