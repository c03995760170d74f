//! Mount Record registry - container to mounted-root bookkeeping.
//!
//! Process-wide (thread-local) map from a container to its currently
//! mounted root instance. Created on first mount into a container, updated
//! in place on re-mount, removed on explicit unmount. An update pass takes
//! the record out and marks the container busy; a nested update request for
//! a busy container queues behind it instead of interleaving.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::host::ContainerId;
use crate::node::{ComponentSpec, Node};

use super::instance::Instance;

// =============================================================================
// Types
// =============================================================================

/// What kind of description is mounted at the root, for the update-vs-
/// replace decision on re-mount.
#[derive(Clone)]
pub enum RootKind {
    Component(Rc<ComponentSpec>),
    Element(String),
    Text,
}

impl RootKind {
    pub fn of(node: &Node) -> Self {
        match node {
            Node::Component(c) => RootKind::Component(c.spec.clone()),
            Node::Element(e) => RootKind::Element(e.tag.clone()),
            Node::Text(_) => RootKind::Text,
        }
    }

    /// Same root type: same spec identity, same tag, or both text.
    pub fn matches(&self, node: &Node) -> bool {
        match (self, node) {
            (RootKind::Component(spec), Node::Component(c)) => Rc::ptr_eq(spec, &c.spec),
            (RootKind::Element(tag), Node::Element(e)) => *tag == e.tag,
            (RootKind::Text, Node::Text(_)) => true,
            _ => false,
        }
    }
}

/// Registry entry for one mounted container.
pub struct MountRecord {
    pub root: Instance,
    pub kind: RootKind,
}

// =============================================================================
// Registry State
// =============================================================================

thread_local! {
    static RECORDS: RefCell<HashMap<ContainerId, MountRecord>> = RefCell::new(HashMap::new());

    /// Containers with an update pass in flight.
    static UPDATING: RefCell<HashSet<ContainerId>> = RefCell::new(HashSet::new());
}

pub fn insert(container: ContainerId, record: MountRecord) {
    RECORDS.with(|records| {
        records.borrow_mut().insert(container, record);
    });
}

/// Take the record out for an update pass. The caller must `insert` it back
/// (or drop it on unmount).
pub fn take(container: ContainerId) -> Option<MountRecord> {
    RECORDS.with(|records| records.borrow_mut().remove(&container))
}

pub fn remove(container: ContainerId) -> Option<MountRecord> {
    RECORDS.with(|records| records.borrow_mut().remove(&container))
}

pub fn is_mounted(container: ContainerId) -> bool {
    RECORDS.with(|records| records.borrow().contains_key(&container))
}

pub fn root_kind(container: ContainerId) -> Option<RootKind> {
    RECORDS.with(|records| records.borrow().get(&container).map(|r| r.kind.clone()))
}

/// Run a closure with shared access to a container's record.
pub fn with_record<R>(
    container: ContainerId,
    f: impl FnOnce(&MountRecord) -> R,
) -> Option<R> {
    RECORDS.with(|records| records.borrow().get(&container).map(f))
}

// =============================================================================
// Update Exclusivity
// =============================================================================

pub fn mark_updating(container: ContainerId) {
    UPDATING.with(|set| {
        set.borrow_mut().insert(container);
    });
}

pub fn unmark_updating(container: ContainerId) {
    UPDATING.with(|set| {
        set.borrow_mut().remove(&container);
    });
}

pub fn is_updating(container: ContainerId) -> bool {
    UPDATING.with(|set| set.borrow().contains(&container))
}

// =============================================================================
// Reset (for testing)
// =============================================================================

pub fn reset_registry_state() {
    RECORDS.with(|records| records.borrow_mut().clear());
    UPDATING.with(|set| set.borrow_mut().clear());
}
