//! Mount Coordinator - the engine's top-level entry points.
//!
//! `mount` picks one of three strategies per container:
//!
//! 1. **Fresh construction**: no mount record, container empty (content
//!    without engine identifiers is cleared first).
//! 2. **Reconciling re-mount**: a record exists and the new root is the
//!    same kind; the reconciler updates in place, preserving identifiers
//!    for unchanged positions.
//! 3. **Adoptive mount**: no record, but the container holds markup
//!    carrying engine identifiers (a prior markup render). The full mount
//!    lifecycle runs, the existing nodes' identifiers are adopted into the
//!    instance tree, handlers are registered, and the container content is
//!    left byte-for-byte untouched. A structural mismatch falls back to
//!    fresh construction.
//!
//! Updates are run-to-completion: a pass marks its container busy, and a
//! nested request for that container (from a lifecycle hook) queues on a
//! pending list the outermost pass drains before returning. Requests made
//! from event handlers outside any pass run synchronously.
//!
//! # Example
//!
//! ```ignore
//! use arbor::{component, el, text, mount, ComponentSpec, Props};
//!
//! let spec = ComponentSpec::new("Hello", |props, _| {
//!     Ok(el("span")
//!         .child(text(format!("hello {}", props.str("name").unwrap_or(""))))
//!         .into())
//! })
//! .build();
//!
//! let container = arbor::host::create_container();
//! let handle = mount(&component(&spec, Props::new().set("name", "world")), container)?;
//! handle.set_state("", Props::new().set("clicked", true))?;
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::engine::id;
use crate::engine::instance::{
    Instance, find_at_path, find_composite_mut, fire_pending, instantiate, unmount_instance,
};
use crate::engine::registry::{self, MountRecord, RootKind};
use crate::error::{EngineError, Result};
use crate::events;
use crate::host::{self, ContainerId, LiveChild};
use crate::node::Node;
use crate::renderer::live::{apply_patches, collect_bindings, materialize};
use crate::renderer::markup::render_instance_to_markup;
use crate::types::Props;

use super::reconcile::{ReconcileCtx, reconcile_root, update_composite};

// =============================================================================
// Pending Queue
// =============================================================================

enum PendingOp {
    Mount(Node),
    SetState { path: String, partial: Props },
}

thread_local! {
    /// Update requests made while their container had a pass in flight.
    static PENDING: RefCell<VecDeque<(ContainerId, PendingOp)>> = RefCell::new(VecDeque::new());
}

fn schedule(container: ContainerId, op: PendingOp) -> Result<()> {
    if registry::is_updating(container) {
        tracing::trace!(?container, "queueing request behind in-flight pass");
        PENDING.with(|queue| queue.borrow_mut().push_back((container, op)));
        return Ok(());
    }
    run_op(container, op)?;
    drain_pending()
}

fn run_op(container: ContainerId, op: PendingOp) -> Result<()> {
    registry::mark_updating(container);
    let result = match op {
        PendingOp::Mount(node) => perform_mount(container, &node),
        PendingOp::SetState { path, partial } => perform_set_state(container, &path, partial),
    };
    registry::unmark_updating(container);
    result
}

fn drain_pending() -> Result<()> {
    loop {
        let next = PENDING.with(|queue| queue.borrow_mut().pop_front());
        let Some((container, op)) = next else {
            return Ok(());
        };
        run_op(container, op)?;
    }
}

// =============================================================================
// Public Surface
// =============================================================================

/// Handle to a mounted container.
#[derive(Clone, Copy, Debug)]
pub struct MountHandle {
    container: ContainerId,
}

/// Read-only view of one instance, for inspection.
#[derive(Clone, Debug)]
pub struct InstanceSnapshot {
    pub id: String,
    /// Component name, element tag, or `#text`.
    pub name: String,
    pub props: Props,
    /// Present for composite instances only.
    pub state: Option<Props>,
}

/// Mount a description into a container.
pub fn mount(node: &Node, container: ContainerId) -> Result<MountHandle> {
    schedule(container, PendingOp::Mount(node.clone()))?;
    Ok(MountHandle { container })
}

/// Tear down whatever is mounted in a container. Returns true if a mounted
/// tree was actually removed.
pub fn unmount(container: ContainerId) -> Result<bool> {
    if !host::container_exists(container) {
        return Err(EngineError::UnknownContainer(container));
    }
    if !registry::is_mounted(container) {
        return Ok(false);
    }
    teardown(container)?;
    tracing::debug!(?container, "unmounted");
    Ok(true)
}

/// Render a description to markup, delivering the string to `callback`
/// exactly once, synchronously.
pub fn render_to_markup(node: &Node, callback: impl FnOnce(&str)) -> Result<()> {
    let markup = render_markup(node)?;
    callback(&markup);
    Ok(())
}

/// Direct-return form of [`render_to_markup`].
pub fn render_markup(node: &Node) -> Result<String> {
    let (markup, _root) = render_instance_to_markup(node)?;
    Ok(markup)
}

impl MountHandle {
    pub fn container(&self) -> ContainerId {
        self.container
    }

    /// Identifier of the mounted root, if still mounted.
    pub fn root_id(&self) -> Option<String> {
        registry::with_record(self.container, |record| record.root.id().to_string())
    }

    /// Snapshot the instance at a dot-separated child-index path ("" is the
    /// root, "0.1" the second child of the first child).
    pub fn instance_at(&self, path: &str) -> Option<InstanceSnapshot> {
        registry::with_record(self.container, |record| {
            find_at_path(&record.root, path).map(snapshot)
        })
        .flatten()
    }

    /// Merge partial state into the composite at `path` and run its update
    /// lifecycle.
    pub fn set_state(&self, path: &str, partial: Props) -> Result<()> {
        schedule(
            self.container,
            PendingOp::SetState {
                path: path.to_string(),
                partial,
            },
        )
    }

    /// Re-mount with a new description (reconciles when the root kind is
    /// unchanged).
    pub fn update(&self, node: &Node) -> Result<()> {
        schedule(self.container, PendingOp::Mount(node.clone()))
    }
}

fn snapshot(inst: &Instance) -> InstanceSnapshot {
    match inst {
        Instance::Host(h) => InstanceSnapshot {
            id: h.id.clone(),
            name: h.tag.clone(),
            props: h.props.clone(),
            state: None,
        },
        Instance::Composite(c) => InstanceSnapshot {
            id: c.id.clone(),
            name: c.spec.name.clone(),
            props: c.props.clone(),
            state: Some(c.state.clone()),
        },
        Instance::Text(t) => InstanceSnapshot {
            id: t.id.clone(),
            name: "#text".to_string(),
            props: Props::new(),
            state: None,
        },
    }
}

// =============================================================================
// Mount Strategies
// =============================================================================

fn perform_mount(container: ContainerId, node: &Node) -> Result<()> {
    if !host::container_exists(container) {
        return Err(EngineError::UnknownContainer(container));
    }
    match registry::root_kind(container) {
        Some(kind) if kind.matches(node) => {
            tracing::debug!(?container, "reconciling re-mount");
            update_mounted(container, node)
        }
        Some(_) => {
            tracing::debug!(?container, "root kind changed, remounting fresh");
            teardown(container)?;
            fresh_mount(container, node)
        }
        None => {
            let live = host::children_of(container)?;
            if live.is_empty() {
                tracing::debug!(?container, "fresh mount");
                fresh_mount(container, node)
            } else if has_identified(&live) {
                adopt_or_fresh(container, node, &live)
            } else {
                tracing::debug!(?container, "clearing unrecognized content");
                host::clear(container)?;
                fresh_mount(container, node)
            }
        }
    }
}

fn install_bindings(root: &Instance) {
    for (node_id, handlers) in collect_bindings(root) {
        events::rebind(&node_id, &handlers);
    }
}

fn fresh_mount(container: ContainerId, node: &Node) -> Result<()> {
    let mut root = instantiate(node, id::next_root_id())?;
    host::attach(container, materialize(&root, false))?;
    install_bindings(&root);
    fire_pending(&mut root, true);
    registry::insert(
        container,
        MountRecord {
            root,
            kind: RootKind::of(node),
        },
    );
    Ok(())
}

fn update_mounted(container: ContainerId, node: &Node) -> Result<()> {
    let mut record = registry::take(container).ok_or(EngineError::NotMounted(container))?;
    let mut ctx = ReconcileCtx::new();
    if let Err(e) = reconcile_root(&mut record.root, node, &mut ctx) {
        restore_after_failure(container, record);
        return Err(e);
    }
    if let Err(e) = apply_ctx(container, ctx) {
        restore_after_failure(container, record);
        return Err(e);
    }
    fire_pending(&mut record.root, true);
    registry::insert(container, record);
    Ok(())
}

fn perform_set_state(container: ContainerId, path: &str, partial: Props) -> Result<()> {
    let mut record = registry::take(container).ok_or(EngineError::NotMounted(container))?;
    let mut ctx = ReconcileCtx::new();
    let result = match find_composite_mut(&mut record.root, path) {
        None => Err(EngineError::NoSuchInstance(path.to_string())),
        Some((composite, slot)) => update_composite(composite, None, Some(partial), &slot, &mut ctx),
    };
    if let Err(e) = result {
        restore_after_failure(container, record);
        return Err(e);
    }
    if let Err(e) = apply_ctx(container, ctx) {
        restore_after_failure(container, record);
        return Err(e);
    }
    fire_pending(&mut record.root, true);
    registry::insert(container, record);
    Ok(())
}

/// Put the record back after a failed pass. Instances that finished their
/// part of the pass settle without firing attachment effects: the patches
/// those effects belong to were discarded.
fn restore_after_failure(container: ContainerId, mut record: MountRecord) {
    fire_pending(&mut record.root, false);
    registry::insert(container, record);
}

/// Apply everything a successful pass collected. Releases go first so a
/// rebound identifier survives.
fn apply_ctx(container: ContainerId, ctx: ReconcileCtx) -> Result<()> {
    for node_id in &ctx.released {
        events::release(node_id);
    }
    for (node_id, handlers) in &ctx.rebound {
        events::rebind(node_id, handlers);
    }
    apply_patches(container, ctx.patches)
}

fn teardown(container: ContainerId) -> Result<()> {
    if let Some(mut record) = registry::remove(container) {
        let mut released = Vec::new();
        if let Err(e) = unmount_instance(&mut record.root, &mut released) {
            registry::insert(container, record);
            return Err(e);
        }
        for node_id in released {
            events::release(&node_id);
        }
        host::clear(container)?;
    }
    Ok(())
}

// =============================================================================
// Adoption
// =============================================================================

fn has_identified(children: &[LiveChild]) -> bool {
    children.iter().any(|child| match child {
        LiveChild::Element(node) => {
            node.identifier().is_some() || has_identified(&node.children)
        }
        LiveChild::Text(_) => false,
    })
}

fn adopt_or_fresh(container: ContainerId, node: &Node, live: &[LiveChild]) -> Result<()> {
    // The full mount lifecycle runs either way; adoption only decides
    // whether the output is attached or the existing nodes are kept.
    let mut root = instantiate(node, id::next_root_id())?;

    if live.len() == 1 && shape_matches(&root, false, &live[0]) {
        tracing::debug!(?container, "adoptive mount");
        adopt_ids(&mut root, &live[0]);
    } else {
        tracing::debug!(?container, "adoption mismatch, falling back to fresh mount");
        host::clear(container)?;
        host::attach(container, materialize(&root, false))?;
    }

    install_bindings(&root);
    fire_pending(&mut root, true);
    registry::insert(
        container,
        MountRecord {
            root,
            kind: RootKind::of(node),
        },
    );
    Ok(())
}

/// Structural comparison for adoption: tags and child shape only, never
/// text or attribute values. Mirrors the materializer's wrapping rule.
fn shape_matches(inst: &Instance, wrapped: bool, live: &LiveChild) -> bool {
    match inst {
        Instance::Text(_) => {
            if wrapped {
                matches!(
                    live,
                    LiveChild::Element(node)
                        if node.tag == "span"
                            && node.children.len() == 1
                            && matches!(node.children[0], LiveChild::Text(_))
                )
            } else {
                matches!(live, LiveChild::Text(_))
            }
        }
        Instance::Composite(c) => shape_matches(&c.rendered, wrapped, live),
        Instance::Host(h) => match live {
            LiveChild::Element(node) => {
                node.tag == h.tag && node.children.len() == h.children.len() && {
                    let lone = h.children.len() == 1;
                    h.children.iter().zip(&node.children).all(|(child, live_child)| {
                        let child_wrapped =
                            !(lone && crate::engine::instance::renders_as_text(child));
                        shape_matches(child, child_wrapped, live_child)
                    })
                }
            }
            LiveChild::Text(_) => false,
        },
    }
}

/// Overwrite the instance tree's identifiers with the ones the existing
/// nodes carry. Only runs after `shape_matches`, so the walks line up.
fn adopt_ids(inst: &mut Instance, live: &LiveChild) {
    match inst {
        Instance::Text(t) => {
            if let LiveChild::Element(node) = live {
                if let Some(adopted) = node.identifier() {
                    t.id = adopted.to_string();
                }
            }
        }
        Instance::Composite(c) => {
            if let LiveChild::Element(node) = live {
                if let Some(adopted) = node.identifier() {
                    c.id = adopted.to_string();
                }
            }
            adopt_ids(&mut c.rendered, live);
        }
        Instance::Host(h) => {
            if let LiveChild::Element(node) = live {
                if let Some(adopted) = node.identifier() {
                    h.id = adopted.to_string();
                }
                for (child, live_child) in h.children.iter_mut().zip(&node.children) {
                    adopt_ids(child, live_child);
                }
            }
        }
    }
}

// =============================================================================
// Reset (for testing)
// =============================================================================

pub fn reset_pipeline_state() {
    PENDING.with(|queue| queue.borrow_mut().clear());
}

// =============================================================================
// Tests
// =============================================================================
