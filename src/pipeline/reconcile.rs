//! Reconciler - minimal updates from a previous instance tree and a new
//! description.
//!
//! Reconciliation is two-phase: this module walks the trees running the
//! update lifecycle and collecting `Patch`es plus dispatch-table deltas,
//! and the coordinator applies them only once the whole pass has
//! succeeded. A failure mid-walk therefore never leaves a half-mutated
//! container.
//!
//! Position rules: same type reuses the instance and recurses; a type
//! change builds the replacement subtree first (fresh identifier space)
//! and unmounts the stale one after. Sibling lists are matched by explicit
//! key when present, else by index, left to right; moves surface as a
//! keep-by-identifier child-list patch rather than rebuilds.

use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use crate::engine::id;
use crate::engine::instance::{
    CompositeInstance, HostInstance, Instance, Pending, Phase, SlotKind, check_sibling_keys,
    instantiate, renders_as_text, unmount_instance, visible_id,
};
use crate::error::{EngineError, Result};
use crate::events::EventHandler;
use crate::host::ChildSpec;
use crate::node::Node;
use crate::renderer::live::{Patch, collect_bindings, materialize};
use crate::types::Props;

// =============================================================================
// Context
// =============================================================================

/// Everything a pass accumulates for deferred application.
pub(crate) struct ReconcileCtx {
    pub patches: Vec<Patch>,
    /// Identifiers whose dispatch-table entries must be released.
    pub released: Vec<String>,
    /// Identifiers whose handlers must be rebound to a new set.
    pub rebound: Vec<(String, Vec<(String, EventHandler)>)>,
}

impl ReconcileCtx {
    pub fn new() -> Self {
        Self {
            patches: Vec::new(),
            released: Vec::new(),
            rebound: Vec::new(),
        }
    }

    fn change_marker(&self) -> usize {
        self.patches.len() + self.released.len() + self.rebound.len()
    }
}

// =============================================================================
// Entry
// =============================================================================

/// Reconcile the mounted root against a new description.
pub(crate) fn reconcile_root(
    root: &mut Instance,
    next: &Node,
    ctx: &mut ReconcileCtx,
) -> Result<()> {
    if compatible(root, next) {
        reconcile(root, next, &SlotKind::Root, ctx)
    } else {
        replace_slot(root, next, &SlotKind::Root, ctx)
    }
}

/// Same type at the same position: text with text, element with the same
/// tag, composite with the same spec identity.
fn compatible(prev: &Instance, next: &Node) -> bool {
    match (prev, next) {
        (Instance::Text(_), Node::Text(_)) => true,
        (Instance::Host(h), Node::Element(e)) => h.tag == e.tag,
        (Instance::Composite(c), Node::Component(n)) => Rc::ptr_eq(&c.spec, &n.spec),
        _ => false,
    }
}

// =============================================================================
// Position Reconciliation
// =============================================================================

fn reconcile(
    prev: &mut Instance,
    next: &Node,
    slot: &SlotKind,
    ctx: &mut ReconcileCtx,
) -> Result<()> {
    debug_assert!(compatible(prev, next));
    match (prev, next) {
        (Instance::Text(t), Node::Text(s)) => {
            if t.text != *s {
                t.text = s.clone();
                ctx.patches.push(Patch::SetText {
                    id: text_target(slot, &t.id),
                    text: s.clone(),
                });
            }
            Ok(())
        }
        (Instance::Host(h), Node::Element(e)) => {
            diff_attrs(&h.id, &h.props, &e.props, ctx);
            if handlers_changed(&h.props, &e.props) {
                let handlers = e
                    .props
                    .handlers()
                    .map(|(name, handler)| (name.to_string(), handler.clone()))
                    .collect();
                ctx.rebound.push((h.id.clone(), handlers));
            }
            h.props = e.props.clone();
            reconcile_children(h, &e.children, ctx)
        }
        (Instance::Composite(c), Node::Component(n)) => {
            update_composite(c, Some(n.props.clone()), None, slot, ctx)
        }
        _ => unreachable!("reconcile called on incompatible pair"),
    }
}

/// Where a text mutation for this slot must land.
fn text_target(slot: &SlotKind, own_id: &str) -> Option<String> {
    match slot {
        SlotKind::Root => None,
        SlotKind::Lone(parent) => Some(parent.clone()),
        SlotKind::Own => Some(own_id.to_string()),
    }
}

/// Type changed: build the replacement first, then unmount the stale
/// subtree, so the visible output never shows an empty gap.
fn replace_slot(
    prev: &mut Instance,
    next: &Node,
    slot: &SlotKind,
    ctx: &mut ReconcileCtx,
) -> Result<()> {
    // The discarded identifier is never reused: the replacement draws a
    // fresh identifier space from the pass counter.
    let new_inst = instantiate(next, id::next_root_id())?;
    ctx.rebound.extend(collect_bindings(&new_inst));

    let wrapped = matches!(slot, SlotKind::Own);
    let live = materialize(&new_inst, wrapped);
    let patch = match slot {
        SlotKind::Root => Patch::SetChildren {
            parent: None,
            specs: vec![ChildSpec::New(live)],
        },
        SlotKind::Lone(parent) => Patch::SetChildren {
            parent: Some(parent.clone()),
            specs: vec![ChildSpec::New(live)],
        },
        SlotKind::Own => Patch::Replace {
            id: visible_id(prev).to_string(),
            new: live,
        },
    };
    ctx.patches.push(patch);

    unmount_instance(prev, &mut ctx.released)?;
    *prev = new_inst;
    Ok(())
}

// =============================================================================
// Composite Update Lifecycle
// =============================================================================

/// Run the update lifecycle on a composite: `will_receive_props` (only when
/// props were supplied), the `should_update` gate, `will_update`, render,
/// child reconciliation, and a pending `did_update` for after patches apply.
///
/// The gate skips re-render only: stored props and state advance either
/// way. Without an explicit gate, a composite whose props and state are
/// unchanged skips re-render, so untouched instances fire no update hooks.
pub(crate) fn update_composite(
    c: &mut CompositeInstance,
    next_props: Option<Props>,
    partial_state: Option<Props>,
    slot: &SlotKind,
    ctx: &mut ReconcileCtx,
) -> Result<()> {
    c.phase.advance(Phase::Updating);
    let result = composite_update_pass(c, next_props, partial_state, slot, ctx);
    if result.is_err() {
        // Keep the phase machine consistent so the instance stays updatable
        // after an aborted pass.
        c.phase.advance(Phase::Mounted);
    }
    result
}

fn composite_update_pass(
    c: &mut CompositeInstance,
    next_props: Option<Props>,
    partial_state: Option<Props>,
    slot: &SlotKind,
    ctx: &mut ReconcileCtx,
) -> Result<()> {
    let resolved_props = next_props.clone().unwrap_or_else(|| c.props.clone());
    let mut next_state = c.state.clone();
    if let Some(partial) = partial_state {
        next_state.merge(partial);
    }

    if let Some(incoming) = &next_props {
        if let Some(hook) = &c.spec.will_receive_props {
            hook(incoming, &c.props, &c.state).map_err(|reason| EngineError::HookFailed {
                hook: "will_receive_props",
                component: c.spec.name.clone(),
                reason,
            })?;
        }
    }

    let proceed = match &c.spec.should_update {
        Some(gate) => gate(&c.props, &c.state, &resolved_props, &next_state),
        None => resolved_props != c.props || next_state != c.state,
    };

    c.props = resolved_props;
    c.state = next_state;

    if !proceed {
        c.phase.advance(Phase::Mounted);
        return Ok(());
    }

    if let Some(hook) = &c.spec.will_update {
        hook(&c.props, &c.state).map_err(|reason| EngineError::HookFailed {
            hook: "will_update",
            component: c.spec.name.clone(),
            reason,
        })?;
    }

    let output = (c.spec.render)(&c.props, &c.state).map_err(|reason| {
        EngineError::RenderFailed {
            component: c.spec.name.clone(),
            reason,
        }
    })?;

    let marker = ctx.change_marker();
    if compatible(&c.rendered, &output) {
        reconcile(&mut c.rendered, &output, slot, ctx)?;
    } else {
        replace_slot(&mut c.rendered, &output, slot, ctx)?;
    }

    // did_update is owed only when the rendered output actually changed.
    if ctx.change_marker() > marker {
        c.pending.insert(Pending::DID_UPDATE);
    } else {
        c.phase.advance(Phase::Mounted);
    }
    Ok(())
}

// =============================================================================
// Attribute Diffing
// =============================================================================

fn diff_attrs(id: &str, old: &Props, new: &Props, ctx: &mut ReconcileCtx) {
    let old_attrs: HashMap<&str, String> = old.attrs().collect();
    let new_attrs: HashMap<&str, String> = new.attrs().collect();

    for (name, value) in new.attrs() {
        if old_attrs.get(name) != Some(&value) {
            ctx.patches.push(Patch::SetAttr {
                id: id.to_string(),
                name: name.to_string(),
                value,
            });
        }
    }
    for (name, _) in old.attrs() {
        if !new_attrs.contains_key(name) {
            ctx.patches.push(Patch::RemoveAttr {
                id: id.to_string(),
                name: name.to_string(),
            });
        }
    }
}

fn handlers_changed(old: &Props, new: &Props) -> bool {
    let old_handlers: Vec<_> = old.handlers().collect();
    let new_handlers: Vec<_> = new.handlers().collect();
    old_handlers.len() != new_handlers.len()
        || old_handlers
            .iter()
            .zip(&new_handlers)
            .any(|((on, oh), (nn, nh))| on != nn || !Rc::ptr_eq(oh, nh))
}

// =============================================================================
// Child List Reconciliation
// =============================================================================

fn reconcile_children(
    h: &mut HostInstance,
    next: &[Node],
    ctx: &mut ReconcileCtx,
) -> Result<()> {
    check_sibling_keys(next, &h.id)?;

    let prev_lone = h.children.len() == 1;
    let prev_inline_text = prev_lone && renders_as_text(&h.children[0]);

    if prev_lone && next.len() == 1 {
        let slot = SlotKind::Lone(h.id.clone());
        if compatible(&h.children[0], &next[0]) {
            return reconcile(&mut h.children[0], &next[0], &slot, ctx);
        }
        return replace_slot(&mut h.children[0], &next[0], &slot, ctx);
    }

    // Inline text has no addressable live node, so leaving the lone-child
    // shape forces a full child rebuild.
    if prev_inline_text {
        return rebuild_children(h, next, ctx);
    }

    keyed_reconcile_children(h, next, ctx)
}

fn instance_key(inst: &Instance) -> Option<&str> {
    match inst {
        Instance::Host(host) => host.key.as_deref(),
        Instance::Composite(c) => c.key.as_deref(),
        Instance::Text(_) => None,
    }
}

/// How one position in the next child list gets filled.
enum ChildPlan {
    /// Reconciled in place; holds the child's previous index.
    Reuse(usize),
    /// Freshly instantiated subtree.
    Fresh(Instance),
}

/// Left-to-right keyed matching. Reused children recurse in place; fresh
/// ones are materialized as `New` specs; leftovers unmount after the new
/// list is fully built. A single keep-by-identifier child-list patch
/// expresses inserts, removals, and moves.
///
/// Every fallible step runs against the intact previous list; the list is
/// reassembled only once all of them have succeeded, so an aborted pass
/// never drops a mounted child.
fn keyed_reconcile_children(
    h: &mut HostInstance,
    next: &[Node],
    ctx: &mut ReconcileCtx,
) -> Result<()> {
    let prev_count = h.children.len();

    let mut keyed_lookup: HashMap<String, usize> = HashMap::new();
    for (index, child) in h.children.iter().enumerate() {
        if let Some(key) = instance_key(child) {
            keyed_lookup.insert(key.to_string(), index);
        }
    }

    let mut plans = Vec::with_capacity(next.len());
    for (index, desc) in next.iter().enumerate() {
        let candidate = match desc.explicit_key() {
            Some(key) => keyed_lookup.get(key).copied(),
            None => {
                (index < prev_count && instance_key(&h.children[index]).is_none()).then_some(index)
            }
        };

        match candidate {
            Some(old_index) if compatible(&h.children[old_index], desc) => {
                reconcile(&mut h.children[old_index], desc, &SlotKind::Own, ctx)?;
                plans.push(ChildPlan::Reuse(old_index));
            }
            candidate => {
                // A replacement draws a fresh identifier space so it never
                // collides with the identifier it discards; a pure insert
                // extends the positional scheme.
                let child_id = if candidate.is_some() {
                    id::next_root_id()
                } else {
                    id::child_id(&h.id, index, desc.explicit_key())
                };
                let inst = instantiate(desc, child_id)?;
                ctx.rebound.extend(collect_bindings(&inst));
                plans.push(ChildPlan::Fresh(inst));
            }
        }
    }

    // Commit. New subtrees are fully built and the kept list reassembled
    // before any stale sibling unmounts.
    let mut slots: Vec<Option<Instance>> =
        mem::take(&mut h.children).into_iter().map(Some).collect();
    let mut new_children = Vec::with_capacity(next.len());
    let mut specs = Vec::with_capacity(next.len());
    let mut structure_changed = prev_count != next.len();

    for (index, plan) in plans.into_iter().enumerate() {
        match plan {
            ChildPlan::Reuse(old_index) => {
                if old_index != index {
                    structure_changed = true;
                }
                if let Some(inst) = slots[old_index].take() {
                    specs.push(ChildSpec::Keep(visible_id(&inst).to_string()));
                    new_children.push(inst);
                }
            }
            ChildPlan::Fresh(inst) => {
                structure_changed = true;
                specs.push(ChildSpec::New(materialize(&inst, true)));
                new_children.push(inst);
            }
        }
    }
    h.children = new_children;

    let mut stale: Vec<Instance> = slots.into_iter().flatten().collect();
    if !stale.is_empty() {
        structure_changed = true;
    }
    if structure_changed {
        ctx.patches.push(Patch::SetChildren {
            parent: Some(h.id.clone()),
            specs,
        });
    }
    for inst in &mut stale {
        unmount_instance(inst, &mut ctx.released)?;
    }
    Ok(())
}

/// Discard and rebuild the whole child list (wrapping-shape transitions).
fn rebuild_children(h: &mut HostInstance, next: &[Node], ctx: &mut ReconcileCtx) -> Result<()> {
    let lone = next.len() == 1;
    let mut new_children = Vec::with_capacity(next.len());
    let mut specs = Vec::with_capacity(next.len());
    for (index, desc) in next.iter().enumerate() {
        let child_id = id::child_id(&h.id, index, desc.explicit_key());
        let inst = instantiate(desc, child_id)?;
        ctx.rebound.extend(collect_bindings(&inst));
        specs.push(ChildSpec::New(materialize(
            &inst,
            !(lone && renders_as_text(&inst)),
        )));
        new_children.push(inst);
    }

    for child in &mut h.children {
        unmount_instance(child, &mut ctx.released)?;
    }

    ctx.patches.push(Patch::SetChildren {
        parent: Some(h.id.clone()),
        specs,
    });
    h.children = new_children;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ComponentSpec, component, el, text};
    use crate::types::Props;
    use std::cell::RefCell;

    fn setup() -> ReconcileCtx {
        crate::engine::id::reset_id_state();
        ReconcileCtx::new()
    }

    fn mounted(node: &Node) -> Instance {
        let mut inst = instantiate(node, crate::engine::id::next_root_id()).unwrap();
        crate::engine::instance::fire_pending(&mut inst, true);
        inst
    }

    #[test]
    fn test_text_change_targets_parent_when_inline() {
        let mut ctx = setup();
        let mut root = mounted(&el("span").child(text("old")).into());

        reconcile_root(&mut root, &el("span").child(text("new")).into(), &mut ctx).unwrap();

        assert_eq!(ctx.patches.len(), 1);
        match &ctx.patches[0] {
            Patch::SetText { id: Some(id), text } => {
                assert_eq!(id, ".0");
                assert_eq!(text, "new");
            }
            other => panic!("unexpected patch {other:?}"),
        }
    }

    #[test]
    fn test_unchanged_tree_emits_nothing() {
        let mut ctx = setup();
        let node: Node = el("div")
            .props(Props::new().set("class", "x"))
            .child(el("span").child(text("a")).into())
            .into();
        let mut root = mounted(&node);

        reconcile_root(&mut root, &node, &mut ctx).unwrap();
        assert!(ctx.patches.is_empty());
        assert!(ctx.released.is_empty());
        assert!(ctx.rebound.is_empty());
    }

    #[test]
    fn test_attr_diff() {
        let mut ctx = setup();
        let mut root = mounted(
            &el("div")
                .props(Props::new().set("class", "a").set("title", "t"))
                .into(),
        );

        reconcile_root(
            &mut root,
            &el("div")
                .props(Props::new().set("class", "b").set("role", "note"))
                .into(),
            &mut ctx,
        )
        .unwrap();

        let mut sets = 0;
        let mut removes = 0;
        for patch in &ctx.patches {
            match patch {
                Patch::SetAttr { name, value, .. } => {
                    sets += 1;
                    assert!(
                        (name == "class" && value == "b") || (name == "role" && value == "note")
                    );
                }
                Patch::RemoveAttr { name, .. } => {
                    removes += 1;
                    assert_eq!(name, "title");
                }
                other => panic!("unexpected patch {other:?}"),
            }
        }
        assert_eq!((sets, removes), (2, 1));
    }

    #[test]
    fn test_type_change_builds_new_before_unmounting_stale() {
        let mut ctx = setup();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = log.clone();
        let old_spec = ComponentSpec::new("Old", |_, _| Ok(text("old")))
            .will_unmount(move |_, _| {
                l.borrow_mut().push("old_unmount");
                Ok(())
            })
            .build();
        let l = log.clone();
        let new_spec = ComponentSpec::new("New", move |_, _| {
            l.borrow_mut().push("new_render");
            Ok(text("new"))
        })
        .build();

        let mut root = mounted(&el("div").child(component(&old_spec, Props::new())).into());
        reconcile_root(
            &mut root,
            &el("div").child(component(&new_spec, Props::new())).into(),
            &mut ctx,
        )
        .unwrap();

        assert_eq!(*log.borrow(), vec!["new_render", "old_unmount"]);
    }

    #[test]
    fn test_replacement_gets_fresh_identifier() {
        let mut ctx = setup();
        let mut root = mounted(
            &el("div").child(el("span").into()).child(el("b").into()).into(),
        );
        let old_id = crate::engine::instance::child_instances(&root)[0].id().to_string();

        reconcile_root(
            &mut root,
            &el("div").child(el("em").into()).child(el("b").into()).into(),
            &mut ctx,
        )
        .unwrap();

        let new_id = crate::engine::instance::child_instances(&root)[0].id().to_string();
        assert_ne!(new_id, old_id);
        // Untouched sibling keeps its identifier.
        assert_eq!(crate::engine::instance::child_instances(&root)[1].id(), ".0.1");
    }

    #[test]
    fn test_keyed_move_keeps_instances() {
        let mut ctx = setup();
        let item = |k: &str| -> Node { el("li").props(Props::new().key(k)).into() };
        let mut root = mounted(&el("ul").child(item("a")).child(item("b")).into());

        let ids_before: Vec<String> = crate::engine::instance::child_instances(&root)
            .iter()
            .map(|i| i.id().to_string())
            .collect();

        reconcile_root(
            &mut root,
            &el("ul").child(item("b")).child(item("a")).into(),
            &mut ctx,
        )
        .unwrap();

        let ids_after: Vec<String> = crate::engine::instance::child_instances(&root)
            .iter()
            .map(|i| i.id().to_string())
            .collect();
        assert_eq!(ids_after, vec![ids_before[1].clone(), ids_before[0].clone()]);

        // The move is a keep-by-identifier child patch, not a rebuild.
        assert_eq!(ctx.patches.len(), 1);
        let Patch::SetChildren { specs, .. } = &ctx.patches[0] else {
            panic!("expected SetChildren");
        };
        assert!(specs.iter().all(|s| matches!(s, ChildSpec::Keep(_))));
    }

    #[test]
    fn test_duplicate_keys_rejected_on_update() {
        let mut ctx = setup();
        let item = |k: &str| -> Node { el("li").props(Props::new().key(k)).into() };
        let mut root = mounted(&el("ul").child(item("a")).child(item("b")).into());

        let err = reconcile_root(
            &mut root,
            &el("ul").child(item("a")).child(item("a")).into(),
            &mut ctx,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateKey { .. }));
    }

    #[test]
    fn test_gate_false_skips_render_but_stores_state() {
        let mut ctx = setup();
        let renders = Rc::new(RefCell::new(0));
        let r = renders.clone();
        let spec = ComponentSpec::new("Gated", move |_, _| {
            *r.borrow_mut() += 1;
            Ok(text("fixed"))
        })
        .should_update(|_, _, _, _| false)
        .build();

        let mut root = mounted(&component(&spec, Props::new().set("n", 1)));
        assert_eq!(*renders.borrow(), 1);

        reconcile_root(&mut root, &component(&spec, Props::new().set("n", 2)), &mut ctx)
            .unwrap();

        assert_eq!(*renders.borrow(), 1);
        assert!(ctx.patches.is_empty());
        let Instance::Composite(c) = &root else { panic!() };
        assert_eq!(c.props.int("n"), Some(2));
        assert_eq!(c.phase, Phase::Mounted);
    }

    #[test]
    fn test_update_hooks_fire_only_on_changed_instances() {
        let mut ctx = setup();
        let log = Rc::new(RefCell::new(Vec::<String>::new()));

        let make = |name: &'static str, log: Rc<RefCell<Vec<String>>>| {
            let l = log.clone();
            ComponentSpec::new(name, move |props, _| {
                Ok(el("span")
                    .child(text(props.str("v").unwrap_or("").to_string()))
                    .into())
            })
            .did_update(move |_, _| l.borrow_mut().push(name.to_string()))
            .build()
        };
        let changed = make("Changed", log.clone());
        let steady = make("Steady", log.clone());

        let tree = |v: &str| -> Node {
            el("div")
                .child(component(&changed, Props::new().set("v", v)))
                .child(component(&steady, Props::new().set("v", "same")))
                .into()
        };

        let mut root = mounted(&tree("one"));
        reconcile_root(&mut root, &tree("two"), &mut ctx).unwrap();
        crate::engine::instance::fire_pending(&mut root, true);

        assert_eq!(*log.borrow(), vec!["Changed".to_string()]);
    }

    #[test]
    fn test_failing_will_update_aborts_without_patches_applied() {
        let mut ctx = setup();
        let spec = ComponentSpec::new("Flaky", |props, _| {
            Ok(text(props.str("v").unwrap_or("").to_string()))
        })
        .will_update(|_, _| Err("broken".to_string()))
        .build();

        let mut root = mounted(&component(&spec, Props::new().set("v", "a")));
        let err = reconcile_root(
            &mut root,
            &component(&spec, Props::new().set("v", "b")),
            &mut ctx,
        )
        .unwrap_err();

        assert!(matches!(err, EngineError::HookFailed { hook: "will_update", .. }));
        assert!(ctx.patches.is_empty());
    }

    #[test]
    fn test_failed_sibling_update_keeps_children_mounted() {
        let mut ctx = setup();
        let unmounts = Rc::new(RefCell::new(0));

        let u = unmounts.clone();
        let steady = ComponentSpec::new("Steady", |props, _| {
            Ok(el("span")
                .child(text(props.str("v").unwrap_or("").to_string()))
                .into())
        })
        .will_unmount(move |_, _| {
            *u.borrow_mut() += 1;
            Ok(())
        })
        .build();
        let flaky = ComponentSpec::new("Flaky", |_, _| Ok(el("b").into()))
            .will_update(|_, _| Err("down".to_string()))
            .build();

        let tree = |v: &str| -> Node {
            el("div")
                .child(component(&steady, Props::new().set("v", v)))
                .child(component(&flaky, Props::new().set("v", v)))
                .into()
        };
        let mut root = mounted(&tree("one"));

        let err = reconcile_root(&mut root, &tree("two"), &mut ctx).unwrap_err();
        assert!(matches!(err, EngineError::HookFailed { hook: "will_update", .. }));

        // The aborted pass tears nothing down: both children are still
        // mounted under their original identifiers.
        assert_eq!(*unmounts.borrow(), 0);
        let children = crate::engine::instance::child_instances(&root);
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].id(), ".0.0");
        assert_eq!(children[1].id(), ".0.1");
    }
}
