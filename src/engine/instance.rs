//! Component Instances - the engine-owned, mutable side of a mounted tree.
//!
//! Instances are created by `instantiate`, which runs the initial-mount
//! lifecycle (`get_initial_state` -> `will_mount` -> `render`) depth-first
//! over a description. Attachment effects (`did_mount`, `did_update`) are
//! recorded as pending flags and fired by `fire_pending` once the output is
//! actually attached - or settled without firing for markup-only renders,
//! which have no attachment to react to.
//!
//! A composite instance shares its identifier with the host node it renders:
//! the visible tree has exactly one node per identifier.

use std::rc::Rc;

use bitflags::bitflags;

use crate::error::{EngineError, Result};
use crate::node::{ComponentSpec, Node};
use crate::types::Props;

use super::id;

// =============================================================================
// Lifecycle Phase
// =============================================================================

/// Lifecycle phase of a composite instance.
///
/// Strictly advances: unmounted -> mounting -> mounted -> (updating ->
/// mounted)* -> unmounting -> unmounted. `advance` asserts legality in
/// debug builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Unmounted,
    Mounting,
    Mounted,
    Updating,
    Unmounting,
}

impl Phase {
    fn legal(from: Phase, to: Phase) -> bool {
        matches!(
            (from, to),
            (Phase::Unmounted, Phase::Mounting)
                | (Phase::Mounting, Phase::Mounted)
                | (Phase::Mounted, Phase::Updating)
                | (Phase::Updating, Phase::Mounted)
                | (Phase::Mounted, Phase::Unmounting)
                | (Phase::Unmounting, Phase::Unmounted)
        )
    }

    pub fn advance(&mut self, to: Phase) {
        debug_assert!(Phase::legal(*self, to), "illegal phase step {self:?} -> {to:?}");
        *self = to;
    }
}

bitflags! {
    /// Attachment effects owed to an instance once patches have applied.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct Pending: u8 {
        const DID_MOUNT = 1;
        const DID_UPDATE = 1 << 1;
    }
}

// =============================================================================
// Instance Tree
// =============================================================================

/// One mounted position in the tree.
pub enum Instance {
    Host(HostInstance),
    Composite(CompositeInstance),
    Text(TextInstance),
}

/// A mounted primitive element.
pub struct HostInstance {
    pub tag: String,
    pub props: Props,
    pub id: String,
    /// Explicit sibling key the description declared, for keyed matching.
    pub key: Option<String>,
    pub children: Vec<Instance>,
}

/// A mounted composite component.
pub struct CompositeInstance {
    pub spec: Rc<ComponentSpec>,
    pub props: Props,
    pub state: Props,
    pub id: String,
    pub key: Option<String>,
    pub phase: Phase,
    pub pending: Pending,
    /// The instance tree produced by the most recent render.
    pub rendered: Box<Instance>,
}

/// A mounted piece of text. The identifier is only visible in the output
/// when the text is wrapped (i.e. not a lone child).
pub struct TextInstance {
    pub id: String,
    pub text: String,
}

impl Instance {
    pub fn id(&self) -> &str {
        match self {
            Instance::Host(h) => &h.id,
            Instance::Composite(c) => &c.id,
            Instance::Text(t) => &t.id,
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instance::Host(h) => f
                .debug_struct("Host")
                .field("tag", &h.tag)
                .field("id", &h.id)
                .field("children", &h.children.len())
                .finish(),
            Instance::Composite(c) => f
                .debug_struct("Composite")
                .field("name", &c.spec.name)
                .field("id", &c.id)
                .field("phase", &c.phase)
                .finish(),
            Instance::Text(t) => write!(f, "Text({:?} @ {})", t.text, t.id),
        }
    }
}

/// Identifier of the node an instance actually shows. Usually the
/// instance's own identifier, but when a type change replaced a composite's
/// rendered root mid-update, the replacement carries a fresh identifier
/// while the composite keeps its logical one.
pub fn visible_id(inst: &Instance) -> &str {
    match inst {
        Instance::Composite(c) => visible_id(&c.rendered),
        Instance::Host(h) => &h.id,
        Instance::Text(t) => &t.id,
    }
}

/// Whether this instance ultimately renders as bare text (composites are
/// transparent). Drives the lone-child inlining rule in both backends.
pub fn renders_as_text(inst: &Instance) -> bool {
    match inst {
        Instance::Text(_) => true,
        Instance::Composite(c) => renders_as_text(&c.rendered),
        Instance::Host(_) => false,
    }
}

// =============================================================================
// Instantiation (initial-mount lifecycle)
// =============================================================================

fn hook_failed(hook: &'static str, component: &str, reason: String) -> EngineError {
    EngineError::HookFailed {
        hook,
        component: component.to_string(),
        reason,
    }
}

/// Verify no two siblings declare the same explicit key.
pub fn check_sibling_keys(children: &[Node], parent: &str) -> Result<()> {
    let mut seen: Vec<&str> = Vec::new();
    for child in children {
        if let Some(key) = child.explicit_key() {
            if seen.contains(&key) {
                return Err(EngineError::DuplicateKey {
                    key: key.to_string(),
                    parent: parent.to_string(),
                });
            }
            seen.push(key);
        }
    }
    Ok(())
}

/// Build the instance tree for a description, running the initial-mount
/// lifecycle up through render. No output is attached here; `did_mount`
/// stays pending until `fire_pending`.
pub fn instantiate(node: &Node, instance_id: String) -> Result<Instance> {
    match node {
        Node::Text(t) => Ok(Instance::Text(TextInstance {
            id: instance_id,
            text: t.clone(),
        })),
        Node::Element(e) => {
            check_sibling_keys(&e.children, &instance_id)?;
            let mut children = Vec::with_capacity(e.children.len());
            for (index, child) in e.children.iter().enumerate() {
                let child_id = id::child_id(&instance_id, index, child.explicit_key());
                children.push(instantiate(child, child_id)?);
            }
            Ok(Instance::Host(HostInstance {
                tag: e.tag.clone(),
                props: e.props.clone(),
                id: instance_id,
                key: e.props.explicit_key().map(String::from),
                children,
            }))
        }
        Node::Component(c) => {
            let props = c.props.clone();
            let state = match &c.spec.get_initial_state {
                Some(init) => init(&props),
                None => Props::new(),
            };

            if let Some(hook) = &c.spec.will_mount {
                hook(&props, &state)
                    .map_err(|r| hook_failed("will_mount", &c.spec.name, r))?;
            }

            let output = (c.spec.render)(&props, &state).map_err(|reason| {
                EngineError::RenderFailed {
                    component: c.spec.name.clone(),
                    reason,
                }
            })?;

            // The rendered root shares the composite's identifier.
            let rendered = instantiate(&output, instance_id.clone())?;

            let mut phase = Phase::Unmounted;
            phase.advance(Phase::Mounting);
            let key = c.props.explicit_key().map(String::from);
            Ok(Instance::Composite(CompositeInstance {
                spec: c.spec.clone(),
                props,
                state,
                id: instance_id,
                key,
                phase,
                pending: Pending::DID_MOUNT,
                rendered: Box::new(rendered),
            }))
        }
    }
}

// =============================================================================
// Pending Effects
// =============================================================================

/// Settle pending attachment effects bottom-up (children before parents).
///
/// With `invoke` set, `did_mount`/`did_update` hooks actually run - the
/// live backend's behavior. The markup backend settles with `invoke`
/// false: phases advance, hooks do not fire.
pub fn fire_pending(inst: &mut Instance, invoke: bool) {
    match inst {
        Instance::Text(_) => {}
        Instance::Host(h) => {
            for child in &mut h.children {
                fire_pending(child, invoke);
            }
        }
        Instance::Composite(c) => {
            fire_pending(&mut c.rendered, invoke);
            if c.pending.contains(Pending::DID_MOUNT) {
                c.pending.remove(Pending::DID_MOUNT);
                c.phase.advance(Phase::Mounted);
                if invoke {
                    if let Some(hook) = &c.spec.did_mount {
                        hook(&c.props, &c.state);
                    }
                }
            }
            if c.pending.contains(Pending::DID_UPDATE) {
                c.pending.remove(Pending::DID_UPDATE);
                c.phase.advance(Phase::Mounted);
                if invoke {
                    if let Some(hook) = &c.spec.did_update {
                        hook(&c.props, &c.state);
                    }
                }
            }
        }
    }
}

// =============================================================================
// Unmount
// =============================================================================

/// Tear an instance subtree down, firing `will_unmount` bottom-up and
/// collecting the identifiers whose dispatch-table entries must go.
///
/// A failing hook aborts immediately; hooks for unprocessed ancestors do
/// not fire.
pub fn unmount_instance(inst: &mut Instance, released: &mut Vec<String>) -> Result<()> {
    match inst {
        Instance::Text(_) => Ok(()),
        Instance::Host(h) => {
            for child in &mut h.children {
                unmount_instance(child, released)?;
            }
            released.push(h.id.clone());
            Ok(())
        }
        Instance::Composite(c) => {
            c.phase.advance(Phase::Unmounting);
            unmount_instance(&mut c.rendered, released)?;
            if let Some(hook) = &c.spec.will_unmount {
                hook(&c.props, &c.state)
                    .map_err(|r| hook_failed("will_unmount", &c.spec.name, r))?;
            }
            c.phase.advance(Phase::Unmounted);
            Ok(())
        }
    }
}

// =============================================================================
// Navigation
// =============================================================================

/// Child instances at one visible level. Composites are transparent: their
/// rendered subtree's children are their children.
pub fn child_instances(inst: &Instance) -> &[Instance] {
    match inst {
        Instance::Host(h) => &h.children,
        Instance::Composite(c) => child_instances(&c.rendered),
        Instance::Text(_) => &[],
    }
}

/// Resolve a dot-separated child-index path ("" is the root, "0.1" is the
/// second child of the first child).
pub fn find_at_path<'a>(root: &'a Instance, path: &str) -> Option<&'a Instance> {
    let mut current = root;
    if path.is_empty() {
        return Some(current);
    }
    for seg in path.split('.') {
        let index: usize = seg.parse().ok()?;
        current = child_instances(current).get(index)?;
    }
    Some(current)
}

/// Live-slot context of an instance: how its visible node is addressed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum SlotKind {
    /// The instance is the container's root child.
    Root,
    /// The instance is the lone child of the host with this identifier, so
    /// bare text it renders is inlined there.
    Lone(String),
    /// The instance's own identifier addresses its visible node.
    Own,
}

/// Resolve a path to a composite instance, tracking the slot context needed
/// to patch its output.
pub(crate) fn find_composite_mut<'a>(
    root: &'a mut Instance,
    path: &str,
) -> Option<(&'a mut CompositeInstance, SlotKind)> {
    let segs: Vec<usize> = if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').map(|s| s.parse().ok()).collect::<Option<_>>()?
    };
    descend(root, &segs, SlotKind::Root)
}

fn descend<'a>(
    inst: &'a mut Instance,
    segs: &[usize],
    slot: SlotKind,
) -> Option<(&'a mut CompositeInstance, SlotKind)> {
    if segs.is_empty() {
        return match inst {
            Instance::Composite(c) => Some((c, slot)),
            _ => None,
        };
    }
    match inst {
        Instance::Composite(c) => descend(&mut c.rendered, segs, slot),
        Instance::Host(h) => {
            let lone = h.children.len() == 1;
            let parent_id = h.id.clone();
            let child = h.children.get_mut(segs[0])?;
            let child_slot = if lone { SlotKind::Lone(parent_id) } else { SlotKind::Own };
            descend(child, &segs[1..], child_slot)
        }
        Instance::Text(_) => None,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ComponentSpec, component, el, text};
    use std::cell::RefCell;

    fn logging_spec(log: Rc<RefCell<Vec<&'static str>>>) -> Rc<ComponentSpec> {
        let l = log.clone();
        let mut spec = ComponentSpec::new("Probe", move |_, state| {
            l.borrow_mut().push("render");
            Ok(el("span")
                .child(text(format!(
                    "Component name: {}",
                    state.str("name").unwrap_or("")
                )))
                .into())
        });
        let l = log.clone();
        spec = spec.initial_state(move |_| {
            l.borrow_mut().push("get_initial_state");
            Props::new().set("name", "Probe")
        });
        let l = log.clone();
        spec = spec.will_mount(move |_, _| {
            l.borrow_mut().push("will_mount");
            Ok(())
        });
        let l = log.clone();
        spec = spec.did_mount(move |_, _| {
            l.borrow_mut().push("did_mount");
        });
        spec.build()
    }

    #[test]
    fn test_initial_mount_hook_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let spec = logging_spec(log.clone());

        let mut root = instantiate(&component(&spec, Props::new()), ".0".to_string()).unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["get_initial_state", "will_mount", "render"]
        );

        fire_pending(&mut root, true);
        assert_eq!(
            *log.borrow(),
            vec!["get_initial_state", "will_mount", "render", "did_mount"]
        );
    }

    #[test]
    fn test_markup_settle_skips_did_mount() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let spec = logging_spec(log.clone());

        let mut root = instantiate(&component(&spec, Props::new()), ".0".to_string()).unwrap();
        fire_pending(&mut root, false);

        assert_eq!(
            *log.borrow(),
            vec!["get_initial_state", "will_mount", "render"]
        );
        let Instance::Composite(c) = &root else { panic!() };
        assert_eq!(c.phase, Phase::Mounted);
    }

    #[test]
    fn test_composite_shares_id_with_rendered_root() {
        let spec = ComponentSpec::new("A", |_, _| Ok(el("span").into())).build();
        let root = instantiate(&component(&spec, Props::new()), ".7".to_string()).unwrap();

        let Instance::Composite(c) = &root else { panic!() };
        assert_eq!(c.id, ".7");
        assert_eq!(c.rendered.id(), ".7");
    }

    #[test]
    fn test_sibling_ids_distinct() {
        let tree = el("ul")
            .child(el("li").into())
            .child(el("li").into())
            .child(el("li").props(Props::new().key("x")).into())
            .into();
        let root = instantiate(&tree, ".0".to_string()).unwrap();

        let ids: Vec<&str> = child_instances(&root).iter().map(Instance::id).collect();
        assert_eq!(ids, vec![".0.0", ".0.1", ".0.$x"]);
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let tree = el("ul")
            .child(el("li").props(Props::new().key("a")).into())
            .child(el("li").props(Props::new().key("a")).into())
            .into();
        let err = instantiate(&tree, ".0".to_string()).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateKey { key, .. } if key == "a"));
    }

    #[test]
    fn test_failing_will_mount_aborts() {
        let rendered = Rc::new(RefCell::new(false));
        let r = rendered.clone();
        let spec = ComponentSpec::new("Bad", move |_, _| {
            *r.borrow_mut() = true;
            Ok(text("x"))
        })
        .will_mount(|_, _| Err("nope".to_string()))
        .build();

        let err = instantiate(&component(&spec, Props::new()), ".0".to_string()).unwrap_err();
        assert!(matches!(err, EngineError::HookFailed { hook: "will_mount", .. }));
        // render never ran: subsequent hooks are skipped on failure.
        assert!(!*rendered.borrow());
    }

    #[test]
    fn test_unmount_fires_bottom_up() {
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = log.clone();
        let inner = ComponentSpec::new("Inner", |_, _| Ok(text("x")))
            .will_unmount(move |_, _| {
                l.borrow_mut().push("inner");
                Ok(())
            })
            .build();
        let inner_node = component(&inner, Props::new());
        let l = log.clone();
        let outer = ComponentSpec::new("Outer", move |_, _| {
            Ok(el("div").child(inner_node.clone()).into())
        })
        .will_unmount(move |_, _| {
            l.borrow_mut().push("outer");
            Ok(())
        })
        .build();

        let mut root = instantiate(&component(&outer, Props::new()), ".0".to_string()).unwrap();
        fire_pending(&mut root, true);

        let mut released = Vec::new();
        unmount_instance(&mut root, &mut released).unwrap();

        assert_eq!(*log.borrow(), vec!["inner", "outer"]);
        // Host identifiers were collected for dispatch-table release.
        assert!(released.contains(&".0".to_string()));
    }

    #[test]
    fn test_find_at_path() {
        let tree = el("div")
            .child(el("span").child(text("a")).into())
            .child(el("b").into())
            .into();
        let root = instantiate(&tree, ".0".to_string()).unwrap();

        assert_eq!(find_at_path(&root, "").unwrap().id(), ".0");
        assert_eq!(find_at_path(&root, "1").unwrap().id(), ".0.1");
        assert_eq!(find_at_path(&root, "0.0").unwrap().id(), ".0.0.0");
        assert!(find_at_path(&root, "5").is_none());
    }
}
