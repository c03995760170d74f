//! Render-to-Live-Tree backend.
//!
//! Materializes an instance tree into detached live nodes, collects the
//! handler bindings to install in the event dispatch table, and applies
//! the patch lists the reconciler produces. Both backends share
//! `materialize`, so markup output and live output are structurally
//! identical by construction - the property adoptive mount relies on.
//!
//! Wrapping rule (shared with serialization): a lone text child is inlined
//! into its parent; text among siblings is wrapped in a `<span>` carrying
//! its own identifier, so it stays addressable for updates.

use crate::engine::id::ATTR_NAME;
use crate::engine::instance::{Instance, renders_as_text};
use crate::error::Result;
use crate::events::EventHandler;
use crate::host::{self, ChildSpec, ContainerId, LiveChild, LiveNode};

// =============================================================================
// Materialization
// =============================================================================

/// Build the detached live form of an instance. `wrapped` states whether a
/// bare text instance must become an identified span (it is not the lone
/// child of its parent).
pub fn materialize(inst: &Instance, wrapped: bool) -> LiveChild {
    match inst {
        Instance::Text(t) => {
            if wrapped {
                LiveChild::Element(LiveNode {
                    tag: "span".to_string(),
                    attrs: vec![(ATTR_NAME.to_string(), t.id.clone())],
                    children: vec![LiveChild::Text(t.text.clone())],
                })
            } else {
                LiveChild::Text(t.text.clone())
            }
        }
        Instance::Composite(c) => materialize(&c.rendered, wrapped),
        Instance::Host(h) => {
            let mut attrs = vec![(ATTR_NAME.to_string(), h.id.clone())];
            for (name, value) in h.props.attrs() {
                attrs.push((name.to_string(), value));
            }
            let lone = h.children.len() == 1;
            let children = h
                .children
                .iter()
                .map(|child| materialize(child, !(lone && renders_as_text(child))))
                .collect();
            LiveChild::Element(LiveNode {
                tag: h.tag.clone(),
                attrs,
                children,
            })
        }
    }
}

// =============================================================================
// Handler Bindings
// =============================================================================

/// Handler bindings declared by an instance subtree: one entry per host
/// node that declares at least one handler.
pub fn collect_bindings(inst: &Instance) -> Vec<(String, Vec<(String, EventHandler)>)> {
    let mut out = Vec::new();
    collect_into(inst, &mut out);
    out
}

fn collect_into(inst: &Instance, out: &mut Vec<(String, Vec<(String, EventHandler)>)>) {
    match inst {
        Instance::Text(_) => {}
        Instance::Composite(c) => collect_into(&c.rendered, out),
        Instance::Host(h) => {
            let handlers: Vec<(String, EventHandler)> = h
                .props
                .handlers()
                .map(|(event, handler)| (event.to_string(), handler.clone()))
                .collect();
            if !handlers.is_empty() {
                out.push((h.id.clone(), handlers));
            }
            for child in &h.children {
                collect_into(child, out);
            }
        }
    }
}

// =============================================================================
// Patches
// =============================================================================

/// One structural mutation, produced by the reconciler and applied only
/// after a whole update pass has succeeded.
#[derive(Debug)]
pub enum Patch {
    /// Replace content with a single text child. `None` targets the
    /// container itself.
    SetText { id: Option<String>, text: String },
    SetAttr { id: String, name: String, value: String },
    RemoveAttr { id: String, name: String },
    /// Swap the identified node for a freshly built subtree.
    Replace { id: String, new: LiveChild },
    /// Rebuild a child list, keeping untouched siblings by identifier.
    /// `None` targets the container's own child list.
    SetChildren {
        parent: Option<String>,
        specs: Vec<ChildSpec>,
    },
}

/// Apply a patch list in order.
pub fn apply_patches(container: ContainerId, patches: Vec<Patch>) -> Result<()> {
    tracing::trace!(?container, count = patches.len(), "applying patches");
    for patch in patches {
        match patch {
            Patch::SetText { id, text } => host::set_text(container, id.as_deref(), &text)?,
            Patch::SetAttr { id, name, value } => host::set_attr(container, &id, &name, &value)?,
            Patch::RemoveAttr { id, name } => host::remove_attr(container, &id, &name)?,
            Patch::Replace { id, new } => host::replace_node(container, &id, new)?,
            Patch::SetChildren { parent, specs } => {
                host::set_children(container, parent.as_deref(), specs)?
            }
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
