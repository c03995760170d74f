//! Render-to-Markup backend.
//!
//! Runs the same instantiation pass as a live mount, then serializes the
//! materialized tree instead of attaching it. `did_mount` never fires here:
//! there is no live attachment to react to. The instance tree is returned
//! alongside the string so the caller keeps the lifecycle bookkeeping.

use crate::engine::instance::{Instance, fire_pending, instantiate};
use crate::engine::id;
use crate::error::Result;
use crate::host::markup_of_children;
use crate::node::Node;

use super::live::materialize;

/// Serialize an instance tree to markup.
pub fn serialize_instance(root: &Instance) -> String {
    markup_of_children(&[materialize(root, false)])
}

/// Render a description to markup with a fresh identifier pass.
///
/// Returns the markup and the settled instance tree.
pub fn render_instance_to_markup(node: &Node) -> Result<(String, Instance)> {
    let root_id = id::next_root_id();
    let mut root = instantiate(node, root_id)?;
    let markup = serialize_instance(&root);
    // Settle phases without invoking attachment effects.
    fire_pending(&mut root, false);
    Ok((markup, root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::id::{ATTR_NAME, reset_id_state};
    use crate::node::{ComponentSpec, component, el, text};
    use crate::types::Props;

    #[test]
    fn test_simple_markup() {
        reset_id_state();
        let (markup, _) =
            render_instance_to_markup(&el("span").child(text("hello world")).into()).unwrap();

        // <span data-arborid="...">hello world</span> with a non-empty id.
        let prefix = format!("<span {ATTR_NAME}=\"");
        assert!(markup.starts_with(&prefix), "got: {markup}");
        let rest = &markup[prefix.len()..];
        let id_end = rest.find('"').unwrap();
        assert!(!rest[..id_end].is_empty());
        assert!(markup.ends_with(">hello world</span>"));
    }

    #[test]
    fn test_composite_markup_wraps_text_runs() {
        reset_id_state();
        let child = ComponentSpec::new("Child", |props, _| {
            Ok(el("span")
                .child(text("My name is "))
                .child(text(props.str("name").unwrap_or("").to_string()))
                .into())
        })
        .build();
        let child_node = component(&child, Props::new().set("name", "child"));
        let parent = ComponentSpec::new("Parent", move |_, _| {
            Ok(el("div").child(child_node.clone()).into())
        })
        .build();

        let (markup, _) =
            render_instance_to_markup(&component(&parent, Props::new())).unwrap();

        assert!(markup.starts_with(&format!("<div {ATTR_NAME}=")));
        // The child composite renders a span whose two text runs are
        // themselves identified spans.
        assert!(markup.contains(">My name is </span>"));
        assert!(markup.contains(">child</span>"));
        assert_eq!(markup.matches("<span").count(), 3);
    }

    #[test]
    fn test_markup_and_live_agree() {
        use crate::host::{self, LiveChild};

        reset_id_state();
        let node: Node = el("div")
            .props(Props::new().set("class", "x"))
            .child(el("span").child(text("a")).into())
            .child(text("b"))
            .into();

        let (markup, root) = render_instance_to_markup(&node).unwrap();
        let live: Vec<LiveChild> = vec![materialize(&root, false)];
        assert_eq!(markup, host::markup_of_children(&live));
    }
}
