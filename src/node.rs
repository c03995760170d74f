//! Description nodes - the tree-construction API.
//!
//! A `Node` is an immutable declarative description of what to render:
//! a primitive element with a tag and children, a piece of text, or a
//! composite component reference with props. The engine consumes
//! descriptions and never mutates them.
//!
//! Composite components are declared as a `ComponentSpec`: a name, a render
//! closure, and optional lifecycle hooks. Two descriptions are "the same
//! type" when they point at the same spec (`Rc::ptr_eq`).
//!
//! # Example
//!
//! ```ignore
//! use arbor::node::{el, text, component, ComponentSpec};
//! use arbor::types::Props;
//!
//! let child = ComponentSpec::new("Child", |props, _state| {
//!     Ok(el("span")
//!         .child(text(format!("My name is {}", props.str("name").unwrap_or(""))))
//!         .into())
//! })
//! .build();
//!
//! let tree = el("div")
//!     .child(component(&child, Props::new().set("name", "child")))
//!     .into();
//! ```

use std::rc::Rc;

use crate::types::Props;

// =============================================================================
// Nodes
// =============================================================================

/// Immutable description of a node to render.
#[derive(Clone)]
pub enum Node {
    Element(ElementNode),
    Text(String),
    Component(ComponentNode),
}

/// A primitive element: tag, props, ordered children.
#[derive(Clone)]
pub struct ElementNode {
    pub tag: String,
    pub props: Props,
    pub children: Vec<Node>,
}

/// A composite component reference.
#[derive(Clone)]
pub struct ComponentNode {
    pub spec: Rc<ComponentSpec>,
    pub props: Props,
}

impl Node {
    /// Explicit sibling key, if the description declares one.
    pub fn explicit_key(&self) -> Option<&str> {
        match self {
            Node::Element(e) => e.props.explicit_key(),
            Node::Component(c) => c.props.explicit_key(),
            Node::Text(_) => None,
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Element(e) => f
                .debug_struct("Element")
                .field("tag", &e.tag)
                .field("children", &e.children.len())
                .finish(),
            Node::Text(t) => write!(f, "Text({t:?})"),
            Node::Component(c) => write!(f, "Component({})", c.spec.name),
        }
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Start a primitive element description.
pub fn el(tag: impl Into<String>) -> ElementNode {
    ElementNode {
        tag: tag.into(),
        props: Props::new(),
        children: Vec::new(),
    }
}

/// A text description.
pub fn text(content: impl Into<String>) -> Node {
    Node::Text(content.into())
}

/// A composite component description.
pub fn component(spec: &Rc<ComponentSpec>, props: Props) -> Node {
    Node::Component(ComponentNode {
        spec: spec.clone(),
        props,
    })
}

impl ElementNode {
    /// Replace this element's props wholesale.
    pub fn props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    /// Append one child description.
    pub fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Append several child descriptions.
    pub fn children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }
}

impl From<ElementNode> for Node {
    fn from(e: ElementNode) -> Self {
        Node::Element(e)
    }
}

// =============================================================================
// Component Spec
// =============================================================================

/// Render closure: (props, state) -> description. Must be pure with respect
/// to the engine; an error aborts the surrounding mount/update pass.
pub type RenderFn = Rc<dyn Fn(&Props, &Props) -> Result<Node, String>>;

/// Initial state from the mount-time props.
pub type InitFn = Rc<dyn Fn(&Props) -> Props>;

/// Fallible pre-attachment/pre-update hook: (props, state).
pub type HookFn = Rc<dyn Fn(&Props, &Props) -> Result<(), String>>;

/// Fallible props-arrival hook: (next_props, props, state).
pub type PropsHookFn = Rc<dyn Fn(&Props, &Props, &Props) -> Result<(), String>>;

/// Post-attachment/post-update effect: (props, state).
pub type EffectFn = Rc<dyn Fn(&Props, &Props)>;

/// Update gate: (props, state, next_props, next_state) -> re-render?
pub type GateFn = Rc<dyn Fn(&Props, &Props, &Props, &Props) -> bool>;

/// Declaration of a composite component: render logic plus lifecycle hooks.
///
/// Hooks fire in a fixed order (see `engine::instance`); every hook is
/// optional except `render`.
pub struct ComponentSpec {
    pub name: String,
    pub get_initial_state: Option<InitFn>,
    pub will_mount: Option<HookFn>,
    pub did_mount: Option<EffectFn>,
    pub will_receive_props: Option<PropsHookFn>,
    pub should_update: Option<GateFn>,
    pub will_update: Option<HookFn>,
    pub did_update: Option<EffectFn>,
    pub will_unmount: Option<HookFn>,
    pub render: RenderFn,
}

impl ComponentSpec {
    /// Start a spec with a name and a render closure.
    pub fn new(
        name: impl Into<String>,
        render: impl Fn(&Props, &Props) -> Result<Node, String> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            get_initial_state: None,
            will_mount: None,
            did_mount: None,
            will_receive_props: None,
            should_update: None,
            will_update: None,
            did_update: None,
            will_unmount: None,
            render: Rc::new(render),
        }
    }

    pub fn initial_state(mut self, f: impl Fn(&Props) -> Props + 'static) -> Self {
        self.get_initial_state = Some(Rc::new(f));
        self
    }

    pub fn will_mount(mut self, f: impl Fn(&Props, &Props) -> Result<(), String> + 'static) -> Self {
        self.will_mount = Some(Rc::new(f));
        self
    }

    pub fn did_mount(mut self, f: impl Fn(&Props, &Props) + 'static) -> Self {
        self.did_mount = Some(Rc::new(f));
        self
    }

    pub fn will_receive_props(
        mut self,
        f: impl Fn(&Props, &Props, &Props) -> Result<(), String> + 'static,
    ) -> Self {
        self.will_receive_props = Some(Rc::new(f));
        self
    }

    pub fn should_update(
        mut self,
        f: impl Fn(&Props, &Props, &Props, &Props) -> bool + 'static,
    ) -> Self {
        self.should_update = Some(Rc::new(f));
        self
    }

    pub fn will_update(mut self, f: impl Fn(&Props, &Props) -> Result<(), String> + 'static) -> Self {
        self.will_update = Some(Rc::new(f));
        self
    }

    pub fn did_update(mut self, f: impl Fn(&Props, &Props) + 'static) -> Self {
        self.did_update = Some(Rc::new(f));
        self
    }

    pub fn will_unmount(
        mut self,
        f: impl Fn(&Props, &Props) -> Result<(), String> + 'static,
    ) -> Self {
        self.will_unmount = Some(Rc::new(f));
        self
    }

    /// Finish the declaration.
    pub fn build(self) -> Rc<ComponentSpec> {
        Rc::new(self)
    }
}

// =============================================================================
// Tests
// =============================================================================
