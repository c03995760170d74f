//! arbor - a dual-mode component-tree rendering engine.
//!
//! Components are declared as specs (a render closure plus optional
//! lifecycle hooks) and composed into immutable description trees. The
//! engine renders a description two ways off one lifecycle machine and one
//! identity scheme:
//!
//! - **Markup**: [`render_markup`] serializes a fresh render to a string
//!   with embedded identifiers and no live attachment.
//! - **Live tree**: [`mount`] attaches an engine-owned node tree to a
//!   container, wires declared handlers into the event dispatch table, and
//!   keeps the tree current through reconciliation on re-mount and
//!   [`MountHandle::set_state`].
//!
//! Mounting onto a container pre-populated with the engine's own markup
//! adopts the existing nodes instead of rebuilding them, so previously
//! serialized output becomes interactive without visible mutation.
//!
//! # Example
//!
//! ```ignore
//! use arbor::{ComponentSpec, Props, component, el, text};
//!
//! let spec = ComponentSpec::new("Hello", |props, _| {
//!     Ok(el("span")
//!         .child(text(format!("hello {}", props.str("name").unwrap_or(""))))
//!         .into())
//! })
//! .build();
//!
//! let node = component(&spec, Props::new().set("name", "world"));
//!
//! // Static output:
//! let markup = arbor::render_markup(&node)?;
//!
//! // Interactive output:
//! let container = arbor::host::create_container();
//! let handle = arbor::mount(&node, container)?;
//! arbor::events::simulate(&handle.root_id().unwrap(), "click");
//! ```

pub mod engine;
pub mod error;
pub mod events;
pub mod host;
pub mod node;
pub mod pipeline;
pub mod renderer;
pub mod types;

pub use error::{EngineError, Result};
pub use host::ContainerId;
pub use node::{ComponentSpec, ElementNode, Node, component, el, text};
pub use pipeline::{
    InstanceSnapshot, MountHandle, mount, render_markup, render_to_markup, unmount,
};
pub use types::{PropValue, Props};
