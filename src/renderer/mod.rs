//! Rendering backends: markup serialization and live-tree materialization.

pub mod live;
pub mod markup;

pub use live::{Patch, apply_patches, collect_bindings, materialize};
pub use markup::{render_instance_to_markup, serialize_instance};
