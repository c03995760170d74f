//! Mount coordination and reconciliation.

pub mod mount;
pub mod reconcile;

pub use mount::{
    InstanceSnapshot, MountHandle, mount, render_markup, render_to_markup, reset_pipeline_state,
    unmount,
};
