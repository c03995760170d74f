//! Engine internals: identity allocation, instance lifecycle, mount records.

pub mod id;
pub mod instance;
pub mod registry;

pub use id::{ATTR_NAME, child_id, next_root_id, reset_id_state};
pub use instance::{
    CompositeInstance, HostInstance, Instance, Pending, Phase, TextInstance, child_instances,
    find_at_path, fire_pending, instantiate, renders_as_text, unmount_instance, visible_id,
};
pub use registry::{MountRecord, RootKind, reset_registry_state};
