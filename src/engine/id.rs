//! Identity Allocator - mount-scoped, path-derived identifiers.
//!
//! Every rendered node gets an identifier built by appending one segment per
//! tree level: the root of a pass is `.{seq}` where `seq` is a process-wide
//! counter bumped once per pass, and each child appends `.{index}` or
//! `.${key}`. Within one pass the scheme is reproducible; across passes the
//! root segment differs, so identifiers never repeat between mounts even for
//! structurally identical trees.
//!
//! Subtrees rebuilt mid-update (type changed at a position) draw a fresh
//! root segment from the same counter, so a replacement never collides with
//! the identifier it discards.
//!
//! Allocation cannot fail; duplicate-key detection among siblings belongs to
//! the callers that walk child lists.

use std::cell::Cell;

/// The engine-reserved markup attribute carrying a node's identifier.
pub const ATTR_NAME: &str = "data-arborid";

thread_local! {
    static PASS_SEQ: Cell<usize> = const { Cell::new(0) };
}

/// Allocate the root identifier for a new mount/render pass.
pub fn next_root_id() -> String {
    PASS_SEQ.with(|seq| {
        let n = seq.get();
        seq.set(n + 1);
        format!(".{n}")
    })
}

/// Identifier for a child at `index` under `parent`, or under an explicit
/// key. Pure: same inputs give the same identifier within a pass.
pub fn child_id(parent: &str, index: usize, key: Option<&str>) -> String {
    match key {
        Some(k) => format!("{parent}.${k}"),
        None => format!("{parent}.{index}"),
    }
}

/// Reset the pass counter (for testing).
pub fn reset_id_state() {
    PASS_SEQ.with(|seq| seq.set(0));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_ids_never_repeat() {
        reset_id_state();
        let a = next_root_id();
        let b = next_root_id();
        assert_ne!(a, b);
        assert!(a.starts_with('.'));
    }

    #[test]
    fn test_child_id_reproducible() {
        assert_eq!(child_id(".0", 2, None), ".0.2");
        assert_eq!(child_id(".0", 2, None), ".0.2");
        assert_eq!(child_id(".0.1", 0, Some("row")), ".0.1.$row");
    }
}
