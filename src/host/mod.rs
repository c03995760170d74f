//! Host containers and live nodes - the document mutation capability.
//!
//! The renderer does not design document internals; it calls this small
//! primitive surface: create a container, attach a subtree, and mutate
//! nodes addressed by their identifier attribute. Containers can also be
//! pre-populated from markup (the innerHTML path that adoptive mount
//! detects) and serialized back to markup for inspection.
//!
//! Containers live in a thread-local registry and are addressed by value
//! handles, mirroring the index-handle style of the component registry.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::engine::id::ATTR_NAME;
use crate::error::{EngineError, Result};

// =============================================================================
// Types
// =============================================================================

/// Handle to an attachment target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContainerId(usize);

/// One child position in the live tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LiveChild {
    Element(LiveNode),
    Text(String),
}

/// A live element node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveNode {
    pub tag: String,
    /// Attributes in serialization order; the identifier attribute comes
    /// first when the engine built the node.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<LiveChild>,
}

impl LiveNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// The identifier attribute, if present.
    pub fn identifier(&self) -> Option<&str> {
        self.attr(ATTR_NAME)
    }
}

/// Child-list rebuild instruction: keep an existing node (moved as-is, with
/// its whole subtree) or splice in a freshly built one.
#[derive(Debug)]
pub enum ChildSpec {
    Keep(String),
    New(LiveChild),
}

struct Container {
    children: Vec<LiveChild>,
}

// =============================================================================
// Container Registry
// =============================================================================

thread_local! {
    static CONTAINERS: RefCell<HashMap<usize, Container>> = RefCell::new(HashMap::new());
    static NEXT_CONTAINER: Cell<usize> = const { Cell::new(0) };
}

pub fn create_container() -> ContainerId {
    let handle = NEXT_CONTAINER.with(|next| {
        let n = next.get();
        next.set(n + 1);
        n
    });
    CONTAINERS.with(|containers| {
        containers
            .borrow_mut()
            .insert(handle, Container { children: Vec::new() });
    });
    ContainerId(handle)
}

pub fn container_exists(container: ContainerId) -> bool {
    CONTAINERS.with(|containers| containers.borrow().contains_key(&container.0))
}

/// Drop a container entirely. Returns false if it was never created.
pub fn dispose_container(container: ContainerId) -> bool {
    CONTAINERS.with(|containers| containers.borrow_mut().remove(&container.0).is_some())
}

fn with_container<R>(
    container: ContainerId,
    f: impl FnOnce(&mut Container) -> Result<R>,
) -> Result<R> {
    CONTAINERS.with(|containers| {
        let mut containers = containers.borrow_mut();
        let c = containers
            .get_mut(&container.0)
            .ok_or(EngineError::UnknownContainer(container))?;
        f(c)
    })
}

// =============================================================================
// Container Surface
// =============================================================================

pub fn is_empty(container: ContainerId) -> Result<bool> {
    with_container(container, |c| Ok(c.children.is_empty()))
}

/// Snapshot of the container's children.
pub fn children_of(container: ContainerId) -> Result<Vec<LiveChild>> {
    with_container(container, |c| Ok(c.children.clone()))
}

pub fn clear(container: ContainerId) -> Result<()> {
    with_container(container, |c| {
        c.children.clear();
        Ok(())
    })
}

/// Attach a subtree as the container's sole content.
pub fn attach(container: ContainerId, child: LiveChild) -> Result<()> {
    with_container(container, |c| {
        c.children = vec![child];
        Ok(())
    })
}

/// Serialize the container's content.
pub fn markup(container: ContainerId) -> Result<String> {
    with_container(container, |c| Ok(markup_of_children(&c.children)))
}

/// Pre-populate the container from markup (the innerHTML path).
pub fn set_markup(container: ContainerId, markup: &str) -> Result<()> {
    let children = parse_markup(markup)?;
    with_container(container, |c| {
        c.children = children;
        Ok(())
    })
}

// =============================================================================
// Identifier-addressed Mutation
// =============================================================================

fn find_node_mut<'a>(children: &'a mut [LiveChild], id: &str) -> Option<&'a mut LiveNode> {
    for child in children {
        if let LiveChild::Element(node) = child {
            if node.identifier() == Some(id) {
                return Some(node);
            }
            if let Some(found) = find_node_mut(&mut node.children, id) {
                return Some(found);
            }
        }
    }
    None
}

/// Replace a node's content with a single text child. `None` targets the
/// container itself (a bare text root).
pub fn set_text(container: ContainerId, target: Option<&str>, text: &str) -> Result<()> {
    with_container(container, |c| match target {
        None => {
            c.children = vec![LiveChild::Text(text.to_string())];
            Ok(())
        }
        Some(id) => {
            let node = find_node_mut(&mut c.children, id)
                .ok_or_else(|| EngineError::NodeNotFound(id.to_string()))?;
            node.children = vec![LiveChild::Text(text.to_string())];
            Ok(())
        }
    })
}

pub fn set_attr(container: ContainerId, id: &str, name: &str, value: &str) -> Result<()> {
    with_container(container, |c| {
        let node = find_node_mut(&mut c.children, id)
            .ok_or_else(|| EngineError::NodeNotFound(id.to_string()))?;
        match node.attrs.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value.to_string(),
            None => node.attrs.push((name.to_string(), value.to_string())),
        }
        Ok(())
    })
}

pub fn remove_attr(container: ContainerId, id: &str, name: &str) -> Result<()> {
    with_container(container, |c| {
        let node = find_node_mut(&mut c.children, id)
            .ok_or_else(|| EngineError::NodeNotFound(id.to_string()))?;
        node.attrs.retain(|(n, _)| n != name);
        Ok(())
    })
}

fn replace_in(children: &mut [LiveChild], id: &str, new: &mut Option<LiveChild>) -> bool {
    for child in children.iter_mut() {
        let matched = matches!(child, LiveChild::Element(node) if node.identifier() == Some(id));
        if matched {
            if let Some(replacement) = new.take() {
                *child = replacement;
            }
            return true;
        }
        if let LiveChild::Element(node) = child {
            if replace_in(&mut node.children, id, new) {
                return true;
            }
        }
    }
    false
}

/// Swap the node with this identifier for a new subtree, in place.
pub fn replace_node(container: ContainerId, id: &str, new: LiveChild) -> Result<()> {
    with_container(container, |c| {
        let mut new = Some(new);
        if replace_in(&mut c.children, id, &mut new) {
            Ok(())
        } else {
            Err(EngineError::NodeNotFound(id.to_string()))
        }
    })
}

/// Rebuild a child list from keep/new instructions. Kept nodes move with
/// their subtrees; children not mentioned are dropped. `None` targets the
/// container's own child list.
pub fn set_children(
    container: ContainerId,
    parent: Option<&str>,
    specs: Vec<ChildSpec>,
) -> Result<()> {
    with_container(container, |c| {
        let list = match parent {
            None => &mut c.children,
            Some(id) => {
                let node = find_node_mut(&mut c.children, id)
                    .ok_or_else(|| EngineError::NodeNotFound(id.to_string()))?;
                &mut node.children
            }
        };

        // Validate every keep instruction against the current list first,
        // so a bad instruction leaves the children untouched.
        let mut seen: Vec<&str> = Vec::new();
        for spec in &specs {
            if let ChildSpec::Keep(id) = spec {
                let present = list.iter().any(|child| {
                    matches!(child, LiveChild::Element(n) if n.identifier() == Some(id.as_str()))
                });
                if !present || seen.contains(&id.as_str()) {
                    return Err(EngineError::NodeNotFound(id.clone()));
                }
                seen.push(id);
            }
        }

        let old = std::mem::take(list);
        let mut by_id: HashMap<String, LiveChild> = HashMap::new();
        for child in old {
            if let LiveChild::Element(node) = &child {
                if let Some(id) = node.identifier() {
                    by_id.insert(id.to_string(), child);
                    continue;
                }
            }
            // Unidentified children (bare text) cannot be kept by id.
        }

        let mut assembled = Vec::with_capacity(specs.len());
        for spec in specs {
            match spec {
                ChildSpec::New(child) => assembled.push(child),
                ChildSpec::Keep(id) => {
                    if let Some(kept) = by_id.remove(&id) {
                        assembled.push(kept);
                    }
                }
            }
        }
        *list = assembled;
        Ok(())
    })
}

// =============================================================================
// Serialization
// =============================================================================

pub(crate) fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub(crate) fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn write_child(child: &LiveChild, out: &mut String) {
    match child {
        LiveChild::Text(t) => out.push_str(&escape_text(t)),
        LiveChild::Element(node) => {
            out.push('<');
            out.push_str(&node.tag);
            for (name, value) in &node.attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&escape_attr(value));
                out.push('"');
            }
            out.push('>');
            for c in &node.children {
                write_child(c, out);
            }
            out.push_str("</");
            out.push_str(&node.tag);
            out.push('>');
        }
    }
}

/// Serialize a child list to markup.
pub fn markup_of_children(children: &[LiveChild]) -> String {
    let mut out = String::new();
    for child in children {
        write_child(child, &mut out);
    }
    out
}

// =============================================================================
// Parsing
// =============================================================================

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn err(&self, reason: impl Into<String>) -> EngineError {
        EngineError::MarkupParse {
            at: self.pos,
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s.as_bytes())
    }

    fn name(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.err("expected a name"));
        }
        Ok(String::from_utf8_lossy(&self.src[start..self.pos]).into_owned())
    }

    fn unescape(&self, raw: &str) -> String {
        raw.replace("&quot;", "\"")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&")
    }

    fn element(&mut self) -> Result<LiveNode> {
        self.pos += 1; // consume '<'
        let tag = self.name()?;
        let mut attrs = Vec::new();

        loop {
            while self.peek() == Some(b' ') {
                self.pos += 1;
            }
            match self.peek() {
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let name = self.name()?;
                    if self.peek() != Some(b'=') {
                        return Err(self.err("expected `=` after attribute name"));
                    }
                    self.pos += 1;
                    if self.peek() != Some(b'"') {
                        return Err(self.err("expected opening quote"));
                    }
                    self.pos += 1;
                    let start = self.pos;
                    while let Some(b) = self.peek() {
                        if b == b'"' {
                            break;
                        }
                        self.pos += 1;
                    }
                    if self.peek() != Some(b'"') {
                        return Err(self.err("unterminated attribute value"));
                    }
                    let raw = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
                    self.pos += 1;
                    attrs.push((name, self.unescape(&raw)));
                }
                None => return Err(self.err("unterminated open tag")),
            }
        }

        let children = self.children()?;

        if !self.starts_with("</") {
            return Err(self.err(format!("expected closing tag for `{tag}`")));
        }
        self.pos += 2;
        let closing = self.name()?;
        if closing != tag {
            return Err(self.err(format!("mismatched closing tag `{closing}` for `{tag}`")));
        }
        if self.peek() != Some(b'>') {
            return Err(self.err("expected `>` after closing tag"));
        }
        self.pos += 1;

        Ok(LiveNode { tag, attrs, children })
    }

    fn children(&mut self) -> Result<Vec<LiveChild>> {
        let mut out = Vec::new();
        loop {
            if self.pos >= self.src.len() || self.starts_with("</") {
                return Ok(out);
            }
            if self.peek() == Some(b'<') {
                out.push(LiveChild::Element(self.element()?));
            } else {
                let start = self.pos;
                while let Some(b) = self.peek() {
                    if b == b'<' {
                        break;
                    }
                    self.pos += 1;
                }
                let raw = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
                out.push(LiveChild::Text(self.unescape(&raw)));
            }
        }
    }
}

/// Parse markup in the engine's own serialization format.
pub fn parse_markup(markup: &str) -> Result<Vec<LiveChild>> {
    let mut parser = Parser {
        src: markup.as_bytes(),
        pos: 0,
    };
    let children = parser.children()?;
    if parser.pos < parser.src.len() {
        return Err(parser.err("trailing content after root"));
    }
    Ok(children)
}

// =============================================================================
// Reset (for testing)
// =============================================================================

pub fn reset_host_state() {
    CONTAINERS.with(|containers| containers.borrow_mut().clear());
    NEXT_CONTAINER.with(|next| next.set(0));
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn span(id: &str, text: &str) -> LiveChild {
        LiveChild::Element(LiveNode {
            tag: "span".to_string(),
            attrs: vec![(ATTR_NAME.to_string(), id.to_string())],
            children: vec![LiveChild::Text(text.to_string())],
        })
    }

    #[test]
    fn test_serialize_roundtrip() {
        let tree = vec![LiveChild::Element(LiveNode {
            tag: "div".to_string(),
            attrs: vec![
                (ATTR_NAME.to_string(), ".0".to_string()),
                ("class".to_string(), "a \"quoted\" & <odd>".to_string()),
            ],
            children: vec![span(".0.0", "x < y & z"), LiveChild::Text("tail".to_string())],
        })];

        let markup = markup_of_children(&tree);
        assert!(markup.starts_with("<div data-arborid=\".0\""));
        assert!(markup.contains("x &lt; y &amp; z"));

        let parsed = parse_markup(&markup).unwrap();
        assert_eq!(parsed, tree);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_markup("<div>").is_err());
        assert!(parse_markup("<div></span>").is_err());
        assert!(parse_markup("<div x=1></div>").is_err());
    }

    #[test]
    fn test_set_text_by_id() {
        reset_host_state();
        let c = create_container();
        attach(c, span(".0", "old")).unwrap();

        set_text(c, Some(".0"), "new").unwrap();
        assert_eq!(markup(c).unwrap(), "<span data-arborid=\".0\">new</span>");

        assert!(matches!(
            set_text(c, Some(".9"), "x"),
            Err(EngineError::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_attr_mutation() {
        reset_host_state();
        let c = create_container();
        attach(c, span(".0", "t")).unwrap();

        set_attr(c, ".0", "class", "warn").unwrap();
        set_attr(c, ".0", "class", "ok").unwrap();
        assert!(markup(c).unwrap().contains("class=\"ok\""));

        remove_attr(c, ".0", "class").unwrap();
        assert!(!markup(c).unwrap().contains("class"));
    }

    #[test]
    fn test_set_children_keeps_subtrees() {
        reset_host_state();
        let c = create_container();
        attach(
            c,
            LiveChild::Element(LiveNode {
                tag: "ul".to_string(),
                attrs: vec![(ATTR_NAME.to_string(), ".0".to_string())],
                children: vec![span(".0.$a", "a"), span(".0.$b", "b")],
            }),
        )
        .unwrap();

        // Mutate a kept node so we can observe the subtree moved, not rebuilt.
        set_text(c, Some(".0.$b"), "b2").unwrap();

        set_children(
            c,
            Some(".0"),
            vec![
                ChildSpec::Keep(".0.$b".to_string()),
                ChildSpec::New(span(".0.$c", "c")),
            ],
        )
        .unwrap();

        assert_eq!(
            markup(c).unwrap(),
            "<ul data-arborid=\".0\">\
             <span data-arborid=\".0.$b\">b2</span>\
             <span data-arborid=\".0.$c\">c</span>\
             </ul>"
        );
    }

    #[test]
    fn test_set_children_bad_keep_leaves_list_intact() {
        reset_host_state();
        let c = create_container();
        attach(
            c,
            LiveChild::Element(LiveNode {
                tag: "ul".to_string(),
                attrs: vec![(ATTR_NAME.to_string(), ".0".to_string())],
                children: vec![span(".0.$a", "a"), span(".0.$b", "b")],
            }),
        )
        .unwrap();
        let before = markup(c).unwrap();

        assert!(matches!(
            set_children(
                c,
                Some(".0"),
                vec![
                    ChildSpec::Keep(".0.$a".to_string()),
                    ChildSpec::Keep(".0.$missing".to_string()),
                ],
            ),
            Err(EngineError::NodeNotFound(_))
        ));
        assert_eq!(markup(c).unwrap(), before);
    }

    #[test]
    fn test_replace_node() {
        reset_host_state();
        let c = create_container();
        attach(
            c,
            LiveChild::Element(LiveNode {
                tag: "div".to_string(),
                attrs: vec![(ATTR_NAME.to_string(), ".0".to_string())],
                children: vec![span(".0.0", "inner")],
            }),
        )
        .unwrap();

        replace_node(c, ".0.0", span(".5", "fresh")).unwrap();
        assert!(markup(c).unwrap().contains("<span data-arborid=\".5\">fresh</span>"));
    }

    #[test]
    fn test_set_markup_prepopulates() {
        reset_host_state();
        let c = create_container();
        set_markup(c, "<span data-arborid=\".3\">hello</span>").unwrap();
        assert!(!is_empty(c).unwrap());
        assert_eq!(markup(c).unwrap(), "<span data-arborid=\".3\">hello</span>");
    }

    #[test]
    fn test_unknown_container() {
        reset_host_state();
        let c = create_container();
        dispose_container(c);
        assert!(matches!(
            markup(c),
            Err(EngineError::UnknownContainer(_))
        ));
    }
}
