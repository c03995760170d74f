//! Core types - Props and property values.
//!
//! Props are ordered maps of named values attached to a description node.
//! The same shape doubles as component state: lifecycle hooks read and
//! produce `Props`, and `set_state` merges a partial `Props` into the
//! stored one.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::events::EventHandler;

// =============================================================================
// Prop Value
// =============================================================================

/// A single property value.
///
/// Serializable variants become markup attributes; `Handler` entries are
/// routed into the event dispatch table instead and never serialize.
#[derive(Clone)]
pub enum PropValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Handler(EventHandler),
}

impl PropValue {
    /// Attribute string form, or None for handlers.
    pub fn as_attr(&self) -> Option<String> {
        match self {
            PropValue::Str(s) => Some(s.clone()),
            PropValue::Int(n) => Some(n.to_string()),
            PropValue::Bool(b) => Some(b.to_string()),
            PropValue::Handler(_) => None,
        }
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Str(a), PropValue::Str(b)) => a == b,
            (PropValue::Int(a), PropValue::Int(b)) => a == b,
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            // Handlers compare by identity: same Rc, same handler.
            (PropValue::Handler(a), PropValue::Handler(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for PropValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropValue::Str(s) => write!(f, "Str({s:?})"),
            PropValue::Int(n) => write!(f, "Int({n})"),
            PropValue::Bool(b) => write!(f, "Bool({b})"),
            PropValue::Handler(_) => write!(f, "Handler(..)"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::Str(s.to_string())
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        PropValue::Str(s)
    }
}

impl From<i64> for PropValue {
    fn from(n: i64) -> Self {
        PropValue::Int(n)
    }
}

impl From<i32> for PropValue {
    fn from(n: i32) -> Self {
        PropValue::Int(n.into())
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        PropValue::Bool(b)
    }
}

// =============================================================================
// Props
// =============================================================================

/// Named values for a description node, plus an optional sibling key.
///
/// Backed by a `BTreeMap` so attribute serialization order is deterministic.
#[derive(Clone, Default, PartialEq, Debug)]
pub struct Props {
    key: Option<String>,
    map: BTreeMap<String, PropValue>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the explicit sibling key used by keyed reconciliation.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set a named value (builder style).
    pub fn set(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.map.insert(name.into(), value.into());
        self
    }

    /// Attach an interaction handler under an event name (e.g. "click").
    pub fn on(mut self, event: impl Into<String>, handler: EventHandler) -> Self {
        self.map.insert(event.into(), PropValue::Handler(handler));
        self
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.map.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.map.get(name) {
            Some(PropValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.map.get(name) {
            Some(PropValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.map.get(name) {
            Some(PropValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn explicit_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Serializable entries in map order: (name, attribute value).
    pub fn attrs(&self) -> impl Iterator<Item = (&str, String)> {
        self.map
            .iter()
            .filter_map(|(name, value)| value.as_attr().map(|v| (name.as_str(), v)))
    }

    /// Handler entries in map order: (event name, handler).
    pub fn handlers(&self) -> impl Iterator<Item = (&str, &EventHandler)> {
        self.map.iter().filter_map(|(name, value)| match value {
            PropValue::Handler(h) => Some((name.as_str(), h)),
            _ => None,
        })
    }

    /// Merge `partial` into self, overwriting existing names.
    ///
    /// This is the `set_state` merge: untouched names survive.
    pub fn merge(&mut self, partial: Props) {
        for (name, value) in partial.map {
            self.map.insert(name, value);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prop_value_eq() {
        assert_eq!(PropValue::from("a"), PropValue::from("a"));
        assert_ne!(PropValue::from("a"), PropValue::from("b"));
        assert_ne!(PropValue::from("1"), PropValue::from(1));

        let h: EventHandler = Rc::new(|_| {});
        assert_eq!(
            PropValue::Handler(h.clone()),
            PropValue::Handler(h.clone())
        );
        let other: EventHandler = Rc::new(|_| {});
        assert_ne!(PropValue::Handler(h), PropValue::Handler(other));
    }

    #[test]
    fn test_attrs_skip_handlers() {
        let props = Props::new()
            .set("name", "child")
            .set("count", 3)
            .on("click", Rc::new(|_| {}));

        let attrs: Vec<_> = props.attrs().collect();
        assert_eq!(
            attrs,
            vec![("count", "3".to_string()), ("name", "child".to_string())]
        );
        assert_eq!(props.handlers().count(), 1);
    }

    #[test]
    fn test_merge_overwrites_and_keeps() {
        let mut state = Props::new().set("name", "a").set("count", 1);
        state.merge(Props::new().set("count", 2));

        assert_eq!(state.str("name"), Some("a"));
        assert_eq!(state.int("count"), Some(2));
    }

    #[test]
    fn test_explicit_key() {
        let props = Props::new().key("row-1");
        assert_eq!(props.explicit_key(), Some("row-1"));
        assert_eq!(Props::new().explicit_key(), None);
    }
}
