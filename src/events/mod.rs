//! Event Dispatch Table - identifier-keyed interaction handlers.
//!
//! Handlers declared on a rendered node are registered here during live
//! mount/update, keyed by the node's identifier and an event name. They are
//! removed when the owning instance unmounts. Dispatch is synchronous:
//! a simulated interaction runs every matching handler to completion before
//! `simulate` returns, including any update pass a handler triggers.
//!
//! # Example
//!
//! ```ignore
//! use arbor::events;
//!
//! // Normally populated by the live-tree backend. Direct registration is
//! // useful in tests:
//! events::register(".0", "click", Rc::new(|i| println!("clicked {}", i.id)));
//! assert!(events::simulate(".0", "click"));
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

// =============================================================================
// Types
// =============================================================================

/// An interaction delivered to a handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interaction {
    /// Identifier of the node the event targets.
    pub id: String,
    /// Event name, e.g. "click".
    pub name: String,
}

/// Interaction handler. Rc so the same handler can live in props and in the
/// dispatch table at once.
pub type EventHandler = Rc<dyn Fn(&Interaction)>;

// =============================================================================
// Table State
// =============================================================================

thread_local! {
    /// identifier -> event name -> ordered handlers.
    static TABLE: RefCell<HashMap<String, HashMap<String, Vec<EventHandler>>>> =
        RefCell::new(HashMap::new());
}

// =============================================================================
// Registration
// =============================================================================

/// Register a handler for (identifier, event name).
pub fn register(id: &str, event: &str, handler: EventHandler) {
    TABLE.with(|table| {
        table
            .borrow_mut()
            .entry(id.to_string())
            .or_default()
            .entry(event.to_string())
            .or_default()
            .push(handler);
    });
}

/// Replace every handler registered under an identifier with a new set.
///
/// Used on update: a node's declared handlers are rebound wholesale rather
/// than diffed individually.
pub fn rebind(id: &str, handlers: &[(String, EventHandler)]) {
    release(id);
    for (event, handler) in handlers {
        register(id, event, handler.clone());
    }
}

/// Remove every handler registered under an identifier.
pub fn release(id: &str) {
    TABLE.with(|table| {
        table.borrow_mut().remove(id);
    });
}

// =============================================================================
// Dispatch
// =============================================================================

/// Dispatch an interaction to the handlers registered for exactly this
/// identifier and event name. Returns true if at least one handler ran.
///
/// Handlers are cloned out of the table before invocation so a handler may
/// register, release, or trigger an update pass without aliasing the table.
pub fn simulate(id: &str, event: &str) -> bool {
    let handlers: Vec<EventHandler> = TABLE.with(|table| {
        table
            .borrow()
            .get(id)
            .and_then(|events| events.get(event))
            .cloned()
            .unwrap_or_default()
    });

    if handlers.is_empty() {
        return false;
    }

    tracing::trace!(id, event, count = handlers.len(), "dispatching interaction");

    let interaction = Interaction {
        id: id.to_string(),
        name: event.to_string(),
    };
    for handler in handlers {
        handler(&interaction);
    }
    true
}

// =============================================================================
// Introspection
// =============================================================================

/// Number of handlers registered under an identifier (all events).
pub fn handler_count(id: &str) -> usize {
    TABLE.with(|table| {
        table
            .borrow()
            .get(id)
            .map(|events| events.values().map(Vec::len).sum())
            .unwrap_or(0)
    })
}

/// Identifiers that currently have at least one handler.
pub fn registered_ids() -> Vec<String> {
    TABLE.with(|table| table.borrow().keys().cloned().collect())
}

/// Clear the whole table (for testing).
pub fn reset_events_state() {
    TABLE.with(|table| table.borrow_mut().clear());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn setup() {
        reset_events_state();
    }

    #[test]
    fn test_simulate_exact_target() {
        setup();

        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        register(".0.1", "click", Rc::new(move |_| {
            count_clone.set(count_clone.get() + 1);
        }));

        // Wrong id, wrong event: nothing fires.
        assert!(!simulate(".0.2", "click"));
        assert!(!simulate(".0.1", "submit"));
        assert_eq!(count.get(), 0);

        assert!(simulate(".0.1", "click"));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_handlers_fire_in_order() {
        setup();

        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second"] {
            let log = log.clone();
            register(".0", "click", Rc::new(move |_| {
                log.borrow_mut().push(tag);
            }));
        }

        simulate(".0", "click");
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_release() {
        setup();

        register(".0", "click", Rc::new(|_| {}));
        register(".0", "submit", Rc::new(|_| {}));
        assert_eq!(handler_count(".0"), 2);

        release(".0");
        assert_eq!(handler_count(".0"), 0);
        assert!(!simulate(".0", "click"));
    }

    #[test]
    fn test_rebind_replaces() {
        setup();

        let old_fired = Rc::new(Cell::new(false));
        let old_clone = old_fired.clone();
        register(".0", "click", Rc::new(move |_| old_clone.set(true)));

        let new_fired = Rc::new(Cell::new(false));
        let new_clone = new_fired.clone();
        let handlers: Vec<(String, EventHandler)> = vec![(
            "click".to_string(),
            Rc::new(move |_: &Interaction| new_clone.set(true)) as EventHandler,
        )];
        rebind(".0", &handlers);

        simulate(".0", "click");
        assert!(!old_fired.get());
        assert!(new_fired.get());
    }

    #[test]
    fn test_handler_receives_interaction() {
        setup();

        let seen = Rc::new(RefCell::new(None));
        let seen_clone = seen.clone();
        register(".3", "click", Rc::new(move |i: &Interaction| {
            *seen_clone.borrow_mut() = Some(i.clone());
        }));

        simulate(".3", "click");
        let got = seen.borrow().clone().unwrap();
        assert_eq!(got.id, ".3");
        assert_eq!(got.name, "click");
    }

    #[test]
    fn test_handler_may_mutate_table() {
        setup();

        register(".0", "click", Rc::new(|_| {
            // Nested mutation while dispatching must not panic.
            register(".1", "click", Rc::new(|_| {}));
            release(".0");
        }));

        assert!(simulate(".0", "click"));
        assert_eq!(handler_count(".0"), 0);
        assert_eq!(handler_count(".1"), 1);
    }
}
