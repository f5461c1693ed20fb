//! Root-scope broker for the runtime's text-selection notifications.
//!
//! The runtime listener is attached when the first subscription is taken and
//! detached when the last one is dropped, or together with the broker. Subscribers
//! are identified by a key the owner uses to route each change to the right component.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::layout::{ElementId, LayoutHost};

/// The runtime's current text selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionSnapshot {
    pub anchor: Option<ElementId>,
    pub focus: Option<ElementId>,
    /// Length of the selected text.
    pub text_len: usize,
}

impl SelectionSnapshot {
    pub fn is_empty(&self) -> bool {
        self.text_len == 0
    }

    /// True when a non-empty selection is anchored or focused inside `container`.
    pub fn intersects(&self, container: ElementId, host: &dyn LayoutHost) -> bool {
        !self.is_empty()
            && [self.anchor, self.focus]
                .into_iter()
                .flatten()
                .any(|node| host.contains(container, node))
    }
}

/// Runtime hook that starts and stops delivery of selection changes.
pub trait SelectionSource {
    fn attach(&mut self);

    fn detach(&mut self);
}

struct BrokerState<K> {
    source: Box<dyn SelectionSource>,
    attached: bool,
    next_id: u64,
    subscribers: BTreeMap<u64, K>,
}

impl<K> Drop for BrokerState<K> {
    fn drop(&mut self) {
        if self.attached {
            self.source.detach();
            self.attached = false;
            tracing::debug!("detached selection listener with the broker");
        }
    }
}

/// Cloneable handle on the shared selection listener.
pub struct SelectionBroker<K> {
    state: Rc<RefCell<BrokerState<K>>>,
}

impl<K> Clone for SelectionBroker<K> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<K> fmt::Debug for SelectionBroker<K> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        formatter
            .debug_struct("SelectionBroker")
            .field("attached", &state.attached)
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

impl<K: Clone + 'static> SelectionBroker<K> {
    pub fn new(source: impl SelectionSource + 'static) -> Self {
        Self {
            state: Rc::new(RefCell::new(BrokerState {
                source: Box::new(source),
                attached: false,
                next_id: 0,
                subscribers: BTreeMap::new(),
            })),
        }
    }

    /// Registers `key`; the returned handle unsubscribes when dropped.
    pub fn subscribe(&self, key: K) -> SelectionSubscription<K> {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.insert(id, key);

        if !state.attached {
            state.source.attach();
            state.attached = true;
            tracing::debug!("attached selection listener");
        }

        SelectionSubscription {
            state: Rc::downgrade(&self.state),
            id,
        }
    }

    /// Keys to notify for one change, in subscription order.
    pub fn subscribers(&self) -> Vec<K> {
        self.state.borrow().subscribers.values().cloned().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.borrow().subscribers.len()
    }

    pub fn is_attached(&self) -> bool {
        self.state.borrow().attached
    }
}

/// Live interest in selection changes.
pub struct SelectionSubscription<K> {
    state: Weak<RefCell<BrokerState<K>>>,
    id: u64,
}

impl<K> fmt::Debug for SelectionSubscription<K> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SelectionSubscription")
            .field("id", &self.id)
            .finish()
    }
}

impl<K> Drop for SelectionSubscription<K> {
    fn drop(&mut self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let mut state = state.borrow_mut();
        state.subscribers.remove(&self.id);

        if state.subscribers.is_empty() && state.attached {
            state.source.detach();
            state.attached = false;
            tracing::debug!("detached selection listener");
        }
    }
}
