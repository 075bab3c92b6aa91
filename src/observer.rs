//! Hook for observing committed tree mutations.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// A committed change to the tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TreeEvent<I> {
    NodeInserted {
        node: I,
    },
    NodeUpdated {
        node: I,
    },
    ChildAdded {
        parent: Option<I>,
        child: I,
        order_index: i32,
        paths: usize,
    },
    SubtreeMoved {
        root: I,
        destination: Option<I>,
        order_index: i32,
        nodes: usize,
        paths: usize,
    },
    OrderChanged {
        node: I,
        order_index: i32,
    },
    PathDeleted {
        node: I,
        paths: usize,
    },
    NodeRemoved {
        node: I,
        forced: bool,
    },
    LinkChanged {
        node: I,
        target: Option<I>,
    },
}

/// Receives every [`TreeEvent`] after its transaction committed, or after its
/// savepoint was released when the caller supplied the transaction.
pub trait TreeObserver<I>: Send + Sync {
    fn on_event(&self, event: &TreeEvent<I>);
}

impl<I, F> TreeObserver<I> for F
where
    F: Fn(&TreeEvent<I>) + Send + Sync,
{
    fn on_event(&self, event: &TreeEvent<I>) {
        self(event)
    }
}

/// Shared, optional observer slot held by repositories.
pub(crate) struct ObserverSlot<I>(Option<Arc<dyn TreeObserver<I>>>);

impl<I> ObserverSlot<I> {
    pub(crate) fn empty() -> Self {
        Self(None)
    }

    pub(crate) fn set(&mut self, observer: Arc<dyn TreeObserver<I>>) {
        self.0 = Some(observer);
    }

    pub(crate) fn notify(&self, event: TreeEvent<I>) {
        if let Some(observer) = &self.0 {
            observer.on_event(&event);
        }
    }
}

impl<I> Clone for ObserverSlot<I> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<I> fmt::Debug for ObserverSlot<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObserverSlot")
            .field(&self.0.as_ref().map(|_| "observer"))
            .finish()
    }
}
