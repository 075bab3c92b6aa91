//! Value types shared by the engine: node kinds and path rows.

use serde::Serialize;

/// Whether a node owns children or aliases another node.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind<I> {
    #[default]
    Normal,
    /// A link never has children. `target = None` is a dead link.
    Link { target: Option<I> },
}

impl<I> NodeKind<I> {
    pub fn is_link(&self) -> bool {
        matches!(self, NodeKind::Link { .. })
    }

    pub fn is_dead_link(&self) -> bool {
        matches!(self, NodeKind::Link { target: None })
    }

    pub fn target(&self) -> Option<&I> {
        match self {
            NodeKind::Link { target } => target.as_ref(),
            NodeKind::Normal => None,
        }
    }

    /// Kind produced by pointing a node at `target`: a link when a target is
    /// given, a normal node otherwise.
    pub fn linked_to(target: Option<I>) -> Self {
        match target {
            Some(target) => NodeKind::Link {
                target: Some(target),
            },
            None => NodeKind::Normal,
        }
    }
}

/// Columns every path row carries besides its two endpoints.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize)]
pub struct PathCore {
    pub depth: u32,
    pub order_index: i32,
}

impl PathCore {
    pub fn new(depth: u32, order_index: i32) -> Self {
        Self { depth, order_index }
    }

    pub fn is_self_reference(&self) -> bool {
        self.depth == 0
    }
}

/// One row of the closure table.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub struct TreePath<I> {
    pub ancestor: I,
    pub descendant: I,
    #[serde(flatten)]
    pub core: PathCore,
}

impl<I: PartialEq> TreePath<I> {
    pub fn new(ancestor: I, descendant: I, depth: u32, order_index: i32) -> Self {
        Self {
            ancestor,
            descendant,
            core: PathCore::new(depth, order_index),
        }
    }

    pub fn self_reference(node: I, order_index: i32) -> Self
    where
        I: Clone,
    {
        Self::new(node.clone(), node, 0, order_index)
    }

    pub fn depth(&self) -> u32 {
        self.core.depth
    }

    pub fn order_index(&self) -> i32 {
        self.core.order_index
    }

    pub fn is_self_reference(&self) -> bool {
        self.ancestor == self.descendant
    }
}

/// How [`find_by_name`](crate::ClosureTableRepository::find_by_name) compares names.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NameMatch {
    Exact,
    Prefix,
    Suffix,
    Contains,
}
