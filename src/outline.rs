//! Flat outline of a tree: every node with its ancestor chain and level.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use serde::Serialize;

use crate::error::ClosureTableError;
use crate::model::TreePath;
use crate::traits::ClosureTableModel;

/// One line of an outline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeInfo<N, I> {
    pub node: N,
    /// Zero-padded ancestor ids joined with `-`, root first. Sorting by this
    /// key yields depth-first document order.
    pub path_key: String,
    /// Ancestor ids, root first, ending with the node itself.
    pub path_seq: Vec<I>,
    pub level: u64,
    pub order_index: i32,
}

pub(crate) fn build_outline<N, I>(
    paths: Vec<TreePath<I>>,
    mut nodes: HashMap<I, N>,
) -> Result<Vec<NodeInfo<N, I>>, ClosureTableError>
where
    I: Clone + Eq + Hash + fmt::Display,
{
    let mut grouped: HashMap<I, Vec<TreePath<I>>> = HashMap::new();
    for path in paths {
        grouped.entry(path.descendant.clone()).or_default().push(path);
    }

    let mut infos = Vec::with_capacity(grouped.len());
    for (descendant, mut chain) in grouped {
        chain.sort_by(|a, b| b.depth().cmp(&a.depth()));
        let node = nodes.remove(&descendant).ok_or_else(|| {
            ClosureTableError::invariant(format!("path references unknown node {descendant}"))
        })?;
        let path_key = chain
            .iter()
            .map(|path| format!("{:0>6}", path.ancestor))
            .collect::<Vec<_>>()
            .join("-");
        let order_index = chain.iter().map(TreePath::order_index).max().unwrap_or(0);
        infos.push(NodeInfo {
            node,
            path_key,
            level: chain.len() as u64,
            path_seq: chain.into_iter().map(|path| path.ancestor).collect(),
            order_index,
        });
    }

    infos.sort_by(|a, b| a.path_key.cmp(&b.path_key));
    Ok(infos)
}

/// Shift levels so the first entry sits at level 1.
pub(crate) fn rebase_levels<N, I>(infos: &mut [NodeInfo<N, I>]) {
    let Some(offset) = infos.first().map(|info| info.level.saturating_sub(1)) else {
        return;
    };
    for info in infos.iter_mut() {
        info.level = info.level.saturating_sub(offset);
    }
}

impl<M> fmt::Display for NodeInfo<M, M::Id>
where
    M: ClosureTableModel,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indent = "  ".repeat(self.level.saturating_sub(1) as usize);
        let label = format!("{indent}- {}", self.node.name());
        write!(
            f,
            "| {:>6} | {:<43} | {:<54} | {:>5} |",
            self.node.id(),
            label,
            self.path_key,
            self.level
        )
    }
}
