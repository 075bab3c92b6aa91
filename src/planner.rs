//! Path regeneration for subtree moves.
//!
//! Planning is kept apart from the store so the depth arithmetic can be
//! checked without a database.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use crate::error::ClosureTableError;
use crate::model::TreePath;

/// Paths to drop and paths to insert for one move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MovePlan<I> {
    /// Nodes whose descendant-paths are deleted, deepest first.
    pub(crate) detach_order: Vec<I>,
    pub(crate) paths: Vec<TreePath<I>>,
}

impl<I> MovePlan<I> {
    pub(crate) fn moved_nodes(&self) -> usize {
        self.detach_order.len()
    }
}

/// Build the new path set for moving the subtree at `subtree_root` below the
/// last node of `destination_chain` (root level when it is empty).
///
/// * `members` is the subtree including its root, shallowest first.
/// * `ancestry` maps every member to its current descendant-paths.
/// * `destination_chain` lists the destination's ancestors root first,
///   ending with the destination itself.
pub(crate) fn plan_move<I>(
    subtree_root: &I,
    order_index: i32,
    members: &[I],
    ancestry: &HashMap<I, Vec<TreePath<I>>>,
    destination_chain: &[I],
) -> Result<MovePlan<I>, ClosureTableError>
where
    I: Clone + Eq + Hash + fmt::Display,
{
    let old_prefix: HashSet<&I> = chain_of(subtree_root, ancestry)?
        .into_iter()
        .filter(|ancestor| *ancestor != subtree_root)
        .collect();

    let mut paths = Vec::new();
    for member in members {
        let order = if member == subtree_root {
            order_index
        } else {
            self_order_index(member, ancestry)?
        };

        let tail = chain_of(member, ancestry)?
            .into_iter()
            .filter(|ancestor| !old_prefix.contains(ancestor));

        let new_chain: Vec<&I> = destination_chain.iter().chain(tail).collect();
        let mut depth = new_chain.len() as u32;
        for ancestor in new_chain {
            depth -= 1;
            paths.push(TreePath::new(
                ancestor.clone(),
                member.clone(),
                depth,
                order,
            ));
        }
    }

    Ok(MovePlan {
        detach_order: members.iter().rev().cloned().collect(),
        paths,
    })
}

/// Ancestors of `node`, root first, the node itself last.
fn chain_of<'a, I>(
    node: &I,
    ancestry: &'a HashMap<I, Vec<TreePath<I>>>,
) -> Result<Vec<&'a I>, ClosureTableError>
where
    I: Eq + Hash + fmt::Display,
{
    let paths = ancestry
        .get(node)
        .ok_or_else(|| ClosureTableError::invariant(format!("no paths loaded for {node}")))?;
    let mut ordered: Vec<&TreePath<I>> = paths.iter().collect();
    ordered.sort_by(|a, b| b.depth().cmp(&a.depth()));
    Ok(ordered.into_iter().map(|path| &path.ancestor).collect())
}

fn self_order_index<I>(
    node: &I,
    ancestry: &HashMap<I, Vec<TreePath<I>>>,
) -> Result<i32, ClosureTableError>
where
    I: Eq + Hash + fmt::Display,
{
    ancestry
        .get(node)
        .and_then(|paths| paths.iter().find(|path| path.core.is_self_reference()))
        .map(TreePath::order_index)
        .ok_or_else(|| ClosureTableError::invariant(format!("{node} has no self-path")))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Paths for a chain `ids[0] -> ids[1] -> ...` with the given self order.
    fn chain(ids: &[i32], order: i32) -> Vec<TreePath<i32>> {
        let node = *ids.last().unwrap();
        ids.iter()
            .enumerate()
            .map(|(i, ancestor)| TreePath::new(*ancestor, node, (ids.len() - 1 - i) as u32, order))
            .collect()
    }

    fn sorted(mut paths: Vec<TreePath<i32>>) -> Vec<(i32, i32, u32, i32)> {
        paths.sort_by_key(|p| (p.descendant, p.ancestor));
        paths
            .into_iter()
            .map(|p| (p.ancestor, p.descendant, p.depth(), p.order_index()))
            .collect()
    }

    // 1 -> 2 -> 3 -> 4, plus 1 -> 5
    fn fixture() -> HashMap<i32, Vec<TreePath<i32>>> {
        HashMap::from([
            (1, chain(&[1], 0)),
            (2, chain(&[1, 2], 0)),
            (3, chain(&[1, 2, 3], 4)),
            (4, chain(&[1, 2, 3, 4], 7)),
            (5, chain(&[1, 5], 1)),
        ])
    }

    #[test]
    fn moving_a_subtree_under_a_sibling_regenerates_depths() {
        let ancestry = fixture();
        let plan = plan_move(&3, 2, &[3, 4], &ancestry, &[1, 5]).unwrap();

        assert_eq!(plan.detach_order, vec![4, 3]);
        assert_eq!(
            sorted(plan.paths),
            vec![
                (1, 3, 2, 2),
                (3, 3, 0, 2),
                (5, 3, 1, 2),
                (1, 4, 3, 7),
                (3, 4, 1, 7),
                (4, 4, 0, 7),
                (5, 4, 2, 7),
            ]
        );
    }

    #[test]
    fn moving_to_root_keeps_only_the_tail() {
        let ancestry = fixture();
        let plan = plan_move(&2, 0, &[2, 3, 4], &ancestry, &[]).unwrap();

        assert_eq!(plan.moved_nodes(), 3);
        assert_eq!(
            sorted(plan.paths),
            vec![
                (2, 2, 0, 0),
                (2, 3, 1, 4),
                (3, 3, 0, 4),
                (2, 4, 2, 7),
                (3, 4, 1, 7),
                (4, 4, 0, 7),
            ]
        );
    }

    #[test]
    fn missing_ancestry_is_an_invariant_violation() {
        let ancestry = HashMap::from([(3, chain(&[1, 2, 3], 0))]);
        let err = plan_move(&3, 0, &[3, 4], &ancestry, &[]).unwrap_err();
        assert!(matches!(err, ClosureTableError::Invariant(_)));
    }
}
