use serde::Serialize;

/// A node together with its expanded children, as produced by
/// [`ClosureTableRepository::nested_view`](crate::ClosureTableRepository::nested_view).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NestedNode<N> {
    pub node: N,
    pub children: Vec<NestedNode<N>>,
}

impl<N> NestedNode<N> {
    pub fn leaf(node: N) -> Self {
        Self {
            node,
            children: Vec::new(),
        }
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Number of nodes in this subtree, including the root.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(NestedNode::len).sum::<usize>()
    }

    /// Edge count of the longest root-to-leaf chain.
    pub fn height(&self) -> usize {
        self.children
            .iter()
            .map(|child| child.height() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Depth-first, parent-before-children traversal.
    pub fn iter(&self) -> impl Iterator<Item = &N> + '_ {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let current = stack.pop()?;
            stack.extend(current.children.iter().rev());
            Some(&current.node)
        })
    }

    pub fn map<T>(self, f: &impl Fn(N) -> T) -> NestedNode<T> {
        NestedNode {
            node: f(self.node),
            children: self.children.into_iter().map(|child| child.map(f)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NestedNode<&'static str> {
        NestedNode {
            node: "root",
            children: vec![
                NestedNode {
                    node: "a",
                    children: vec![NestedNode::leaf("b")],
                },
                NestedNode::leaf("c"),
            ],
        }
    }

    #[test]
    fn traversal_is_depth_first() {
        let tree = sample();
        assert_eq!(tree.iter().copied().collect::<Vec<_>>(), vec!["root", "a", "b", "c"]);
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.height(), 2);
        assert!(tree.has_children());
        assert!(!NestedNode::leaf(1).has_children());
    }

    #[test]
    fn map_keeps_shape() {
        let lengths = sample().map(&|name: &str| name.len());
        assert_eq!(lengths.iter().copied().collect::<Vec<_>>(), vec![4, 1, 1, 1]);
    }
}
