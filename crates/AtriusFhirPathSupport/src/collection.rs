use crate::evaluation_error::EvaluationError;
use crate::node::Node;

/// The result of evaluating any expression: a sequence of nodes.
///
/// A collection is ordered unless it was produced by a function that makes
/// no ordering promise (`children()`, `descendants()`). The flag does not
/// change the layout; it only makes order-dependent functions refuse to run.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    nodes: Vec<Node>,
    unordered: bool,
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}

impl Collection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn singleton(node: Node) -> Self {
        Self {
            nodes: vec![node],
            unordered: false,
        }
    }

    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        Self {
            nodes,
            unordered: false,
        }
    }

    pub fn unordered(nodes: Vec<Node>) -> Self {
        Self {
            nodes,
            unordered: true,
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self::singleton(Node::boolean(value))
    }

    pub fn is_ordered(&self) -> bool {
        !self.unordered
    }

    /// Marks the collection as carrying no ordering promise.
    pub fn into_unordered(mut self) -> Self {
        self.unordered = true;
        self
    }

    /// Fails when `function` depends on order and this collection has none.
    pub fn require_ordered(&self, function: &str) -> Result<(), EvaluationError> {
        if self.unordered && self.nodes.len() > 1 {
            return Err(EvaluationError::InvalidOperation(format!(
                "Function '{}' requires an ordered collection",
                function
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_singleton(&self) -> bool {
        self.nodes.len() == 1
    }

    /// The sole node of a singleton.
    pub fn single(&self) -> Result<&Node, EvaluationError> {
        match self.nodes.as_slice() {
            [node] => Ok(node),
            nodes => Err(EvaluationError::not_singleton(nodes.len())),
        }
    }

    /// The sole node, or `None` for an empty collection.
    pub fn optional_single(&self) -> Result<Option<&Node>, EvaluationError> {
        match self.nodes.as_slice() {
            [] => Ok(None),
            [node] => Ok(Some(node)),
            nodes => Err(EvaluationError::not_singleton(nodes.len())),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }

    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn extend(&mut self, other: Collection) {
        self.unordered |= other.unordered;
        self.nodes.extend(other.nodes);
    }

    /// Membership under `=` semantics.
    pub fn contains_node(&self, node: &Node) -> bool {
        self.nodes.iter().any(|n| n.equals(node) == Some(true))
    }

    pub fn contains_all(&self, other: &Collection) -> bool {
        other.iter().all(|n| self.contains_node(n))
    }

    /// Removes duplicates under `=`, keeping the first occurrence.
    pub fn distinct(&self) -> Collection {
        let mut out = Collection {
            nodes: Vec::with_capacity(self.nodes.len()),
            unordered: self.unordered,
        };
        for node in &self.nodes {
            if !out.contains_node(node) {
                out.nodes.push(node.clone());
            }
        }
        out
    }
}

impl FromIterator<Node> for Collection {
    fn from_iter<T: IntoIterator<Item = Node>>(iter: T) -> Self {
        Self::from_nodes(iter.into_iter().collect())
    }
}

impl IntoIterator for Collection {
    type Item = Node;
    type IntoIter = std::vec::IntoIter<Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unordered_is_a_marker_only() {
        let ordered = Collection::from_nodes(vec![Node::integer(1), Node::integer(2)]);
        let unordered = Collection::unordered(vec![Node::integer(1), Node::integer(2)]);
        assert_eq!(ordered, unordered);
        assert!(ordered.require_ordered("first").is_ok());
        assert!(unordered.require_ordered("first").is_err());
    }

    #[test]
    fn distinct_uses_value_equality() {
        let c = Collection::from_nodes(vec![
            Node::integer(1),
            Node::decimal(rust_decimal::Decimal::ONE),
            Node::string("a"),
        ]);
        assert_eq!(c.distinct().len(), 2);
    }

    #[test]
    fn single_reports_cardinality() {
        let two = Collection::from_nodes(vec![Node::integer(1), Node::integer(2)]);
        let err = two.single().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Singleton Evaluation Error: Input collection has 2 items, but only 1 is allowed"
        );
        assert!(Collection::empty().optional_single().unwrap().is_none());
    }
}
