//! Release dependency graph

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use keel_core::ValidationError;
use tracing::{debug, instrument};

/// Directed graph of "release depends on release" edges.
///
/// Built per resolution call and dropped afterwards. Nodes keep insertion
/// order so walks are deterministic.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    order: Vec<String>,
    /// node -> the nodes it depends on
    down: BTreeMap<String, BTreeSet<String>>,
    /// node -> the nodes depending on it
    up: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: impl Into<String>) {
        let node = node.into();
        if self.down.contains_key(&node) {
            return;
        }
        self.order.push(node.clone());
        self.down.insert(node.clone(), BTreeSet::new());
        self.up.insert(node, BTreeSet::new());
    }

    pub fn contains(&self, node: &str) -> bool {
        self.down.contains_key(node)
    }

    /// Record that `from` depends on `to`; edges touching unknown nodes are ignored
    pub fn connect(&mut self, from: &str, to: &str) {
        if !self.contains(from) || !self.contains(to) {
            debug!(from, to, "skipping edge to a node outside the graph");
            return;
        }
        if let Some(deps) = self.down.get_mut(from) {
            deps.insert(to.to_string());
        }
        if let Some(dependents) = self.up.get_mut(to) {
            dependents.insert(from.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Nodes `node` depends on
    pub fn down_edges(&self, node: &str) -> Vec<&str> {
        self.down
            .get(node)
            .map(|s| s.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Nodes depending on `node`
    pub fn up_edges(&self, node: &str) -> Vec<&str> {
        self.up
            .get(node)
            .map(|s| s.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Nodes nothing depends on
    pub fn roots(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|n| self.up.get(*n).map_or(true, BTreeSet::is_empty))
            .map(String::as_str)
            .collect()
    }

    /// Order in which every node comes after the nodes it depends on.
    ///
    /// Fails with `CyclicDependency` naming the nodes left on a cycle.
    #[instrument(skip_all, fields(node_count = self.order.len()))]
    pub fn walk_order(&self) -> Result<Vec<String>, ValidationError> {
        let mut remaining: BTreeMap<&str, usize> = self
            .order
            .iter()
            .map(|n| (n.as_str(), self.down.get(n).map_or(0, BTreeSet::len)))
            .collect();
        let mut queue: VecDeque<&str> = self
            .order
            .iter()
            .map(String::as_str)
            .filter(|n| remaining.get(n) == Some(&0))
            .collect();
        let mut sorted = Vec::with_capacity(self.order.len());

        while let Some(node) = queue.pop_front() {
            sorted.push(node.to_string());
            for dependent in self.up_edges(node) {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if sorted.len() != self.order.len() {
            let visited: HashSet<&str> = sorted.iter().map(String::as_str).collect();
            let cyclic: Vec<&str> = self
                .order
                .iter()
                .map(String::as_str)
                .filter(|n| !visited.contains(n))
                .collect();
            return Err(ValidationError::CyclicDependency(cyclic.join(", ")));
        }
        Ok(sorted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for node in nodes {
            g.add(*node);
        }
        for (from, to) in edges {
            g.connect(from, to);
        }
        g
    }

    #[test]
    fn test_walk_visits_dependencies_first() {
        let g = graph(&["app", "cache", "db"], &[("app", "db"), ("app", "cache"), ("cache", "db")]);
        assert_eq!(g.walk_order().unwrap(), vec!["db", "cache", "app"]);
        assert_eq!(g.roots(), vec!["app"]);
    }

    #[test]
    fn test_independent_nodes_keep_insertion_order() {
        let g = graph(&["b", "a", "c"], &[]);
        assert_eq!(g.walk_order().unwrap(), vec!["b", "a", "c"]);
        assert_eq!(g.roots().len(), 3);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "a")]);
        let err = g.walk_order().unwrap_err();
        assert_eq!(err, ValidationError::CyclicDependency("a, b".to_string()));
    }

    #[test]
    fn test_edges_and_unknown_nodes() {
        let g = graph(&["a", "b"], &[("a", "b"), ("a", "external")]);
        assert_eq!(g.down_edges("a"), vec!["b"]);
        assert_eq!(g.up_edges("b"), vec!["a"]);
        assert!(g.up_edges("external").is_empty());
        assert_eq!(g.len(), 2);
    }
}
