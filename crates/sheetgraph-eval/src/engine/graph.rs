//! Arena-backed dependency graph plus the address → node map.
//!
//! Nodes live in a `Vec<Option<Node>>`; removal leaves a tombstone so existing
//! [`NodeId`]s stay valid. Edges point from precedent to dependent and are
//! stored on both ends, deduplicated.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::cell::{Node, NodeId};
use super::error::EngineError;

type Edges = SmallVec<[NodeId; 4]>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    nodes: Vec<Option<Node>>,
    /// Precedent → dependents.
    dependents: Vec<Edges>,
    /// Dependent → precedents.
    dependencies: Vec<Edges>,
    addr_to_node: FxHashMap<String, NodeId>,
    next_id: u64,
    edge_count: usize,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live node count.
    pub fn len(&self) -> usize {
        self.addr_to_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addr_to_node.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn get(&self, key: &str) -> Option<NodeId> {
        self.addr_to_node.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.addr_to_node.contains_key(key)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.as_index()).and_then(Option::as_ref)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.as_index()).and_then(Option::as_mut)
    }

    pub fn node_by_key(&self, key: &str) -> Option<&Node> {
        self.get(key).and_then(|id| self.node(id))
    }

    /// Take ownership of `node`, stamping it with the next creation id.
    pub fn insert(&mut self, mut node: Node) -> Result<NodeId, EngineError> {
        let key = node.key();
        if self.addr_to_node.contains_key(&key) {
            return Err(EngineError::DuplicateNode(key));
        }
        self.next_id += 1;
        node.set_id(self.next_id);
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        self.dependents.push(Edges::new());
        self.dependencies.push(Edges::new());
        self.addr_to_node.insert(key, id);
        Ok(id)
    }

    /// Record that `dependent` reads `precedent`. Returns false if the edge
    /// already existed.
    pub fn add_edge(&mut self, precedent: NodeId, dependent: NodeId) -> bool {
        let (p, d) = (precedent.as_index(), dependent.as_index());
        if p >= self.nodes.len() || d >= self.nodes.len() || self.dependents[p].contains(&dependent)
        {
            return false;
        }
        self.dependents[p].push(dependent);
        self.dependencies[d].push(precedent);
        self.edge_count += 1;
        true
    }

    pub fn dependents(&self, id: NodeId) -> &[NodeId] {
        self.dependents
            .get(id.as_index())
            .map(|e| e.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependencies(&self, id: NodeId) -> &[NodeId] {
        self.dependencies
            .get(id.as_index())
            .map(|e| e.as_slice())
            .unwrap_or(&[])
    }

    /// Drop every precedent edge of `id`.
    pub(crate) fn clear_dependencies(&mut self, id: NodeId) {
        let Some(precedents) = self.dependencies.get_mut(id.as_index()) else {
            return;
        };
        let precedents = std::mem::take(precedents);
        for p in &precedents {
            self.dependents[p.as_index()].retain(|d| *d != id);
        }
        self.edge_count -= precedents.len();
    }

    /// Remove a node and all of its edges.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.get_mut(id.as_index())?.take()?;
        self.addr_to_node.remove(&node.key());
        self.clear_dependencies(id);
        let dependents = std::mem::take(&mut self.dependents[id.as_index()]);
        for d in &dependents {
            self.dependencies[d.as_index()].retain(|p| *p != id);
        }
        self.edge_count -= dependents.len();
        Some(node)
    }

    /// Arena length; nodes inserted later have ids at or beyond it.
    pub(crate) fn checkpoint(&self) -> usize {
        self.nodes.len()
    }

    /// Remove every node inserted since `checkpoint`.
    pub(crate) fn rollback(&mut self, checkpoint: usize) {
        for index in (checkpoint..self.nodes.len()).rev() {
            self.remove(NodeId::new(index as u32));
        }
        self.nodes.truncate(checkpoint);
        self.dependents.truncate(checkpoint);
        self.dependencies.truncate(checkpoint);
    }

    /// Live nodes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (NodeId::new(i as u32), n)))
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.addr_to_node.keys().map(String::as_str)
    }
}
