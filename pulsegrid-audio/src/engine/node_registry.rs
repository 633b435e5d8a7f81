use std::collections::HashSet;

use super::backend::NodeId;

/// Registry of nodes the engine believes are alive on the render backend and
/// of the connections between them.
///
/// Reconnects go through here so that connecting an existing edge, or
/// dropping one that is already gone, becomes a no-op instead of a backend
/// error.
pub struct NodeRegistry {
    live_nodes: HashSet<NodeId>,
    edges: HashSet<(NodeId, NodeId)>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            live_nodes: HashSet::new(),
            edges: HashSet::new(),
        }
    }

    /// Record that a node has been created on the backend.
    pub fn register(&mut self, node_id: NodeId) {
        self.live_nodes.insert(node_id);
    }

    /// Record that a node has been freed; its edges go with it.
    pub fn unregister(&mut self, node_id: NodeId) {
        self.live_nodes.remove(&node_id);
        self.edges.retain(|(from, to)| *from != node_id && *to != node_id);
    }

    /// Returns `true` if the edge is new and should be sent to the backend.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> bool {
        self.edges.insert((from, to))
    }

    /// Returns `true` if the edge existed and should be removed on the backend.
    pub fn disconnect(&mut self, from: NodeId, to: NodeId) -> bool {
        self.edges.remove(&(from, to))
    }

    pub fn is_connected(&self, from: NodeId, to: NodeId) -> bool {
        self.edges.contains(&(from, to))
    }

    /// Mark everything as dead (e.g. after the backend is replaced).
    pub fn invalidate_all(&mut self) {
        self.live_nodes.clear();
        self.edges.clear();
    }

    pub fn is_live(&self, node_id: NodeId) -> bool {
        self.live_nodes.contains(&node_id)
    }

    /// Number of nodes currently believed to be alive.
    pub fn live_count(&self) -> usize {
        self.live_nodes.len()
    }

    /// Check whether a node is tracked as live. If it is not, log a warning
    /// and return `false`.
    pub fn check_node(&self, node_id: NodeId) -> bool {
        if self.live_nodes.contains(&node_id) {
            true
        } else {
            log::warn!(
                target: "audio::nodes",
                "node {} is not tracked as live",
                node_id
            );
            false
        }
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
