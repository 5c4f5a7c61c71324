//! Node Arena
//!
//! All nodes live in one generational arena. Edges are stored on both ends
//! with parallel slot indices, so that detaching a listener from a source is
//! a swap-remove plus one index fix-up instead of a linear search.

use std::any::Any;
use std::rc::Rc;

use slotmap::SlotMap;
use smallvec::SmallVec;

use super::node::{ContextId, Edge, ErrorHandler, Node, NodeId, NodeKind, NodeState};

/// The dependency graph: node storage and edge bookkeeping.
///
/// Nothing in here calls user code, which is what lets the runtime hold a
/// mutable borrow of the graph while using it.
#[derive(Default)]
pub(crate) struct Graph {
    nodes: SlotMap<NodeId, Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. When `attach` is set, the node is also pushed onto its
    /// owner's `owned` list so that it is disposed along with the owner.
    pub fn insert(&mut self, node: Node, attach: bool) -> NodeId {
        let owner = node.owner;
        let id = self.nodes.insert(node);
        if attach {
            if let Some(owner) = owner.and_then(|owner| self.nodes.get_mut(owner)) {
                owner.owned.push(id);
            }
        }
        id
    }

    /// Remove a node from the arena and return it so the caller can drop
    /// its closures outside any runtime borrow.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.nodes.get(id).map(|node| node.kind)
    }

    pub fn state(&self, id: NodeId) -> Option<NodeState> {
        self.nodes.get(id).map(|node| node.state)
    }

    /// Record that `listener` read `source`.
    ///
    /// Reading the same source twice during one run adds a single edge.
    pub fn link(&mut self, source: NodeId, listener: NodeId) {
        if source == listener {
            return;
        }
        let Some(observer_slot) = self.nodes.get(source).map(|node| node.observers.len()) else {
            return;
        };
        let Some(node) = self.nodes.get_mut(listener) else {
            return;
        };
        if node.has_source(source) {
            return;
        }
        let source_slot = node.sources.len();
        node.sources.push(Edge {
            node: source,
            slot: observer_slot,
        });

        if let Some(node) = self.nodes.get_mut(source) {
            node.observers.push(Edge {
                node: listener,
                slot: source_slot,
            });
        }
    }

    /// Detach `id` from every source it read.
    pub fn unlink_sources(&mut self, id: NodeId) {
        loop {
            let Some(edge) = self.nodes.get_mut(id).and_then(|node| node.sources.pop()) else {
                return;
            };
            let Some(source) = self.nodes.get_mut(edge.node) else {
                continue;
            };

            // `edge.slot` is our position in the source's observer list. The
            // last observer moves into it and must learn its new slot.
            let index = edge.slot;
            if index >= source.observers.len() {
                continue;
            }
            source.observers.swap_remove(index);
            let Some(&moved) = source.observers.get(index) else {
                continue;
            };
            if let Some(edge) = self
                .nodes
                .get_mut(moved.node)
                .and_then(|node| node.sources.get_mut(moved.slot))
            {
                edge.slot = index;
            }
        }
    }

    /// Detach `id` from every observer that read it.
    ///
    /// Used when a source is disposed ahead of its readers.
    pub fn unlink_observers(&mut self, id: NodeId) {
        loop {
            let Some(edge) = self.nodes.get_mut(id).and_then(|node| node.observers.pop()) else {
                return;
            };
            let Some(listener) = self.nodes.get_mut(edge.node) else {
                continue;
            };

            let index = edge.slot;
            if index >= listener.sources.len() {
                continue;
            }
            listener.sources.swap_remove(index);
            let Some(&moved) = listener.sources.get(index) else {
                continue;
            };
            if let Some(edge) = self
                .nodes
                .get_mut(moved.node)
                .and_then(|node| node.observers.get_mut(moved.slot))
            {
                edge.slot = index;
            }
        }
    }

    /// Ids of every node that read `id`.
    pub fn observers(&self, id: NodeId) -> SmallVec<[NodeId; 8]> {
        self.nodes
            .get(id)
            .map(|node| node.observers.iter().map(|edge| edge.node).collect())
            .unwrap_or_default()
    }

    /// Ids of every node `id` read, in read order.
    pub fn sources(&self, id: NodeId) -> SmallVec<[NodeId; 8]> {
        self.nodes
            .get(id)
            .map(|node| node.sources.iter().map(|edge| edge.node).collect())
            .unwrap_or_default()
    }

    /// Remove `child` from its owner's owned list.
    pub fn detach_from_owner(&mut self, child: NodeId) {
        let Some(owner) = self.nodes.get(child).and_then(|node| node.owner) else {
            return;
        };
        if let Some(owner) = self.nodes.get_mut(owner) {
            if let Some(pos) = owner.owned.iter().position(|id| *id == child) {
                owner.owned.remove(pos);
            }
        }
    }

    /// Look up a context value, walking from `start` to the root.
    pub fn lookup_context(&self, start: Option<NodeId>, key: ContextId) -> Option<Rc<dyn Any>> {
        let mut current = start;
        while let Some(id) = current {
            let node = self.nodes.get(id)?;
            if let Some(value) = node.contexts.as_ref().and_then(|map| map.get(&key)) {
                return Some(Rc::clone(value));
            }
            current = node.owner;
        }
        None
    }

    /// Find the nearest error handlers, walking from `start` to the root.
    pub fn lookup_error_handlers(&self, start: NodeId) -> SmallVec<[ErrorHandler; 1]> {
        let mut current = Some(start);
        while let Some(id) = current {
            let Some(node) = self.nodes.get(id) else {
                break;
            };
            if !node.error_handlers.is_empty() {
                return node.error_handlers.clone();
            }
            current = node.owner;
        }
        SmallVec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(kinds: &[NodeKind]) -> (Graph, Vec<NodeId>) {
        let mut graph = Graph::new();
        let ids = kinds
            .iter()
            .map(|kind| graph.insert(Node::new(*kind, None), false))
            .collect();
        (graph, ids)
    }

    /// Every edge must be mirrored on the other side at the recorded slot.
    fn assert_consistent(graph: &Graph, ids: &[NodeId]) {
        for &id in ids {
            let node = graph.get(id).unwrap();
            for (i, edge) in node.sources.iter().enumerate() {
                let back = graph.get(edge.node).unwrap().observers[edge.slot];
                assert_eq!(back, Edge { node: id, slot: i });
            }
            for (i, edge) in node.observers.iter().enumerate() {
                let back = graph.get(edge.node).unwrap().sources[edge.slot];
                assert_eq!(back, Edge { node: id, slot: i });
            }
        }
    }

    #[test]
    fn link_is_idempotent() {
        let (mut graph, ids) = graph_with(&[NodeKind::Signal, NodeKind::Memo]);
        graph.link(ids[0], ids[1]);
        graph.link(ids[0], ids[1]);

        assert_eq!(graph.sources(ids[1]).as_slice(), &[ids[0]]);
        assert_eq!(graph.observers(ids[0]).as_slice(), &[ids[1]]);
        assert_consistent(&graph, &ids);
    }

    #[test]
    fn unlink_fixes_moved_slots() {
        let (mut graph, ids) = graph_with(&[
            NodeKind::Signal,
            NodeKind::Signal,
            NodeKind::Memo,
            NodeKind::Memo,
            NodeKind::Effect,
        ]);
        let (s1, s2, m1, m2, e) = (ids[0], ids[1], ids[2], ids[3], ids[4]);

        graph.link(s1, m1);
        graph.link(s1, m2);
        graph.link(s2, m2);
        graph.link(s1, e);
        graph.link(m1, e);
        graph.link(m2, e);
        assert_consistent(&graph, &ids);

        // m1 sits first in s1's observers; removing it moves e into slot 0
        graph.unlink_sources(m1);
        assert!(graph.sources(m1).is_empty());
        assert_eq!(graph.observers(s1).len(), 2);
        assert_consistent(&graph, &ids);

        graph.unlink_sources(e);
        assert_eq!(graph.observers(s1).as_slice(), &[m2]);
        assert!(graph.observers(m1).is_empty());
        assert_consistent(&graph, &ids);
    }

    #[test]
    fn unlink_observers_detaches_readers() {
        let (mut graph, ids) = graph_with(&[NodeKind::Signal, NodeKind::Signal, NodeKind::Effect]);
        graph.link(ids[0], ids[2]);
        graph.link(ids[1], ids[2]);

        graph.unlink_observers(ids[0]);
        assert_eq!(graph.sources(ids[2]).as_slice(), &[ids[1]]);
        assert_consistent(&graph, &ids);
    }

    #[test]
    fn ownership_attach_and_detach() {
        let mut graph = Graph::new();
        let root = graph.insert(Node::new(NodeKind::Owner, None), false);
        let child = graph.insert(Node::new(NodeKind::Effect, Some(root)), true);
        let detached = graph.insert(Node::new(NodeKind::Owner, Some(root)), false);

        assert_eq!(graph.get(root).unwrap().owned, vec![child]);
        assert_eq!(graph.get(detached).unwrap().owner, Some(root));

        graph.detach_from_owner(child);
        assert!(graph.get(root).unwrap().owned.is_empty());
    }

    #[test]
    fn context_lookup_walks_and_shadows() {
        let mut graph = Graph::new();
        let key = ContextId::new();
        let root = graph.insert(Node::new(NodeKind::Owner, None), false);
        let mid = graph.insert(Node::new(NodeKind::Owner, Some(root)), true);
        let leaf = graph.insert(Node::new(NodeKind::Effect, Some(mid)), true);

        graph.get_mut(root).unwrap().contexts =
            Some([(key, Rc::new(1_i32) as Rc<dyn Any>)].into_iter().collect());
        let found = graph.lookup_context(Some(leaf), key).unwrap();
        assert_eq!(found.downcast_ref::<i32>(), Some(&1));

        graph.get_mut(mid).unwrap().contexts =
            Some([(key, Rc::new(2_i32) as Rc<dyn Any>)].into_iter().collect());
        let found = graph.lookup_context(Some(leaf), key).unwrap();
        assert_eq!(found.downcast_ref::<i32>(), Some(&2));

        assert!(graph.lookup_context(Some(leaf), ContextId::new()).is_none());
    }
}
