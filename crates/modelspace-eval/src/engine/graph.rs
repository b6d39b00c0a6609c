//! Read-edges recorded during evaluation.
//!
//! An edge `dependent -> precedent` means computing `dependent` read the
//! value of `precedent`. Both directions are indexed so invalidation can
//! walk forward from a changed node and eviction can drop a node's stale
//! reads. Edges are plain data over [`Node`] keys; destroying an entity
//! prunes every edge touching it.

use rustc_hash::{FxHashMap, FxHashSet};

use super::node::{ArgKey, EntityId, Node};

#[derive(Debug, Default)]
pub(crate) struct DependencyGraph {
    /// precedent -> nodes that read it
    dependents: FxHashMap<Node, FxHashSet<Node>>,
    /// dependent -> nodes it read
    precedents: FxHashMap<Node, FxHashSet<Node>>,
    /// entity -> argument tuples of its nodes present in the graph
    by_entity: FxHashMap<EntityId, FxHashSet<ArgKey>>,
}

impl DependencyGraph {
    /// Record that `dependent` read `precedent`. Repeated reads collapse.
    pub fn add_edge(&mut self, dependent: &Node, precedent: &Node) {
        if dependent == precedent {
            return;
        }
        let inserted = self
            .precedents
            .entry(dependent.clone())
            .or_default()
            .insert(precedent.clone());
        if !inserted {
            return;
        }
        self.dependents
            .entry(precedent.clone())
            .or_default()
            .insert(dependent.clone());
        self.register(dependent);
        self.register(precedent);
    }

    /// Drop every read recorded for `node`.
    pub fn remove_precedents(&mut self, node: &Node) {
        let Some(reads) = self.precedents.remove(node) else {
            return;
        };
        for precedent in reads {
            if let Some(set) = self.dependents.get_mut(&precedent) {
                set.remove(node);
                if set.is_empty() {
                    self.dependents.remove(&precedent);
                }
            }
            self.release_if_isolated(&precedent);
        }
        self.release_if_isolated(node);
    }

    pub fn dependents_of(&self, node: &Node) -> Vec<Node> {
        self.dependents
            .get(node)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn precedents_of(&self, node: &Node) -> Vec<Node> {
        self.precedents
            .get(node)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_dependents(&self, node: &Node) -> bool {
        self.dependents.contains_key(node)
    }

    /// Every node of `entity` that has at least one edge.
    pub fn nodes_of(&self, entity: EntityId) -> Vec<Node> {
        self.by_entity
            .get(&entity)
            .map(|keys| {
                keys.iter()
                    .map(|args| Node::new(entity, args.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove every edge touching a node of `entity`.
    pub fn prune_entity(&mut self, entity: EntityId) {
        for node in self.nodes_of(entity) {
            self.remove_precedents(&node);
            if let Some(readers) = self.dependents.remove(&node) {
                for reader in readers {
                    if let Some(set) = self.precedents.get_mut(&reader) {
                        set.remove(&node);
                        if set.is_empty() {
                            self.precedents.remove(&reader);
                        }
                    }
                    self.release_if_isolated(&reader);
                }
            }
            self.release_if_isolated(&node);
        }
    }

    pub fn edge_count(&self) -> usize {
        self.precedents.values().map(FxHashSet::len).sum()
    }

    pub fn node_count(&self) -> usize {
        self.by_entity.values().map(FxHashSet::len).sum()
    }

    pub fn clear(&mut self) {
        self.dependents.clear();
        self.precedents.clear();
        self.by_entity.clear();
    }

    fn register(&mut self, node: &Node) {
        self.by_entity
            .entry(node.entity)
            .or_default()
            .insert(node.args.clone());
    }

    fn release_if_isolated(&mut self, node: &Node) {
        if self.dependents.contains_key(node) || self.precedents.contains_key(node) {
            return;
        }
        if let Some(keys) = self.by_entity.get_mut(&node.entity) {
            keys.remove(&node.args);
            if keys.is_empty() {
                self.by_entity.remove(&node.entity);
            }
        }
    }
}
