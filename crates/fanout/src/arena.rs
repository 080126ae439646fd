//! Request-scoped node arena.
//!
//! Assigns LocalIndex values in first-seen order. One arena lives for one
//! sampling call and has a single writer, so claim-or-lookup needs no
//! synchronization.

use std::collections::{BTreeMap, HashMap};

use fanout_core::{GlobalId, LocalIndex, NodeType};

/// Append-only ID table of one node type.
#[derive(Debug, Default)]
pub(crate) struct NodeArena {
    ids: Vec<GlobalId>,
    index: HashMap<GlobalId, LocalIndex>,
}

impl NodeArena {
    /// LocalIndex of `id`, assigning the next one if unseen.
    /// The flag is true when `id` was newly added.
    pub(crate) fn claim(&mut self, id: GlobalId) -> (LocalIndex, bool) {
        if let Some(&idx) = self.index.get(&id) {
            return (idx, false);
        }
        let idx = self.ids.len();
        self.ids.push(id);
        self.index.insert(id, idx);
        (idx, true)
    }

    pub(crate) fn get(&self, id: GlobalId) -> Option<LocalIndex> {
        self.index.get(&id).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Node arenas keyed by node type.
#[derive(Debug, Default)]
pub(crate) struct Arena {
    types: BTreeMap<NodeType, NodeArena>,
}

impl Arena {
    pub(crate) fn claim(&mut self, node_type: &NodeType, id: GlobalId) -> (LocalIndex, bool) {
        match self.types.get_mut(node_type) {
            Some(arena) => arena.claim(id),
            None => self
                .types
                .entry(node_type.clone())
                .or_default()
                .claim(id),
        }
    }

    pub(crate) fn get(&self, node_type: &NodeType, id: GlobalId) -> Option<LocalIndex> {
        self.types.get(node_type).and_then(|a| a.get(id))
    }

    /// Current size of every node type seen so far.
    pub(crate) fn sizes(&self) -> BTreeMap<NodeType, usize> {
        self.types
            .iter()
            .map(|(t, a)| (t.clone(), a.len()))
            .collect()
    }

    /// Per-type ID sequences ordered by LocalIndex.
    pub(crate) fn into_nodes(self) -> BTreeMap<NodeType, Vec<GlobalId>> {
        self.types.into_iter().map(|(t, a)| (t, a.ids)).collect()
    }
}
