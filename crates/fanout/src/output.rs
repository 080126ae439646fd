//! Sampling results.

use ndarray::Array2;
use std::collections::BTreeMap;

use fanout_core::{EdgeType, GlobalId, LocalIndex, NodeType};

/// Sampled edges of one output edge type.
///
/// `row` indexes the node sequence of the key's source type and `col` that
/// of its destination type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeIndex {
    /// Source LocalIndex per edge.
    pub row: Vec<LocalIndex>,
    /// Destination LocalIndex per edge.
    pub col: Vec<LocalIndex>,
    /// Edge GlobalIDs, when requested.
    pub edge: Option<Vec<GlobalId>>,
    /// Edge type actually traversed (differs from the key in the
    /// message-passing layout). Edge IDs live in its namespace.
    pub origin: EdgeType,
}

impl EdgeIndex {
    pub(crate) fn new(origin: EdgeType, with_edge: bool) -> Self {
        Self {
            row: Vec::new(),
            col: Vec::new(),
            edge: with_edge.then(Vec::new),
            origin,
        }
    }

    pub(crate) fn push(&mut self, row: LocalIndex, col: LocalIndex, edge: GlobalId) {
        self.row.push(row);
        self.col.push(col);
        if let Some(edges) = &mut self.edge {
            edges.push(edge);
        }
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.row.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row.is_empty()
    }

    /// `(row, col)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (LocalIndex, LocalIndex)> + '_ {
        self.row.iter().copied().zip(self.col.iter().copied())
    }
}

/// Supervision edges addressed by LocalIndex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeLabelIndex {
    /// Source LocalIndex.
    pub row: Vec<LocalIndex>,
    /// Destination LocalIndex.
    pub col: Vec<LocalIndex>,
}

impl EdgeLabelIndex {
    pub fn len(&self) -> usize {
        self.row.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row.is_empty()
    }
}

/// Task-specific tensors riding along with the subgraph.
#[derive(Debug, Clone, PartialEq)]
pub enum Metadata {
    /// Node-seeded request: the seeds are the first LocalIndex values of the
    /// input node type.
    Node,
    /// Edge-seeded request without negatives, or with binary negatives.
    Link {
        input_type: EdgeType,
        /// Positives, then negatives in binary mode.
        edge_label_index: EdgeLabelIndex,
        /// 1.0 / 0.0 in binary mode, caller labels otherwise.
        edge_label: Option<Vec<f32>>,
    },
    /// Edge-seeded request with triplet negatives.
    Triplet {
        input_type: EdgeType,
        /// Seed source LocalIndex, one per positive.
        src_index: Vec<LocalIndex>,
        /// Seed destination LocalIndex, one per positive.
        dst_pos_index: Vec<LocalIndex>,
        /// Negative destination LocalIndex, shape `(positives, amount)`.
        dst_neg_index: Array2<LocalIndex>,
        /// Caller labels, passed through.
        edge_label: Option<Vec<f32>>,
    },
}

/// Result of one sampling call. Owned by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingOutput {
    /// GlobalIDs per node type; position = LocalIndex.
    pub node: BTreeMap<NodeType, Vec<GlobalId>>,
    /// Sampled edges per output edge type.
    pub edges: BTreeMap<EdgeType, EdgeIndex>,
    /// New nodes per type at each hop; entry 0 counts seeds.
    pub num_sampled_nodes: BTreeMap<NodeType, Vec<usize>>,
    /// Edges per output edge type at each hop.
    pub num_sampled_edges: BTreeMap<EdgeType, Vec<usize>>,
    pub metadata: Metadata,
}

impl SamplingOutput {
    /// Sampled node IDs of `node_type` (empty if none).
    pub fn nodes(&self, node_type: &NodeType) -> &[GlobalId] {
        self.node.get(node_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total sampled nodes across types.
    pub fn total_nodes(&self) -> usize {
        self.node.values().map(Vec::len).sum()
    }

    /// Total sampled edges across types.
    pub fn total_edges(&self) -> usize {
        self.edges.values().map(EdgeIndex::len).sum()
    }

    /// Edges of `edge_type` mapped back to `(row GlobalID, col GlobalID)`.
    pub fn global_pairs(&self, edge_type: &EdgeType) -> Vec<(GlobalId, GlobalId)> {
        let Some(index) = self.edges.get(edge_type) else {
            return Vec::new();
        };
        let rows = self.nodes(&edge_type.src_type);
        let cols = self.nodes(&edge_type.dst_type);
        index.iter().map(|(r, c)| (rows[r], cols[c])).collect()
    }
}
