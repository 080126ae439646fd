//! Heterogeneous graph support.
//!
//! A heterogeneous graph is a set of CSR topologies, one per [`EdgeType`],
//! over node ID spaces partitioned by [`NodeType`]. The registry is resolved
//! once at construction; samplers look topologies up by type tag and never
//! mutate them.
//!
//! # Example
//!
//! ```rust
//! use fanout_core::hetero::{EdgeType, HeteroGraph, NodeType};
//! use fanout_core::CsrTopology;
//!
//! let buys = EdgeType::new("user", "buys", "item");
//! let topo = CsrTopology::from_edge_index(&[0, 0, 1], &[0, 1, 1], None).unwrap();
//!
//! let graph = HeteroGraph::builder()
//!     .num_nodes("user", 3)
//!     .topology(buys.clone(), topo)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(graph.num_node_types(), 2);
//! assert_eq!(graph.degree(&buys, 0).unwrap(), 2);
//! // Node 2 never appears as a source: empty, not an error.
//! assert_eq!(graph.degree(&buys, 2).unwrap(), 0);
//! assert!(graph.degree(&buys, 3).is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::topology::{CsrTopology, Neighbors};
use crate::{Error, GlobalId, Result};

/// A node type identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeType(pub String);

impl NodeType {
    /// Create a new node type.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the type name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: Into<String>> From<S> for NodeType {
    fn from(s: S) -> Self {
        Self(s.into())
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An edge type identifier, represented as (src_type, relation, dst_type).
///
/// Serialized as a three-element array, e.g. `["user", "u2i", "item"]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(
    from = "(NodeType, String, NodeType)",
    into = "(NodeType, String, NodeType)"
)]
pub struct EdgeType {
    /// Source node type.
    pub src_type: NodeType,
    /// Relation name.
    pub relation: String,
    /// Destination node type.
    pub dst_type: NodeType,
}

const REVERSE_PREFIX: &str = "rev_";

impl EdgeType {
    /// Create a new edge type.
    pub fn new(
        src_type: impl Into<NodeType>,
        relation: impl Into<String>,
        dst_type: impl Into<NodeType>,
    ) -> Self {
        Self {
            src_type: src_type.into(),
            relation: relation.into(),
            dst_type: dst_type.into(),
        }
    }

    /// Get the reverse edge type.
    ///
    /// `(user, u2i, item)` becomes `(item, rev_u2i, user)` and reversing
    /// again restores the original.
    pub fn reverse(&self) -> Self {
        let relation = match self.relation.strip_prefix(REVERSE_PREFIX) {
            Some(base) => base.to_string(),
            None => format!("{REVERSE_PREFIX}{}", self.relation),
        };
        Self {
            src_type: self.dst_type.clone(),
            relation,
            dst_type: self.src_type.clone(),
        }
    }

    /// Whether source and destination share a node type.
    pub fn is_homogeneous(&self) -> bool {
        self.src_type == self.dst_type
    }
}

impl From<(NodeType, String, NodeType)> for EdgeType {
    fn from((src_type, relation, dst_type): (NodeType, String, NodeType)) -> Self {
        Self {
            src_type,
            relation,
            dst_type,
        }
    }
}

impl From<EdgeType> for (NodeType, String, NodeType) {
    fn from(e: EdgeType) -> Self {
        (e.src_type, e.relation, e.dst_type)
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.src_type, self.relation, self.dst_type)
    }
}

/// A heterogeneous graph: one immutable CSR topology per edge type.
///
/// Shared read-only (typically behind an `Arc`) by every concurrent sampling
/// request.
#[derive(Debug, Clone, Default)]
pub struct HeteroGraph {
    num_nodes: BTreeMap<NodeType, usize>,
    topologies: BTreeMap<EdgeType, CsrTopology>,
}

impl HeteroGraph {
    /// Start building a graph.
    pub fn builder() -> HeteroGraphBuilder {
        HeteroGraphBuilder::default()
    }

    /// Number of node types.
    pub fn num_node_types(&self) -> usize {
        self.num_nodes.len()
    }

    /// Number of edge types.
    pub fn num_edge_types(&self) -> usize {
        self.topologies.len()
    }

    /// All node types, in sorted order.
    pub fn node_types(&self) -> impl Iterator<Item = &NodeType> {
        self.num_nodes.keys()
    }

    /// All edge types, in sorted order.
    pub fn edge_types(&self) -> impl Iterator<Item = &EdgeType> {
        self.topologies.keys()
    }

    /// Edge types whose source is `src_type`, in sorted order.
    pub fn edge_types_from<'a>(
        &'a self,
        src_type: &'a NodeType,
    ) -> impl Iterator<Item = (&'a EdgeType, &'a CsrTopology)> + 'a {
        self.topologies
            .iter()
            .filter(move |(etype, _)| &etype.src_type == src_type)
    }

    /// Whether a node type is registered.
    pub fn has_node_type(&self, node_type: &NodeType) -> bool {
        self.num_nodes.contains_key(node_type)
    }

    /// Declared number of nodes of a type.
    pub fn num_nodes(&self, node_type: &NodeType) -> Result<usize> {
        self.num_nodes
            .get(node_type)
            .copied()
            .ok_or_else(|| Error::UnknownNodeType(node_type.to_string()))
    }

    /// Number of edges of a type.
    pub fn num_edges(&self, edge_type: &EdgeType) -> Result<usize> {
        Ok(self.topology(edge_type)?.num_edges())
    }

    /// Total number of nodes across all types.
    pub fn total_nodes(&self) -> usize {
        self.num_nodes.values().sum()
    }

    /// Total number of edges across all types.
    pub fn total_edges(&self) -> usize {
        self.topologies.values().map(CsrTopology::num_edges).sum()
    }

    /// Topology of an edge type.
    pub fn topology(&self, edge_type: &EdgeType) -> Result<&CsrTopology> {
        self.topologies
            .get(edge_type)
            .ok_or_else(|| Error::UnknownEdgeType(edge_type.to_string()))
    }

    /// Check that `id` lies in the declared range of `node_type`.
    pub fn check_node(&self, node_type: &NodeType, id: GlobalId) -> Result<()> {
        let n = self.num_nodes(node_type)?;
        if (id as usize) < n {
            Ok(())
        } else {
            Err(Error::UnknownNodeId {
                context: node_type.to_string(),
                id,
                num_nodes: n,
            })
        }
    }

    /// Out-neighbors of `node` under `edge_type`, paired with edge IDs.
    ///
    /// A node inside the declared range that never appears as a source has
    /// an empty neighbor list; a node outside the range is an error.
    pub fn neighbors(&self, edge_type: &EdgeType, node: GlobalId) -> Result<Neighbors<'_>> {
        let topo = self.topology(edge_type)?;
        topo.neighbors(node).ok_or_else(|| Error::UnknownNodeId {
            context: edge_type.to_string(),
            id: node,
            num_nodes: topo.num_nodes(),
        })
    }

    /// Out-degree of `node` under `edge_type`.
    pub fn degree(&self, edge_type: &EdgeType, node: GlobalId) -> Result<usize> {
        Ok(self.neighbors(edge_type, node)?.len())
    }

    /// Statistics about the graph.
    pub fn stats(&self) -> HeteroGraphStats {
        HeteroGraphStats {
            num_node_types: self.num_node_types(),
            num_edge_types: self.num_edge_types(),
            total_nodes: self.total_nodes(),
            total_edges: self.total_edges(),
            nodes_by_type: self
                .num_nodes
                .iter()
                .map(|(t, n)| (t.0.clone(), *n))
                .collect(),
            edges_by_type: self
                .topologies
                .iter()
                .map(|(t, topo)| (t.to_string(), topo.num_edges()))
                .collect(),
            max_degree_by_type: self
                .topologies
                .iter()
                .map(|(t, topo)| (t.to_string(), topo.max_degree()))
                .collect(),
        }
    }
}

/// Builder resolving node counts and padding topologies so every node of a
/// type has a row in every topology sourced at that type.
#[derive(Debug, Default)]
pub struct HeteroGraphBuilder {
    declared: BTreeMap<NodeType, usize>,
    topologies: BTreeMap<EdgeType, CsrTopology>,
}

impl HeteroGraphBuilder {
    /// Declare the number of nodes of a type.
    ///
    /// Without a declaration the count is inferred from the largest ID seen
    /// as a source or destination.
    pub fn num_nodes(mut self, node_type: impl Into<NodeType>, n: usize) -> Self {
        self.declared.insert(node_type.into(), n);
        self
    }

    /// Register the topology of an edge type.
    pub fn topology(mut self, edge_type: EdgeType, topology: CsrTopology) -> Self {
        self.topologies.insert(edge_type, topology);
        self
    }

    /// Resolve counts and build the graph.
    pub fn build(self) -> Result<HeteroGraph> {
        let mut inferred: BTreeMap<NodeType, usize> = BTreeMap::new();
        for (etype, topo) in &self.topologies {
            let src = inferred.entry(etype.src_type.clone()).or_insert(0);
            *src = (*src).max(topo.num_nodes());
            let dst_count = topo.max_destination().map_or(0, |d| d as usize + 1);
            let dst = inferred.entry(etype.dst_type.clone()).or_insert(0);
            *dst = (*dst).max(dst_count);
        }

        let mut num_nodes = inferred;
        for (ntype, n) in self.declared {
            let seen = num_nodes.get(&ntype).copied().unwrap_or(0);
            if n < seen {
                return Err(Error::InvalidTopology(format!(
                    "node type {ntype} declared with {n} nodes but topologies reference {seen}"
                )));
            }
            num_nodes.insert(ntype, n);
        }

        let mut topologies = self.topologies;
        for (etype, topo) in &mut topologies {
            topo.pad_to(num_nodes[&etype.src_type]);
        }

        Ok(HeteroGraph {
            num_nodes,
            topologies,
        })
    }
}

/// Statistics for a heterogeneous graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeteroGraphStats {
    /// Number of node types.
    pub num_node_types: usize,
    /// Number of edge types.
    pub num_edge_types: usize,
    /// Total nodes.
    pub total_nodes: usize,
    /// Total edges.
    pub total_edges: usize,
    /// Nodes per type.
    pub nodes_by_type: HashMap<String, usize>,
    /// Edges per type.
    pub edges_by_type: HashMap<String, usize>,
    /// Largest out-degree per edge type.
    pub max_degree_by_type: HashMap<String, usize>,
}
