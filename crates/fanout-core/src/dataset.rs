//! JSON graph datasets.
//!
//! A [`GraphSpec`] is the precomputed input handed over by the ingestion
//! pipeline: edge lists per edge type, optional declared node counts, and
//! optional dense feature tables and node labels.
//!
//! ```json
//! {
//!   "num_nodes": { "user": 40, "item": 40 },
//!   "edges": [
//!     { "edge_type": ["user", "u2i", "item"], "rows": [0, 0], "cols": [1, 2] }
//!   ],
//!   "node_features": { "user": { "rows": [[0.0], [1.0]] } }
//! }
//! ```

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::feature::{Feature, FeatureStore};
use crate::hetero::{EdgeType, HeteroGraph, NodeType};
use crate::id2idx::Id2Idx;
use crate::placement::{DeviceGroup, Placement};
use crate::topology::CsrTopology;
use crate::{Error, GlobalId, Result};

/// Edge list of one edge type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// Edge type.
    pub edge_type: EdgeType,
    /// Source IDs.
    pub rows: Vec<GlobalId>,
    /// Destination IDs.
    pub cols: Vec<GlobalId>,
    /// Edge IDs (default: position in the list).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_ids: Option<Vec<GlobalId>>,
    /// Placement of the topology.
    #[serde(default)]
    pub placement: Placement,
}

/// A dense feature table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    /// GlobalID of each row (default: row position).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<GlobalId>>,
    /// Row-major values.
    pub rows: Vec<Vec<f32>>,
    /// Hot fraction.
    #[serde(default)]
    pub split_ratio: f64,
    /// Placement of the cold rows.
    #[serde(default)]
    pub cold: Placement,
}

impl TableSpec {
    fn to_feature(&self, groups: &[DeviceGroup]) -> Result<Feature> {
        let dim = self.rows.first().map_or(0, Vec::len);
        if let Some(bad) = self.rows.iter().find(|r| r.len() != dim) {
            return Err(Error::DimensionMismatch {
                expected: dim,
                actual: bad.len(),
            });
        }
        let flat: Vec<f32> = self.rows.iter().flatten().copied().collect();
        let data = Array2::from_shape_vec((self.rows.len(), dim), flat)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let id2idx = match &self.ids {
            Some(ids) => {
                if ids.len() != self.rows.len() {
                    return Err(Error::InvalidConfig(format!(
                        "{} ids for {} feature rows",
                        ids.len(),
                        self.rows.len()
                    )));
                }
                Id2Idx::from_ids(ids)?
            }
            None => Id2Idx::identity(self.rows.len()),
        };
        Feature::builder(data, id2idx)
            .split_ratio(self.split_ratio)
            .device_groups(groups.to_vec())
            .cold_placement(self.cold)
            .build()
    }
}

/// Edge features of one edge type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeTableSpec {
    /// Edge type.
    pub edge_type: EdgeType,
    /// Table keyed by edge ID.
    #[serde(flatten)]
    pub table: TableSpec,
}

/// A heterogeneous graph dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    /// Declared node counts (inferred when absent).
    #[serde(default)]
    pub num_nodes: BTreeMap<NodeType, usize>,
    /// Edge lists.
    pub edges: Vec<EdgeSpec>,
    /// Node feature tables.
    #[serde(default)]
    pub node_features: BTreeMap<NodeType, TableSpec>,
    /// Edge feature tables.
    #[serde(default)]
    pub edge_features: Vec<EdgeTableSpec>,
    /// Node labels indexed by GlobalID.
    #[serde(default)]
    pub node_labels: BTreeMap<NodeType, Vec<i64>>,
}

impl GraphSpec {
    /// Load from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let spec: Self = serde_json::from_str(&text)?;
        info!(
            path = %path.as_ref().display(),
            edge_types = spec.edges.len(),
            "loaded graph spec"
        );
        Ok(spec)
    }

    /// Write as JSON.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    /// Build the CSR topologies.
    pub fn build_graph(&self) -> Result<HeteroGraph> {
        let mut builder = HeteroGraph::builder();
        for (ntype, &n) in &self.num_nodes {
            builder = builder.num_nodes(ntype.clone(), n);
        }
        for edge in &self.edges {
            let topo = CsrTopology::from_edge_index(&edge.rows, &edge.cols, edge.edge_ids.as_deref())?
                .with_placement(edge.placement);
            builder = builder.topology(edge.edge_type.clone(), topo);
        }
        builder.build()
    }

    /// Build the feature tables, replicating hot rows onto `groups`.
    pub fn build_features(&self, groups: &[DeviceGroup]) -> Result<FeatureStore> {
        let mut store = FeatureStore::new();
        for (ntype, table) in &self.node_features {
            store = store.with_node(ntype.clone(), table.to_feature(groups)?);
        }
        for edge in &self.edge_features {
            store = store.with_edge(edge.edge_type.clone(), edge.table.to_feature(groups)?);
        }
        Ok(store)
    }
}

/// The reference ring dataset.
///
/// `num_nodes` users and items; user `v` links to items `v+1 .. v+degree`
/// (`u2i`), item `v` links to items `v+2 .. v+degree+1` (`i2i`), all modulo
/// `num_nodes`. Edge `k` of node `v` has ID `v * degree + k`. Every feature
/// row is filled with its own GlobalID and labels equal IDs, which makes
/// alignment easy to check.
pub fn ring(num_nodes: usize, degree: usize, dim: usize) -> GraphSpec {
    let ring_edges = |offset: usize| {
        let mut rows = Vec::with_capacity(num_nodes * degree);
        let mut cols = Vec::with_capacity(num_nodes * degree);
        let mut eids = Vec::with_capacity(num_nodes * degree);
        for v in 0..num_nodes {
            for k in 0..degree {
                rows.push(v as GlobalId);
                cols.push(((v + k + offset) % num_nodes) as GlobalId);
                eids.push((v * degree + k) as GlobalId);
            }
        }
        (rows, cols, eids)
    };
    let table = |n: usize| TableSpec {
        ids: None,
        rows: (0..n).map(|i| vec![i as f32; dim]).collect(),
        split_ratio: 0.2,
        cold: Placement::ZeroCopy,
    };

    let u2i = EdgeType::new("user", "u2i", "item");
    let i2i = EdgeType::new("item", "i2i", "item");
    let (u_rows, u_cols, u_eids) = ring_edges(1);
    let (i_rows, i_cols, i_eids) = ring_edges(2);

    GraphSpec {
        num_nodes: [("user".into(), num_nodes), ("item".into(), num_nodes)]
            .into_iter()
            .collect(),
        edges: vec![
            EdgeSpec {
                edge_type: u2i.clone(),
                rows: u_rows,
                cols: u_cols,
                edge_ids: Some(u_eids),
                placement: Placement::ZeroCopy,
            },
            EdgeSpec {
                edge_type: i2i.clone(),
                rows: i_rows,
                cols: i_cols,
                edge_ids: Some(i_eids),
                placement: Placement::ZeroCopy,
            },
        ],
        node_features: [("user".into(), table(num_nodes)), ("item".into(), table(num_nodes))]
            .into_iter()
            .collect(),
        edge_features: vec![
            EdgeTableSpec {
                edge_type: u2i,
                table: table(num_nodes * degree),
            },
            EdgeTableSpec {
                edge_type: i2i,
                table: table(num_nodes * degree),
            },
        ],
        node_labels: [
            ("user".into(), (0..num_nodes as i64).collect()),
            ("item".into(), (0..num_nodes as i64).collect()),
        ]
        .into_iter()
        .collect(),
    }
}
