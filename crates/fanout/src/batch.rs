//! Feature-resolved batches.
//!
//! The assembler turns a [`SamplingOutput`] into a [`Batch`]: node features
//! aligned with every node ID sequence, edge features aligned with every
//! `edge` array, and node labels. All table lookups of one batch run
//! concurrently under a single request deadline; on expiry the whole batch
//! fails and no partially filled matrix is returned.

use futures::future::try_join_all;
use ndarray::Array2;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use fanout_core::{
    EdgeType, EntityType, Error, FeatureStore, GlobalId, NodeType, Result,
};

use crate::output::{EdgeIndex, Metadata, SamplingOutput};

/// A sampled subgraph with its features, handed to the training loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// GlobalIDs per node type; position = LocalIndex.
    pub node: BTreeMap<NodeType, Vec<GlobalId>>,
    /// Sampled edges per output edge type.
    pub edges: BTreeMap<EdgeType, EdgeIndex>,
    /// Node features, row `i` = node `i` of the type.
    pub x: BTreeMap<NodeType, Array2<f32>>,
    /// Edge features, row `k` = edge `k` of the output edge type.
    pub edge_attr: BTreeMap<EdgeType, Array2<f32>>,
    /// Node labels aligned like `x`.
    pub y: BTreeMap<NodeType, Vec<i64>>,
    pub num_sampled_nodes: BTreeMap<NodeType, Vec<usize>>,
    pub num_sampled_edges: BTreeMap<EdgeType, Vec<usize>>,
    pub metadata: Metadata,
}

/// Resolves features and labels for sampling outputs.
#[derive(Debug, Clone, Default)]
pub struct BatchAssembler {
    features: Option<Arc<FeatureStore>>,
    labels: Arc<BTreeMap<NodeType, Vec<i64>>>,
    device: usize,
    timeout: Option<Duration>,
}

impl BatchAssembler {
    /// Assembler without features or labels.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_features(mut self, features: Arc<FeatureStore>) -> Self {
        self.features = Some(features);
        self
    }

    /// Labels per node type, indexed by GlobalID.
    pub fn with_labels(mut self, labels: BTreeMap<NodeType, Vec<i64>>) -> Self {
        self.labels = Arc::new(labels);
        self
    }

    /// Device whose hot replicas serve the lookups.
    pub fn with_device(mut self, device: usize) -> Self {
        self.device = device;
        self
    }

    /// Deadline for all feature lookups of one batch.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn device(&self) -> usize {
        self.device
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Resolve features and labels for `out`.
    ///
    /// Node types and edge types without a registered table get no entry in
    /// `x` / `edge_attr`.
    pub async fn assemble(&self, out: SamplingOutput) -> Result<Batch> {
        let (x, edge_attr) = match &self.features {
            Some(store) => self.resolve(store, &out).await?,
            None => (BTreeMap::new(), BTreeMap::new()),
        };
        let y = self.gather_labels(&out.node)?;

        Ok(Batch {
            node: out.node,
            edges: out.edges,
            x,
            edge_attr,
            y,
            num_sampled_nodes: out.num_sampled_nodes,
            num_sampled_edges: out.num_sampled_edges,
            metadata: out.metadata,
        })
    }

    async fn resolve(
        &self,
        store: &FeatureStore,
        out: &SamplingOutput,
    ) -> Result<(BTreeMap<NodeType, Array2<f32>>, BTreeMap<EdgeType, Array2<f32>>)> {
        let node_requests: Vec<(NodeType, EntityType, &[GlobalId])> = out
            .node
            .iter()
            .map(|(t, ids)| (t.clone(), EntityType::Node(t.clone()), ids.as_slice()))
            .filter(|(_, entity, _)| store.contains(entity))
            .collect();
        let edge_requests: Vec<(EdgeType, EntityType, &[GlobalId])> = out
            .edges
            .iter()
            .filter_map(|(key, index)| {
                let ids = index.edge.as_deref()?;
                Some((key.clone(), EntityType::Edge(index.origin.clone()), ids))
            })
            .filter(|(_, entity, _)| store.contains(entity))
            .collect();

        debug!(
            node_tables = node_requests.len(),
            edge_tables = edge_requests.len(),
            device = self.device,
            "resolving batch features"
        );

        let device = self.device;
        let lookups = futures::future::try_join(
            try_join_all(
                node_requests
                    .iter()
                    .map(|(_, entity, ids)| store.lookup(entity, ids, device)),
            ),
            try_join_all(
                edge_requests
                    .iter()
                    .map(|(_, entity, ids)| store.lookup(entity, ids, device)),
            ),
        );

        let (node_rows, edge_rows) = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, lookups).await {
                Ok(res) => res?,
                Err(_) => {
                    warn!(?timeout, "batch feature lookup timed out");
                    return Err(Error::FeatureLookupTimeout {
                        entity: "batch".to_string(),
                        timeout,
                    });
                }
            },
            None => lookups.await?,
        };

        let x = node_requests
            .into_iter()
            .map(|(t, _, _)| t)
            .zip(node_rows)
            .collect();
        let edge_attr = edge_requests
            .into_iter()
            .map(|(t, _, _)| t)
            .zip(edge_rows)
            .collect();
        Ok((x, edge_attr))
    }

    fn gather_labels(
        &self,
        nodes: &BTreeMap<NodeType, Vec<GlobalId>>,
    ) -> Result<BTreeMap<NodeType, Vec<i64>>> {
        let mut y = BTreeMap::new();
        for (ntype, ids) in nodes {
            let Some(labels) = self.labels.get(ntype) else {
                continue;
            };
            let gathered = ids
                .iter()
                .map(|&id| {
                    labels.get(id as usize).copied().ok_or_else(|| Error::UnknownEntity {
                        entity: format!("labels {ntype}"),
                        id,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            y.insert(ntype.clone(), gathered);
        }
        Ok(y)
    }
}
