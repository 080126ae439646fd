// Allow minor clippy style warnings at crate level
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]

//! Heterogeneous neighbor sampling for mini-batch GNN training.
//!
//! Builds small connected subgraphs around seed nodes or seed edges of a
//! [`HeteroGraph`](fanout_core::HeteroGraph), optionally with negative
//! examples for link prediction, and resolves their features from a
//! [`FeatureStore`](fanout_core::FeatureStore).
//!
//! ```text
//! seeds -> NeighborSampler -> SamplingOutput -> BatchAssembler -> Batch
//!            |  (hop by hop over CSR topologies)     |  (async feature lookups)
//!            +-- negatives folded into the seeds      +-- hot replica / cold backing
//! ```
//!
//! # Output
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `node[t]` | GlobalIDs of node type `t`, position = LocalIndex |
//! | `edges[e]` | `row`/`col` LocalIndex arrays and optional edge GlobalIDs |
//! | `metadata` | `edge_label_index` + `edge_label`, or triplet indices |
//!
//! # Determinism
//!
//! With the same graph, config and seed, the output is identical whether a
//! hop fans out on one thread or on the rayon pool.

mod arena;
pub mod batch;
pub mod config;
pub mod input;
pub mod loader;
pub mod negative;
pub mod neighbor;
pub mod output;
mod rng;

pub use batch::{Batch, BatchAssembler};
pub use config::{
    EdgeLayout, LoaderConfig, NegativeMode, NegativeSampling, NumNeighbors, SamplerConfig,
};
pub use input::{EdgeSamplerInput, NodeSamplerInput, SamplerInput};
pub use loader::{BatchPipeline, LinkLoader, Loader, NodeLoader};
pub use negative::{NegativeSampler, NegativeStats};
pub use neighbor::NeighborSampler;
pub use output::{EdgeIndex, EdgeLabelIndex, Metadata, SamplingOutput};

pub use fanout_core::{Error, Result};
