// Allow minor clippy style warnings at crate level
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::uninlined_format_args)]

//! Topology and feature stores for heterogeneous mini-batch sampling.
//!
//! This crate holds the read-only data a sampler works against:
//!
//! - [`CsrTopology`] - compressed adjacency of one edge type
//! - [`HeteroGraph`] - registry of topologies keyed by [`EdgeType`]
//! - [`Feature`] - a feature table split into hot (replicated per
//!   [`DeviceGroup`]) and cold rows
//! - [`FeatureStore`] - registry of feature tables keyed by [`EntityType`]
//! - [`GraphSpec`] - JSON dataset format and the reference ring dataset
//!
//! # IDs
//!
//! | Name | Type | Scope |
//! |------|------|-------|
//! | GlobalID | [`GlobalId`] | Stable within a node type or edge type namespace |
//! | LocalIndex | [`LocalIndex`] | Position inside one sampling result |
//!
//! # Placement
//!
//! Topologies and feature backings carry a [`Placement`] (resident,
//! zero-copy, partitioned). It affects latency only; every placement
//! answers the same queries with the same results.
//!
//! # Concurrency
//!
//! Everything here is immutable after construction and `Send + Sync`, so a
//! single `Arc<HeteroGraph>` / `Arc<FeatureStore>` serves any number of
//! concurrent requests without locking.
//!
//! # Example
//!
//! ```rust
//! use fanout_core::{dataset, EdgeType};
//!
//! let graph = dataset::ring(40, 2, 8).build_graph().unwrap();
//! let u2i = EdgeType::new("user", "u2i", "item");
//!
//! let neighbors = graph.neighbors(&u2i, 3).unwrap();
//! assert_eq!(neighbors.dst, &[4, 5]);
//! assert_eq!(neighbors.edge_ids, &[6, 7]);
//! ```

pub mod dataset;
mod error;
pub mod feature;
pub mod hetero;
mod id2idx;
pub mod placement;
pub mod topology;

pub use dataset::GraphSpec;
pub use error::{Error, Result};
pub use feature::{EntityType, Feature, FeatureStore, RowSource};
pub use hetero::{EdgeType, HeteroGraph, HeteroGraphStats, NodeType};
pub use id2idx::Id2Idx;
pub use placement::{DeviceGroup, Placement};
pub use topology::{CsrTopology, Neighbors};

/// Persistent ID of a node or edge within its type's namespace.
pub type GlobalId = u64;

/// Position of an entity within one sampling result's per-type sequence.
pub type LocalIndex = usize;
