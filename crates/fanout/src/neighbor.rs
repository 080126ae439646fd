//! Multi-hop heterogeneous neighbor sampling.
//!
//! The frontier engine expands seeds hop by hop over every edge type whose
//! source type is present in the frontier:
//!
//! 1. Each frontier node fetches its neighbor list and keeps all of it when
//!    its degree fits the hop budget, otherwise a uniform subset of `budget`
//!    neighbors drawn without replacement.
//! 2. Destinations are claimed in the request arena. Unseen IDs get the next
//!    LocalIndex of their type and join the next frontier; seen IDs reuse
//!    their LocalIndex and are not expanded again.
//! 3. Every traversed edge is recorded by LocalIndex plus its edge GlobalID.
//!
//! Fan-out for a large frontier runs on the rayon pool. Each node draws from
//! its own derived stream, and claiming stays on the calling thread in
//! frontier order, so the result does not depend on the thread count.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use fanout::{NeighborSampler, NodeSamplerInput, SamplerConfig};
//! use fanout_core::{dataset, EdgeType};
//!
//! let graph = Arc::new(dataset::ring(40, 2, 8).build_graph()?);
//! let sampler = NeighborSampler::new(graph, SamplerConfig::new(vec![2, 1]))?;
//!
//! let out = sampler.sample_from_nodes(&NodeSamplerInput::new("user", vec![1, 5]))?;
//! assert_eq!(&out.nodes(&"user".into())[..2], &[1, 5]);
//!
//! let u2i = EdgeType::new("user", "u2i", "item");
//! for (user, item) in out.global_pairs(&u2i) {
//!     assert!(item == (user + 1) % 40 || item == (user + 2) % 40);
//! }
//! # Ok::<(), fanout_core::Error>(())
//! ```

use ndarray::Array2;
use rand::seq::index;
use rand::Rng;
use rayon::prelude::*;
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use fanout_core::{
    CsrTopology, EdgeType, Error, GlobalId, HeteroGraph, LocalIndex, Neighbors, NodeType, Result,
};

use crate::arena::Arena;
use crate::config::{EdgeLayout, NegativeMode, SamplerConfig};
use crate::input::{EdgeSamplerInput, NodeSamplerInput, SamplerInput};
use crate::negative::{NegativeSampler, NegativeStats};
use crate::output::{EdgeIndex, EdgeLabelIndex, Metadata, SamplingOutput};
use crate::rng;

/// `(dst, edge_id)` pairs picked for one frontier node.
type Picks = SmallVec<[(GlobalId, GlobalId); 16]>;

const NEGATIVE_STREAM: u64 = u64::MAX;

/// Heterogeneous neighbor sampler over a shared read-only graph.
///
/// Cheap to share: wrap in an `Arc` and call from any number of threads.
#[derive(Debug)]
pub struct NeighborSampler {
    graph: Arc<HeteroGraph>,
    config: SamplerConfig,
    edge_ordinals: HashMap<EdgeType, u64>,
    negative_stats: NegativeStats,
}

impl NeighborSampler {
    /// Validate `config` against `graph`.
    pub fn new(graph: Arc<HeteroGraph>, config: SamplerConfig) -> Result<Self> {
        config.validate()?;
        for etype in config.num_neighbors.edge_types() {
            graph.topology(etype)?;
        }
        let edge_ordinals = graph
            .edge_types()
            .enumerate()
            .map(|(i, e)| (e.clone(), i as u64))
            .collect();
        Ok(Self {
            graph,
            config,
            edge_ordinals,
            negative_stats: NegativeStats::default(),
        })
    }

    pub fn graph(&self) -> &Arc<HeteroGraph> {
        &self.graph
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Negative sampling counters across all requests.
    pub fn negative_stats(&self) -> &NegativeStats {
        &self.negative_stats
    }

    /// Sample around either kind of seed set with the configured seed.
    pub fn sample(&self, input: &SamplerInput) -> Result<SamplingOutput> {
        self.sample_seeded(input, self.config.seed)
    }

    /// Sample around either kind of seed set with an explicit seed.
    pub fn sample_seeded(&self, input: &SamplerInput, seed: u64) -> Result<SamplingOutput> {
        match input {
            SamplerInput::Node(input) => self.sample_from_nodes_seeded(input, seed),
            SamplerInput::Edge(input) => self.sample_from_edges_seeded(input, seed),
        }
    }

    /// Sample the neighborhood of seed nodes.
    pub fn sample_from_nodes(&self, input: &NodeSamplerInput) -> Result<SamplingOutput> {
        self.sample_from_nodes_seeded(input, self.config.seed)
    }

    pub fn sample_from_nodes_seeded(
        &self,
        input: &NodeSamplerInput,
        seed: u64,
    ) -> Result<SamplingOutput> {
        let ntype = &input.input_type;
        if !self.graph.has_node_type(ntype) {
            return Err(Error::UnknownNodeType(ntype.to_string()));
        }
        for &id in &input.node {
            self.graph.check_node(ntype, id)?;
        }

        let mut exp = Expansion::new(self.config.layout, self.config.with_edge);
        for &id in &input.node {
            exp.seed(ntype, id);
        }
        self.expand(&mut exp, seed)?;

        let out = exp.finish(self.num_hops(), Metadata::Node);
        debug!(
            input = %ntype,
            seeds = input.len(),
            nodes = out.total_nodes(),
            edges = out.total_edges(),
            "sampled from nodes"
        );
        Ok(out)
    }

    /// Sample the neighborhood of seed edges, manufacturing negatives if the
    /// input asks for them.
    pub fn sample_from_edges(&self, input: &EdgeSamplerInput) -> Result<SamplingOutput> {
        self.sample_from_edges_seeded(input, self.config.seed)
    }

    pub fn sample_from_edges_seeded(
        &self,
        input: &EdgeSamplerInput,
        seed: u64,
    ) -> Result<SamplingOutput> {
        input.validate()?;
        let etype = &input.input_type;
        let topo = self.graph.topology(etype)?;
        for &r in &input.row {
            self.graph.check_node(&etype.src_type, r)?;
        }
        for &c in &input.col {
            self.graph.check_node(&etype.dst_type, c)?;
        }
        if input.neg_sampling.is_some() && !self.config.with_neg {
            return Err(Error::InvalidConfig(
                "negative sampling requested but with_neg is disabled".to_string(),
            ));
        }

        let negatives = match &input.neg_sampling {
            Some(neg) => {
                let num_dst = self.graph.num_nodes(&etype.dst_type)?;
                let sampler = NegativeSampler::new(
                    topo,
                    num_dst,
                    self.config.negative_attempts(neg),
                    &self.negative_stats,
                )?;
                let mut rng = rng::stream(seed, &[NEGATIVE_STREAM]);
                match neg.mode {
                    NegativeMode::Binary => sampler.binary(&input.row, &input.col, &mut rng),
                    NegativeMode::Triplet => {
                        sampler.triplet(&input.row, &input.col, neg.amount, &mut rng)
                    }
                }
            }
            None => Vec::new(),
        };

        // Sources first, then positive destinations, then negatives.
        let mut exp = Expansion::new(self.config.layout, self.config.with_edge);
        for &r in &input.row {
            exp.seed(&etype.src_type, r);
        }
        for &c in input.col.iter().chain(&negatives) {
            exp.seed(&etype.dst_type, c);
        }
        self.expand(&mut exp, seed)?;

        let src = exp.locals(&etype.src_type, &input.row)?;
        let dst_pos = exp.locals(&etype.dst_type, &input.col)?;
        let dst_neg = exp.locals(&etype.dst_type, &negatives)?;
        let metadata = match input.neg_sampling {
            None => Metadata::Link {
                input_type: etype.clone(),
                edge_label_index: EdgeLabelIndex {
                    row: src,
                    col: dst_pos,
                },
                edge_label: input.label.clone(),
            },
            Some(neg) if neg.mode == NegativeMode::Binary => {
                let p = src.len();
                let mut label = vec![1.0f32; p];
                label.resize(2 * p, 0.0);
                Metadata::Link {
                    input_type: etype.clone(),
                    edge_label_index: EdgeLabelIndex {
                        row: src.iter().chain(&src).copied().collect(),
                        col: dst_pos.into_iter().chain(dst_neg).collect(),
                    },
                    edge_label: Some(label),
                }
            }
            Some(neg) => {
                let dst_neg_index = Array2::from_shape_vec((src.len(), neg.amount), dst_neg)
                    .map_err(|e| Error::InvalidInput(e.to_string()))?;
                Metadata::Triplet {
                    input_type: etype.clone(),
                    src_index: src,
                    dst_pos_index: dst_pos,
                    dst_neg_index,
                    edge_label: input.label.clone(),
                }
            }
        };

        let out = exp.finish(self.num_hops(), metadata);
        debug!(
            input = %etype,
            seeds = input.len(),
            negatives = negatives.len(),
            nodes = out.total_nodes(),
            edges = out.total_edges(),
            "sampled from edges"
        );
        Ok(out)
    }

    fn num_hops(&self) -> usize {
        self.config.num_neighbors.num_hops()
    }

    fn expand(&self, exp: &mut Expansion, seed: u64) -> Result<()> {
        exp.node_sizes.push(exp.arena.sizes());
        for hop in 0..self.num_hops() {
            if exp.frontier.is_empty() {
                break;
            }
            let frontier = std::mem::take(&mut exp.frontier);
            let mut counts: BTreeMap<EdgeType, usize> = BTreeMap::new();

            for (ntype, nodes) in &frontier {
                for (etype, topo) in self.graph.edge_types_from(ntype) {
                    let budget = self.config.num_neighbors.budget(etype, hop);
                    if budget == 0 {
                        continue;
                    }
                    let ordinal = self.edge_ordinals.get(etype).copied().unwrap_or_default();
                    let stream = [seed, hop as u64, ordinal];
                    let picks = self.fan_out(etype, topo, nodes, budget, stream)?;
                    let (key, n) = exp.record(ntype, etype, nodes, picks);
                    *counts.entry(key).or_insert(0) += n;
                }
            }

            debug!(
                hop,
                frontier = frontier.values().map(Vec::len).sum::<usize>(),
                next = exp.frontier.values().map(Vec::len).sum::<usize>(),
                "hop expanded"
            );
            exp.edge_counts.push(counts);
            exp.node_sizes.push(exp.arena.sizes());
        }
        Ok(())
    }

    /// Pick neighbors of every frontier node.
    fn fan_out(
        &self,
        etype: &EdgeType,
        topo: &CsrTopology,
        nodes: &[GlobalId],
        budget: usize,
        [seed, hop, ordinal]: [u64; 3],
    ) -> Result<Vec<Picks>> {
        let replace = self.config.replace;
        let pick = |&node: &GlobalId| -> Result<Picks> {
            let neighbors = topo.neighbors(node).ok_or_else(|| Error::UnknownNodeId {
                context: etype.to_string(),
                id: node,
                num_nodes: topo.num_nodes(),
            })?;
            let mut rng = rng::stream(seed, &[hop, ordinal, node]);
            Ok(choose(neighbors, budget, replace, &mut rng))
        };

        if nodes.len() >= self.config.parallel_threshold {
            nodes.par_iter().map(pick).collect()
        } else {
            nodes.iter().map(pick).collect()
        }
    }
}

/// Fan-out policy for one node.
fn choose<R: Rng>(neighbors: Neighbors<'_>, budget: usize, replace: bool, rng: &mut R) -> Picks {
    let degree = neighbors.len();
    if degree == 0 {
        Picks::new()
    } else if replace {
        (0..budget)
            .map(|_| neighbors.get(rng.gen_range(0..degree)))
            .collect()
    } else if degree <= budget {
        neighbors.iter().collect()
    } else {
        let mut picked = index::sample(rng, degree, budget).into_vec();
        picked.sort_unstable();
        picked.into_iter().map(|k| neighbors.get(k)).collect()
    }
}

/// State of one sampling call.
struct Expansion {
    layout: EdgeLayout,
    with_edge: bool,
    arena: Arena,
    frontier: BTreeMap<NodeType, Vec<GlobalId>>,
    edges: BTreeMap<EdgeType, EdgeIndex>,
    /// Arena sizes after seeding and after each hop.
    node_sizes: Vec<BTreeMap<NodeType, usize>>,
    /// Edges recorded per output key at each hop.
    edge_counts: Vec<BTreeMap<EdgeType, usize>>,
}

impl Expansion {
    fn new(layout: EdgeLayout, with_edge: bool) -> Self {
        Self {
            layout,
            with_edge,
            arena: Arena::default(),
            frontier: BTreeMap::new(),
            edges: BTreeMap::new(),
            node_sizes: Vec::new(),
            edge_counts: Vec::new(),
        }
    }

    fn seed(&mut self, ntype: &NodeType, id: GlobalId) {
        let (_, new) = self.arena.claim(ntype, id);
        if new {
            self.frontier.entry(ntype.clone()).or_default().push(id);
        }
    }

    fn locals(&self, ntype: &NodeType, ids: &[GlobalId]) -> Result<Vec<LocalIndex>> {
        ids.iter()
            .map(|&id| {
                self.arena.get(ntype, id).ok_or_else(|| Error::UnknownNodeId {
                    context: format!("sampled {ntype} nodes"),
                    id,
                    num_nodes: 0,
                })
            })
            .collect()
    }

    fn output_key(&self, etype: &EdgeType) -> EdgeType {
        match self.layout {
            EdgeLayout::MessagePassing if !etype.is_homogeneous() => etype.reverse(),
            _ => etype.clone(),
        }
    }

    /// Claim picked destinations and record the traversed edges.
    fn record(
        &mut self,
        src_type: &NodeType,
        etype: &EdgeType,
        nodes: &[GlobalId],
        picks: Vec<Picks>,
    ) -> (EdgeType, usize) {
        let key = self.output_key(etype);
        let with_edge = self.with_edge;
        let index = self
            .edges
            .entry(key.clone())
            .or_insert_with(|| EdgeIndex::new(etype.clone(), with_edge));

        let mut count = 0;
        for (&src, picked) in nodes.iter().zip(picks) {
            let Some(src_local) = self.arena.get(src_type, src) else {
                continue;
            };
            for (dst, eid) in picked {
                let (dst_local, new) = self.arena.claim(&etype.dst_type, dst);
                if new {
                    self.frontier
                        .entry(etype.dst_type.clone())
                        .or_default()
                        .push(dst);
                }
                match self.layout {
                    EdgeLayout::Traversal => index.push(src_local, dst_local, eid),
                    EdgeLayout::MessagePassing => index.push(dst_local, src_local, eid),
                }
                count += 1;
            }
        }
        (key, count)
    }

    fn finish(self, num_hops: usize, metadata: Metadata) -> SamplingOutput {
        let size_at = |step: usize, t: &NodeType| {
            self.node_sizes
                .get(step)
                .and_then(|s| s.get(t))
                .copied()
                .unwrap_or(0)
        };

        let node = self.arena.into_nodes();
        let num_sampled_nodes: BTreeMap<NodeType, Vec<usize>> = node
            .keys()
            .map(|t| {
                let counts: Vec<usize> = (0..=num_hops)
                    .map(|step| {
                        if step == 0 {
                            size_at(0, t)
                        } else if step < self.node_sizes.len() {
                            size_at(step, t) - size_at(step - 1, t)
                        } else {
                            0
                        }
                    })
                    .collect();
                (t.clone(), counts)
            })
            .collect();
        let num_sampled_edges: BTreeMap<EdgeType, Vec<usize>> = self
            .edges
            .keys()
            .map(|key| {
                let counts: Vec<usize> = (0..num_hops)
                    .map(|hop| {
                        self.edge_counts
                            .get(hop)
                            .and_then(|c| c.get(key))
                            .copied()
                            .unwrap_or(0)
                    })
                    .collect();
                (key.clone(), counts)
            })
            .collect();

        SamplingOutput {
            node,
            edges: self.edges,
            num_sampled_nodes,
            num_sampled_edges,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NegativeSampling, NumNeighbors};
    use fanout_core::dataset;

    fn ring_graph() -> Arc<HeteroGraph> {
        Arc::new(dataset::ring(40, 2, 4).build_graph().unwrap())
    }

    fn u2i() -> EdgeType {
        EdgeType::new("user", "u2i", "item")
    }

    fn i2i() -> EdgeType {
        EdgeType::new("item", "i2i", "item")
    }

    #[test]
    fn test_choose_policy() {
        let topo =
            CsrTopology::from_edge_index(&[0, 0, 0, 0, 0], &[1, 2, 3, 4, 5], None).unwrap();
        let n = topo.neighbors(0).unwrap();
        let mut r = rng::stream(1, &[]);

        assert_eq!(choose(n, 10, false, &mut r).len(), 5);
        let picked = choose(n, 3, false, &mut r);
        assert_eq!(picked.len(), 3);
        let mut dst: Vec<_> = picked.iter().map(|p| p.0).collect();
        dst.dedup();
        assert_eq!(dst.len(), 3, "without replacement picks are distinct");

        assert_eq!(choose(n, 9, true, &mut r).len(), 9);
        let empty = CsrTopology::from_edge_index(&[1], &[0], None).unwrap();
        assert!(choose(empty.neighbors(0).unwrap(), 3, true, &mut r).is_empty());
    }

    #[test]
    fn test_node_seeds_come_first_and_dedup() {
        let sampler = NeighborSampler::new(ring_graph(), SamplerConfig::new(vec![2, 2])).unwrap();
        let out = sampler
            .sample_from_nodes(&NodeSamplerInput::new("user", vec![3, 7, 3]))
            .unwrap();

        assert_eq!(out.nodes(&"user".into()), &[3, 7]);
        assert_eq!(out.num_sampled_nodes[&NodeType::new("user")], vec![2, 0, 0]);
        // users 3 and 7 reach items 4, 5, 8, 9
        assert_eq!(out.num_sampled_nodes[&NodeType::new("item")][1], 4);
        assert_eq!(out.num_sampled_edges[&u2i()], vec![4, 0]);

        let items = out.nodes(&"item".into());
        let mut sorted = items.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), items.len());
    }

    #[test]
    fn test_message_passing_layout() {
        let config = SamplerConfig::new(vec![2, 1])
            .with_layout(EdgeLayout::MessagePassing)
            .with_edge(true);
        let sampler = NeighborSampler::new(ring_graph(), config).unwrap();
        let out = sampler
            .sample_from_nodes(&NodeSamplerInput::new("user", vec![1, 5]))
            .unwrap();

        let rev = u2i().reverse();
        assert!(!out.edges.contains_key(&u2i()));
        assert_eq!(out.edges[&rev].origin, u2i());
        for (item, user) in out.global_pairs(&rev) {
            assert!(item == (user + 1) % 40 || item == (user + 2) % 40);
        }
        // same-type relation keeps its key, row is the sampled neighbor
        for (nbr, node) in out.global_pairs(&i2i()) {
            assert!(nbr == (node + 2) % 40 || nbr == (node + 3) % 40);
        }
    }

    #[test]
    fn test_zero_budget_skips_edge_type() {
        let fanout = NumNeighbors::PerEdgeType(vec![(u2i(), vec![2, 0]), (i2i(), vec![0, 2])]);
        let sampler = NeighborSampler::new(ring_graph(), SamplerConfig::new(fanout)).unwrap();
        let out = sampler
            .sample_from_nodes(&NodeSamplerInput::new("item", vec![0]))
            .unwrap();
        // i2i has budget 0 at hop 0, so items never expand
        assert_eq!(out.total_edges(), 0);
        assert_eq!(out.nodes(&"item".into()), &[0]);
    }

    #[test]
    fn test_unknown_edge_type_in_fanout() {
        let fanout = NumNeighbors::PerEdgeType(vec![(EdgeType::new("a", "b", "c"), vec![1])]);
        assert!(matches!(
            NeighborSampler::new(ring_graph(), SamplerConfig::new(fanout)),
            Err(Error::UnknownEdgeType(_))
        ));
    }

    #[test]
    fn test_seed_validation() {
        let sampler = NeighborSampler::new(ring_graph(), SamplerConfig::new(vec![1])).unwrap();
        assert!(matches!(
            sampler.sample_from_nodes(&NodeSamplerInput::new("user", vec![40])),
            Err(Error::UnknownNodeId { id: 40, .. })
        ));
        assert!(matches!(
            sampler.sample_from_nodes(&NodeSamplerInput::new("shop", vec![0])),
            Err(Error::UnknownNodeType(_))
        ));
        let neg = EdgeSamplerInput::new(u2i(), vec![1], vec![2])
            .with_neg_sampling(NegativeSampling::binary());
        assert!(matches!(
            sampler.sample_from_edges(&neg),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_binary_negatives_use_the_negative_stream() {
        let config = SamplerConfig::new(vec![1]).with_neg(true).with_seed(3);
        let sampler = NeighborSampler::new(ring_graph(), config).unwrap();
        let (rows, cols) = (vec![1, 7, 20], vec![2, 8, 21]);
        let input = EdgeSamplerInput::new(u2i(), rows.clone(), cols.clone())
            .with_neg_sampling(NegativeSampling::binary());
        let out = sampler.sample_from_edges(&input).unwrap();

        let graph = ring_graph();
        let stats = NegativeStats::default();
        let negatives = NegativeSampler::new(
            graph.topology(&u2i()).unwrap(),
            40,
            sampler.config().negative_attempts(&NegativeSampling::binary()),
            &stats,
        )
        .unwrap()
        .binary(&rows, &cols, &mut rng::stream(3, &[NEGATIVE_STREAM]));

        let Metadata::Link { edge_label_index, .. } = &out.metadata else {
            panic!("expected link metadata");
        };
        let items = out.nodes(&"item".into());
        let drawn: Vec<u64> = edge_label_index.col[3..].iter().map(|&c| items[c]).collect();
        assert_eq!(drawn, negatives);
        assert_eq!(sampler.negative_stats().drawn(), 3);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let seeds: Vec<u64> = (0..40).collect();
        let input = NodeSamplerInput::new("user", seeds);
        let base = SamplerConfig::new(vec![1, 1]).with_edge(true).with_seed(9);

        let seq = NeighborSampler::new(ring_graph(), base.clone().with_parallel_threshold(usize::MAX))
            .unwrap()
            .sample_from_nodes(&input)
            .unwrap();
        let par = NeighborSampler::new(ring_graph(), base.with_parallel_threshold(0))
            .unwrap()
            .sample_from_nodes(&input)
            .unwrap();
        assert_eq!(seq, par);
    }

    #[test]
    fn test_edge_input_without_negatives() {
        let sampler = NeighborSampler::new(ring_graph(), SamplerConfig::new(vec![1])).unwrap();
        let input = EdgeSamplerInput::new(u2i(), vec![4, 9], vec![5, 11]).with_label(vec![0.5, 2.0]);
        let out = sampler.sample_from_edges(&input).unwrap();

        let Metadata::Link {
            edge_label_index,
            edge_label,
            ..
        } = &out.metadata
        else {
            panic!("expected link metadata");
        };
        assert_eq!(edge_label.as_deref(), Some(&[0.5, 2.0][..]));
        let users = out.nodes(&"user".into());
        let items = out.nodes(&"item".into());
        let pairs: Vec<_> = edge_label_index
            .row
            .iter()
            .zip(&edge_label_index.col)
            .map(|(&r, &c)| (users[r], items[c]))
            .collect();
        assert_eq!(pairs, vec![(4, 5), (9, 11)]);
    }
}
