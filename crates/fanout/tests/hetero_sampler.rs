//! Sampling scenarios on the ring dataset.
//!
//! 40 users and 40 items; user `v` links to items `v+1, v+2` (`u2i`, edge
//! IDs `2v, 2v+1`) and item `v` links to items `v+2, v+3` (`i2i`).

use std::collections::BTreeSet;
use std::sync::Arc;

use fanout::{
    EdgeLayout, EdgeSamplerInput, Metadata, NegativeSampling, NeighborSampler, NodeSamplerInput,
    SamplerConfig,
};
use fanout_core::{dataset, EdgeType, HeteroGraph, NodeType};

const N: u64 = 40;

fn graph() -> Arc<HeteroGraph> {
    Arc::new(dataset::ring(N as usize, 2, 4).build_graph().unwrap())
}

fn u2i() -> EdgeType {
    EdgeType::new("user", "u2i", "item")
}

fn i2i() -> EdgeType {
    EdgeType::new("item", "i2i", "item")
}

fn user() -> NodeType {
    NodeType::new("user")
}

fn item() -> NodeType {
    NodeType::new("item")
}

const USER_SEEDS: [u64; 8] = [1, 5, 9, 13, 17, 21, 25, 29];
const EDGE_ROWS: [u64; 9] = [1, 3, 4, 7, 12, 18, 27, 32, 38];
const EDGE_COLS: [u64; 9] = [2, 5, 5, 8, 13, 20, 29, 33, 0];

fn is_u2i(user: u64, item: u64) -> bool {
    item == (user + 1) % N || item == (user + 2) % N
}

fn is_i2i(src: u64, dst: u64) -> bool {
    dst == (src + 2) % N || dst == (src + 3) % N
}

#[test]
fn node_seeds_traversal_layout() {
    let config = SamplerConfig::new(vec![2, 1]).with_edge(true);
    let sampler = NeighborSampler::new(graph(), config).unwrap();
    let out = sampler
        .sample_from_nodes(&NodeSamplerInput::new("user", USER_SEEDS.to_vec()))
        .unwrap();

    assert_eq!(out.nodes(&user()), &USER_SEEDS);

    let u2i_pairs = out.global_pairs(&u2i());
    // degree 2 fits budget 2: every seed keeps both items
    assert_eq!(u2i_pairs.len(), 16);
    assert!(u2i_pairs.iter().all(|&(u, i)| is_u2i(u, i)));

    let i2i_pairs = out.global_pairs(&i2i());
    assert!(!i2i_pairs.is_empty());
    assert!(i2i_pairs.iter().all(|&(s, d)| is_i2i(s, d)));

    let eids: BTreeSet<u64> = out.edges[&u2i()].edge.clone().unwrap().into_iter().collect();
    let expected: BTreeSet<u64> = USER_SEEDS.iter().flat_map(|&u| [2 * u, 2 * u + 1]).collect();
    assert_eq!(eids, expected);

    // no edge type leads back to users
    assert_eq!(out.nodes(&user()).len(), USER_SEEDS.len());
}

#[test]
fn node_seeds_message_passing_layout() {
    let config = SamplerConfig::new(vec![2, 1])
        .with_edge(true)
        .with_layout(EdgeLayout::MessagePassing);
    let sampler = NeighborSampler::new(graph(), config).unwrap();
    let out = sampler
        .sample_from_nodes(&NodeSamplerInput::new("user", USER_SEEDS.to_vec()))
        .unwrap();

    let rev_u2i = EdgeType::new("item", "rev_u2i", "user");
    assert_eq!(out.edges.keys().cloned().collect::<Vec<_>>(), vec![i2i(), rev_u2i.clone()]);

    // row = sampled neighbor, col = frontier node
    for (nbr, node) in out.global_pairs(&i2i()) {
        assert!(is_i2i(node, nbr));
    }
    for (it, us) in out.global_pairs(&rev_u2i) {
        assert!(is_u2i(us, it));
    }

    let eids: BTreeSet<u64> = out.edges[&rev_u2i].edge.clone().unwrap().into_iter().collect();
    let expected: BTreeSet<u64> = USER_SEEDS.iter().flat_map(|&u| [2 * u, 2 * u + 1]).collect();
    assert_eq!(eids, expected);
}

#[test]
fn hop_counts_add_up() {
    let sampler = NeighborSampler::new(graph(), SamplerConfig::new(vec![2, 1])).unwrap();
    let out = sampler
        .sample_from_nodes(&NodeSamplerInput::new("user", USER_SEEDS.to_vec()))
        .unwrap();

    for (ntype, counts) in &out.num_sampled_nodes {
        assert_eq!(counts.len(), 3);
        assert_eq!(counts.iter().sum::<usize>(), out.nodes(ntype).len());
    }
    for (etype, counts) in &out.num_sampled_edges {
        assert_eq!(counts.len(), 2);
        assert_eq!(counts.iter().sum::<usize>(), out.edges[etype].len());
    }
    assert_eq!(out.num_sampled_nodes[&user()], vec![8, 0, 0]);
    assert_eq!(out.num_sampled_edges[&u2i()], vec![16, 0]);
    // budget 1 per new item at hop 2
    let new_items = out.num_sampled_nodes[&item()][1];
    assert_eq!(out.num_sampled_edges[&i2i()], vec![0, new_items]);
}

#[test]
fn binary_negatives() {
    let config = SamplerConfig::new(vec![2, 1]).with_neg(true);
    let sampler = NeighborSampler::new(graph(), config).unwrap();
    let input = EdgeSamplerInput::new(u2i(), EDGE_ROWS.to_vec(), EDGE_COLS.to_vec())
        .with_neg_sampling(NegativeSampling::binary());
    let out = sampler.sample_from_edges(&input).unwrap();

    let Metadata::Link {
        input_type,
        edge_label_index,
        edge_label,
    } = &out.metadata
    else {
        panic!("binary mode yields link metadata");
    };
    assert_eq!(input_type, &u2i());
    assert_eq!(edge_label_index.len(), 18);

    let mut expected_label = vec![1.0f32; 9];
    expected_label.extend([0.0f32; 9]);
    assert_eq!(edge_label.as_ref().unwrap(), &expected_label);

    let users = out.nodes(&user());
    let items = out.nodes(&item());
    let pairs: Vec<(u64, u64)> = edge_label_index
        .row
        .iter()
        .zip(&edge_label_index.col)
        .map(|(&r, &c)| (users[r], items[c]))
        .collect();

    let seeds: Vec<(u64, u64)> = EDGE_ROWS.iter().copied().zip(EDGE_COLS).collect();
    assert_eq!(&pairs[..9], &seeds[..]);
    for &(u, i) in &pairs[9..] {
        assert!(!is_u2i(u, i), "negative ({u}, {i}) is a true edge");
    }
    // negatives keep the positive row
    assert_eq!(&edge_label_index.row[..9], &edge_label_index.row[9..]);
}

#[test]
fn triplet_negatives() {
    let config = SamplerConfig::new(vec![2, 1]).with_neg(true);
    let sampler = NeighborSampler::new(graph(), config).unwrap();
    let input = EdgeSamplerInput::new(u2i(), EDGE_ROWS.to_vec(), EDGE_COLS.to_vec())
        .with_neg_sampling(NegativeSampling::triplet(2));
    let out = sampler.sample_from_edges(&input).unwrap();

    let Metadata::Triplet {
        src_index,
        dst_pos_index,
        dst_neg_index,
        ..
    } = &out.metadata
    else {
        panic!("triplet mode yields triplet metadata");
    };
    assert_eq!(dst_neg_index.dim(), (9, 2));

    let users = out.nodes(&user());
    let items = out.nodes(&item());
    let src: Vec<u64> = src_index.iter().map(|&i| users[i]).collect();
    let pos: Vec<u64> = dst_pos_index.iter().map(|&i| items[i]).collect();
    assert_eq!(src, EDGE_ROWS);
    assert_eq!(pos, EDGE_COLS);

    for (k, row) in dst_neg_index.rows().into_iter().enumerate() {
        for &neg in row {
            assert!(!is_u2i(EDGE_ROWS[k], items[neg]));
        }
    }
}

#[test]
fn negatives_share_the_node_space() {
    let config = SamplerConfig::new(vec![1]).with_neg(true);
    let sampler = NeighborSampler::new(graph(), config).unwrap();
    let input = EdgeSamplerInput::new(u2i(), vec![0], vec![1])
        .with_neg_sampling(NegativeSampling::triplet(3));
    let out = sampler.sample_from_edges(&input).unwrap();

    let Metadata::Triplet { dst_neg_index, .. } = &out.metadata else {
        panic!("triplet metadata");
    };
    let items = out.nodes(&item());
    // seed item first, then the negatives in draw order
    assert_eq!(items[0], 1);
    for &neg in dst_neg_index.iter() {
        assert!(neg < items.len());
    }
    let unique: BTreeSet<u64> = items.iter().copied().collect();
    assert_eq!(unique.len(), items.len());
}

#[test]
fn same_seed_same_output() {
    let config = SamplerConfig::new(vec![1, 1]).with_edge(true);
    let sampler = NeighborSampler::new(graph(), config).unwrap();
    let input = NodeSamplerInput::new("item", (0..N).collect());

    let a = sampler.sample_from_nodes_seeded(&input, 5).unwrap();
    let b = sampler.sample_from_nodes_seeded(&input, 5).unwrap();
    assert_eq!(a, b);
}

#[test]
fn replacement_draws_full_budget() {
    let config = SamplerConfig::new(vec![5]).with_replace(true);
    let sampler = NeighborSampler::new(graph(), config).unwrap();
    let out = sampler
        .sample_from_nodes(&NodeSamplerInput::new("user", vec![3]))
        .unwrap();
    // 5 draws over 2 neighbors: duplicates allowed, nodes still deduped
    assert_eq!(out.edges[&u2i()].len(), 5);
    assert!(out.nodes(&item()).len() <= 2);
}
