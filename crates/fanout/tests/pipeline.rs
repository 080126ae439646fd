//! Feature-resolved batches through the async pipeline.

use async_trait::async_trait;
use ndarray::Array2;
use std::sync::Arc;
use std::time::Duration;

use fanout::{
    BatchAssembler, BatchPipeline, EdgeSamplerInput, Error, LinkLoader, Loader, LoaderConfig,
    NegativeSampling, NeighborSampler, NodeLoader, NodeSamplerInput, SamplerConfig,
};
use fanout_core::{
    dataset, DeviceGroup, EdgeType, Feature, FeatureStore, Id2Idx, NodeType, Placement, RowSource,
};

fn sampler(config: SamplerConfig) -> Arc<NeighborSampler> {
    let graph = Arc::new(dataset::ring(40, 2, 4).build_graph().unwrap());
    Arc::new(NeighborSampler::new(graph, config).unwrap())
}

fn ring_assembler() -> BatchAssembler {
    let spec = dataset::ring(40, 2, 4);
    let store = spec
        .build_features(&[DeviceGroup::new(0, [0, 1]), DeviceGroup::new(1, [2, 3])])
        .unwrap();
    BatchAssembler::new()
        .with_features(Arc::new(store))
        .with_labels(spec.node_labels)
}

#[tokio::test]
async fn node_pipeline_streams_every_batch_in_order() {
    let loader = Arc::new(
        NodeLoader::new(
            sampler(SamplerConfig::new(vec![2, 1]).with_edge(true)),
            NodeSamplerInput::new("user", (0..40).collect()),
            LoaderConfig::default().with_batch_size(16).with_device(2),
        )
        .unwrap(),
    );
    let expected = loader.sample_epoch(0).unwrap();
    let pipeline = BatchPipeline::new(Arc::clone(&loader), ring_assembler());

    let mut rx = pipeline.run(0);
    let mut batches = Vec::new();
    while let Some(batch) = rx.recv().await {
        batches.push(batch.unwrap());
    }
    assert_eq!(batches.len(), 3);

    for (batch, out) in batches.iter().zip(&expected) {
        assert_eq!(batch.node, out.node);
        for (ntype, ids) in &batch.node {
            let x = &batch.x[ntype];
            assert_eq!(x.nrows(), ids.len());
            for (i, &id) in ids.iter().enumerate() {
                assert_eq!(x[[i, 3]], id as f32);
            }
            assert_eq!(batch.y[ntype].len(), ids.len());
        }
        for (key, index) in &batch.edges {
            let eids = index.edge.as_ref().unwrap();
            let attr = &batch.edge_attr[key];
            for (k, &eid) in eids.iter().enumerate() {
                assert_eq!(attr[[k, 0]], eid as f32);
            }
        }
    }
}

#[tokio::test]
async fn link_pipeline_stops_after_first_error() {
    // negatives requested but the sampler does not allow them
    let loader = Arc::new(
        LinkLoader::new(
            sampler(SamplerConfig::new(vec![1])),
            EdgeSamplerInput::new(
                EdgeType::new("user", "u2i", "item"),
                (0..10).collect(),
                (1..11).collect(),
            ),
            Some(NegativeSampling::binary()),
            LoaderConfig::default().with_batch_size(2),
        )
        .unwrap(),
    );
    let mut rx = BatchPipeline::new(loader, BatchAssembler::new()).run(0);

    let first = rx.recv().await.unwrap();
    assert!(matches!(first, Err(Error::InvalidConfig(_))));
    assert!(rx.recv().await.is_none());
}

#[test]
fn link_loader_with_negatives() {
    let loader = LinkLoader::new(
        sampler(SamplerConfig::new(vec![1]).with_neg(true)),
        EdgeSamplerInput::new(
            EdgeType::new("user", "u2i", "item"),
            (0..10).collect(),
            (1..11).collect(),
        ),
        Some(NegativeSampling::triplet(3)),
        LoaderConfig::default().with_batch_size(4).with_shuffle(true),
    )
    .unwrap();
    let outs = loader.sample_epoch(1).unwrap();
    assert_eq!(outs.len(), 3);
    let rows: usize = outs
        .iter()
        .map(|o| match &o.metadata {
            fanout::Metadata::Triplet { dst_neg_index, .. } => dst_neg_index.nrows(),
            _ => 0,
        })
        .sum();
    assert_eq!(rows, 10);
}

#[derive(Debug)]
struct StalledRows {
    rows: usize,
    dim: usize,
}

#[async_trait]
impl RowSource for StalledRows {
    fn placement(&self) -> Placement {
        Placement::Partitioned { num_partitions: 1 }
    }

    fn num_rows(&self) -> usize {
        self.rows
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn fetch(&self, rows: &[usize]) -> fanout::Result<Array2<f32>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Array2::zeros((rows.len(), self.dim)))
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_cold_rows_fail_the_batch() {
    // users 0..20 hot, 20..40 behind a backing that never answers
    let user = Feature::builder(Array2::zeros((40, 2)), Id2Idx::identity(40))
        .split_ratio(0.5)
        .device_groups(vec![DeviceGroup::new(0, [0])])
        .cold_source(Arc::new(StalledRows { rows: 20, dim: 2 }))
        .build()
        .unwrap();
    let store = FeatureStore::new().with_node(NodeType::new("user"), user);
    let assembler = BatchAssembler::new()
        .with_features(Arc::new(store))
        .with_timeout(Duration::from_millis(100));

    let s = sampler(SamplerConfig::new(vec![1]));
    let hot = s
        .sample_from_nodes(&NodeSamplerInput::new("user", vec![1, 2]))
        .unwrap();
    let batch = assembler.assemble(hot).await.unwrap();
    assert_eq!(batch.x[&NodeType::new("user")].nrows(), 2);

    let cold = s
        .sample_from_nodes(&NodeSamplerInput::new("user", vec![1, 30]))
        .unwrap();
    let res = assembler.assemble(cold).await;
    assert!(matches!(res, Err(Error::FeatureLookupTimeout { .. })));
}
