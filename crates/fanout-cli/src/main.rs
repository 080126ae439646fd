//! fanout CLI - neighbor sampling over graph datasets from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Write the 40-node ring dataset
//! fanout ring -o ring.json --num-nodes 40 --degree 2
//!
//! # Show stats
//! fanout stats ring.json
//!
//! # Two-hop sample around user seeds, with edge IDs and features
//! fanout sample ring.json --input-type user --seeds 1,5,9 \
//!     --num-neighbors 2,1 --with-edge --features
//!
//! # Seed edges with binary negatives
//! fanout sample-edges ring.json --edge-type user,u2i,item \
//!     --rows 1,3,4 --cols 2,5,5 --neg binary
//!
//! # Stream one epoch of feature-resolved batches
//! fanout epoch ring.json --input-type user --batch-size 16 --shuffle
//! ```
//!
//! Sampling results are printed to stdout as JSON; logs go to stderr
//! (`-v` for info, `-vv` for debug, or `RUST_LOG`).

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use fanout::{
    Batch, BatchAssembler, BatchPipeline, EdgeLayout, EdgeSamplerInput, Loader, LoaderConfig,
    Metadata, NegativeSampling, NeighborSampler, NodeLoader, NodeSamplerInput, SamplerConfig,
    SamplingOutput,
};
use fanout_core::{dataset, DeviceGroup, EdgeType, GraphSpec, HeteroGraph};
use indicatif::ProgressBar;
use serde_json::{json, Map, Value};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "fanout")]
#[command(about = "Heterogeneous neighbor sampling CLI", long_about = None)]
struct Cli {
    /// Increase log verbosity (stderr)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the reference ring dataset as JSON
    Ring {
        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Nodes per type
        #[arg(long, default_value = "40")]
        num_nodes: usize,

        /// Out-degree of every node
        #[arg(long, default_value = "2")]
        degree: usize,

        /// Feature width
        #[arg(long, default_value = "8")]
        dim: usize,
    },

    /// Show statistics about a graph dataset
    Stats {
        /// Input file (JSON graph dataset)
        input: PathBuf,
    },

    /// Sample around seed nodes
    Sample {
        /// Input file (JSON graph dataset)
        input: PathBuf,

        /// Node type of the seeds
        #[arg(long)]
        input_type: String,

        /// Seed GlobalIDs
        #[arg(long, value_delimiter = ',', required = true)]
        seeds: Vec<u64>,

        #[command(flatten)]
        sampler: SamplerArgs,

        #[command(flatten)]
        features: FeatureArgs,
    },

    /// Sample around seed edges, optionally with negatives
    SampleEdges {
        /// Input file (JSON graph dataset)
        input: PathBuf,

        /// Seed edge type as `src,relation,dst`
        #[arg(long, value_parser = parse_edge_type)]
        edge_type: EdgeType,

        /// Seed source GlobalIDs
        #[arg(long, value_delimiter = ',', required = true)]
        rows: Vec<u64>,

        /// Seed destination GlobalIDs
        #[arg(long, value_delimiter = ',', required = true)]
        cols: Vec<u64>,

        /// Negative sampling mode
        #[arg(long)]
        neg: Option<NegMode>,

        /// Negatives per positive (triplet mode)
        #[arg(long, default_value = "1")]
        amount: usize,

        #[command(flatten)]
        sampler: SamplerArgs,

        #[command(flatten)]
        features: FeatureArgs,
    },

    /// Stream one epoch of feature-resolved batches over every node of a type
    Epoch {
        /// Input file (JSON graph dataset)
        input: PathBuf,

        /// Node type to iterate
        #[arg(long)]
        input_type: String,

        /// Seeds per batch
        #[arg(long, default_value = "512")]
        batch_size: usize,

        /// Shuffle seeds
        #[arg(long)]
        shuffle: bool,

        /// Drop the last incomplete batch
        #[arg(long)]
        drop_last: bool,

        /// Epoch number (selects the shuffle order)
        #[arg(long, default_value = "0")]
        epoch: u64,

        /// Batches sampled ahead of feature resolution
        #[arg(long, default_value = "2")]
        prefetch: usize,

        /// Per-batch feature lookup deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Device resolving hot feature rows
        #[arg(long, default_value = "0")]
        device: usize,

        #[command(flatten)]
        sampler: SamplerArgs,
    },
}

#[derive(Args)]
struct SamplerArgs {
    /// Sampler configuration file (JSON); flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fan-out budget per hop
    #[arg(long, value_delimiter = ',')]
    num_neighbors: Option<Vec<usize>>,

    /// Edge layout of the output
    #[arg(long)]
    layout: Option<Layout>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Record sampled edge IDs
    #[arg(long)]
    with_edge: bool,

    /// Sample neighbors with replacement
    #[arg(long)]
    replace: bool,
}

#[derive(Args)]
struct FeatureArgs {
    /// Resolve node and edge features and report their shapes
    #[arg(long)]
    features: bool,

    /// Device resolving hot feature rows
    #[arg(long, default_value = "0")]
    device: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum Layout {
    /// row = source, col = destination, under the traversed edge type
    Traversal,
    /// row = neighbor, col = frontier node, under the reverse edge type
    MessagePassing,
}

#[derive(Clone, Copy, ValueEnum)]
enum NegMode {
    /// One negative per positive, labels 1/0
    Binary,
    /// `amount` negatives per positive
    Triplet,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Ring {
            output,
            num_nodes,
            degree,
            dim,
        } => cmd_ring(&output, num_nodes, degree, dim),
        Commands::Stats { input } => cmd_stats(&input),
        Commands::Sample {
            input,
            input_type,
            seeds,
            sampler,
            features,
        } => cmd_sample(&input, input_type, seeds, &sampler, &features).await,
        Commands::SampleEdges {
            input,
            edge_type,
            rows,
            cols,
            neg,
            amount,
            sampler,
            features,
        } => {
            let neg = neg.map(|mode| match mode {
                NegMode::Binary => NegativeSampling::binary(),
                NegMode::Triplet => NegativeSampling::triplet(amount),
            });
            cmd_sample_edges(&input, edge_type, rows, cols, neg, &sampler, &features).await
        }
        Commands::Epoch {
            input,
            input_type,
            batch_size,
            shuffle,
            drop_last,
            epoch,
            prefetch,
            timeout_ms,
            device,
            sampler,
        } => {
            let mut config = LoaderConfig::default()
                .with_batch_size(batch_size)
                .with_shuffle(shuffle)
                .with_drop_last(drop_last)
                .with_prefetch(prefetch)
                .with_device(device);
            if let Some(ms) = timeout_ms {
                config = config.with_feature_timeout(Duration::from_millis(ms));
            }
            cmd_epoch(&input, input_type, epoch, config, &sampler).await
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn parse_edge_type(s: &str) -> std::result::Result<EdgeType, String> {
    match s.split(',').map(str::trim).collect::<Vec<_>>().as_slice() {
        [src, rel, dst] if !src.is_empty() && !rel.is_empty() && !dst.is_empty() => {
            Ok(EdgeType::new(*src, *rel, *dst))
        }
        _ => Err(format!("expected `src,relation,dst`, got `{s}`")),
    }
}

fn edge_key(e: &EdgeType) -> String {
    format!("{}__{}__{}", e.src_type, e.relation, e.dst_type)
}

fn load_dataset(path: &Path) -> Result<(GraphSpec, Arc<HeteroGraph>)> {
    let start = Instant::now();
    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Loading {}...", path.display()));

    let spec = GraphSpec::from_json_file(path)
        .with_context(|| format!("Failed to load dataset {}", path.display()))?;
    let graph = spec
        .build_graph()
        .with_context(|| format!("Invalid topology in {}", path.display()))?;

    pb.finish_and_clear();
    info!(elapsed = ?start.elapsed(), "dataset loaded");
    Ok((spec, Arc::new(graph)))
}

fn sampler_config(args: &SamplerArgs) -> Result<SamplerConfig> {
    let mut config = match &args.config {
        Some(path) => SamplerConfig::from_json_file(path)
            .with_context(|| format!("Failed to load sampler config {}", path.display()))?,
        None => SamplerConfig::default(),
    };
    if let Some(budgets) = &args.num_neighbors {
        config.num_neighbors = budgets.clone().into();
    }
    if let Some(layout) = args.layout {
        config.layout = match layout {
            Layout::Traversal => EdgeLayout::Traversal,
            Layout::MessagePassing => EdgeLayout::MessagePassing,
        };
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.with_edge |= args.with_edge;
    config.replace |= args.replace;
    Ok(config)
}

fn assembler(spec: &GraphSpec, device: usize) -> Result<BatchAssembler> {
    let store = spec
        .build_features(&[DeviceGroup::new(0, [device])])
        .context("Failed to build feature tables")?;
    Ok(BatchAssembler::new()
        .with_features(Arc::new(store))
        .with_labels(spec.node_labels.clone())
        .with_device(device))
}

fn cmd_ring(output: &Path, num_nodes: usize, degree: usize, dim: usize) -> Result<()> {
    if num_nodes == 0 || degree == 0 {
        bail!("--num-nodes and --degree must be positive");
    }
    dataset::ring(num_nodes, degree, dim)
        .to_json_file(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Wrote ring dataset ({} nodes per type, degree {}) to {}",
        num_nodes,
        degree,
        output.display()
    );
    Ok(())
}

fn cmd_stats(input: &Path) -> Result<()> {
    let (_, graph) = load_dataset(input)?;
    let stats = graph.stats();

    println!("Graph Statistics");
    println!("================");
    println!("Node types:     {}", stats.num_node_types);
    println!("Edge types:     {}", stats.num_edge_types);
    println!("Nodes:          {}", stats.total_nodes);
    println!("Edges:          {}", stats.total_edges);

    let mut nodes: Vec<_> = stats.nodes_by_type.iter().collect();
    nodes.sort();
    println!("\nNodes by type:");
    for (t, n) in nodes {
        println!("  {:<20} {}", t, n);
    }

    let mut edges: Vec<_> = stats.edges_by_type.iter().collect();
    edges.sort();
    println!("\nEdges by type:");
    for (t, n) in edges {
        let max_degree = stats.max_degree_by_type.get(t).copied().unwrap_or(0);
        println!("  {:<30} {:>8}  max degree {}", t, n, max_degree);
    }
    Ok(())
}

async fn cmd_sample(
    input: &Path,
    input_type: String,
    seeds: Vec<u64>,
    sampler_args: &SamplerArgs,
    feature_args: &FeatureArgs,
) -> Result<()> {
    let (spec, graph) = load_dataset(input)?;
    let sampler = NeighborSampler::new(graph, sampler_config(sampler_args)?)?;

    let start = Instant::now();
    let out = sampler
        .sample_from_nodes(&NodeSamplerInput::new(input_type, seeds))
        .context("Sampling failed")?;
    info!(
        nodes = out.total_nodes(),
        edges = out.total_edges(),
        elapsed = ?start.elapsed(),
        "sampled"
    );
    emit(&spec, out, feature_args).await
}

async fn cmd_sample_edges(
    input: &Path,
    edge_type: EdgeType,
    rows: Vec<u64>,
    cols: Vec<u64>,
    neg: Option<NegativeSampling>,
    sampler_args: &SamplerArgs,
    feature_args: &FeatureArgs,
) -> Result<()> {
    let (spec, graph) = load_dataset(input)?;
    let config = sampler_config(sampler_args)?.with_neg(neg.is_some());
    let sampler = NeighborSampler::new(graph, config)?;

    let mut seeds = EdgeSamplerInput::new(edge_type, rows, cols);
    if let Some(neg) = neg {
        seeds = seeds.with_neg_sampling(neg);
    }
    let out = sampler.sample_from_edges(&seeds).context("Sampling failed")?;

    let stats = sampler.negative_stats();
    info!(
        nodes = out.total_nodes(),
        edges = out.total_edges(),
        negatives = stats.drawn(),
        exhausted = stats.exhausted(),
        "sampled"
    );
    emit(&spec, out, feature_args).await
}

async fn emit(spec: &GraphSpec, out: SamplingOutput, feature_args: &FeatureArgs) -> Result<()> {
    let mut summary = summarize(&out);
    if feature_args.features {
        let batch = assembler(spec, feature_args.device)?
            .assemble(out)
            .await
            .context("Feature resolution failed")?;
        summary["features"] = feature_shapes(&batch);
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn cmd_epoch(
    input: &Path,
    input_type: String,
    epoch: u64,
    config: LoaderConfig,
    sampler_args: &SamplerArgs,
) -> Result<()> {
    let (spec, graph) = load_dataset(input)?;
    let num_seeds = graph
        .num_nodes(&input_type.as_str().into())
        .with_context(|| format!("Unknown node type {input_type}"))?;
    let device = config.device;
    let sampler = Arc::new(NeighborSampler::new(graph, sampler_config(sampler_args)?)?);
    let loader = Arc::new(NodeLoader::new(
        sampler,
        NodeSamplerInput::new(input_type, (0..num_seeds as u64).collect()),
        config,
    )?);
    let num_batches = loader.num_batches();
    let pipeline = BatchPipeline::new(loader, assembler(&spec, device)?);

    let start = Instant::now();
    let pb = ProgressBar::new(num_batches as u64);
    let mut rx = pipeline.run(epoch);
    let (mut batches, mut nodes, mut edges) = (0usize, 0usize, 0usize);
    while let Some(batch) = rx.recv().await {
        let batch = batch.with_context(|| format!("Batch {batches} failed"))?;
        nodes += batch.node.values().map(Vec::len).sum::<usize>();
        edges += batch.edges.values().map(|e| e.len()).sum::<usize>();
        batches += 1;
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!("Epoch {}: {} batches in {:.2?}", epoch, batches, start.elapsed());
    println!("Sampled nodes:  {}", nodes);
    println!("Sampled edges:  {}", edges);
    Ok(())
}

fn summarize(out: &SamplingOutput) -> Value {
    let node: Map<String, Value> = out
        .node
        .iter()
        .map(|(t, ids)| (t.to_string(), json!(ids)))
        .collect();
    let edges: Map<String, Value> = out
        .edges
        .iter()
        .map(|(key, index)| {
            let mut entry = json!({
                "origin": edge_key(&index.origin),
                "row": index.row,
                "col": index.col,
            });
            if let Some(ids) = &index.edge {
                entry["edge"] = json!(ids);
            }
            (edge_key(key), entry)
        })
        .collect();
    let num_sampled_nodes: Map<String, Value> = out
        .num_sampled_nodes
        .iter()
        .map(|(t, counts)| (t.to_string(), json!(counts)))
        .collect();
    let num_sampled_edges: Map<String, Value> = out
        .num_sampled_edges
        .iter()
        .map(|(e, counts)| (edge_key(e), json!(counts)))
        .collect();

    let metadata = match &out.metadata {
        Metadata::Node => json!({ "kind": "node" }),
        Metadata::Link {
            input_type,
            edge_label_index,
            edge_label,
        } => json!({
            "kind": "link",
            "input_type": edge_key(input_type),
            "edge_label_index": [edge_label_index.row, edge_label_index.col],
            "edge_label": edge_label,
        }),
        Metadata::Triplet {
            input_type,
            src_index,
            dst_pos_index,
            dst_neg_index,
            edge_label,
        } => json!({
            "kind": "triplet",
            "input_type": edge_key(input_type),
            "src_index": src_index,
            "dst_pos_index": dst_pos_index,
            "dst_neg_index": dst_neg_index.outer_iter().map(|r| r.to_vec()).collect::<Vec<_>>(),
            "edge_label": edge_label,
        }),
    };

    json!({
        "node": node,
        "edges": edges,
        "num_sampled_nodes": num_sampled_nodes,
        "num_sampled_edges": num_sampled_edges,
        "metadata": metadata,
    })
}

fn feature_shapes(batch: &Batch) -> Value {
    let x: Map<String, Value> = batch
        .x
        .iter()
        .map(|(t, m)| (t.to_string(), json!([m.nrows(), m.ncols()])))
        .collect();
    let edge_attr: Map<String, Value> = batch
        .edge_attr
        .iter()
        .map(|(e, m)| (edge_key(e), json!([m.nrows(), m.ncols()])))
        .collect();
    let y: Map<String, Value> = batch
        .y
        .iter()
        .map(|(t, labels)| (t.to_string(), json!(labels.len())))
        .collect();
    json!({ "x": x, "edge_attr": edge_attr, "y": y })
}
