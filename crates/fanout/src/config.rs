//! Sampler and loader configuration.
//!
//! Both configs deserialize from JSON so a run can be described in a file:
//!
//! ```json
//! {
//!   "num_neighbors": [2, 1],
//!   "with_edge": true,
//!   "layout": "message_passing",
//!   "seed": 7
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use fanout_core::{EdgeType, Error, Result};

/// Fan-out budgets, one per hop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumNeighbors {
    /// The same per-hop budgets for every edge type.
    Uniform(Vec<usize>),
    /// Per-hop budgets for listed edge types. Unlisted edge types are not
    /// traversed.
    PerEdgeType(Vec<(EdgeType, Vec<usize>)>),
}

impl NumNeighbors {
    /// Number of hops.
    pub fn num_hops(&self) -> usize {
        match self {
            Self::Uniform(hops) => hops.len(),
            Self::PerEdgeType(lists) => lists.first().map_or(0, |(_, hops)| hops.len()),
        }
    }

    /// Budget of `edge_type` at `hop`; 0 means the edge type is skipped.
    pub fn budget(&self, edge_type: &EdgeType, hop: usize) -> usize {
        match self {
            Self::Uniform(hops) => hops.get(hop).copied().unwrap_or(0),
            Self::PerEdgeType(lists) => lists
                .iter()
                .find(|(etype, _)| etype == edge_type)
                .and_then(|(_, hops)| hops.get(hop).copied())
                .unwrap_or(0),
        }
    }

    /// Edge types named explicitly.
    pub fn edge_types(&self) -> impl Iterator<Item = &EdgeType> {
        let listed: &[(EdgeType, Vec<usize>)] = match self {
            Self::Uniform(_) => &[],
            Self::PerEdgeType(lists) => lists,
        };
        listed.iter().map(|(etype, _)| etype)
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Uniform(hops) if hops.is_empty() => Err(Error::InvalidConfig(
                "num_neighbors must list at least one hop".to_string(),
            )),
            Self::Uniform(_) => Ok(()),
            Self::PerEdgeType(lists) => {
                let hops = self.num_hops();
                if hops == 0 {
                    return Err(Error::InvalidConfig(
                        "num_neighbors must list at least one hop".to_string(),
                    ));
                }
                for (etype, list) in lists {
                    if list.len() != hops {
                        return Err(Error::InvalidConfig(format!(
                            "num_neighbors for {etype} lists {} hops, expected {hops}",
                            list.len()
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

impl From<Vec<usize>> for NumNeighbors {
    fn from(hops: Vec<usize>) -> Self {
        Self::Uniform(hops)
    }
}

/// How sampled edges are keyed and oriented in the output.
///
/// The default records edges in traversal direction. Consumers that expect
/// PyG-style message-passing output (edges under `rev_<relation>` with the
/// sampled neighbor in `row`) must opt into [`EdgeLayout::MessagePassing`].
///
/// ```
/// use fanout::{EdgeLayout, SamplerConfig};
///
/// assert_eq!(SamplerConfig::default().layout, EdgeLayout::Traversal);
/// let config = SamplerConfig::new(vec![2, 1]).with_layout(EdgeLayout::MessagePassing);
/// assert_eq!(config.layout, EdgeLayout::MessagePassing);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeLayout {
    /// Key = traversed edge type, `row` = source, `col` = sampled destination.
    #[default]
    Traversal,
    /// Key = reverse edge type, `row` = sampled neighbor, `col` = frontier
    /// node. Same-type relations keep their key.
    MessagePassing,
}

/// Negative sampling flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativeMode {
    /// One negative pair per positive, labelled 0.0.
    Binary,
    /// `amount` negative destinations per positive.
    Triplet,
}

/// Negative sampling request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegativeSampling {
    /// Output format.
    pub mode: NegativeMode,
    /// Negatives per positive (triplet mode; binary always draws one).
    #[serde(default = "default_amount")]
    pub amount: usize,
}

fn default_amount() -> usize {
    1
}

impl NegativeSampling {
    /// Binary mode.
    pub fn binary() -> Self {
        Self {
            mode: NegativeMode::Binary,
            amount: 1,
        }
    }

    /// Triplet mode with `amount` negatives per positive.
    pub fn triplet(amount: usize) -> Self {
        Self {
            mode: NegativeMode::Triplet,
            amount,
        }
    }

    /// Negatives drawn for each positive pair.
    pub fn per_positive(&self) -> usize {
        match self.mode {
            NegativeMode::Binary => 1,
            NegativeMode::Triplet => self.amount,
        }
    }

    /// Reject a non-positive triplet amount.
    pub fn validate(&self) -> Result<()> {
        if self.mode == NegativeMode::Triplet && self.amount == 0 {
            return Err(Error::InvalidConfig(
                "triplet negative sampling needs amount > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Sampler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Fan-out budget per hop (default: [10, 5]).
    pub num_neighbors: NumNeighbors,
    /// Record sampled edge IDs (default: false).
    #[serde(default)]
    pub with_edge: bool,
    /// Allow negative sampling on edge-seeded requests (default: false).
    #[serde(default)]
    pub with_neg: bool,
    /// Sample neighbors with replacement (default: false).
    #[serde(default)]
    pub replace: bool,
    /// Output edge layout (default: traversal).
    #[serde(default)]
    pub layout: EdgeLayout,
    /// Base random seed (default: 42).
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Rejection attempts per negative candidate
    /// (None = 5 x negatives per positive).
    #[serde(default)]
    pub max_negative_attempts: Option<usize>,
    /// Frontier size above which a hop fans out on the rayon pool
    /// (default: 1024).
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,
}

fn default_seed() -> u64 {
    42
}

fn default_parallel_threshold() -> usize {
    1024
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            num_neighbors: NumNeighbors::Uniform(vec![10, 5]),
            with_edge: false,
            with_neg: false,
            replace: false,
            layout: EdgeLayout::Traversal,
            seed: default_seed(),
            max_negative_attempts: None,
            parallel_threshold: default_parallel_threshold(),
        }
    }
}

impl SamplerConfig {
    /// Config with the given fan-out and defaults elsewhere.
    pub fn new(num_neighbors: impl Into<NumNeighbors>) -> Self {
        Self {
            num_neighbors: num_neighbors.into(),
            ..Self::default()
        }
    }

    /// Load from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_edge(mut self, with_edge: bool) -> Self {
        self.with_edge = with_edge;
        self
    }

    pub fn with_neg(mut self, with_neg: bool) -> Self {
        self.with_neg = with_neg;
        self
    }

    pub fn with_replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    pub fn with_layout(mut self, layout: EdgeLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_negative_attempts(mut self, attempts: usize) -> Self {
        self.max_negative_attempts = Some(attempts);
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Check the config before any traversal work.
    pub fn validate(&self) -> Result<()> {
        self.num_neighbors.validate()?;
        if self.max_negative_attempts == Some(0) {
            return Err(Error::InvalidConfig(
                "max_negative_attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Rejection attempts allowed per negative candidate.
    pub fn negative_attempts(&self, neg: &NegativeSampling) -> usize {
        self.max_negative_attempts
            .unwrap_or_else(|| 5 * neg.per_positive().max(1))
    }
}

/// Loader configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Seeds per batch (default: 512).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Shuffle seeds every epoch (default: false).
    #[serde(default)]
    pub shuffle: bool,
    /// Drop a trailing partial batch (default: false).
    #[serde(default)]
    pub drop_last: bool,
    /// Sampled batches buffered ahead of feature resolution (default: 2).
    #[serde(default = "default_prefetch")]
    pub prefetch: usize,
    /// Request deadline for feature resolution in milliseconds.
    #[serde(default)]
    pub feature_timeout_ms: Option<u64>,
    /// Device the batches are resolved for (default: 0).
    #[serde(default)]
    pub device: usize,
    /// Shuffle seed (default: 0).
    #[serde(default)]
    pub seed: u64,
}

fn default_batch_size() -> usize {
    512
}

fn default_prefetch() -> usize {
    2
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            shuffle: false,
            drop_last: false,
            prefetch: default_prefetch(),
            feature_timeout_ms: None,
            device: 0,
            seed: 0,
        }
    }
}

impl LoaderConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn with_feature_timeout(mut self, timeout: Duration) -> Self {
        self.feature_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_device(mut self, device: usize) -> Self {
        self.device = device;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Feature resolution deadline, if any.
    pub fn feature_timeout(&self) -> Option<Duration> {
        self.feature_timeout_ms.map(Duration::from_millis)
    }

    /// Reject an empty batch size.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_and_per_type_budgets() {
        let u2i = EdgeType::new("user", "u2i", "item");
        let i2i = EdgeType::new("item", "i2i", "item");

        let uniform = NumNeighbors::from(vec![2, 1]);
        assert_eq!(uniform.num_hops(), 2);
        assert_eq!(uniform.budget(&u2i, 1), 1);
        assert_eq!(uniform.budget(&u2i, 2), 0);

        let per_type = NumNeighbors::PerEdgeType(vec![(u2i.clone(), vec![3, 0])]);
        assert_eq!(per_type.budget(&u2i, 0), 3);
        assert_eq!(per_type.budget(&u2i, 1), 0);
        assert_eq!(per_type.budget(&i2i, 0), 0);
    }

    #[test]
    fn test_validation() {
        assert!(SamplerConfig::new(vec![2, 1]).validate().is_ok());
        assert!(SamplerConfig::new(Vec::<usize>::new()).validate().is_err());
        assert!(SamplerConfig::new(vec![1])
            .with_max_negative_attempts(0)
            .validate()
            .is_err());

        let ragged = NumNeighbors::PerEdgeType(vec![
            (EdgeType::new("a", "r", "b"), vec![1, 1]),
            (EdgeType::new("b", "r", "a"), vec![1]),
        ]);
        assert!(SamplerConfig::new(ragged).validate().is_err());

        assert!(NegativeSampling::triplet(0).validate().is_err());
        assert!(NegativeSampling::triplet(3).validate().is_ok());
        assert!(LoaderConfig::default().with_batch_size(0).validate().is_err());
    }

    #[test]
    fn test_negative_attempts_default() {
        let config = SamplerConfig::default();
        assert_eq!(config.negative_attempts(&NegativeSampling::binary()), 5);
        assert_eq!(config.negative_attempts(&NegativeSampling::triplet(4)), 20);
        let config = config.with_max_negative_attempts(3);
        assert_eq!(config.negative_attempts(&NegativeSampling::triplet(4)), 3);
    }

    #[test]
    fn test_config_json() {
        let json = r#"{
            "num_neighbors": [2, 1],
            "with_edge": true,
            "layout": "message_passing"
        }"#;
        let config: SamplerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.num_neighbors, NumNeighbors::Uniform(vec![2, 1]));
        assert_eq!(config.layout, EdgeLayout::MessagePassing);
        assert_eq!(config.seed, 42);
        assert_eq!(config.parallel_threshold, 1024);

        let json = r#"{ "num_neighbors": [[["user", "u2i", "item"], [4, 2]]] }"#;
        let config: SamplerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.num_neighbors.budget(&EdgeType::new("user", "u2i", "item"), 1),
            2
        );

        let neg: NegativeSampling = serde_json::from_str(r#"{ "mode": "triplet", "amount": 3 }"#).unwrap();
        assert_eq!(neg, NegativeSampling::triplet(3));
    }
}
