//! Sampling requests.

use fanout_core::{EdgeType, Error, GlobalId, NodeType, Result};

use crate::config::{NegativeMode, NegativeSampling};

/// Seed nodes of a single node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSamplerInput {
    /// Node type of every seed.
    pub input_type: NodeType,
    /// Seed GlobalIDs.
    pub node: Vec<GlobalId>,
}

impl NodeSamplerInput {
    pub fn new(input_type: impl Into<NodeType>, node: Vec<GlobalId>) -> Self {
        Self {
            input_type: input_type.into(),
            node,
        }
    }

    /// Number of seeds.
    pub fn len(&self) -> usize {
        self.node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.is_empty()
    }

    /// Seeds at `positions`, in that order.
    pub fn select(&self, positions: &[usize]) -> Self {
        Self {
            input_type: self.input_type.clone(),
            node: positions.iter().map(|&p| self.node[p]).collect(),
        }
    }
}

/// Seed edges of a single edge type.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSamplerInput {
    /// Edge type of every seed pair.
    pub input_type: EdgeType,
    /// Source GlobalIDs.
    pub row: Vec<GlobalId>,
    /// Destination GlobalIDs.
    pub col: Vec<GlobalId>,
    /// Caller-supplied labels, one per pair.
    pub label: Option<Vec<f32>>,
    /// Negatives to manufacture.
    pub neg_sampling: Option<NegativeSampling>,
}

impl EdgeSamplerInput {
    pub fn new(input_type: EdgeType, row: Vec<GlobalId>, col: Vec<GlobalId>) -> Self {
        Self {
            input_type,
            row,
            col,
            label: None,
            neg_sampling: None,
        }
    }

    pub fn with_label(mut self, label: Vec<f32>) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_neg_sampling(mut self, neg_sampling: NegativeSampling) -> Self {
        self.neg_sampling = Some(neg_sampling);
        self
    }

    /// Number of seed pairs.
    pub fn len(&self) -> usize {
        self.row.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row.is_empty()
    }

    /// Seed pairs at `positions`, in that order.
    pub fn select(&self, positions: &[usize]) -> Self {
        Self {
            input_type: self.input_type.clone(),
            row: positions.iter().map(|&p| self.row[p]).collect(),
            col: positions.iter().map(|&p| self.col[p]).collect(),
            label: self
                .label
                .as_ref()
                .map(|l| positions.iter().map(|&p| l[p]).collect()),
            neg_sampling: self.neg_sampling,
        }
    }

    /// Shape checks that need no graph.
    pub fn validate(&self) -> Result<()> {
        if self.row.len() != self.col.len() {
            return Err(Error::InvalidInput(format!(
                "{} seed rows but {} seed cols",
                self.row.len(),
                self.col.len()
            )));
        }
        if let Some(label) = &self.label {
            if label.len() != self.row.len() {
                return Err(Error::InvalidInput(format!(
                    "{} labels for {} seed pairs",
                    label.len(),
                    self.row.len()
                )));
            }
        }
        if let Some(neg) = &self.neg_sampling {
            neg.validate()?;
            if neg.mode == NegativeMode::Binary && self.label.is_some() {
                return Err(Error::InvalidInput(
                    "binary negative sampling assigns labels itself".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Either kind of request.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplerInput {
    Node(NodeSamplerInput),
    Edge(EdgeSamplerInput),
}

impl From<NodeSamplerInput> for SamplerInput {
    fn from(input: NodeSamplerInput) -> Self {
        Self::Node(input)
    }
}

impl From<EdgeSamplerInput> for SamplerInput {
    fn from(input: EdgeSamplerInput) -> Self {
        Self::Edge(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u2i() -> EdgeType {
        EdgeType::new("user", "u2i", "item")
    }

    #[test]
    fn test_edge_input_validation() {
        assert!(EdgeSamplerInput::new(u2i(), vec![1, 2], vec![3]).validate().is_err());
        assert!(EdgeSamplerInput::new(u2i(), vec![1], vec![3])
            .with_label(vec![1.0, 0.0])
            .validate()
            .is_err());
        assert!(EdgeSamplerInput::new(u2i(), vec![1], vec![3])
            .with_label(vec![1.0])
            .with_neg_sampling(NegativeSampling::binary())
            .validate()
            .is_err());
        assert!(EdgeSamplerInput::new(u2i(), vec![1], vec![3])
            .with_neg_sampling(NegativeSampling::triplet(0))
            .validate()
            .is_err());
        assert!(EdgeSamplerInput::new(u2i(), vec![1], vec![3])
            .with_label(vec![2.0])
            .with_neg_sampling(NegativeSampling::triplet(2))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_select_keeps_pairs_aligned() {
        let input = EdgeSamplerInput::new(u2i(), vec![1, 2, 3], vec![4, 5, 6])
            .with_label(vec![0.1, 0.2, 0.3]);
        let part = input.select(&[2, 0]);
        assert_eq!(part.row, vec![3, 1]);
        assert_eq!(part.col, vec![6, 4]);
        assert_eq!(part.label, Some(vec![0.3, 0.1]));

        let nodes = NodeSamplerInput::new("user", vec![7, 8, 9]).select(&[1]);
        assert_eq!(nodes.node, vec![8]);
    }
}
