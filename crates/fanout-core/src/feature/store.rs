//! Registry of feature tables keyed by node type or edge type.

use ndarray::Array2;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use super::Feature;
use crate::hetero::{EdgeType, NodeType};
use crate::{Error, GlobalId, Result};

/// The entity a feature table describes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityType {
    /// Node features.
    Node(NodeType),
    /// Edge features.
    Edge(EdgeType),
}

impl EntityType {
    fn missing(&self) -> Error {
        match self {
            Self::Node(t) => Error::UnknownNodeType(t.to_string()),
            Self::Edge(t) => Error::UnknownEdgeType(t.to_string()),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(t) => write!(f, "node {t}"),
            Self::Edge(t) => write!(f, "edge {t}"),
        }
    }
}

impl From<NodeType> for EntityType {
    fn from(t: NodeType) -> Self {
        Self::Node(t)
    }
}

impl From<EdgeType> for EntityType {
    fn from(t: EdgeType) -> Self {
        Self::Edge(t)
    }
}

/// Node and edge feature tables, fixed after construction.
#[derive(Debug, Clone, Default)]
pub struct FeatureStore {
    tables: HashMap<EntityType, Feature>,
}

impl FeatureStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register node features.
    pub fn with_node(self, node_type: impl Into<NodeType>, feature: Feature) -> Self {
        self.with(EntityType::Node(node_type.into()), feature)
    }

    /// Register edge features.
    pub fn with_edge(self, edge_type: EdgeType, feature: Feature) -> Self {
        self.with(EntityType::Edge(edge_type), feature)
    }

    /// Register a table under `entity`, replacing any previous one.
    pub fn with(mut self, entity: EntityType, mut feature: Feature) -> Self {
        feature.set_entity(entity.to_string());
        self.tables.insert(entity, feature);
        self
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Whether `entity` has a table.
    pub fn contains(&self, entity: &EntityType) -> bool {
        self.tables.contains_key(entity)
    }

    /// Table of `entity`.
    pub fn get(&self, entity: &EntityType) -> Result<&Feature> {
        self.tables.get(entity).ok_or_else(|| entity.missing())
    }

    /// Registered entities.
    pub fn entities(&self) -> impl Iterator<Item = &EntityType> {
        self.tables.keys()
    }

    /// Gather rows for `ids` of `entity`, in order.
    pub async fn lookup(
        &self,
        entity: &EntityType,
        ids: &[GlobalId],
        device: usize,
    ) -> Result<Array2<f32>> {
        self.get(entity)?.lookup(ids, device).await
    }

    /// Gather rows for `ids` of `entity`, failing after `timeout`.
    pub async fn lookup_within(
        &self,
        entity: &EntityType,
        ids: &[GlobalId],
        device: usize,
        timeout: Duration,
    ) -> Result<Array2<f32>> {
        self.get(entity)?.lookup_within(ids, device, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Id2Idx;

    fn store() -> FeatureStore {
        let user = Feature::builder(Array2::zeros((4, 8)), Id2Idx::identity(4))
            .build()
            .unwrap();
        let buys = Feature::builder(Array2::ones((3, 2)), Id2Idx::from_ids(&[10, 11, 12]).unwrap())
            .build()
            .unwrap();
        FeatureStore::new()
            .with_node("user", user)
            .with_edge(EdgeType::new("user", "buys", "item"), buys)
    }

    #[tokio::test]
    async fn test_store_dispatch() {
        let store = store();
        assert_eq!(store.len(), 2);

        let user = EntityType::Node("user".into());
        let x = store.lookup(&user, &[3, 1], 0).await.unwrap();
        assert_eq!(x.dim(), (2, 8));

        let buys = EntityType::Edge(EdgeType::new("user", "buys", "item"));
        let e = store.lookup(&buys, &[12], 0).await.unwrap();
        assert_eq!(e.dim(), (1, 2));
        assert_eq!(store.get(&buys).unwrap().entity(), "edge (user, buys, item)");
    }

    #[tokio::test]
    async fn test_store_missing_tables() {
        let store = store();
        assert!(matches!(
            store.lookup(&EntityType::Node("item".into()), &[0], 0).await,
            Err(Error::UnknownNodeType(_))
        ));
        assert!(matches!(
            store
                .lookup(&EntityType::Edge(EdgeType::new("a", "b", "c")), &[0], 0)
                .await,
            Err(Error::UnknownEdgeType(_))
        ));
        assert!(matches!(
            store.lookup(&EntityType::Node("user".into()), &[4], 0).await,
            Err(Error::UnknownEntity { id: 4, .. })
        ));
    }
}
