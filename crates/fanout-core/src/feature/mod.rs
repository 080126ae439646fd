//! Feature tables with a hot/cold split.
//!
//! A [`Feature`] holds a dense `(count, dim)` matrix for one node or edge
//! type plus an [`Id2Idx`] map from GlobalID to row. The first
//! `floor(split_ratio * count)` rows are *hot*: copied once per
//! [`DeviceGroup`] onto that group's home device. The remainder is *cold*
//! and lives behind a zero-copy or partitioned backing.
//!
//! ```text
//!            rows 0 .. hot           rows hot .. count
//!   group 0: [DeviceRows replica]  \
//!   group 1: [DeviceRows replica]   >  cold: ZeroCopyRows | PartitionedRows
//!   ...                            /
//! ```
//!
//! Lookups resolve each ID against the caller's group replica first, then
//! the cold backing; both fetches run concurrently and the result is
//! scattered back into input order.

mod source;
mod store;

pub use source::{DeviceRows, PartitionedRows, RowSource, ZeroCopyRows};
pub use store::{EntityType, FeatureStore};

use ndarray::{s, Array2};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::id2idx::Id2Idx;
use crate::placement::{DeviceGroup, Placement};
use crate::{Error, GlobalId, Result};

/// A feature table for one node type or edge type.
#[derive(Debug, Clone)]
pub struct Feature {
    entity: String,
    id2idx: Id2Idx,
    num_rows: usize,
    dim: usize,
    hot_rows: usize,
    groups: Vec<DeviceGroup>,
    replicas: HashMap<usize, Arc<dyn RowSource>>,
    cold: Arc<dyn RowSource>,
}

impl Feature {
    /// Start building a table from a dense matrix and its ID map.
    pub fn builder(data: Array2<f32>, id2idx: Id2Idx) -> FeatureBuilder {
        FeatureBuilder {
            data,
            id2idx,
            split_ratio: 0.0,
            device_groups: Vec::new(),
            cold_placement: Placement::ZeroCopy,
            cold_source: None,
        }
    }

    /// Name used in errors and logs.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub(crate) fn set_entity(&mut self, entity: String) {
        self.entity = entity;
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Row width.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of hot (replicated) rows.
    pub fn hot_rows(&self) -> usize {
        self.hot_rows
    }

    /// Placement of the cold backing.
    pub fn cold_placement(&self) -> Placement {
        self.cold.placement()
    }

    /// The ID map.
    pub fn id2idx(&self) -> &Id2Idx {
        &self.id2idx
    }

    /// Whether `id` has a row.
    pub fn contains(&self, id: GlobalId) -> bool {
        self.id2idx.get(id).is_some()
    }

    /// Hot replica serving `device`.
    fn replica_for(&self, device: usize) -> Result<&Arc<dyn RowSource>> {
        self.groups
            .iter()
            .find(|g| g.contains(device))
            .and_then(|g| self.replicas.get(&g.group_id))
            .ok_or(Error::NoReplica(device))
    }

    /// Gather the rows of `ids`, in order, as seen from `device`.
    ///
    /// Fails with [`Error::UnknownEntity`] on the first unregistered ID.
    pub async fn lookup(&self, ids: &[GlobalId], device: usize) -> Result<Array2<f32>> {
        let mut hot: (Vec<usize>, Vec<usize>) = (Vec::new(), Vec::new());
        let mut cold: (Vec<usize>, Vec<usize>) = (Vec::new(), Vec::new());
        for (pos, &id) in ids.iter().enumerate() {
            let row = self.id2idx.get(id).ok_or_else(|| Error::UnknownEntity {
                entity: self.entity.clone(),
                id,
            })?;
            if row < self.hot_rows {
                hot.0.push(pos);
                hot.1.push(row);
            } else {
                cold.0.push(pos);
                cold.1.push(row - self.hot_rows);
            }
        }

        let replica = if hot.1.is_empty() {
            None
        } else {
            Some(self.replica_for(device)?)
        };
        debug!(
            entity = %self.entity,
            hot = hot.1.len(),
            cold = cold.1.len(),
            device,
            "feature lookup"
        );

        let (hot_block, cold_block) = tokio::try_join!(
            fetch_rows(replica, &hot.1, self.dim),
            fetch_rows(Some(&self.cold), &cold.1, self.dim),
        )?;

        let mut out = Array2::zeros((ids.len(), self.dim));
        for (block, positions) in [(&hot_block, &hot.0), (&cold_block, &cold.0)] {
            for (k, &pos) in positions.iter().enumerate() {
                out.row_mut(pos).assign(&block.row(k));
            }
        }
        Ok(out)
    }

    /// [`lookup`](Self::lookup) bounded by a deadline.
    ///
    /// On expiry the pending fetches are dropped and
    /// [`Error::FeatureLookupTimeout`] is returned; no partial matrix escapes.
    pub async fn lookup_within(
        &self,
        ids: &[GlobalId],
        device: usize,
        timeout: Duration,
    ) -> Result<Array2<f32>> {
        match tokio::time::timeout(timeout, self.lookup(ids, device)).await {
            Ok(res) => res,
            Err(_) => Err(Error::FeatureLookupTimeout {
                entity: self.entity.clone(),
                timeout,
            }),
        }
    }
}

async fn fetch_rows(
    source: Option<&Arc<dyn RowSource>>,
    rows: &[usize],
    dim: usize,
) -> Result<Array2<f32>> {
    match source {
        Some(src) if !rows.is_empty() => {
            let block = src.fetch(rows).await?;
            source::check_block(&block, rows.len(), dim)?;
            Ok(block)
        }
        _ => Ok(Array2::zeros((0, dim))),
    }
}

/// Builder for [`Feature`].
#[derive(Debug)]
pub struct FeatureBuilder {
    data: Array2<f32>,
    id2idx: Id2Idx,
    split_ratio: f64,
    device_groups: Vec<DeviceGroup>,
    cold_placement: Placement,
    cold_source: Option<Arc<dyn RowSource>>,
}

impl FeatureBuilder {
    /// Fraction of rows (from the top) to replicate per device group.
    pub fn split_ratio(mut self, ratio: f64) -> Self {
        self.split_ratio = ratio;
        self
    }

    /// Device groups that each receive a hot replica.
    pub fn device_groups(mut self, groups: Vec<DeviceGroup>) -> Self {
        self.device_groups = groups;
        self
    }

    /// Placement of the cold rows.
    pub fn cold_placement(mut self, placement: Placement) -> Self {
        self.cold_placement = placement;
        self
    }

    /// Serve the cold rows from an existing backing (e.g. a remote client).
    ///
    /// It must hold exactly the rows below the hot split, in order.
    pub fn cold_source(mut self, source: Arc<dyn RowSource>) -> Self {
        self.cold_source = Some(source);
        self
    }

    /// Validate, split and place the table.
    pub fn build(self) -> Result<Feature> {
        if !(0.0..=1.0).contains(&self.split_ratio) {
            return Err(Error::InvalidConfig(format!(
                "split_ratio {} outside [0, 1]",
                self.split_ratio
            )));
        }
        let (num_rows, dim) = self.data.dim();
        if let Some(max) = self.id2idx.max_row() {
            if max >= num_rows {
                return Err(Error::InvalidConfig(format!(
                    "id2idx references row {max} of a {num_rows}-row table"
                )));
            }
        }

        let hot_rows = (self.split_ratio * num_rows as f64).floor() as usize;
        if hot_rows > 0 && self.device_groups.is_empty() {
            return Err(Error::InvalidConfig(
                "hot rows need at least one device group".to_string(),
            ));
        }

        let mut replicas: HashMap<usize, Arc<dyn RowSource>> = HashMap::new();
        if hot_rows > 0 {
            let hot = self.data.slice(s![..hot_rows, ..]);
            for group in &self.device_groups {
                let device = group.home_device().ok_or_else(|| {
                    Error::InvalidConfig(format!("device group {} is empty", group.group_id))
                })?;
                replicas.insert(group.group_id, Arc::new(DeviceRows::new(device, hot.to_owned())));
            }
        }

        let cold: Arc<dyn RowSource> = match self.cold_source {
            Some(src) => {
                if src.num_rows() != num_rows - hot_rows {
                    return Err(Error::InvalidConfig(format!(
                        "cold backing holds {} rows, expected {}",
                        src.num_rows(),
                        num_rows - hot_rows
                    )));
                }
                if src.dim() != dim {
                    return Err(Error::DimensionMismatch {
                        expected: dim,
                        actual: src.dim(),
                    });
                }
                src
            }
            None => {
                let rest = self.data.slice(s![hot_rows.., ..]).to_owned();
                match self.cold_placement {
                    Placement::ZeroCopy => Arc::new(ZeroCopyRows::new(rest)),
                    Placement::Resident { device } => Arc::new(DeviceRows::new(device, rest)),
                    Placement::Partitioned { num_partitions } => {
                        Arc::new(PartitionedRows::split(rest, num_partitions)?)
                    }
                }
            }
        };

        Ok(Feature {
            entity: "feature".to_string(),
            id2idx: self.id2idx,
            num_rows,
            dim,
            hot_rows,
            groups: self.device_groups,
            replicas,
            cold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn table(n: usize, dim: usize) -> Array2<f32> {
        Array2::from_shape_fn((n, dim), |(r, c)| (r * 100 + c) as f32)
    }

    fn groups() -> Vec<DeviceGroup> {
        vec![DeviceGroup::new(0, [0, 1]), DeviceGroup::new(1, [2])]
    }

    #[tokio::test]
    async fn test_lookup_preserves_input_order_across_hot_and_cold() {
        let ids: Vec<GlobalId> = (0..10).map(|i| 100 + i).collect();
        let feature = Feature::builder(table(10, 3), Id2Idx::from_ids(&ids).unwrap())
            .split_ratio(0.3)
            .device_groups(groups())
            .build()
            .unwrap();
        assert_eq!(feature.hot_rows(), 3);

        let query = [109, 100, 105, 102, 102];
        let out = feature.lookup(&query, 1).await.unwrap();
        for (k, &id) in query.iter().enumerate() {
            let row = (id - 100) as f32;
            assert_eq!(out[[k, 0]], row * 100.0);
            assert_eq!(out[[k, 2]], row * 100.0 + 2.0);
        }
    }

    #[tokio::test]
    async fn test_every_group_sees_same_rows() {
        let feature = Feature::builder(table(5, 2), Id2Idx::identity(5))
            .split_ratio(1.0)
            .device_groups(groups())
            .build()
            .unwrap();
        let a = feature.lookup(&[4, 0], 0).await.unwrap();
        let b = feature.lookup(&[4, 0], 2).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_unknown_id_and_missing_replica() {
        let feature = Feature::builder(table(4, 2), Id2Idx::identity(4))
            .split_ratio(0.5)
            .device_groups(groups())
            .build()
            .unwrap();
        assert!(matches!(
            feature.lookup(&[1, 9], 0).await,
            Err(Error::UnknownEntity { id: 9, .. })
        ));
        // hot row requested from a device outside every group
        assert!(matches!(
            feature.lookup(&[0], 7).await,
            Err(Error::NoReplica(7))
        ));
        // cold-only requests need no replica
        assert_eq!(feature.lookup(&[3], 7).await.unwrap().nrows(), 1);
    }

    #[tokio::test]
    async fn test_partitioned_cold_rows() {
        let feature = Feature::builder(table(9, 2), Id2Idx::identity(9))
            .split_ratio(0.2)
            .device_groups(groups())
            .cold_placement(Placement::Partitioned { num_partitions: 3 })
            .build()
            .unwrap();
        assert_eq!(feature.cold_placement(), Placement::Partitioned { num_partitions: 3 });
        let out = feature.lookup(&[8, 0, 4], 0).await.unwrap();
        assert_eq!(out.column(0).to_vec(), vec![800.0, 0.0, 400.0]);
    }

    #[test]
    fn test_builder_validation() {
        assert!(Feature::builder(table(4, 2), Id2Idx::identity(4))
            .split_ratio(1.5)
            .build()
            .is_err());
        assert!(Feature::builder(table(4, 2), Id2Idx::identity(5))
            .build()
            .is_err());
        assert!(Feature::builder(table(4, 2), Id2Idx::identity(4))
            .split_ratio(0.5)
            .build()
            .is_err());
        assert!(Feature::builder(table(4, 2), Id2Idx::identity(4))
            .split_ratio(0.5)
            .device_groups(vec![DeviceGroup::new(0, Vec::<usize>::new())])
            .build()
            .is_err());
    }

    #[derive(Debug)]
    struct StalledRows {
        dim: usize,
        rows: usize,
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
        async fn fetch(&self, rows: &[usize]) -> Result<Array2<f32>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Array2::zeros((rows.len(), self.dim)))
        }
    }

    #[derive(Debug)]
    struct ShortRows {
        dim: usize,
        rows: usize,
    }

    #[async_trait]
    impl RowSource for ShortRows {
        fn placement(&self) -> Placement {
            Placement::ZeroCopy
        }
        fn num_rows(&self) -> usize {
            self.rows
        }
        fn dim(&self) -> usize {
            self.dim
        }
        async fn fetch(&self, _rows: &[usize]) -> Result<Array2<f32>> {
            Ok(Array2::zeros((0, self.dim)))
        }
    }

    #[tokio::test]
    async fn test_short_cold_block_is_an_error() {
        let feature = Feature::builder(table(4, 2), Id2Idx::identity(4))
            .split_ratio(0.5)
            .device_groups(groups())
            .cold_source(Arc::new(ShortRows { dim: 2, rows: 2 }))
            .build()
            .unwrap();

        assert_eq!(feature.lookup(&[1, 0], 0).await.unwrap().nrows(), 2);
        assert!(matches!(
            feature.lookup(&[0, 3], 0).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_timeout_surfaces_error() {
        let feature = Feature::builder(table(4, 2), Id2Idx::identity(4))
            .split_ratio(0.5)
            .device_groups(groups())
            .cold_source(Arc::new(StalledRows { dim: 2, rows: 2 }))
            .build()
            .unwrap();

        // hot rows only: no stall
        let hot = feature
            .lookup_within(&[0, 1], 0, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(hot.nrows(), 2);

        let res = feature
            .lookup_within(&[0, 3], 0, Duration::from_millis(50))
            .await;
        assert!(matches!(res, Err(Error::FeatureLookupTimeout { .. })));
    }
}
