//! Row backings for feature tables.
//!
//! Every placement implements the same capability, [`RowSource::fetch`],
//! so feature logic stays placement-agnostic:
//!
//! - [`DeviceRows`] - a copy resident on one device (hot replicas)
//! - [`ZeroCopyRows`] - shared host memory, no per-reader copy
//! - [`PartitionedRows`] - contiguous row ranges spread over partitions,
//!   each itself a `RowSource` (local or remote)

use async_trait::async_trait;
use futures::future::try_join_all;
use ndarray::{Array2, Axis};
use std::fmt;
use std::sync::Arc;

use crate::placement::Placement;
use crate::{Error, Result};

/// Something that can return dense rows by row index.
#[async_trait]
pub trait RowSource: Send + Sync + fmt::Debug {
    /// Where the rows live.
    fn placement(&self) -> Placement;

    /// Number of rows held.
    fn num_rows(&self) -> usize;

    /// Row width.
    fn dim(&self) -> usize;

    /// Gather `rows` in order. The result has shape `(rows.len(), dim)`.
    async fn fetch(&self, rows: &[usize]) -> Result<Array2<f32>>;
}

fn gather(data: &Array2<f32>, rows: &[usize]) -> Result<Array2<f32>> {
    if let Some(&bad) = rows.iter().find(|&&r| r >= data.nrows()) {
        return Err(Error::InvalidInput(format!(
            "row {bad} out of range for a backing of {} rows",
            data.nrows()
        )));
    }
    Ok(data.select(Axis(0), rows))
}

/// Reject a fetched block whose shape is not `(rows, dim)`.
pub(crate) fn check_block(block: &Array2<f32>, rows: usize, dim: usize) -> Result<()> {
    if block.dim() != (rows, dim) {
        return Err(Error::InvalidInput(format!(
            "backing returned a {}x{} block for {rows} rows of width {dim}",
            block.nrows(),
            block.ncols()
        )));
    }
    Ok(())
}

/// Rows resident on a single device.
#[derive(Debug, Clone)]
pub struct DeviceRows {
    device: usize,
    data: Array2<f32>,
}

impl DeviceRows {
    /// Place `data` on `device`.
    pub fn new(device: usize, data: Array2<f32>) -> Self {
        Self { device, data }
    }
}

#[async_trait]
impl RowSource for DeviceRows {
    fn placement(&self) -> Placement {
        Placement::Resident {
            device: self.device,
        }
    }

    fn num_rows(&self) -> usize {
        self.data.nrows()
    }

    fn dim(&self) -> usize {
        self.data.ncols()
    }

    async fn fetch(&self, rows: &[usize]) -> Result<Array2<f32>> {
        gather(&self.data, rows)
    }
}

/// Host rows shared by every reader without copying.
#[derive(Debug, Clone)]
pub struct ZeroCopyRows {
    data: Arc<Array2<f32>>,
}

impl ZeroCopyRows {
    /// Share `data`.
    pub fn new(data: impl Into<Arc<Array2<f32>>>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl RowSource for ZeroCopyRows {
    fn placement(&self) -> Placement {
        Placement::ZeroCopy
    }

    fn num_rows(&self) -> usize {
        self.data.nrows()
    }

    fn dim(&self) -> usize {
        self.data.ncols()
    }

    async fn fetch(&self, rows: &[usize]) -> Result<Array2<f32>> {
        gather(&self.data, rows)
    }
}

/// Rows split into contiguous ranges, one per partition.
///
/// A fetch touching several partitions issues one request per partition and
/// awaits them together.
#[derive(Debug, Clone)]
pub struct PartitionedRows {
    parts: Vec<Arc<dyn RowSource>>,
    /// `offsets[p]` is the first global row of partition `p`;
    /// the last entry is the total row count.
    offsets: Vec<usize>,
    dim: usize,
}

impl PartitionedRows {
    /// Concatenate partitions in order.
    pub fn new(parts: Vec<Arc<dyn RowSource>>) -> Result<Self> {
        let dim = match parts.first() {
            Some(p) => p.dim(),
            None => {
                return Err(Error::InvalidConfig(
                    "a partitioned backing needs at least one partition".to_string(),
                ))
            }
        };
        let mut offsets = Vec::with_capacity(parts.len() + 1);
        offsets.push(0);
        for p in &parts {
            if p.dim() != dim {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    actual: p.dim(),
                });
            }
            offsets.push(offsets[offsets.len() - 1] + p.num_rows());
        }
        Ok(Self { parts, offsets, dim })
    }

    /// Split `data` into `num_partitions` near-equal host partitions.
    pub fn split(data: Array2<f32>, num_partitions: usize) -> Result<Self> {
        if num_partitions == 0 {
            return Err(Error::InvalidConfig(
                "num_partitions must be positive".to_string(),
            ));
        }
        let dim = data.ncols();
        let chunk = data.nrows().div_ceil(num_partitions).max(1);
        let mut parts: Vec<Arc<dyn RowSource>> = data
            .axis_chunks_iter(Axis(0), chunk)
            .map(|c| Arc::new(ZeroCopyRows::new(c.to_owned())) as Arc<dyn RowSource>)
            .collect();
        while parts.len() < num_partitions {
            parts.push(Arc::new(ZeroCopyRows::new(Array2::zeros((0, dim)))));
        }
        Self::new(parts)
    }

    /// Number of partitions.
    pub fn num_partitions(&self) -> usize {
        self.parts.len()
    }

    fn locate(&self, row: usize) -> Result<(usize, usize)> {
        if row >= self.num_rows() {
            return Err(Error::InvalidInput(format!(
                "row {row} out of range for a backing of {} rows",
                self.num_rows()
            )));
        }
        // Last partition whose first row is <= row; skips empty partitions.
        let p = self.offsets.partition_point(|&o| o <= row) - 1;
        Ok((p, row - self.offsets[p]))
    }
}

#[async_trait]
impl RowSource for PartitionedRows {
    fn placement(&self) -> Placement {
        Placement::Partitioned {
            num_partitions: self.parts.len(),
        }
    }

    fn num_rows(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn fetch(&self, rows: &[usize]) -> Result<Array2<f32>> {
        // (output position, row within partition) per partition
        let mut requests: Vec<Vec<(usize, usize)>> = vec![Vec::new(); self.parts.len()];
        for (pos, &row) in rows.iter().enumerate() {
            let (p, local) = self.locate(row)?;
            requests[p].push((pos, local));
        }

        let pending = requests
            .iter()
            .enumerate()
            .filter(|(_, req)| !req.is_empty())
            .map(|(p, req)| async move {
                let local: Vec<usize> = req.iter().map(|&(_, r)| r).collect();
                let block = self.parts[p].fetch(&local).await?;
                check_block(&block, local.len(), self.dim)?;
                Ok::<_, Error>((p, block))
            });
        let blocks = try_join_all(pending).await?;

        let mut out = Array2::zeros((rows.len(), self.dim));
        for (p, block) in blocks {
            for (k, &(pos, _)) in requests[p].iter().enumerate() {
                out.row_mut(pos).assign(&block.row(k));
            }
        }
        Ok(out)
    }
}
