//! Compressed sparse row topology for one edge type.
//!
//! ```text
//! row_ptr     = [0, 2, 2, 3]        # 3 source nodes
//! col_indices = [1, 2, | | 0]       # node 0 -> {1, 2}, node 1 -> {}, node 2 -> {0}
//! edge_ids    = [7, 8, | | 9]
//! ```
//!
//! `col_indices[row_ptr[i]..row_ptr[i + 1]]` are exactly node `i`'s
//! out-neighbors, so degree lookup is O(1) and enumeration O(degree).
//! Each row is kept sorted by destination so membership tests are
//! logarithmic; edge IDs travel with their destinations.

use crate::placement::Placement;
use crate::{Error, GlobalId, Result};

/// CSR adjacency of one edge type. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrTopology {
    row_ptr: Vec<usize>,
    col_indices: Vec<GlobalId>,
    edge_ids: Vec<GlobalId>,
    placement: Placement,
}

impl CsrTopology {
    /// Build from raw CSR arrays.
    ///
    /// Validates the row pointer invariants and sorts every row by
    /// destination.
    pub fn new(
        row_ptr: Vec<usize>,
        col_indices: Vec<GlobalId>,
        edge_ids: Vec<GlobalId>,
    ) -> Result<Self> {
        if row_ptr.first() != Some(&0) {
            return Err(Error::InvalidTopology(
                "row_ptr must start with 0".to_string(),
            ));
        }
        if row_ptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::InvalidTopology(
                "row_ptr must be non-decreasing".to_string(),
            ));
        }
        let last = row_ptr[row_ptr.len() - 1];
        if last != col_indices.len() {
            return Err(Error::InvalidTopology(format!(
                "row_ptr ends at {last} but there are {} column indices",
                col_indices.len()
            )));
        }
        if edge_ids.len() != col_indices.len() {
            return Err(Error::InvalidTopology(format!(
                "{} edge ids for {} column indices",
                edge_ids.len(),
                col_indices.len()
            )));
        }

        let mut topo = Self {
            row_ptr,
            col_indices,
            edge_ids,
            placement: Placement::default(),
        };
        topo.sort_rows();
        Ok(topo)
    }

    /// Build from a COO edge index (`rows[k] -> cols[k]`).
    ///
    /// Edge IDs default to the position of each edge in the input. The
    /// number of source nodes is `max(rows) + 1`; use
    /// [`HeteroGraph::builder`](crate::HeteroGraph::builder) to declare more.
    pub fn from_edge_index(
        rows: &[GlobalId],
        cols: &[GlobalId],
        edge_ids: Option<&[GlobalId]>,
    ) -> Result<Self> {
        if rows.len() != cols.len() {
            return Err(Error::InvalidTopology(format!(
                "edge index rows ({}) and cols ({}) differ in length",
                rows.len(),
                cols.len()
            )));
        }
        if let Some(eids) = edge_ids {
            if eids.len() != rows.len() {
                return Err(Error::InvalidTopology(format!(
                    "{} edge ids for {} edges",
                    eids.len(),
                    rows.len()
                )));
            }
        }

        let num_nodes = rows.iter().max().map_or(0, |&m| m as usize + 1);
        let mut row_ptr = vec![0usize; num_nodes + 1];
        for &r in rows {
            row_ptr[r as usize + 1] += 1;
        }
        for i in 1..=num_nodes {
            row_ptr[i] += row_ptr[i - 1];
        }

        // Stable counting sort by source.
        let mut cursor = row_ptr.clone();
        let mut col_indices = vec![0; rows.len()];
        let mut out_eids = vec![0; rows.len()];
        for (k, (&r, &c)) in rows.iter().zip(cols).enumerate() {
            let slot = &mut cursor[r as usize];
            col_indices[*slot] = c;
            out_eids[*slot] = edge_ids.map_or(k as GlobalId, |e| e[k]);
            *slot += 1;
        }

        Self::new(row_ptr, col_indices, out_eids)
    }

    /// Attach a placement mode.
    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// Where the backing arrays live.
    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Number of source nodes (rows).
    pub fn num_nodes(&self) -> usize {
        self.row_ptr.len() - 1
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.col_indices.len()
    }

    /// Row pointer array.
    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    /// Destination IDs, grouped by source.
    pub fn col_indices(&self) -> &[GlobalId] {
        &self.col_indices
    }

    /// Edge IDs aligned with [`col_indices`](Self::col_indices).
    pub fn edge_ids(&self) -> &[GlobalId] {
        &self.edge_ids
    }

    /// Largest destination ID, if any edge exists.
    pub fn max_destination(&self) -> Option<GlobalId> {
        self.col_indices.iter().copied().max()
    }

    /// Largest out-degree.
    pub fn max_degree(&self) -> usize {
        self.row_ptr
            .windows(2)
            .map(|w| w[1] - w[0])
            .max()
            .unwrap_or(0)
    }

    /// Out-degree of `node`, or `None` when out of range.
    pub fn degree(&self, node: GlobalId) -> Option<usize> {
        self.neighbors(node).map(|n| n.len())
    }

    /// Out-neighbors of `node`, or `None` when out of range.
    pub fn neighbors(&self, node: GlobalId) -> Option<Neighbors<'_>> {
        let i = usize::try_from(node).ok()?;
        if i >= self.num_nodes() {
            return None;
        }
        let (start, end) = (self.row_ptr[i], self.row_ptr[i + 1]);
        Some(Neighbors {
            dst: &self.col_indices[start..end],
            edge_ids: &self.edge_ids[start..end],
        })
    }

    /// Whether `src -> dst` is an edge.
    pub fn has_edge(&self, src: GlobalId, dst: GlobalId) -> bool {
        self.neighbors(src)
            .is_some_and(|n| n.dst.binary_search(&dst).is_ok())
    }

    /// Extend with empty rows up to `num_nodes` sources.
    pub(crate) fn pad_to(&mut self, num_nodes: usize) {
        let last = self.num_edges();
        while self.num_nodes() < num_nodes {
            self.row_ptr.push(last);
        }
    }

    fn sort_rows(&mut self) {
        for i in 0..self.num_nodes() {
            let (start, end) = (self.row_ptr[i], self.row_ptr[i + 1]);
            let cols = &self.col_indices[start..end];
            if cols.windows(2).all(|w| w[0] <= w[1]) {
                continue;
            }
            let mut pairs: Vec<(GlobalId, GlobalId)> = cols
                .iter()
                .copied()
                .zip(self.edge_ids[start..end].iter().copied())
                .collect();
            pairs.sort_unstable();
            for (k, (c, e)) in pairs.into_iter().enumerate() {
                self.col_indices[start + k] = c;
                self.edge_ids[start + k] = e;
            }
        }
    }
}

/// Borrowed neighbor list of one node.
#[derive(Debug, Clone, Copy)]
pub struct Neighbors<'a> {
    /// Destination IDs, sorted ascending.
    pub dst: &'a [GlobalId],
    /// Edge IDs aligned with `dst`.
    pub edge_ids: &'a [GlobalId],
}

impl<'a> Neighbors<'a> {
    /// Degree.
    pub fn len(&self) -> usize {
        self.dst.len()
    }

    /// Whether the node has no out-neighbors.
    pub fn is_empty(&self) -> bool {
        self.dst.is_empty()
    }

    /// The `k`-th `(dst, edge_id)` pair.
    pub fn get(&self, k: usize) -> (GlobalId, GlobalId) {
        (self.dst[k], self.edge_ids[k])
    }

    /// Iterate `(dst, edge_id)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (GlobalId, GlobalId)> + 'a {
        self.dst
            .iter()
            .copied()
            .zip(self.edge_ids.iter().copied())
    }
}
