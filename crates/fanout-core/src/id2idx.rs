//! GlobalID to row-index mapping for feature tables.

use std::collections::{HashMap, HashSet};

use crate::{Error, GlobalId, Result};

/// Sparse maps are used when a dense table would waste more than this many
/// slots per registered ID.
const DENSE_SLACK: usize = 4;

/// Total, injective map from registered GlobalIDs to table rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Id2Idx(Repr);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Repr {
    /// `rows[id]` is the row of `id`, `None` when unregistered.
    Dense(Vec<Option<usize>>),
    /// Hash map for sparse ID spaces.
    Sparse(HashMap<GlobalId, usize>),
}

impl Id2Idx {
    /// Map `ids[k]` to row `k`.
    ///
    /// Picks a dense table when IDs are compact. Duplicate IDs are rejected.
    pub fn from_ids(ids: &[GlobalId]) -> Result<Self> {
        let pairs: Vec<(GlobalId, usize)> = ids.iter().copied().zip(0..).collect();
        Self::from_pairs(&pairs)
    }

    /// Map each `(id, row)` pair.
    ///
    /// Fails with [`Error::DuplicateId`] when an ID repeats and with
    /// [`Error::InvalidInput`] when two IDs share a row.
    pub fn from_pairs(pairs: &[(GlobalId, usize)]) -> Result<Self> {
        let mut taken = HashSet::with_capacity(pairs.len());
        for &(id, row) in pairs {
            if !taken.insert(row) {
                return Err(Error::InvalidInput(format!(
                    "row {row} is mapped by more than one id (second: {id})"
                )));
            }
        }

        // None when the dense table would need more than usize::MAX slots.
        let span = pairs.iter().map(|&(id, _)| id).max().map_or(Some(0), |m| {
            usize::try_from(m).ok().and_then(|m| m.checked_add(1))
        });
        let limit = pairs.len().saturating_mul(DENSE_SLACK).max(64);

        match span {
            Some(span) if span <= limit => {
                let mut rows = vec![None; span];
                for &(id, row) in pairs {
                    let slot = &mut rows[id as usize];
                    if slot.is_some() {
                        return Err(Error::DuplicateId(id));
                    }
                    *slot = Some(row);
                }
                Ok(Self(Repr::Dense(rows)))
            }
            _ => {
                let mut map = HashMap::with_capacity(pairs.len());
                for &(id, row) in pairs {
                    if map.insert(id, row).is_some() {
                        return Err(Error::DuplicateId(id));
                    }
                }
                Ok(Self(Repr::Sparse(map)))
            }
        }
    }

    /// Identity mapping over `0..n`.
    pub fn identity(n: usize) -> Self {
        Self(Repr::Dense((0..n).map(Some).collect()))
    }

    /// Row of `id`, if registered.
    pub fn get(&self, id: GlobalId) -> Option<usize> {
        match &self.0 {
            Repr::Dense(rows) => usize::try_from(id)
                .ok()
                .and_then(|i| rows.get(i).copied().flatten()),
            Repr::Sparse(map) => map.get(&id).copied(),
        }
    }

    /// Number of registered IDs.
    pub fn len(&self) -> usize {
        match &self.0 {
            Repr::Dense(rows) => rows.iter().filter(|r| r.is_some()).count(),
            Repr::Sparse(map) => map.len(),
        }
    }

    /// Whether no ID is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest row referenced.
    pub fn max_row(&self) -> Option<usize> {
        match &self.0 {
            Repr::Dense(rows) => rows.iter().flatten().copied().max(),
            Repr::Sparse(map) => map.values().copied().max(),
        }
    }
}
