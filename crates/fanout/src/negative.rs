//! Negative sampling for link prediction.
//!
//! A negative for a seed pair `(row, col)` keeps `row` and replaces `col`
//! with a uniformly drawn destination that is not a true neighbor of `row`.
//! Rejection is bounded: after `max_attempts` adjacent draws the sampler
//! settles for the last draw that at least differs from `col` and records
//! the candidate as exhausted.

use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use fanout_core::{CsrTopology, Error, GlobalId, Result};

/// Counters shared by every request of a sampler.
#[derive(Debug, Default)]
pub struct NegativeStats {
    drawn: AtomicU64,
    exhausted: AtomicU64,
}

impl NegativeStats {
    /// Negative candidates produced.
    pub fn drawn(&self) -> u64 {
        self.drawn.load(Ordering::Relaxed)
    }

    /// Candidates that fell back after exhausting their attempts.
    pub fn exhausted(&self) -> u64 {
        self.exhausted.load(Ordering::Relaxed)
    }
}

/// Rejection sampler over one edge type.
#[derive(Debug)]
pub struct NegativeSampler<'a> {
    topology: &'a CsrTopology,
    num_dst: usize,
    max_attempts: usize,
    stats: &'a NegativeStats,
}

impl<'a> NegativeSampler<'a> {
    /// Sampler drawing destinations from `0..num_dst`.
    pub fn new(
        topology: &'a CsrTopology,
        num_dst: usize,
        max_attempts: usize,
        stats: &'a NegativeStats,
    ) -> Result<Self> {
        if num_dst == 0 {
            return Err(Error::InvalidInput(
                "no destination nodes to draw negatives from".to_string(),
            ));
        }
        Ok(Self {
            topology,
            num_dst,
            max_attempts: max_attempts.max(1),
            stats,
        })
    }

    /// One candidate for `src`; the flag is true when attempts ran out.
    fn draw<R: Rng>(&self, src: GlobalId, positive: GlobalId, rng: &mut R) -> (GlobalId, bool) {
        let mut fallback = None;
        let mut last = positive;
        for _ in 0..self.max_attempts {
            let candidate = rng.gen_range(0..self.num_dst as u64);
            if !self.topology.has_edge(src, candidate) {
                return (candidate, false);
            }
            if candidate != positive {
                fallback = Some(candidate);
            }
            last = candidate;
        }
        debug!(src, positive, attempts = self.max_attempts, "negative sampling exhausted");
        (fallback.unwrap_or(last), true)
    }

    /// One negative destination per seed pair.
    pub fn binary<R: Rng>(&self, rows: &[GlobalId], cols: &[GlobalId], rng: &mut R) -> Vec<GlobalId> {
        self.triplet(rows, cols, 1, rng)
    }

    /// `amount` negative destinations per seed pair, row-major.
    pub fn triplet<R: Rng>(
        &self,
        rows: &[GlobalId],
        cols: &[GlobalId],
        amount: usize,
        rng: &mut R,
    ) -> Vec<GlobalId> {
        let mut out = Vec::with_capacity(rows.len() * amount);
        let mut exhausted = 0u64;
        for (&src, &positive) in rows.iter().zip(cols) {
            for _ in 0..amount {
                let (dst, spent) = self.draw(src, positive, rng);
                exhausted += u64::from(spent);
                out.push(dst);
            }
        }

        self.stats.drawn.fetch_add(out.len() as u64, Ordering::Relaxed);
        if exhausted > 0 {
            self.stats.exhausted.fetch_add(exhausted, Ordering::Relaxed);
            warn!(
                exhausted,
                drawn = out.len(),
                "some negatives may be true neighbors"
            );
        }
        out
    }
}
