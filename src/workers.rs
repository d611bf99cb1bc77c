// Copyright 2014-2016 Johannes Köster, Taylor Cramer.
// Licensed under the MIT license (http://opensource.org/licenses/MIT)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! The worker decomposition layer (spec §4.I/§5): partitions the seed ID
//! space across a fixed-size thread pool, gives each thread its own
//! [`UnitigExtender`]/[`UnambiguousJoiner`] with private scratch state, and
//! merges the per-thread accumulators with atomic adds at the end.

use crate::bitset::AtomicBitset;
use crate::config::AssemblerConfig;
use crate::error::Error;
use crate::graph::Node;
use crate::index::IndexOracle;
use crate::joiner::{JoinRecord, JoinerStats, UnambiguousJoiner};
use crate::unitig::{UnitigExtender, UnitigOutcome};
use anyhow::Context;
use std::sync::atomic::{AtomicU64, Ordering};

/// Builds a dedicated rayon pool, wrapping the `ThreadPoolBuildError` in
/// `anyhow` so both worker entry points can report it through one
/// `Error::Config` conversion instead of a second error variant.
fn build_pool(n_threads: usize, purpose: &str) -> Result<rayon::ThreadPool, Error> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build()
        .with_context(|| format!("failed to build {} thread pool", purpose))
        .map_err(|e| Error::Config(format!("{:#}", e)))
}

/// Merged insert-size accumulator (fermi's static `g_n`/`g_sum`/`g_sum2`/
/// `g_unpaired`, spec §5's "Global counters" row), plain `AtomicU64` fields
/// so per-thread results can be folded in with `fetch_add` as each worker
/// finishes, matching the concurrency model's commutative-merge guarantee.
#[derive(Default)]
pub struct InsertSizeStats {
    pub n: AtomicU64,
    pub sum: AtomicU64,
    pub sum2: AtomicU64,
    pub unpaired: AtomicU64,
}

impl InsertSizeStats {
    fn merge(&self, n: u64, sum: u64, sum2: u64, unpaired: u64) {
        self.n.fetch_add(n, Ordering::Relaxed);
        self.sum.fetch_add(sum, Ordering::Relaxed);
        self.sum2.fetch_add(sum2, Ordering::Relaxed);
        self.unpaired.fetch_add(unpaired, Ordering::Relaxed);
    }

    /// Mean and standard deviation of the accumulated insert sizes (fermi:
    /// `fm6_unitig`'s trailing `avg`/`sqrt` report).
    pub fn mean_and_stddev(&self) -> (f64, f64) {
        let n = self.n.load(Ordering::Relaxed) as f64;
        if n == 0.0 {
            return (0.0, 0.0);
        }
        let sum = self.sum.load(Ordering::Relaxed) as f64;
        let sum2 = self.sum2.load(Ordering::Relaxed) as f64;
        let avg = sum / n;
        (avg, (sum2 / n - avg * avg).sqrt())
    }
}

/// Partitions `[0, mcnt1)` into `n_threads` contiguous, even-aligned ranges
/// (unitig.c's `fm6_unitig`, lines 454-462). Each thread then walks the odd
/// IDs in its range, one per read pair.
fn partition_contiguous(mcnt1: u64, n_threads: usize) -> Vec<(u64, u64)> {
    let mut ranges = Vec::with_capacity(n_threads);
    let mut rest = mcnt1;
    for j in 0..n_threads {
        let start = (mcnt1 - rest) / 2 * 2;
        let end = start + rest / (n_threads - j) as u64 / 2 * 2;
        rest -= end - start;
        ranges.push((start, end));
    }
    ranges
}

/// Strided partition for the joiner pool (join.c lines 213-219): thread `j`
/// walks `j, j + step, j + 2*step, ...` over odd seed IDs.
fn partition_strided(n_threads: usize) -> Vec<u64> {
    (0..n_threads as u64).collect()
}

/// Runs unitig construction across a fixed thread pool, returning every
/// emitted vertex together with the merged insert-size statistics (spec
/// §4.I, fermi: `fm6_unitig`/`unitig_core`).
pub fn run_unitig_workers<O: IndexOracle + Sync>(
    oracle: &O,
    opt: &AssemblerConfig,
) -> Result<(Vec<Node>, InsertSizeStats), Error> {
    opt.validate()?;
    let mcnt1 = oracle.mcnt()[1];
    if mcnt1 < opt.n_threads as u64 * 2 {
        return Err(Error::Config(
            "mcnt[1] must be at least 2 * n_threads".to_string(),
        ));
    }
    let ranges = partition_contiguous(mcnt1, opt.n_threads);
    let used = AtomicBitset::new(mcnt1);
    let bend = AtomicBitset::new(mcnt1);
    let visited = AtomicBitset::new(mcnt1);
    let stats = InsertSizeStats::default();

    let pool = build_pool(opt.n_threads, "unitig")?;

    let nodes = pool.install(|| {
        use rayon::prelude::*;
        ranges
            .par_iter()
            .map(|&(start, end)| {
                let mut extender = UnitigExtender::new(oracle, opt.min_match, &used, &bend);
                let mut local = Vec::new();
                let mut seed = start | 1;
                while seed < end {
                    if let UnitigOutcome::Emitted(node) = extender.unitig1(seed, &visited) {
                        local.push(node);
                    }
                    seed += 2;
                }
                stats.merge(extender.n, extender.sum, extender.sum2, extender.unpaired);
                local
            })
            .collect::<Vec<_>>()
    });

    Ok((nodes.into_iter().flatten().collect(), stats))
}

/// Runs the unambiguous joiner across a fixed thread pool, returning every
/// seed's [`JoinRecord`] together with merged `g_cnt`/`g_tot` counters (spec
/// §4.I, join.c: `fm6_unambi_join`/`neighbor1`).
pub fn run_joiner_workers<O: IndexOracle + Sync>(
    oracle: &O,
    opt: &AssemblerConfig,
) -> Result<(Vec<JoinRecord>, JoinerStats), Error> {
    opt.validate()?;
    let mcnt1 = oracle.mcnt()[1];
    let starts = partition_strided(opt.n_threads);
    let bits = AtomicBitset::new(mcnt1);

    let pool = build_pool(opt.n_threads, "joiner")?;

    let step = opt.n_threads as u64;
    let results = pool.install(|| {
        use rayon::prelude::*;
        starts
            .par_iter()
            .map(|&j| {
                let mut joiner = UnambiguousJoiner::new(oracle, opt.min_match, &bits);
                let mut local = Vec::new();
                let mut seed = j << 1 | 1;
                while seed < mcnt1 {
                    if let Some(record) = joiner.join_seed(seed) {
                        local.push(record);
                    }
                    seed += step << 1;
                }
                (local, joiner.stats())
            })
            .collect::<Vec<_>>()
    });

    let mut records = Vec::new();
    let mut stats = JoinerStats::default();
    for (local, local_stats) in results {
        records.extend(local);
        stats.g_cnt += local_stats.g_cnt;
        stats.g_tot += local_stats.g_tot;
    }
    Ok((records, stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_contiguous_covers_the_whole_range_without_overlap() {
        let ranges = partition_contiguous(100, 4);
        assert_eq!(ranges.first().unwrap().0, 0);
        assert_eq!(ranges.last().unwrap().1, 100);
        for w in ranges.windows(2) {
            assert_eq!(w[0].1, w[1].0);
        }
        for &(s, e) in &ranges {
            assert_eq!(s % 2, 0);
            assert_eq!(e % 2, 0);
        }
    }

    #[test]
    fn partition_contiguous_single_thread_covers_everything() {
        let ranges = partition_contiguous(42, 1);
        assert_eq!(ranges, vec![(0, 42)]);
    }

    #[test]
    fn partition_strided_yields_one_start_per_thread() {
        assert_eq!(partition_strided(3), vec![0, 1, 2]);
    }
}
