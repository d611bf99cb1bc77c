// Copyright 2014-2016 Johannes Köster, Taylor Cramer.
// Licensed under the MIT license (http://opensource.org/licenses/MIT)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! The index oracle (spec §6.1) and the bidirectional FM-interval it hands back.
//!
//! Construction of the self-index itself is out of scope for this crate (spec §1):
//! [`IndexOracle`] is the seam the rest of the crate is written against, generalizing
//! the classic FM-index bidirectional-extension pattern (single-symbol
//! `backward_ext`) to the 6-way batch extension fermi's `fm6_extend` performs in
//! one backward-search step. [`NaiveIndex`] is a brute-force, in-memory
//! implementation used only by this crate's own tests.

use crate::alphabet::Base;
use enum_map::EnumMap;

/// A bidirectional FM-interval: fermi's `fmintv_t`, `(k, l, s)` plus a scratch `info`
/// word. `lo`/`lo_rc` are the forward and reverse-complement suffix-array lower bounds
/// (`x[0]`/`x[1]`); `size` is the interval width (`x[2]`), shared by both strands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Intv {
    pub lo: u64,
    pub lo_rc: u64,
    pub size: u64,
    pub info: u64,
}

impl Default for Intv {
    fn default() -> Intv {
        Intv {
            lo: 0,
            lo_rc: 0,
            size: 0,
            info: 0,
        }
    }
}

impl Intv {
    pub fn empty() -> Intv {
        Intv::default()
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Swaps the forward and reverse-complement bounds (fermi/rust-bio: `swapped`).
    pub fn swapped(&self) -> Intv {
        Intv {
            lo: self.lo_rc,
            lo_rc: self.lo,
            size: self.size,
            info: self.info,
        }
    }
}

/// The external collaborator consumed by every algorithm in this crate (spec §6.1).
pub trait IndexOracle {
    /// Cumulative symbol-boundary counts; `mcnt()[1]` is the total read count
    /// (both strands), per spec §3/§6.1.
    fn mcnt(&self) -> [u64; 6];

    /// The interval whose pattern is the single symbol `c`.
    fn set_intv(&self, c: Base) -> Intv;

    /// Bidirectional 6-way extension of `iv`. `backward == true` prepends the symbol
    /// to the match (classic FM-index backward search); `backward == false` appends it.
    fn extend(&self, iv: &Intv, backward: bool) -> EnumMap<Base, Intv>;

    /// As `extend`, but only computes the sentinel (`$`) child -- fermi's `fm6_extend0`.
    fn extend0(&self, iv: &Intv, backward: bool) -> Intv {
        self.extend(iv, backward)[Base::Sentinel]
    }

    /// Materializes the read text for `rid`, in forward index coordinates, together
    /// with a canonical read id (identity unless the oracle maintains a separate
    /// physical read order).
    fn retrieve(&self, rid: u64) -> (Vec<Base>, u64);

    /// Maps a suffix-array row that is known to be sentinel-bounded (i.e. the row
    /// taken from a `$`-child interval) to the read id it terminates. Every interval
    /// this crate marks into a bitset is sentinel-bounded, so fermi's "no sorted
    /// array" fallback -- which uses the raw row as the read id directly -- is this
    /// method's default. An oracle whose suffix array does not place read-terminal
    /// rows at read-id-equal positions must override it.
    fn sentinel_row_to_read_id(&self, row: u64) -> u64 {
        row
    }
}

/// Watson-Crick complement of a base, per spec §4.A (`comp(c) = 5 - c`).
pub fn comp(c: Base) -> Base {
    c.complement()
}

/// A brute-force FM-index oracle built by literal suffix-array sort, used only in
/// this crate's tests. Reads are stored in `(forward, revcomp)` pairs as spec §3
/// describes, each terminated with its own sentinel, concatenated into one text.
pub struct NaiveIndex {
    text: Vec<Base>,
    bwt: Vec<Base>,
    /// `prefix[i][c]` = count of symbol `c` in `bwt[0..i]`.
    prefix: Vec<[u64; 6]>,
    less: [u64; 6],
    reads: Vec<(u64, u64)>, // (start offset in text, length excluding sentinel)
    sa: Vec<u64>,
    /// Maps a sentinel's text position to the read id it terminates, for
    /// `sentinel_row_to_read_id`.
    sentinel_pos_to_read: fxhash::FxHashMap<u64, u64>,
}

impl NaiveIndex {
    /// Builds an index over `reads`, automatically adding the reverse-complement
    /// strand of each input read (spec §3: "reads are stored in reverse-complemented
    /// pairs").
    pub fn build(reads: &[Vec<Base>]) -> NaiveIndex {
        let mut text = Vec::new();
        let mut read_spans = Vec::new();
        for r in reads {
            for strand in [r.clone(), crate::alphabet::revcomp(r)] {
                let start = text.len() as u64;
                text.extend_from_slice(&strand);
                text.push(Base::Sentinel);
                read_spans.push((start, strand.len() as u64));
            }
        }
        let n = text.len();
        let mut sa: Vec<u64> = (0..n as u64).collect();
        sa.sort_by(|&a, &b| text[a as usize..].cmp(&text[b as usize..]));
        let bwt: Vec<Base> = sa
            .iter()
            .map(|&s| {
                if s == 0 {
                    *text.last().unwrap()
                } else {
                    text[(s - 1) as usize]
                }
            })
            .collect();
        let mut prefix = vec![[0u64; 6]; n + 1];
        for i in 0..n {
            prefix[i + 1] = prefix[i];
            prefix[i + 1][bwt[i].code() as usize] += 1;
        }
        let totals = prefix[n];
        let mut less = [0u64; 6];
        let mut acc = 0u64;
        for c in 0..6 {
            less[c] = acc;
            acc += totals[c];
        }
        let mut sentinel_pos_to_read = fxhash::FxHashMap::default();
        for (rid, &(start, len)) in read_spans.iter().enumerate() {
            sentinel_pos_to_read.insert(start + len, rid as u64);
        }
        NaiveIndex {
            text,
            bwt,
            prefix,
            less,
            reads: read_spans,
            sa,
            sentinel_pos_to_read,
        }
    }

    fn occ(&self, r: Option<u64>, c: Base) -> u64 {
        let idx = r.map_or(0, |x| x + 1) as usize;
        self.prefix[idx][c.code() as usize]
    }

    fn extend_one(&self, iv: &Intv, a: Base) -> Intv {
        let mut counts = [0u64; 6];
        for c in Base::ALL {
            let before = self.occ(if iv.lo == 0 { None } else { Some(iv.lo - 1) }, c);
            let upto = self.occ(Some(iv.lo + iv.size - 1), c);
            counts[c.code() as usize] = upto - before;
        }
        let mut suffix_sum = [0u64; 6];
        for code in (0..5).rev() {
            suffix_sum[code] = suffix_sum[code + 1] + counts[code + 1];
        }
        let before_a = self.occ(if iv.lo == 0 { None } else { Some(iv.lo - 1) }, a);
        Intv {
            lo: self.less[a.code() as usize] + before_a,
            lo_rc: iv.lo_rc + suffix_sum[a.code() as usize],
            size: counts[a.code() as usize],
            info: 0,
        }
    }
}

impl IndexOracle for NaiveIndex {
    fn mcnt(&self) -> [u64; 6] {
        self.less
    }

    fn set_intv(&self, c: Base) -> Intv {
        let comp_c = c.complement();
        let totals = self.prefix[self.bwt.len()];
        Intv {
            lo: self.less[c.code() as usize],
            lo_rc: self.less[comp_c.code() as usize],
            size: totals[c.code() as usize],
            info: 0,
        }
    }

    fn extend(&self, iv: &Intv, backward: bool) -> EnumMap<Base, Intv> {
        let mut out = EnumMap::default();
        if backward {
            for a in Base::ALL {
                out[a] = self.extend_one(iv, a);
            }
        } else {
            let swapped = iv.swapped();
            for a in Base::ALL {
                let comp_a = a.complement();
                out[a] = self.extend_one(&swapped, comp_a).swapped();
            }
        }
        out
    }

    fn retrieve(&self, rid: u64) -> (Vec<Base>, u64) {
        let (start, len) = self.reads[rid as usize];
        let seq = self.text[start as usize..(start + len) as usize].to_vec();
        (seq, rid)
    }

    fn sentinel_row_to_read_id(&self, row: u64) -> u64 {
        let pos = self.sa[row as usize];
        *self
            .sentinel_pos_to_read
            .get(&pos)
            .expect("sentinel_row_to_read_id called on a non-sentinel-bounded row")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryFrom;

    fn seq(s: &str) -> Vec<Base> {
        s.bytes().map(|b| Base::try_from(b).unwrap()).collect()
    }

    #[test]
    fn mcnt_total_reads_counts_both_strands() {
        let idx = NaiveIndex::build(&[seq("ACGT"), seq("GGCC")]);
        assert_eq!(idx.mcnt()[1], 4); // 2 reads * 2 strands
    }

    #[test]
    fn retrieve_round_trips_forward_strand() {
        let idx = NaiveIndex::build(&[seq("ACGTACGT")]);
        let (got, canonical) = idx.retrieve(0);
        assert_eq!(got, seq("ACGTACGT"));
        assert_eq!(canonical, 0);
    }

    #[test]
    fn retrieve_revcomp_strand_is_actually_revcomp() {
        let idx = NaiveIndex::build(&[seq("AAACCC")]);
        let (fwd, _) = idx.retrieve(0);
        let (rc, _) = idx.retrieve(1);
        assert_eq!(rc, crate::alphabet::revcomp(&fwd));
    }

    #[test]
    fn set_intv_size_matches_occurrence_count() {
        let idx = NaiveIndex::build(&[seq("AAAA")]);
        let iv = idx.set_intv(Base::A);
        // "AAAA" + sentinel, plus its revcomp "TTTT" + sentinel: 4 A's total across
        // the forward strand only contribute to the A interval size.
        assert_eq!(iv.size, 4);
    }

    #[test]
    fn sentinel_row_to_read_id_recovers_the_terminating_read() {
        let idx = NaiveIndex::build(&[seq("ACGT"), seq("GGCC")]);
        let ik = idx.set_intv(Base::T);
        let ok = idx.extend(&ik, true);
        let end = ok[Base::Sentinel];
        assert!(end.size > 0);
        for row in end.lo..end.lo + end.size {
            let rid = idx.sentinel_row_to_read_id(row);
            let (seq, _) = idx.retrieve(rid);
            assert!(seq.ends_with(&[Base::T]) || seq.is_empty());
        }
    }

    #[test]
    fn extend_backward_then_forward_is_consistent_in_size() {
        let idx = NaiveIndex::build(&[seq("ACGTACGT"), seq("TTACGTAA")]);
        let ik = idx.set_intv(Base::T);
        let ok = idx.extend(&ik, true);
        // total children size can't exceed the parent interval size
        let total: u64 = Base::ALL.iter().map(|&a| ok[a].size).sum();
        assert!(total <= ik.size);
    }
}
