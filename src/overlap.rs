// Copyright 2014-2016 Johannes Köster, Taylor Cramer.
// Licensed under the MIT license (http://opensource.org/licenses/MIT)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! The overlap walker (spec §4.C): enumerating irreducible right-overlap intervals
//! of a read against the rest of the collection, and the seed-only containment check.

use crate::alphabet::Base;
use crate::index::{Intv, IndexOracle};

/// Result of testing whether a read is a substring of some other read in the
/// collection (fermi: `fm6_is_contained`'s `ret` in `{0, -1}`, split here into the
/// two distinct causes the source conflates).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Containment {
    NotContained,
    LeftContained,
    RightContained,
}

impl Containment {
    pub fn is_contained(self) -> bool {
        !matches!(self, Containment::NotContained)
    }
}

/// Walks `seq[j0]` outward (away from the 3' end when `at5` is false, toward it when
/// `at5` is true), recording every sentinel-bounded interval reached once the
/// accumulated depth is at least `min_match`. Returns the final walk interval and the
/// recorded intervals ordered smallest (longest overlap) first.
///
/// `inc_sentinel` selects whether each recorded interval is the sentinel child
/// (`ok[$]`, used when walking toward the 5' end in [`super::unitig::check_left_simple`])
/// or the pre-extension interval itself (used when enumerating right-overlaps).
///
/// Mirrors fermi's `overlap_intv` (unitig.c) line for line.
pub fn overlap_intv(
    oracle: &impl IndexOracle,
    seq: &[Base],
    min_match: usize,
    j0: usize,
    at5: bool,
    inc_sentinel: bool,
) -> (Intv, Vec<Intv>) {
    let len = seq.len() as i64;
    let dir: i64 = if at5 { 1 } else { -1 };
    let end: i64 = if at5 { len } else { -1 };
    let mut ik = oracle.set_intv(seq[j0]);
    let mut prev = Vec::new();
    let mut depth: i64 = 1;
    let mut j = j0 as i64 + dir;
    while j != end {
        let c = if at5 {
            seq[j as usize].complement()
        } else {
            seq[j as usize]
        };
        let ok = oracle.extend(&ik, !at5);
        if ok[c].is_empty() {
            break;
        }
        if depth >= min_match as i64 && ok[Base::Sentinel].size > 0 {
            let mut tmp = if inc_sentinel { ok[Base::Sentinel] } else { ik };
            tmp.info = (j - dir) as u64;
            prev.push(tmp);
        }
        ik = ok[c];
        j += dir;
        depth += 1;
    }
    prev.reverse(); // smallest interval (longest overlap) first
    (ik, prev)
}

/// Tests whether `s` (a full read) is a substring of another read in the index, and
/// returns the sentinel-bounded interval identifying the read's own occurrence
/// together with the irreducible right-overlaps found along the way. Mirrors
/// `fm6_is_contained`.
pub fn is_contained(
    oracle: &impl IndexOracle,
    min_match: usize,
    s: &[Base],
) -> (Containment, Intv, Vec<Intv>) {
    assert!(s.len() > min_match, "seed read must be longer than min_match");
    let (mut ik, ovlp) = overlap_intv(oracle, s, min_match, s.len() - 1, false, false);

    let ok = oracle.extend(&ik, true);
    assert!(ok[Base::Sentinel].size > 0);
    let left_contained = ik.size != ok[Base::Sentinel].size;
    ik = ok[Base::Sentinel];

    let ok2 = oracle.extend(&ik, false);
    assert!(ok2[Base::Sentinel].size > 0);
    let right_contained = ik.size != ok2[Base::Sentinel].size;

    let containment = if right_contained {
        Containment::RightContained
    } else if left_contained {
        Containment::LeftContained
    } else {
        Containment::NotContained
    };
    (containment, ok2[Base::Sentinel], ovlp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::NaiveIndex;
    use std::convert::TryFrom;

    fn seq(s: &str) -> Vec<Base> {
        s.bytes().map(|b| Base::try_from(b).unwrap()).collect()
    }

    #[test]
    fn overlap_intv_finds_right_overlap() {
        // S1 from spec §8: AAACCCGGG / CCCGGGTTT should overlap by "CCCGGG" (len 6).
        let idx = NaiveIndex::build(&[seq("AAACCCGGG"), seq("CCCGGGTTT"), seq("GGGTTTAAA")]);
        let (read, _) = idx.retrieve(0);
        let mut rev = read.clone();
        rev.reverse();
        let (_, prev) = overlap_intv(&idx, &rev, 3, rev.len() - 1, false, false);
        assert!(!prev.is_empty());
    }

    #[test]
    fn s3_second_read_is_contained() {
        // S3: second read is a substring of the first.
        let idx = NaiveIndex::build(&[seq("AAACCCGGGTTT"), seq("CCCGGG")]);
        let (read, _) = idx.retrieve(2); // forward strand of the second read
        let mut rev = read.clone();
        rev.reverse();
        let (containment, _, _) = is_contained(&idx, 3, &rev);
        assert!(containment.is_contained());
    }

    #[test]
    fn s2_isolated_read_is_not_contained() {
        let idx = NaiveIndex::build(&[seq("ACGTACGT")]);
        let (read, _) = idx.retrieve(0);
        let mut rev = read.clone();
        rev.reverse();
        let (containment, _, _) = is_contained(&idx, 4, &rev);
        assert_eq!(containment, Containment::NotContained);
    }
}
