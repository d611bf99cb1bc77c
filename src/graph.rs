// Copyright 2014-2016 Johannes Köster, Taylor Cramer.
// Licensed under the MIT license (http://opensource.org/licenses/MIT)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! The assembly graph: vertices with two endpoint IDs and bidirectional arc lists
//! (spec §3 "Unitig vertex"), its line-oriented text format (§4.F/§4.G) and the
//! amendment pass that reconciles arcs against the endpoint hash (§4.H).

use crate::alphabet::Base;
use crate::config::AssemblerConfig;
use crate::error::Error;
use fxhash::FxHashMap;
use itertools::Itertools;
use std::convert::TryFrom;
use std::io::{BufRead, Write};

/// Transient per-read pair-tracking slot (spec §3 "Paired-read mapping"), the
/// struct rendering of fermi's packed `(begin<<32)|(end<<1)|strand` word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PairSlot {
    pub begin: u32,
    pub end: u32,
    pub strand: bool,
}

/// Tombstone written when an arc's target vertex has no matching back-arc
/// (mog.c: `p->nei[j].a[l].x = (uint64_t)-1`). Unlike [`ARC_DELETED`], an arc
/// left at this value is *not* swept by `rmdup` -- it stays in the list so the
/// endpoint-map sentinel semantics are visible to readers of the graph.
pub const ARC_TOMBSTONE: u64 = u64::MAX;

/// Marker for an arc slated for removal by the next `rmdup`/clean pass
/// (mog.c: `arc_mark_del`, `(uint64_t)-2`).
pub const ARC_DELETED: u64 = u64::MAX - 1;

/// One directed arc out of a unitig endpoint: a target endpoint ID and the
/// overlap length between the two unitigs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Arc {
    pub target: u64,
    pub overlap: u32,
}

impl Arc {
    fn is_deleted(&self) -> bool {
        self.target == ARC_DELETED || self.overlap == 0
    }

    fn mark_deleted(&mut self) {
        self.target = ARC_DELETED;
        self.overlap = 0;
    }
}

/// A unitig vertex (spec §3 "Unitig vertex").
#[derive(Clone, Debug)]
pub struct Node {
    pub k: (u64, u64),
    pub nsr: i32,
    pub seq: Vec<Base>,
    pub cov: Vec<u8>,
    pub nei: (Vec<Arc>, Vec<Arc>),
    pub aux: (i32, i32),
    pub mapping: Vec<(u64, PairSlot)>,
}

/// Saturating coverage bump: ASCII `"` (34) through `~` (126), fermi's inline
/// `p->cov[i] < 126? ++p->cov[i] : p->cov[i]`.
pub fn bump_coverage(byte: u8) -> u8 {
    if byte < 126 {
        byte + 1
    } else {
        byte
    }
}

/// Decodes a coverage byte into its saturating count (spec §6.2).
pub fn coverage_count(byte: u8) -> u8 {
    byte - 33
}

fn render_seq(seq: &[Base]) -> String {
    seq.iter().map(|b| b.as_char()).collect()
}

fn render_nei(arcs: &[Arc]) -> String {
    if arcs.is_empty() {
        ".".to_string()
    } else {
        let mut s = String::new();
        for a in arcs {
            s.push_str(&a.target.to_string());
            s.push(',');
            s.push_str(&a.overlap.to_string());
            s.push(';');
        }
        s
    }
}

/// Renders one vertex in the three-line format of §4.G (mog.c: `mog_write1`).
pub fn write_node(node: &Node) -> String {
    format!(
        "@{}:{}\t{}\t{}\t{}\n{}\n+\n{}\n",
        node.k.0,
        node.k.1,
        node.nsr,
        render_nei(&node.nei.0),
        render_nei(&node.nei.1),
        render_seq(&node.seq),
        String::from_utf8_lossy(&node.cov),
    )
}

/// The in-memory assembly graph (spec §3 "Endpoint map").
pub struct Graph {
    pub nodes: Vec<Node>,
    pub endpoint_map: FxHashMap<u64, u64>,
}

/// Applies the reader's per-side dominance filter in place, reproducing mog.c's
/// `max`/`max2` accumulation bug verbatim (spec §9 Open Question #1).
///
/// `if (max < r->y) max = max2, max = r->y;` assigns into `max` twice via the
/// comma operator -- the intended `max2 = max` promotion of the displaced
/// running maximum never happens. `max2` only ever advances through the
/// `else if (max2 < r->y) max2 = r->y` arm, so it permanently misses every
/// value displaced from `max`.
fn dominance_filter(arcs: &mut [Arc], min_dratio0: f64) {
    let mut max: u32 = 0;
    let mut max2: u32 = 0;
    for a in arcs.iter() {
        if max < a.overlap {
            max = a.overlap;
        } else if max2 < a.overlap {
            max2 = a.overlap;
        }
    }
    let thres = (max2 as f64 * min_dratio0 + 0.499) as u32;
    for a in arcs.iter_mut() {
        if a.overlap < thres {
            a.overlap = 0; // to be swept by rmdup's clean pass
        }
    }
}

/// Drops deleted arcs, then deduplicates by target keeping the highest
/// overlap per target (mog.c: `v128_rmdup`).
fn rmdup(arcs: &mut Vec<Arc>) {
    arcs.retain(|a| !a.is_deleted());
    if arcs.len() > 1 {
        arcs.sort_by(|a, b| a.target.cmp(&b.target).then(b.overlap.cmp(&a.overlap)));
        let mut last_target = arcs[0].target;
        for a in arcs.iter_mut().skip(1) {
            if a.target == last_target {
                a.mark_deleted();
            } else {
                last_target = a.target;
            }
        }
        arcs.retain(|a| !a.is_deleted());
    }
}

/// Caps an arc list to `max_arc` entries by overlap length (mog.c: `v128_cap`).
///
/// Only triggers once the list has more than `max_arc` entries. Sorts by
/// overlap descending, reads off the overlap value sitting at index `max_arc`
/// as the threshold, then keeps only the *strictly greater* prefix -- the
/// source's scan stops at the first arc equal to the threshold and truncates
/// there, so ties at the threshold are dropped along with it, not kept.
fn cap(arcs: &mut Vec<Arc>, max_arc: usize) {
    if arcs.len() <= max_arc {
        return;
    }
    arcs.sort_by(|a, b| b.overlap.cmp(&a.overlap));
    let thres = arcs[max_arc].overlap;
    let keep = arcs.iter().position(|a| a.overlap == thres).unwrap_or(arcs.len());
    arcs.truncate(keep);
}

fn parse_nei(field: &str, min_dratio0: f64, max_arc: usize) -> Result<Vec<Arc>, Error> {
    if field == "." {
        return Ok(Vec::new());
    }
    let mut arcs = Vec::new();
    for entry in field.split(';').filter(|e| !e.is_empty()) {
        let (target_str, overlap_str) =
            entry.split(',').collect_tuple().ok_or_else(|| Error::Parse {
                line: 0,
                message: format!("bad arc entry in {:?}", entry),
            })?;
        let target: u64 = target_str.parse().map_err(|_| Error::Parse {
            line: 0,
            message: format!("bad arc target in {:?}", entry),
        })?;
        let overlap: u32 = overlap_str.parse().map_err(|_| Error::Parse {
            line: 0,
            message: format!("bad arc overlap in {:?}", entry),
        })?;
        arcs.push(Arc { target, overlap });
    }
    dominance_filter(&mut arcs, min_dratio0);
    rmdup(&mut arcs);
    cap(&mut arcs, max_arc);
    Ok(arcs)
}

impl Graph {
    /// Parses a graph in the §4.G text format, applying the reader's dominance
    /// filter and tip-dropping rule, then runs [`Graph::amend`] (mog.c:
    /// `mog_read` + the trailing `mog_amend` call).
    pub fn read<R: BufRead>(mut r: R, opt: &AssemblerConfig) -> Result<Graph, Error> {
        let mut nodes = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            if r.read_line(&mut line)? == 0 {
                break;
            }
            let header = line.trim_end_matches('\n');
            if header.is_empty() {
                continue;
            }
            if !header.starts_with('@') {
                return Err(Error::Parse {
                    line: 0,
                    message: format!("expected '@' record header, got {:?}", header),
                });
            }
            let fields: Vec<&str> = header[1..].split('\t').collect();
            if fields.len() != 4 {
                return Err(Error::Parse {
                    line: 0,
                    message: format!("expected 4 tab-separated header fields, got {}", fields.len()),
                });
            }
            let mut ids = fields[0].splitn(2, ':');
            let k0: u64 = ids
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| Error::Parse {
                    line: 0,
                    message: "missing first endpoint id".to_string(),
                })?;
            let k1: u64 = ids
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| Error::Parse {
                    line: 0,
                    message: "missing second endpoint id".to_string(),
                })?;
            let nsr: i32 = fields[1].parse().map_err(|_| Error::Parse {
                line: 0,
                message: format!("bad nsr field {:?}", fields[1]),
            })?;
            let nei0 = parse_nei(fields[2], opt.min_dratio0, opt.max_arc)?;
            let nei1 = parse_nei(fields[3], opt.min_dratio0, opt.max_arc)?;

            let mut seq_line = String::new();
            r.read_line(&mut seq_line)?;
            let seq_line = seq_line.trim_end_matches('\n');
            let seq: Vec<Base> = seq_line
                .bytes()
                .map(Base::try_from)
                .collect::<Result<_, _>>()
                .map_err(|c| Error::Parse {
                    line: 0,
                    message: format!("non-ACGT base {:?} in sequence", c),
                })?;

            let mut plus_line = String::new();
            r.read_line(&mut plus_line)?;

            let mut cov_line = String::new();
            r.read_line(&mut cov_line)?;
            let cov: Vec<u8> = cov_line.trim_end_matches('\n').as_bytes().to_vec();

            if opt.drop_tip0
                && (nei0.is_empty() || nei1.is_empty())
                && seq.len() < opt.min_el
                && nsr == 1
            {
                log::debug!("dropped tip of length {} at ({}, {})", seq.len(), k0, k1);
                continue;
            }

            nodes.push(Node {
                k: (k0, k1),
                nsr,
                seq,
                cov,
                nei: (nei0, nei1),
                aux: (-1, -1),
                mapping: Vec::new(),
            });
        }

        let mut g = Graph {
            nodes,
            endpoint_map: FxHashMap::default(),
        };
        g.build_endpoint_map();
        g.amend();
        Ok(g)
    }

    /// Writes every vertex in the §4.G text format (mog.c: `mog_print`).
    pub fn write_all<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        for node in &self.nodes {
            w.write_all(write_node(node).as_bytes())?;
        }
        Ok(())
    }

    /// Rebuilds `endpoint_map` from scratch; a duplicated endpoint collapses to
    /// [`ARC_TOMBSTONE`] (mog.c: `build_hash`).
    fn build_endpoint_map(&mut self) {
        self.endpoint_map.clear();
        for (i, node) in self.nodes.iter().enumerate() {
            for (side, endpoint) in [node.k.0, node.k.1].into_iter().enumerate() {
                let packed = ((i as u64) << 1) | side as u64;
                match self.endpoint_map.insert(endpoint, packed) {
                    Some(_) => {
                        log::warn!("end {} is duplicated", endpoint);
                        self.endpoint_map.insert(endpoint, ARC_TOMBSTONE);
                    }
                    None => {}
                }
            }
        }
    }

    /// Reconciles every arc against the endpoint map (spec §4.H, mog.c:
    /// `mog_amend`): a missing target is deleted outright; a present target
    /// lacking a matching back-arc is tombstoned to [`ARC_TOMBSTONE`] instead
    /// of removed. Each side is then deduplicated.
    pub fn amend(&mut self) {
        let endpoints: Vec<(u64, u64)> = self.nodes.iter().map(|n| n.k).collect();
        for i in 0..self.nodes.len() {
            for side in 0..2 {
                let arcs_len = if side == 0 {
                    self.nodes[i].nei.0.len()
                } else {
                    self.nodes[i].nei.1.len()
                };
                for l in 0..arcs_len {
                    let target = if side == 0 {
                        self.nodes[i].nei.0[l].target
                    } else {
                        self.nodes[i].nei.1[l].target
                    };
                    let packed = match self.endpoint_map.get(&target) {
                        Some(&p) if p != ARC_TOMBSTONE => p,
                        _ => {
                            // Either not found, or the endpoint itself was a
                            // duplicate collapsed to the sentinel -- treat both
                            // as "no such vertex" for arc reconciliation.
                            let arc = if side == 0 {
                                &mut self.nodes[i].nei.0[l]
                            } else {
                                &mut self.nodes[i].nei.1[l]
                            };
                            arc.mark_deleted();
                            continue;
                        }
                    };
                    let (vi, vside) = ((packed >> 1) as usize, (packed & 1) as usize);
                    let expect = if side == 0 {
                        endpoints[i].0
                    } else {
                        endpoints[i].1
                    };
                    let has_back_arc = {
                        let back = if vside == 0 {
                            &self.nodes[vi].nei.0
                        } else {
                            &self.nodes[vi].nei.1
                        };
                        back.iter().any(|a| a.target == expect)
                    };
                    if !has_back_arc {
                        let arc = if side == 0 {
                            &mut self.nodes[i].nei.0[l]
                        } else {
                            &mut self.nodes[i].nei.1[l]
                        };
                        arc.target = ARC_TOMBSTONE;
                    }
                }
            }
            rmdup(&mut self.nodes[i].nei.0);
            rmdup(&mut self.nodes[i].nei.1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn base_seq(s: &str) -> Vec<Base> {
        s.bytes().map(|b| Base::try_from(b).unwrap()).collect()
    }

    #[test]
    fn write_then_read_round_trips_a_simple_vertex() {
        let node = Node {
            k: (10, 20),
            nsr: 1,
            seq: base_seq("ACGT"),
            cov: b"\"\"\"\"".to_vec(),
            nei: (Vec::new(), Vec::new()),
            aux: (-1, -1),
            mapping: Vec::new(),
        };
        let text = write_node(&node);
        assert_eq!(text, "@10:20\t1\t.\t.\nACGT\n+\n\"\"\"\"\n");
    }

    #[test]
    fn s6_mutual_arcs_survive_round_trip() {
        let text = "@1:2\t2\t3,10;\t.\n\
AACCGGTT\n+\n\"\"\"\"\"\"\"\"\n\
@3:4\t2\t.\t1,10;\n\
TTGGCCAA\n+\n\"\"\"\"\"\"\"\"\n";
        let mut opt = AssemblerConfig {
            min_match: 1,
            ..Default::default()
        };
        opt.drop_tip0 = false;
        let g = Graph::read(Cursor::new(text), &opt).unwrap();
        assert_eq!(g.nodes.len(), 2);
        assert_eq!(g.nodes[0].nei.0[0].target, 3);
        assert_eq!(g.nodes[1].nei.1[0].target, 1);

        let mut out = Vec::new();
        g.write_all(&mut out).unwrap();
        let g2 = Graph::read(Cursor::new(out), &opt).unwrap();
        assert_eq!(g2.nodes[0].nei.0[0].target, g.nodes[0].nei.0[0].target);
        assert_eq!(g2.nodes[1].nei.1[0].target, g.nodes[1].nei.1[0].target);
    }

    #[test]
    fn amend_tombstones_arcs_with_no_matching_back_arc() {
        let n0 = Node {
            k: (1, 2),
            nsr: 1,
            seq: base_seq("ACGT"),
            cov: b"\"\"\"\"".to_vec(),
            nei: (vec![Arc { target: 5, overlap: 4 }], Vec::new()),
            aux: (-1, -1),
            mapping: Vec::new(),
        };
        let n1 = Node {
            k: (5, 6),
            nsr: 1,
            seq: base_seq("GGCC"),
            cov: b"\"\"\"\"".to_vec(),
            nei: (Vec::new(), Vec::new()),
            aux: (-1, -1),
            mapping: Vec::new(),
        };
        let mut g = Graph {
            nodes: vec![n0, n1],
            endpoint_map: FxHashMap::default(),
        };
        g.build_endpoint_map();
        g.amend();
        assert_eq!(g.nodes[0].nei.0[0].target, ARC_TOMBSTONE);
    }

    #[test]
    fn amend_deletes_arcs_with_no_such_vertex() {
        let n0 = Node {
            k: (1, 2),
            nsr: 1,
            seq: base_seq("ACGT"),
            cov: b"\"\"\"\"".to_vec(),
            nei: (vec![Arc { target: 999, overlap: 4 }], Vec::new()),
            aux: (-1, -1),
            mapping: Vec::new(),
        };
        let mut g = Graph {
            nodes: vec![n0],
            endpoint_map: FxHashMap::default(),
        };
        g.build_endpoint_map();
        g.amend();
        assert!(g.nodes[0].nei.0.is_empty());
    }

    #[test]
    fn dominance_filter_reproduces_the_stale_max2_bug() {
        // Overlaps arrive in increasing order: 5, 6, 7. Each is a new running max,
        // so max2 never advances past 0 through the buggy branch.
        let mut arcs = vec![
            Arc { target: 1, overlap: 5 },
            Arc { target: 2, overlap: 6 },
            Arc { target: 3, overlap: 7 },
        ];
        dominance_filter(&mut arcs, 0.7);
        // thres = round(0 * 0.7) = 0, so nothing gets zeroed out.
        assert!(arcs.iter().all(|a| a.overlap > 0));
    }

    #[test]
    fn cap_drops_ties_at_the_threshold() {
        let mut arcs = vec![
            Arc { target: 1, overlap: 10 },
            Arc { target: 2, overlap: 8 },
            Arc { target: 3, overlap: 8 },
            Arc { target: 4, overlap: 8 },
        ];
        cap(&mut arcs, 2);
        // Sorted descending: 10, 8, 8, 8. thres = arcs[2].overlap = 8.
        // First index with overlap == 8 is index 1, so only the top entry survives.
        assert_eq!(arcs.len(), 1);
        assert_eq!(arcs[0].overlap, 10);
    }
}
