// Copyright 2014-2016 Johannes Köster, Taylor Cramer.
// Licensed under the MIT license (http://opensource.org/licenses/MIT)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! A short-read de-novo sequence assembler core built on a bidirectional
//! FM-index self-index.
//!
//! Reads are overlapped directly against the index (no pairwise alignment),
//! walked into maximal unambiguous unitigs, optionally pre-joined by a
//! lighter-weight unambiguous walker, and written out as a text assembly
//! graph that a separate amendment pass reconciles into mutually consistent
//! arcs.
//!
//! # Example
//!
//! ```rust
//! use fmasm::alphabet::Base;
//! use fmasm::config::AssemblerConfig;
//! use fmasm::index::NaiveIndex;
//! use fmasm::workers::run_unitig_workers;
//! use std::convert::TryFrom;
//!
//! fn seq(s: &str) -> Vec<Base> {
//!     s.bytes().map(|b| Base::try_from(b).unwrap()).collect()
//! }
//!
//! let idx = NaiveIndex::build(&[seq("AAACCCGGG"), seq("CCCGGGTTT")]);
//! let opt = AssemblerConfig {
//!     min_match: 3,
//!     n_threads: 1,
//!     ..Default::default()
//! };
//! let (nodes, _stats) = run_unitig_workers(&idx, &opt).unwrap();
//! assert!(!nodes.is_empty());
//! ```

pub mod alphabet;
pub mod bitset;
pub mod config;
pub mod error;
pub mod graph;
pub mod index;
pub mod joiner;
pub mod overlap;
pub mod unitig;
pub mod workers;

pub use error::Error;
