// Copyright 2014-2016 Johannes Köster, Taylor Cramer.
// Licensed under the MIT license (http://opensource.org/licenses/MIT)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Runtime configuration for unitig construction, joining and graph I/O.

use crate::error::Error;

/// Hard cap on inferred insert size before a pair is discarded unpaired (fermi: `MAX_ISIZE`).
pub const MAX_ISIZE: i64 = 1000;

/// Options shared by the overlap walker, unitig extender, joiner and graph reader.
///
/// Mirrors fermi's `mogopt_t` plus the `min_match`/`n_threads` globals that used to be
/// passed around as bare function arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct AssemblerConfig {
    /// Minimum overlap length required to extend a unitig or joined read.
    pub min_match: usize,
    /// Number of worker threads used by the decomposition layer.
    pub n_threads: usize,
    /// Drop single-read tips with an empty side and length `< min_el` at read time.
    pub drop_tip0: bool,
    /// Maximum number of arcs retained per endpoint after amendment.
    pub max_arc: usize,
    /// Tip length threshold used together with `drop_tip0`.
    pub min_el: usize,
    /// Dominance ratio for the reader's per-side arc filter, in `(0, 1]`.
    pub min_dratio0: f64,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        AssemblerConfig {
            min_match: 0,
            n_threads: 1,
            drop_tip0: true,
            max_arc: 512,
            min_el: 300,
            min_dratio0: 0.7,
        }
    }
}

impl AssemblerConfig {
    /// Checks the invariants the rest of the crate assumes hold.
    pub fn validate(&self) -> Result<(), Error> {
        if self.min_match == 0 {
            return Err(Error::Config("min_match must be positive".to_string()));
        }
        if self.n_threads == 0 {
            return Err(Error::Config("n_threads must be positive".to_string()));
        }
        if self.max_arc == 0 {
            return Err(Error::Config("max_arc must be positive".to_string()));
        }
        if self.min_el == 0 {
            return Err(Error::Config("min_el must be positive".to_string()));
        }
        if !(self.min_dratio0 > 0.0 && self.min_dratio0 <= 1.0) {
            return Err(Error::Config(
                "min_dratio0 must lie in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_fermi_mog_init_opt() {
        let cfg = AssemblerConfig::default();
        assert!(cfg.drop_tip0);
        assert_eq!(cfg.max_arc, 512);
        assert_eq!(cfg.min_el, 300);
        assert!((cfg.min_dratio0 - 0.7).abs() < 1e-9);
    }

    #[test]
    fn rejects_zero_min_match() {
        let mut cfg = AssemblerConfig {
            min_match: 20,
            ..Default::default()
        };
        cfg.validate().unwrap();
        cfg.min_match = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_dratio() {
        let mut cfg = AssemblerConfig {
            min_match: 20,
            ..Default::default()
        };
        cfg.min_dratio0 = 0.0;
        assert!(cfg.validate().is_err());
        cfg.min_dratio0 = 1.5;
        assert!(cfg.validate().is_err());
        cfg.min_dratio0 = 1.0;
        assert!(cfg.validate().is_ok());
    }
}
