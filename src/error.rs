// Copyright 2014-2016 Johannes Köster, Taylor Cramer.
// Licensed under the MIT license (http://opensource.org/licenses/MIT)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Error types shared across the crate.

use thiserror::Error;

/// Errors produced while configuring or running the assembler core.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to open or read graph input")]
    Io(#[from] std::io::Error),
    #[error("malformed graph record at line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("invalid assembler configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
