// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the shard format, matchtree, and aggregator.
//!
//! No derive-macro error crate is used here, matching the rest of this
//! codebase's preference for hand-written `io::Error`-flavored errors. Each
//! variant maps to one of the kinds called out in the shard-searcher and
//! aggregator design: a corrupt shard excludes that shard only, an
//! unsupported query shape is a hard error to the caller, and a cancelled
//! search is explicitly not an error at all (see `SearchStats::canceled`).

use std::fmt;
use std::io;

/// Top-level error type returned by shard loading, query compilation, and
/// single-shard search.
#[derive(Debug)]
pub enum SorexError {
    /// TOC mismatch, section overrun, or impossible offsets. Fatal for the
    /// shard it came from; the aggregator excludes that shard and keeps
    /// searching the others.
    CorruptShard(String),
    /// A content substring query's pattern is shorter than the ngram width
    /// and wasn't wrapped in a regex by the caller.
    QueryTooShort { pattern: String, suggestion: String },
    /// A query shape this engine doesn't support, e.g. a regex nested inside
    /// a `Symbol` atom.
    UnsupportedQueryShape(String),
    /// Wraps an I/O error surfaced while reading shard bytes. Treated the
    /// same as `CorruptShard` for the purposes of the current request; the
    /// shard is not unloaded automatically.
    Io(io::Error),
}

impl fmt::Display for SorexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SorexError::CorruptShard(msg) => write!(f, "corrupt shard: {msg}"),
            SorexError::QueryTooShort { pattern, suggestion } => write!(
                f,
                "query too short: {pattern:?} is under the ngram width; try {suggestion:?}"
            ),
            SorexError::UnsupportedQueryShape(msg) => write!(f, "unsupported query shape: {msg}"),
            SorexError::Io(err) => write!(f, "i/o error: {err}"),
        }
    }
}

impl std::error::Error for SorexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SorexError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SorexError {
    fn from(err: io::Error) -> Self {
        SorexError::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, SorexError>;

/// Shorthand for constructing a corrupt-shard error with a formatted message.
pub fn corrupt<S: Into<String>>(msg: S) -> SorexError {
    SorexError::CorruptShard(msg.into())
}
