// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Shard search: options, results, and the per-shard driver loop.

pub mod options;
pub mod result;
pub mod searcher;

pub use options::SearchOptions;
pub use result::{FileMatch, LineMatch, ShardResult, Stats};
pub use searcher::search;
