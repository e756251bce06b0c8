// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Per-search options and their defaults (spec §4.7/§6).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub shard_max_match_count: usize,
    pub total_max_match_count: usize,
    pub shard_max_important_match: usize,
    pub total_max_important_match: usize,
    pub max_wall_time: Option<Duration>,
    /// Return the full file content alongside matches.
    pub whole: bool,
    /// Report only a document-count estimate, skipping match gathering.
    pub estimate_doc_count: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            shard_max_match_count: 100_000,
            total_max_match_count: 1_000_000,
            shard_max_important_match: 10,
            total_max_important_match: 100,
            max_wall_time: None,
            whole: false,
            estimate_doc_count: false,
        }
    }
}
