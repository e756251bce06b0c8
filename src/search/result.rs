// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Result types returned by a shard (or aggregated) search.

#[derive(Debug, Clone)]
pub struct LineMatch {
    pub line_bytes: Vec<u8>,
    pub line_number: u32,
    pub byte_start: u32,
    pub byte_end: u32,
    /// `(line_offset, match_length)` pairs within `line_bytes`.
    pub fragments: Vec<(u32, u32)>,
}

#[derive(Debug, Clone)]
pub struct FileMatch {
    pub doc_id: u32,
    pub file_name: String,
    pub score: f64,
    pub line_matches: Vec<LineMatch>,
    /// Present only when `SearchOptions::whole` was set.
    pub whole_content: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub files_loaded: u64,
    pub files_considered: u64,
    pub files_skipped: u64,
    pub match_count: u64,
    pub important_match_count: u64,
    pub canceled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ShardResult {
    pub files: Vec<FileMatch>,
    pub stats: Stats,
}
