// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Sharded aggregator: fans a query out across all loaded shards, isolates
//! per-shard panics, merges results, and re-sorts by score.
//!
//! The shard map is a `parking_lot::RwLock` so reads (searches) never block
//! each other; a write lock is only taken to load or unload a shard, mirroring
//! the teacher's own single-writer/many-readers discipline around its index
//! structures.

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rayon::prelude::*;
use tracing::warn;

use crate::binary::RepoMetadata;
use crate::query::Query;
use crate::search::{self, FileMatch, SearchOptions};
use crate::shard::Shard;

#[derive(Debug, Clone, Default)]
pub struct AggregateStats {
    pub files_loaded: u64,
    pub files_considered: u64,
    pub files_skipped: u64,
    pub match_count: u64,
    pub important_match_count: u64,
    /// Shards excluded this request because they panicked mid-search.
    pub crashes: u64,
    /// Shards excluded this request because they were corrupt.
    pub corrupt_shards: u64,
    pub canceled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AggregateResult {
    pub files: Vec<FileMatch>,
    pub stats: AggregateStats,
}

/// Interface a directory watcher implements to keep the aggregator's shard
/// map in sync with on-disk shard files. This crate exposes the trait but
/// does not implement a concrete watcher (no `notify` dependency) — wiring
/// one up is left to the embedding application.
pub trait ShardSetUpdater: Send + Sync {
    fn poll(&self, aggregator: &Aggregator);
}

pub struct Aggregator {
    shards: RwLock<std::collections::HashMap<String, Arc<Shard>>>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            shards: RwLock::new(std::collections::HashMap::new()),
        }
    }

    pub fn load(&self, key: impl Into<String>, shard: Arc<Shard>) {
        self.shards.write().insert(key.into(), shard);
    }

    pub fn unload(&self, key: &str) {
        self.shards.write().remove(key);
    }

    pub fn shard_count(&self) -> usize {
        self.shards.read().len()
    }

    /// Fan a query out to every loaded shard, isolate crashes, and return a
    /// merged, re-sorted aggregate.
    pub fn search(&self, query: Query, options: &SearchOptions) -> AggregateResult {
        let snapshot: Vec<Arc<Shard>> = self.shards.read().values().cloned().collect();
        let cancel = Arc::new(AtomicBool::new(false));
        let total_match_count = AtomicU64::new(0);
        let total_important = AtomicU64::new(0);
        let crashes = AtomicU64::new(0);
        let corrupt_shards = AtomicU64::new(0);

        let per_shard: Vec<Option<crate::search::ShardResult>> = snapshot
            .par_iter()
            .map(|shard| {
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    search::search(shard, query.clone(), options, Some(cancel.as_ref()))
                }));
                match outcome {
                    Ok(Ok(result)) => {
                        let running_matches = total_match_count.fetch_add(result.stats.match_count, Ordering::Relaxed)
                            + result.stats.match_count;
                        let running_important = total_important
                            .fetch_add(result.stats.important_match_count, Ordering::Relaxed)
                            + result.stats.important_match_count;
                        if running_matches >= options.total_max_match_count as u64
                            || running_important >= options.total_max_important_match as u64
                        {
                            cancel.store(true, Ordering::Relaxed);
                        }
                        Some(result)
                    }
                    Ok(Err(err)) => {
                        warn!(error = %err, "excluding corrupt shard from search");
                        corrupt_shards.fetch_add(1, Ordering::Relaxed);
                        None
                    }
                    Err(_) => {
                        warn!("shard search panicked; excluding shard from this request");
                        crashes.fetch_add(1, Ordering::Relaxed);
                        None
                    }
                }
            })
            .collect();

        let mut files = Vec::new();
        let mut stats = AggregateStats {
            crashes: crashes.into_inner(),
            corrupt_shards: corrupt_shards.into_inner(),
            canceled: cancel.load(Ordering::Relaxed),
            ..Default::default()
        };
        for shard_result in per_shard.into_iter().flatten() {
            stats.files_loaded += shard_result.stats.files_loaded;
            stats.files_considered += shard_result.stats.files_considered;
            stats.files_skipped += shard_result.stats.files_skipped;
            stats.match_count += shard_result.stats.match_count;
            stats.important_match_count += shard_result.stats.important_match_count;
            stats.canceled |= shard_result.stats.canceled;
            files.extend(shard_result.files);
        }

        files.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        AggregateResult { files, stats }
    }

    /// Per-repo metadata across every loaded shard, de-duplicated by name.
    pub fn list(&self) -> Vec<RepoMetadata> {
        let snapshot = self.shards.read();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for shard in snapshot.values() {
            if seen.insert(shard.repo_metadata.name.clone()) {
                out.push(shard.repo_metadata.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::header::SectionId;
    use crate::binary::{assemble, Metadata, SectionData};

    fn trivial_shard_bytes(repo_name: &str, content: &[u8]) -> Vec<u8> {
        let metadata = Metadata::current(1, 1).encode();
        let repo = RepoMetadata {
            name: repo_name.to_string(),
            branches: vec!["HEAD".to_string()],
            ..Default::default()
        };
        let sections = vec![
            SectionData::Simple {
                id: SectionId::Metadata,
                bytes: metadata,
            },
            SectionData::Simple {
                id: SectionId::RepoMetadata,
                bytes: repo.encode(),
            },
            SectionData::Compound {
                id: SectionId::FileContents,
                data: content.to_vec(),
                index: [0u32, content.len() as u32]
                    .iter()
                    .flat_map(|v| v.to_be_bytes())
                    .collect(),
            },
            SectionData::Compound {
                id: SectionId::FileNames,
                data: b"a.txt".to_vec(),
                index: [0u32, 5u32].iter().flat_map(|v| v.to_be_bytes()).collect(),
            },
            SectionData::Compound {
                id: SectionId::FileSections,
                data: Vec::new(),
                index: [0u32, 0u32].iter().flat_map(|v| v.to_be_bytes()).collect(),
            },
            SectionData::Compound {
                id: SectionId::Newlines,
                data: Vec::new(),
                index: [0u32, 0u32].iter().flat_map(|v| v.to_be_bytes()).collect(),
            },
            SectionData::Compound {
                id: SectionId::RuneDocSections,
                data: Vec::new(),
                index: [0u32, 0u32].iter().flat_map(|v| v.to_be_bytes()).collect(),
            },
            SectionData::Simple {
                id: SectionId::NgramText,
                bytes: Vec::new(),
            },
            SectionData::Compound {
                id: SectionId::Postings,
                data: Vec::new(),
                index: Vec::new(),
            },
            SectionData::Simple {
                id: SectionId::NameNgramText,
                bytes: Vec::new(),
            },
            SectionData::Compound {
                id: SectionId::NamePostings,
                data: Vec::new(),
                index: Vec::new(),
            },
            SectionData::Simple {
                id: SectionId::BranchMasks,
                bytes: 1u64.to_be_bytes().to_vec(),
            },
            SectionData::Simple {
                id: SectionId::Languages,
                bytes: 0u32.to_be_bytes().to_vec(),
            },
            SectionData::Simple {
                id: SectionId::FileEndRunes,
                bytes: (content.len() as u32).to_be_bytes().to_vec(),
            },
            SectionData::Simple {
                id: SectionId::NameEndRunes,
                bytes: 5u32.to_be_bytes().to_vec(),
            },
            SectionData::Simple {
                id: SectionId::ContentChecksums,
                bytes: 0u64.to_be_bytes().to_vec(),
            },
            SectionData::Simple {
                id: SectionId::RuneOffsets,
                bytes: 0u32.to_be_bytes().to_vec(),
            },
            SectionData::Simple {
                id: SectionId::NameRuneOffsets,
                bytes: 0u32.to_be_bytes().to_vec(),
            },
        ];
        assemble(sections)
    }

    #[test]
    fn list_dedupes_repos_by_name() {
        let agg = Aggregator::new();
        let bytes1 = trivial_shard_bytes("demo", b"hello world");
        let bytes2 = trivial_shard_bytes("demo", b"second shard");
        agg.load("shard-0", Shard::open_bytes(bytes1).unwrap());
        agg.load("shard-1", Shard::open_bytes(bytes2).unwrap());
        assert_eq!(agg.list().len(), 1);
    }

    #[test]
    fn unload_removes_shard_from_search_scope() {
        let agg = Aggregator::new();
        let bytes = trivial_shard_bytes("demo", b"hello world");
        agg.load("only", Shard::open_bytes(bytes).unwrap());
        assert_eq!(agg.shard_count(), 1);
        agg.unload("only");
        assert_eq!(agg.shard_count(), 0);
    }
}
