// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Trigram-indexed code search.
//!
//! A shard is an immutable, mmap-backed file holding one repository's
//! documents plus derived ngram indexes (see [`binary`] for the on-disk
//! layout and [`shard`] for the opened, validated view). Queries are an
//! algebraic tree ([`query`]) compiled per-shard into a [`matchtree`] whose
//! leaves co-walk posting-list positions ([`dociter`], `matchtree`'s
//! `PostingCoWalk`) and
//! lazily pull content through a [`content::ContentProvider`]. [`search`]
//! drives one shard's matchtree across its documents; [`aggregator`] fans a
//! query out across every loaded shard, isolating per-shard panics and
//! merging ranked results. [`build`] assembles a document set into a
//! shard's bit-exact on-disk layout.
//!
//! ```no_run
//! use std::sync::Arc;
//! use trigrep::aggregator::Aggregator;
//! use trigrep::query::Query;
//! use trigrep::search::SearchOptions;
//! use trigrep::shard::Shard;
//!
//! let shard = Shard::open("repo.shard").unwrap();
//! let aggregator = Aggregator::new();
//! aggregator.load("repo", shard);
//!
//! let result = aggregator.search(Query::substring("TODO"), &SearchOptions::default());
//! for file in result.files {
//!     println!("{}: {}", file.file_name, file.score);
//! }
//! ```

pub mod accessor;
pub mod aggregator;
pub mod binary;
pub mod build;
pub mod content;
pub mod dociter;
pub mod error;
pub mod matchtree;
pub mod query;
pub mod scoring;
pub mod search;
pub mod shard;

pub use aggregator::{AggregateResult, AggregateStats, Aggregator};
pub use error::{Result, SorexError};
pub use query::Query;
pub use search::{FileMatch, LineMatch, SearchOptions, ShardResult};
pub use shard::Shard;
