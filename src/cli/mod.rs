// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! CLI definitions for the trigrep command-line interface.
//!
//! Three subcommands: `index` to build a shard from a directory tree,
//! `inspect` to examine a `.shard` file's layout, and `search` to query one
//! or more shards and print ranked results.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "trigrep", about = "Trigram-indexed code search", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a shard from a directory of source files
    Index {
        /// Root directory to walk and index
        input: String,

        /// Output path for the resulting `.shard` file
        #[arg(short, long)]
        output: String,

        /// Repository name recorded in the shard (defaults to the input directory name)
        #[arg(short, long)]
        repo: Option<String>,

        /// Branch name the indexed files belong to
        #[arg(short, long, default_value = "HEAD")]
        branch: String,
    },

    /// Print a shard's metadata, repo info, and document count
    Inspect {
        /// Path to a `.shard` file
        file: String,
    },

    /// Search one or more `.shard` files and print ranked matches
    Search {
        /// Path to a `.shard` file, or a directory containing several
        path: String,

        /// Substring or regex pattern to search for
        query: String,

        /// Treat the query as a regular expression instead of a literal substring
        #[arg(long)]
        regex: bool,

        /// Match case-sensitively
        #[arg(long)]
        case_sensitive: bool,

        /// Search file names instead of file contents
        #[arg(long)]
        file_name: bool,

        /// Maximum number of files to print
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}
