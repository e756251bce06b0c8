// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! trigrep CLI: build, inspect, and search `.shard` indexes.
//!
//! ```bash
//! # Build a shard from a directory tree
//! trigrep index ./my-repo --output ./my-repo.shard --repo my-repo
//!
//! # Inspect the binary structure
//! trigrep inspect ./my-repo.shard
//!
//! # Search it (or every .shard file in a directory)
//! trigrep search ./my-repo.shard "TODO" --limit 20
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use trigrep::aggregator::Aggregator;
use trigrep::build::{InputDocument, ShardBuilder};
use trigrep::query::Query;
use trigrep::search::SearchOptions;
use trigrep::shard::Shard;

mod cli;
use cli::{Cli, Commands};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Index { input, output, repo, branch } => run_index(&input, &output, repo, &branch),
        Commands::Inspect { file } => run_inspect(&file),
        Commands::Search {
            path,
            query,
            regex,
            case_sensitive,
            file_name,
            limit,
        } => run_search(&path, &query, regex, case_sensitive, file_name, limit),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_index(input: &str, output: &str, repo: Option<String>, branch: &str) -> Result<(), Box<dyn std::error::Error>> {
    let input_path = Path::new(input);
    let repo_name = repo.unwrap_or_else(|| {
        input_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.to_string())
    });

    let mut builder = ShardBuilder::new(repo_name, vec![branch.to_string()]);
    let mut files = Vec::new();
    collect_files(input_path, &mut files);
    files.sort();

    for path in &files {
        let content = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable file");
                continue;
            }
        };
        let rel_name = path
            .strip_prefix(input_path)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        builder.add_document(InputDocument::new(rel_name, content, 1));
    }

    println!("indexed {} files", files.len());
    let bytes = builder.build();
    fs::write(output, &bytes)?;
    println!("wrote {output} ({} bytes)", bytes.len());
    Ok(())
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out);
        } else if path.is_file() {
            out.push(path);
        }
    }
}

fn run_inspect(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    let shard = Shard::open(file)?;
    println!("repo:         {}", shard.repo_name());
    println!("branches:     {:?}", shard.repo_metadata.branches);
    println!("doc count:    {}", shard.doc_count());
    println!("format:       v{}", shard.metadata.index_format_version);
    println!("feature ver:  {}", shard.metadata.feature_version);
    for doc_id in 0..shard.doc_count().min(20) {
        let name = String::from_utf8_lossy(shard.doc_name(doc_id)?).into_owned();
        let content_len = shard.doc_content(doc_id)?.len();
        println!("  [{doc_id}] {name} ({content_len} bytes)");
    }
    if shard.doc_count() > 20 {
        println!("  ... and {} more", shard.doc_count() - 20);
    }
    Ok(())
}

fn run_search(
    path: &str,
    query: &str,
    regex: bool,
    case_sensitive: bool,
    file_name: bool,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let aggregator = Aggregator::new();
    let shard_paths = if Path::new(path).is_dir() {
        let mut files = Vec::new();
        collect_files(Path::new(path), &mut files);
        files.retain(|p| p.extension().is_some_and(|e| e == "shard"));
        files
    } else {
        vec![PathBuf::from(path)]
    };

    for (i, shard_path) in shard_paths.iter().enumerate() {
        let shard: Arc<Shard> = Shard::open(shard_path)?;
        aggregator.load(format!("shard-{i}"), shard);
    }

    let q = if regex {
        Query::Regexp {
            regexp: query.to_string(),
            file_name,
            case_sensitive,
        }
    } else {
        Query::Substring {
            pattern: query.to_string(),
            case_sensitive,
            file_name,
            content: !file_name,
        }
    };

    let options = SearchOptions::default();
    let result = aggregator.search(q, &options);

    for file in result.files.iter().take(limit) {
        println!("{} (score {:.1})", file.file_name, file.score);
        for lm in &file.line_matches {
            let line = String::from_utf8_lossy(&lm.line_bytes);
            println!("  {}: {}", lm.line_number, line.trim_end());
        }
    }
    println!(
        "--- {} files considered, {} skipped, {} matches, {} important, canceled={}",
        result.stats.files_considered,
        result.stats.files_skipped,
        result.stats.match_count,
        result.stats.important_match_count,
        result.stats.canceled
    );
    Ok(())
}
