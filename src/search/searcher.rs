// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Shard searcher: the per-shard driver loop (spec §4.5/§4.7).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::content::ContentProvider;
use crate::error::Result;
use crate::matchtree::{build, simplify, CostTier, Known, MatchNode, SpanCandidate};
use crate::query::Query;
use crate::scoring;
use crate::shard::Shard;

use super::options::SearchOptions;
use super::result::{FileMatch, LineMatch, ShardResult, Stats};

/// Search one shard. `cancel`, when set, is polled once per document
/// iteration — the aggregator sets it to broadcast a cross-shard abort.
pub fn search(shard: &Shard, query: Query, options: &SearchOptions, cancel: Option<&AtomicBool>) -> Result<ShardResult> {
    let simplified = simplify::simplify(query, shard.repo_name());
    if simplified == Query::Const(false) {
        return Ok(ShardResult::default());
    }

    let mut root = build::compile(&simplified, shard)?;
    let mut cp = ContentProvider::new(shard);
    let mut known = Known::default();
    let mut stats = Stats::default();
    let mut files = Vec::new();
    let deadline = options.max_wall_time.map(|d| Instant::now() + d);

    let mut doc = root.next_doc(shard);
    let mut early_break = false;
    while doc != u32::MAX {
        if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            stats.canceled = true;
            early_break = true;
            break;
        }
        if let Some(dl) = deadline {
            if Instant::now() >= dl {
                stats.canceled = true;
                early_break = true;
                break;
            }
        }
        if stats.match_count as usize >= options.shard_max_match_count
            || stats.important_match_count as usize >= options.shard_max_important_match
        {
            early_break = true;
            break;
        }

        root.prepare(shard, doc);
        cp.set_document(doc);
        known.clear();
        stats.files_considered += 1;

        let mut accepted = false;
        for cost in CostTier::ALL {
            let (v, sure) = root.matches(shard, &mut cp, cost, &mut known);
            if sure && !v {
                break;
            }
            if sure && v && cost == CostTier::Regex {
                accepted = true;
            }
        }

        if accepted && !options.estimate_doc_count {
            if let Some(file_match) = build_file_match(shard, &mut cp, &root, options)? {
                stats.match_count += file_match.line_matches.len() as u64;
                if scoring::is_important(file_match.score) {
                    stats.important_match_count += 1;
                }
                files.push(file_match);
            }
        } else if accepted {
            stats.match_count += 1;
        }

        doc = root.next_doc(shard);
    }

    if early_break {
        // `doc` itself, plus everything the cursor would still have produced
        // after it, were never considered — cheap to count since advancing
        // the cursor (unlike `matches`) does no per-document work.
        let mut skipped = 1u64;
        while root.next_doc(shard) != u32::MAX {
            skipped += 1;
        }
        stats.files_skipped = skipped;
    }

    stats.files_loaded = cp.files_loaded();
    Ok(ShardResult { files, stats })
}

fn build_file_match(
    shard: &Shard,
    cp: &mut ContentProvider,
    root: &MatchNode,
    options: &SearchOptions,
) -> Result<Option<FileMatch>> {
    let mut spans = Vec::new();
    root.gather(cp, &mut spans)?;
    if spans.is_empty() {
        return Ok(None);
    }

    let has_content_match = spans.iter().any(|s| !s.is_file_name);
    if has_content_match {
        spans.retain(|s| !s.is_file_name);
    }

    let merged = merge_spans(spans);
    let (total_atoms, matched_atoms) = root.count_atoms();

    let doc_id = cp.doc_id();
    let name_bytes = cp.data(true)?.to_vec();
    let file_name = String::from_utf8_lossy(&name_bytes).to_string();

    let line_matches = if has_content_match {
        let content = cp.data(false)?.to_vec();
        let newlines = cp.newlines()?.to_vec();
        build_line_matches(&merged, &content, &newlines)
    } else {
        vec![LineMatch {
            line_bytes: name_bytes.clone(),
            line_number: 0,
            byte_start: 0,
            byte_end: name_bytes.len() as u32,
            fragments: merged.iter().map(|s| (s.byte_offset, s.byte_len)).collect(),
        }]
    };

    let line_bases: Vec<f64> = line_matches
        .iter()
        .map(|lm| scoring::line_base_score(&lm.line_bytes, &fragments_as_tuples(&lm.fragments)))
        .collect();
    let score = scoring::file_score(&line_bases, matched_atoms, total_atoms, doc_id, shard.doc_count());

    let whole_content = if options.whole && has_content_match {
        Some(cp.data(false)?.to_vec())
    } else {
        None
    };

    Ok(Some(FileMatch {
        doc_id,
        file_name,
        score,
        line_matches,
        whole_content,
    }))
}

fn fragments_as_tuples(fragments: &[(u32, u32)]) -> Vec<(usize, usize)> {
    fragments.iter().map(|&(o, l)| (o as usize, l as usize)).collect()
}

fn merge_spans(mut spans: Vec<SpanCandidate>) -> Vec<SpanCandidate> {
    if spans.is_empty() {
        return spans;
    }
    spans.sort_by_key(|s| s.byte_offset);
    let mut merged = vec![spans[0]];
    for s in spans.into_iter().skip(1) {
        let last = merged.last_mut().unwrap();
        if s.byte_offset <= last.byte_offset + last.byte_len {
            let new_end = (s.byte_offset + s.byte_len).max(last.byte_offset + last.byte_len);
            last.byte_len = new_end - last.byte_offset;
        } else {
            merged.push(s);
        }
    }
    merged
}

/// Split merged spans on newlines and group fragments by line number.
fn build_line_matches(spans: &[SpanCandidate], content: &[u8], newlines: &[u32]) -> Vec<LineMatch> {
    let mut by_line: BTreeMap<u32, (u32, u32, Vec<(u32, u32)>)> = BTreeMap::new();
    for s in spans {
        let mut pos = s.byte_offset;
        let end = s.byte_offset + s.byte_len;
        while pos < end {
            let line_no = newlines.partition_point(|&nl| nl < pos) as u32;
            let line_start = if line_no == 0 { 0 } else { newlines[line_no as usize - 1] + 1 };
            let line_end = newlines.get(line_no as usize).copied().unwrap_or(content.len() as u32);
            let seg_end = end.min(line_end);
            let entry = by_line.entry(line_no).or_insert_with(|| (line_start, line_end, Vec::new()));
            entry.2.push((pos - line_start, seg_end - pos));
            pos = seg_end + 1;
        }
    }
    by_line
        .into_iter()
        .map(|(line_no, (start, end, fragments))| {
            let bound = (end as usize).min(content.len());
            LineMatch {
                line_bytes: content[start as usize..bound].to_vec(),
                line_number: line_no + 1,
                byte_start: start,
                byte_end: end,
                fragments,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{InputDocument, ShardBuilder};
    use crate::query::Query;

    fn shard_with_matches(count: usize) -> Shard {
        let mut builder = ShardBuilder::new("demo/repo", vec!["HEAD".to_string()]);
        for i in 0..count {
            builder.add_document(InputDocument::new(format!("f{i}.txt"), *b"needle in the haystack", 1));
        }
        Shard::open_bytes(builder.build()).unwrap()
    }

    #[test]
    fn hitting_the_match_cap_reports_the_rest_as_skipped() {
        let shard = shard_with_matches(5);
        let mut options = SearchOptions::default();
        options.shard_max_match_count = 2;
        let query = Query::substring("needle");

        let result = search(&shard, query, &options, None).unwrap();
        assert_eq!(result.stats.files_considered, 2);
        assert_eq!(result.stats.files_skipped, 3);
    }

    #[test]
    fn exhausting_every_candidate_leaves_nothing_skipped() {
        let shard = shard_with_matches(3);
        let options = SearchOptions::default();
        let query = Query::substring("needle");

        let result = search(&shard, query, &options, None).unwrap();
        assert_eq!(result.stats.files_considered, 3);
        assert_eq!(result.stats.files_skipped, 0);
    }

    #[test]
    fn cancellation_mid_search_reports_remaining_as_skipped() {
        let shard = shard_with_matches(4);
        let options = SearchOptions::default();
        let query = Query::substring("needle");
        let cancel = AtomicBool::new(true);

        let result = search(&shard, query, &options, Some(&cancel)).unwrap();
        assert!(result.stats.canceled);
        assert_eq!(result.stats.files_considered, 0);
        assert_eq!(result.stats.files_skipped, 4);
    }
}
