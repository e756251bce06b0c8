// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Deterministic scoring: every number a query run ever produces is a pure
//! function of the match positions and shard metadata, never of wall-clock
//! time or iteration order.

/// Bonus for a match with a word-class boundary (alphabetic/digit vs. not)
/// on both sides.
pub const SCORE_WORD_BOUNDARY_BOTH: f64 = 50_000.0;
/// Bonus for a match with a word-class boundary on exactly one side.
pub const SCORE_WORD_BOUNDARY_ONE: f64 = 5_000.0;
/// Per-atom contribution, scaled by the fraction of a query's atoms that
/// matched a given file.
pub const SCORE_ATOM: f64 = 1_000.0;
/// A file's score must exceed this to count toward `importantMatches`.
pub const SCORE_IMPORTANT_THRESHOLD: f64 = 1_000.0;

fn is_word_class(b: Option<u8>) -> bool {
    b.is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
}

/// Word-boundary bonus for a match spanning `[start, end)` within `line`.
pub fn word_boundary_bonus(line: &[u8], start: usize, end: usize) -> f64 {
    let before = start.checked_sub(1).map(|i| line[i]);
    let after = line.get(end).copied();
    let left_boundary = is_word_class(before) != is_word_class(Some(line.get(start).copied().unwrap_or(0)));
    let right_boundary = is_word_class(after) != is_word_class(Some(line.get(end.saturating_sub(1)).copied().unwrap_or(0)));
    match (left_boundary, right_boundary) {
        (true, true) => SCORE_WORD_BOUNDARY_BOTH,
        (true, false) | (false, true) => SCORE_WORD_BOUNDARY_ONE,
        (false, false) => 0.0,
    }
}

/// Per-line base score: the best word-boundary bonus among the line's
/// fragments.
pub fn line_base_score(line: &[u8], fragments: &[(usize, usize)]) -> f64 {
    fragments
        .iter()
        .map(|&(offset, len)| word_boundary_bonus(line, offset, offset + len))
        .fold(0.0, f64::max)
}

/// Document-index stability term: later documents score a tiny bit higher
/// so ties break toward them (spec: `10 * docID / docCount`).
pub fn doc_id_term(doc_id: u32, doc_count: u32) -> f64 {
    if doc_count == 0 {
        0.0
    } else {
        10.0 * (doc_id as f64) / (doc_count as f64)
    }
}

/// Within-file position term: earlier lines score a bit higher, preserving
/// source order on equal scores (spec: `1 - i/N`).
pub fn position_term(line_index: usize, line_count: usize) -> f64 {
    if line_count == 0 {
        0.0
    } else {
        1.0 - (line_index as f64 / line_count as f64)
    }
}

/// Full file score: `max(line_base) + atomFraction * SCORE_ATOM + docIdTerm +
/// positionTerm` (of the best-scoring line).
pub fn file_score(
    line_bases: &[f64],
    matched_atoms: usize,
    total_atoms: usize,
    doc_id: u32,
    doc_count: u32,
) -> f64 {
    let max_line = line_bases.iter().copied().fold(0.0, f64::max);
    let best_line_index = line_bases
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(i, _)| i)
        .unwrap_or(0);
    let atom_fraction = if total_atoms == 0 {
        1.0
    } else {
        matched_atoms as f64 / total_atoms as f64
    };
    max_line
        + atom_fraction * SCORE_ATOM
        + doc_id_term(doc_id, doc_count)
        + position_term(best_line_index, line_bases.len())
}

pub fn is_important(score: f64) -> bool {
    score > SCORE_IMPORTANT_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_boundary_on_both_sides_scores_highest() {
        let line = b"the water is cold";
        let bonus = word_boundary_bonus(line, 4, 9); // "water"
        assert_eq!(bonus, SCORE_WORD_BOUNDARY_BOTH);
    }

    #[test]
    fn no_boundary_scores_zero() {
        let line = b"watermelon";
        let bonus = word_boundary_bonus(line, 0, 5); // "water" inside "watermelon"
        assert_eq!(bonus, 0.0);
    }

    #[test]
    fn doc_id_term_increases_with_doc_id() {
        assert!(doc_id_term(9, 10) > doc_id_term(1, 10));
    }

    #[test]
    fn position_term_favors_earlier_lines() {
        assert!(position_term(0, 10) > position_term(5, 10));
    }

    #[test]
    fn important_threshold_is_exclusive() {
        assert!(!is_important(SCORE_IMPORTANT_THRESHOLD));
        assert!(is_important(SCORE_IMPORTANT_THRESHOLD + 1.0));
    }
}
