// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Shared geometry for co-walking the two rarest ngrams of a substring
//! pattern: the actual cursor co-walk lives in `matchtree`'s
//! `PostingCoWalk`, which consumes [`DocIterParams`] and these helpers
//! directly over the fully materialized posting unions `Shard::posting_union`
//! produces.

/// Parameters derived from picking the two least-frequent ngrams of a
/// pattern (see spec §4.3 step 3-5).
#[derive(Debug, Clone, Copy)]
pub struct DocIterParams {
    pub left_pad: u32,
    pub right_pad: u32,
    pub distance: u32,
    pub covers_content: bool,
}

impl DocIterParams {
    pub fn new(i1: u32, i2: u32, pattern_rune_count: u32) -> Self {
        let left_pad = i1;
        let right_pad = (pattern_rune_count - 3) - i2;
        let distance = i2 - i1;
        let covers_content = distance <= 3 && left_pad == 0 && right_pad == 0;
        Self {
            left_pad,
            right_pad,
            distance,
            covers_content,
        }
    }
}

/// Find the index of the document containing global rune position `p`,
/// given the shard's cumulative `file_end_runes` table, starting the search
/// no earlier than `from`. Returns `None` if `p` is past the end of the
/// corpus (exhausted).
pub(crate) fn locate_doc(file_end_runes: &[u32], p: u32, from: usize) -> Option<usize> {
    if from >= file_end_runes.len() {
        return None;
    }
    // file_end_runes[i] is the exclusive rune end of document i, so the
    // owning document is the first i with file_end_runes[i] > p.
    let slice = &file_end_runes[from..];
    let idx = match slice.binary_search(&p) {
        Ok(idx) => idx + 1, // p == end of doc `idx`, belongs to the next doc
        Err(idx) => idx,
    };
    let doc = from + idx;
    if doc < file_end_runes.len() {
        Some(doc)
    } else {
        None
    }
}

pub(crate) fn doc_start(file_end_runes: &[u32], doc_id: usize) -> u32 {
    if doc_id == 0 {
        0
    } else {
        file_end_runes[doc_id - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_content_detected_for_adjacent_trigrams() {
        let params = DocIterParams::new(0, 2, 5);
        assert!(params.covers_content);
        let params2 = DocIterParams::new(0, 4, 8);
        assert!(!params2.covers_content);
    }
}
