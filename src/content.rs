// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Content provider: the lazy per-document view used while evaluating a
//! matchtree against one document.
//!
//! A single `ContentProvider` is owned by the shard searcher and retargeted
//! to a new document via [`ContentProvider::set_document`], which discards
//! every cached view. At most one document is "current" at a time.

use crate::error::{corrupt, Result};
use crate::shard::Shard;

/// Lazily loaded, per-document view over content and file-name bytes, plus
/// the derived newline/rune-offset/symbol tables.
pub struct ContentProvider<'a> {
    shard: &'a Shard,
    doc_id: u32,
    content: Option<&'a [u8]>,
    name: Option<&'a [u8]>,
    newlines: Option<Vec<u32>>,
    files_loaded: u64,
}

impl<'a> ContentProvider<'a> {
    pub fn new(shard: &'a Shard) -> Self {
        Self {
            shard,
            doc_id: u32::MAX,
            content: None,
            name: None,
            newlines: None,
            files_loaded: 0,
        }
    }

    /// Point the provider at a new document, invalidating every cached view.
    pub fn set_document(&mut self, doc_id: u32) {
        if self.doc_id == doc_id {
            return;
        }
        self.doc_id = doc_id;
        self.content = None;
        self.name = None;
        self.newlines = None;
    }

    pub fn doc_id(&self) -> u32 {
        self.doc_id
    }

    /// Number of distinct documents whose content bytes were actually
    /// loaded so far (as opposed to only being named-metadata-checked).
    pub fn files_loaded(&self) -> u64 {
        self.files_loaded
    }

    pub fn data(&mut self, file_name: bool) -> Result<&'a [u8]> {
        if file_name {
            if self.name.is_none() {
                self.name = Some(self.shard.doc_name(self.doc_id)?);
            }
            Ok(self.name.unwrap())
        } else {
            if self.content.is_none() {
                self.content = Some(self.shard.doc_content(self.doc_id)?);
                self.files_loaded += 1;
            }
            Ok(self.content.unwrap())
        }
    }

    pub fn newlines(&mut self) -> Result<&[u32]> {
        if self.newlines.is_none() {
            self.newlines = Some(self.shard.doc_newlines(self.doc_id)?);
        }
        Ok(self.newlines.as_ref().unwrap())
    }

    /// Document-relative symbol sections, `(start_rune, end_rune)`, sorted
    /// and disjoint.
    pub fn doc_sections(&self) -> Result<Vec<(u32, u32)>> {
        self.shard.doc_symbol_sections(self.doc_id)
    }

    /// Resolve a rune offset into this document's content (or name) to a
    /// byte offset, using the rune-offset map's stride to jump close and
    /// then scanning the remainder rune by rune. A corrupt stride table
    /// (non-monotonic, out of range) surfaces as `SorexError::CorruptShard`.
    pub fn find_offset(&mut self, file_name: bool, rune_offset: u32) -> Result<u32> {
        let bytes = self.data(file_name)?;
        let stride = crate::binary::header::RUNE_OFFSET_STRIDE;
        let checkpoint_index = rune_offset / stride;
        let rune_offset_map = self.shard.doc_rune_offsets(self.doc_id, file_name)?;
        let (mut byte_pos, mut rune_pos) = match rune_offset_map.get(checkpoint_index as usize) {
            Some(&byte_off) => (byte_off, checkpoint_index * stride),
            None => (0u32, 0u32),
        };
        if byte_pos as usize > bytes.len() {
            return Err(corrupt("rune-offset checkpoint points past end of document"));
        }
        while rune_pos < rune_offset {
            let rest = bytes
                .get(byte_pos as usize..)
                .ok_or_else(|| corrupt("rune-offset map out of bounds"))?;
            let ch = std::str::from_utf8(rest)
                .ok()
                .and_then(|s| s.chars().next())
                .or_else(|| rest.first().map(|&b| b as char));
            let ch_len = ch.map(|c| c.len_utf8()).unwrap_or(1);
            byte_pos += ch_len as u32;
            rune_pos += 1;
        }
        Ok(byte_pos)
    }
}

/// Compare a byte region against a pattern under Unicode "simple fold"
/// case-insensitive equality, decoding both sides rune by rune. ASCII-only
/// fast paths are only safe when BOTH sides are provably ASCII — some ASCII
/// letters fold to non-ASCII code points (lower-case `k` folds to the
/// Kelvin sign, U+212A), so naive byte-wise ASCII folding is unsound here.
pub fn case_fold_eq(region: &[u8], pattern: &str, case_sensitive: bool) -> bool {
    let region_str = match std::str::from_utf8(region) {
        Ok(s) => s,
        Err(_) => return false,
    };
    if case_sensitive {
        return region_str == pattern;
    }
    if region_str.is_ascii() && pattern.is_ascii() {
        return region_str.eq_ignore_ascii_case(pattern);
    }
    let mut a = region_str.chars().flat_map(|c| c.to_lowercase());
    let mut b = pattern.chars().flat_map(|c| c.to_lowercase());
    loop {
        match (a.next(), b.next()) {
            (None, None) => return true,
            (Some(x), Some(y)) if x == y => continue,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_fold_eq_handles_kelvin_sign() {
        // U+212A KELVIN SIGN folds to 'k'.
        assert!(case_fold_eq("\u{212A}".as_bytes(), "k", false));
        assert!(case_fold_eq("K".as_bytes(), "k", false));
    }

    #[test]
    fn case_fold_eq_respects_case_sensitive_flag() {
        assert!(!case_fold_eq(b"Water", "water", true));
        assert!(case_fold_eq(b"Water", "water", false));
    }

    #[test]
    fn case_fold_eq_handles_non_ascii_mixed_case() {
        assert!(case_fold_eq("NÉÉDLÉ".as_bytes(), "néédlé", false));
    }
}
