// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! `Shard`: an opened, validated shard file — the accessor plus its TOC
//! plus the small per-document index arrays needed to resolve documents,
//! postings, and symbol sections on demand.
//!
//! Large data blobs (file contents, file names, postings) are read lazily
//! through the accessor; the per-document offset/index arrays are small
//! enough (one `u32` per document per table) that they're decoded eagerly
//! at open time, the same way the teacher's own `LoadedLayer::from_bytes`
//! eagerly decodes its section tables.

use std::collections::HashMap;
use std::path::Path;

use crate::accessor::{InMemoryAccessor, InMemoryPins, MmapAccessor, SharedAccessor, ShardAccessor};
use crate::binary::encoding::{decode_varint, ngram_to_runes};
use crate::binary::header::SectionId;
use crate::binary::postings::{decode_content_posting, decode_name_posting};
use crate::binary::toc::{SectionSpan, Toc};
use crate::binary::{read_toc, Metadata, RepoMetadata};
use crate::error::{corrupt, Result};
use std::sync::Arc;

fn decode_u32_be_array(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(corrupt("u32 index array length not a multiple of 4"));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes(c.try_into().unwrap()))
        .collect())
}

fn decode_u64_be_array(bytes: &[u8]) -> Result<Vec<u64>> {
    if bytes.len() % 8 != 0 {
        return Err(corrupt("u64 array length not a multiple of 8"));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|c| u64::from_be_bytes(c.try_into().unwrap()))
        .collect())
}

/// A matched ngram's posting list source, kept abstract over content vs.
/// file-name tables.
pub struct NgramTable {
    /// Sorted distinct ngram keys.
    keys: Vec<u64>,
    /// Per-key `(offset, size)` into the postings data blob, derived from
    /// the compound index array (`index[i]..index[i+1]`).
    offsets: Vec<u32>,
    data_span: SectionSpan,
}

impl NgramTable {
    fn load(toc: &Toc, accessor: &dyn ShardAccessor, text_id: SectionId, postings_id: SectionId) -> Result<Self> {
        let text_span = toc
            .simple(text_id)
            .ok_or_else(|| corrupt(format!("missing {:?} section", text_id)))?;
        let text_bytes = accessor.read(text_span.offset, text_span.size)?;
        let keys = decode_u64_be_array(text_bytes)?;

        let (data_span, index_span) = toc
            .compound(postings_id)
            .ok_or_else(|| corrupt(format!("missing {:?} section", postings_id)))?;
        let index_bytes = accessor.read(index_span.offset, index_span.size)?;
        let offsets = decode_u32_be_array(index_bytes)?;
        if !offsets.is_empty() && offsets.len() != keys.len() + 1 {
            return Err(corrupt("ngram index/key count mismatch"));
        }

        Ok(Self {
            keys,
            offsets,
            data_span,
        })
    }

    /// Binary-search for `key`; returns the raw posting-list bytes if
    /// present (caller decodes with the appropriate codec for this table).
    pub fn lookup<'a>(&self, accessor: &'a dyn ShardAccessor, key: u64) -> Result<Option<&'a [u8]>> {
        match self.keys.binary_search(&key) {
            Ok(idx) => {
                let start = self.offsets[idx];
                let end = self.offsets[idx + 1];
                let bytes = accessor.read(self.data_span.offset + start, end - start)?;
                Ok(Some(bytes))
            }
            Err(_) => Ok(None),
        }
    }

    pub fn frequency(&self, accessor: &dyn ShardAccessor, key: u64) -> Result<usize> {
        match self.keys.binary_search(&key) {
            Ok(idx) => Ok((self.offsets[idx + 1] - self.offsets[idx]) as usize),
            Err(_) => Ok(0),
        }
    }
}

pub struct Shard {
    accessor: SharedAccessor,
    toc: Toc,
    pub metadata: Metadata,
    pub repo_metadata: RepoMetadata,
    pins: InMemoryPins,
    /// Data blobs for sections `pins` names that also have a real mmap/heap
    /// choice to make (currently only `FileNames`'s compound data blob —
    /// `NgramText`/`NameNgramText`/`BranchMasks` are always eagerly decoded
    /// into owned arrays below regardless of pin status, so pinning them has
    /// nothing left to toggle). Populated once at open time; `doc_slice`
    /// serves from here instead of `accessor` when a section is present.
    pinned_blobs: HashMap<SectionId, Vec<u8>>,

    file_contents_index: Vec<u32>,
    file_names_index: Vec<u32>,
    file_sections_index: Vec<u32>, // doc-relative byte sections (docSections)
    newlines_index: Vec<u32>,
    rune_doc_sections_index: Vec<u32>,

    pub branch_masks: Vec<u64>,
    pub languages: Vec<u32>,
    pub file_end_runes: Vec<u32>,
    pub name_end_runes: Vec<u32>,
    pub content_checksums: Vec<u64>,

    content_ngrams: NgramTable,
    name_ngrams: NgramTable,
}

impl Shard {
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let accessor: SharedAccessor = Arc::new(MmapAccessor::open(path)?);
        Self::from_accessor(accessor)
    }

    pub fn open_bytes(bytes: Vec<u8>) -> Result<Arc<Self>> {
        let accessor: SharedAccessor = Arc::new(InMemoryAccessor::new(bytes));
        Self::from_accessor(accessor)
    }

    fn from_accessor(accessor: SharedAccessor) -> Result<Arc<Self>> {
        let full = accessor.read(0, accessor.size())?;
        let toc = read_toc(full)?;

        let meta_span = toc
            .simple(SectionId::Metadata)
            .ok_or_else(|| corrupt("missing metadata section"))?;
        let metadata = Metadata::decode(accessor.read(meta_span.offset, meta_span.size)?)?;
        if !metadata.is_supported() {
            return Err(corrupt(format!(
                "unsupported index format version {}",
                metadata.index_format_version
            )));
        }

        let repo_span = toc
            .simple(SectionId::RepoMetadata)
            .ok_or_else(|| corrupt("missing repo-metadata section"))?;
        let repo_metadata = RepoMetadata::decode(accessor.read(repo_span.offset, repo_span.size)?)?;

        let read_index = |id: SectionId| -> Result<Vec<u32>> {
            let (_, index_span) = toc
                .compound(id)
                .ok_or_else(|| corrupt(format!("missing {:?} section", id)))?;
            decode_u32_be_array(accessor.read(index_span.offset, index_span.size)?)
        };

        let file_contents_index = read_index(SectionId::FileContents)?;
        let file_names_index = read_index(SectionId::FileNames)?;
        let file_sections_index = read_index(SectionId::FileSections)?;
        let newlines_index = read_index(SectionId::Newlines)?;
        let rune_doc_sections_index = read_index(SectionId::RuneDocSections)?;

        let read_simple_u64 = |id: SectionId| -> Result<Vec<u64>> {
            let span = toc.simple(id).ok_or_else(|| corrupt(format!("missing {:?} section", id)))?;
            decode_u64_be_array(accessor.read(span.offset, span.size)?)
        };
        let read_simple_u32 = |id: SectionId| -> Result<Vec<u32>> {
            let span = toc.simple(id).ok_or_else(|| corrupt(format!("missing {:?} section", id)))?;
            decode_u32_be_array(accessor.read(span.offset, span.size)?)
        };

        let branch_masks = read_simple_u64(SectionId::BranchMasks)?;
        if branch_masks.iter().any(|&m| m == 0) {
            return Err(corrupt("document with zero branch mask"));
        }
        let languages = read_simple_u32(SectionId::Languages)?;
        let file_end_runes = read_simple_u32(SectionId::FileEndRunes)?;
        let name_end_runes = read_simple_u32(SectionId::NameEndRunes)?;
        if !file_end_runes.windows(2).all(|w| w[0] < w[1]) {
            return Err(corrupt("file_end_runes is not strictly increasing"));
        }
        let content_checksums = read_simple_u64(SectionId::ContentChecksums)?;

        let content_ngrams = NgramTable::load(&toc, accessor.as_ref(), SectionId::NgramText, SectionId::Postings)?;
        let name_ngrams = NgramTable::load(
            &toc,
            accessor.as_ref(),
            SectionId::NameNgramText,
            SectionId::NamePostings,
        )?;

        let pins = InMemoryPins::from_env();

        let mut pinned_blobs = HashMap::new();
        if pins.contains(SectionId::FileNames) {
            let (data_span, _) = toc
                .compound(SectionId::FileNames)
                .ok_or_else(|| corrupt("missing FileNames section"))?;
            let bytes = accessor.read(data_span.offset, data_span.size)?.to_vec();
            pinned_blobs.insert(SectionId::FileNames, bytes);
        }

        Ok(Arc::new(Self {
            accessor,
            toc,
            metadata,
            repo_metadata,
            pins,
            pinned_blobs,
            file_contents_index,
            file_names_index,
            file_sections_index,
            newlines_index,
            rune_doc_sections_index,
            branch_masks,
            languages,
            file_end_runes,
            name_end_runes,
            content_checksums,
            content_ngrams,
            name_ngrams,
        }))
    }

    pub fn doc_count(&self) -> u32 {
        self.branch_masks.len() as u32
    }

    pub fn repo_name(&self) -> &str {
        &self.repo_metadata.name
    }

    fn doc_slice<'a>(&'a self, id: SectionId, index: &[u32], doc_id: u32) -> Result<&'a [u8]> {
        let doc_id = doc_id as usize;
        if doc_id + 1 >= index.len() {
            return Err(corrupt("document index out of range"));
        }
        let (data_span, _) = self
            .toc
            .compound(id)
            .ok_or_else(|| corrupt(format!("missing {:?} section", id)))?;
        let start = index[doc_id];
        let end = index[doc_id + 1];
        if let Some(blob) = self.pinned_blobs.get(&id) {
            return blob
                .get(start as usize..end as usize)
                .ok_or_else(|| corrupt("pinned section read range out of bounds"));
        }
        self.accessor.read(data_span.offset + start, end - start)
    }

    pub fn doc_content(&self, doc_id: u32) -> Result<&[u8]> {
        self.doc_slice(SectionId::FileContents, &self.file_contents_index, doc_id)
    }

    pub fn doc_name(&self, doc_id: u32) -> Result<&[u8]> {
        self.doc_slice(SectionId::FileNames, &self.file_names_index, doc_id)
    }

    pub fn doc_newlines(&self, doc_id: u32) -> Result<Vec<u32>> {
        let bytes = self.doc_slice(SectionId::Newlines, &self.newlines_index, doc_id)?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        let (count, pos) = decode_varint(bytes)?;
        let (values, _) = crate::binary::encoding::decode_deltas(&bytes[pos..], count as usize)?;
        Ok(values)
    }

    pub fn doc_symbol_sections(&self, doc_id: u32) -> Result<Vec<(u32, u32)>> {
        let bytes = self.doc_slice(
            SectionId::RuneDocSections,
            &self.rune_doc_sections_index,
            doc_id,
        )?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        let (count, mut pos) = decode_varint(bytes)?;
        let mut sections = Vec::with_capacity(count as usize);
        let mut prev_end = 0u32;
        for _ in 0..count {
            let (start_delta, consumed) = decode_varint(&bytes[pos..])?;
            pos += consumed;
            let (len, consumed) = decode_varint(&bytes[pos..])?;
            pos += consumed;
            let start = prev_end + start_delta as u32;
            let end = start + len as u32;
            sections.push((start, end));
            prev_end = end;
        }
        Ok(sections)
    }

    pub fn doc_byte_sections(&self, doc_id: u32) -> Result<(u32, u32)> {
        let doc_id = doc_id as usize;
        if doc_id + 1 >= self.file_sections_index.len() {
            return Err(corrupt("document index out of range"));
        }
        Ok((
            self.file_sections_index[doc_id],
            self.file_sections_index[doc_id + 1],
        ))
    }

    /// Number of checkpoints a document with `rune_count` runes occupies in
    /// a rune-offset table (one checkpoint every `RUNE_OFFSET_STRIDE` runes,
    /// plus the leading checkpoint at rune 0).
    fn checkpoint_span(end_runes: &[u32], doc_id: usize) -> u32 {
        let rune_count = if doc_id == 0 {
            end_runes[0]
        } else {
            end_runes[doc_id] - end_runes[doc_id - 1]
        };
        rune_count / crate::binary::header::RUNE_OFFSET_STRIDE + 1
    }

    /// Rune-offset checkpoints (byte offset at every `RUNE_OFFSET_STRIDE`
    /// runes) for a document's content or name. The shard stores one flat
    /// BE `u32` array per shard, documents laid out back to back in document
    /// order with `checkpoint_span` entries each.
    pub fn doc_rune_offsets(&self, doc_id: u32, file_name: bool) -> Result<Vec<u32>> {
        let (id, end_runes) = if file_name {
            (SectionId::NameRuneOffsets, &self.name_end_runes)
        } else {
            (SectionId::RuneOffsets, &self.file_end_runes)
        };
        let span = self
            .toc
            .simple(id)
            .ok_or_else(|| corrupt(format!("missing {:?} section", id)))?;
        let all = decode_u32_be_array(self.accessor.read(span.offset, span.size)?)?;

        let start: u32 = (0..doc_id as usize)
            .map(|i| Self::checkpoint_span(end_runes, i))
            .sum();
        let this_doc_span = Self::checkpoint_span(end_runes, doc_id as usize);
        let end = (start + this_doc_span).min(all.len() as u32);
        if start > end {
            return Ok(Vec::new());
        }
        Ok(all[start as usize..end as usize].to_vec())
    }

    pub fn content_ngram_frequency(&self, key: u64, runes: [u32; 3], case_sensitive: bool) -> Result<usize> {
        if case_sensitive {
            self.content_ngrams.frequency(self.accessor.as_ref(), key)
        } else {
            let mut total = 0;
            for variant in case_fold_ngram_variants(runes) {
                total += self.content_ngrams.frequency(self.accessor.as_ref(), variant)?;
            }
            Ok(total)
        }
    }

    pub fn name_ngram_frequency(&self, key: u64, runes: [u32; 3], case_sensitive: bool) -> Result<usize> {
        if case_sensitive {
            self.name_ngrams.frequency(self.accessor.as_ref(), key)
        } else {
            let mut total = 0;
            for variant in case_fold_ngram_variants(runes) {
                total += self.name_ngrams.frequency(self.accessor.as_ref(), variant)?;
            }
            Ok(total)
        }
    }

    pub fn content_posting(&self, key: u64) -> Result<Vec<u32>> {
        match self.content_ngrams.lookup(self.accessor.as_ref(), key)? {
            Some(bytes) => decode_content_posting(bytes),
            None => Ok(Vec::new()),
        }
    }

    pub fn name_posting(&self, key: u64) -> Result<Vec<u32>> {
        match self.name_ngrams.lookup(self.accessor.as_ref(), key)? {
            Some(bytes) => decode_name_posting(bytes),
            None => Ok(Vec::new()),
        }
    }

    /// Union of postings across every case-fold variant of `key`/`runes`
    /// (or just `key` itself when `case_sensitive`), sorted and deduplicated.
    pub fn posting_union(&self, key: u64, runes: [u32; 3], case_sensitive: bool, file_name: bool) -> Result<Vec<u32>> {
        let keys = if case_sensitive {
            vec![key]
        } else {
            case_fold_ngram_variants(runes)
        };
        let mut merged = Vec::new();
        for k in keys {
            let posting = if file_name {
                self.name_posting(k)?
            } else {
                self.content_posting(k)?
            };
            merged.extend(posting);
        }
        merged.sort_unstable();
        merged.dedup();
        Ok(merged)
    }

    pub fn pins(&self) -> &InMemoryPins {
        &self.pins
    }
}

/// Enumerate up to 8 case-fold variants of a packed ngram by folding each of
/// the three runes independently (simple Unicode case folding via
/// `char::to_lowercase`/`to_uppercase`, approximating full Unicode "simple
/// fold" with the standard library's tables).
pub fn case_fold_ngram_variants(runes: [u32; 3]) -> Vec<u64> {
    let variants_for = |r: u32| -> Vec<u32> {
        let mut vs = vec![r];
        if let Some(c) = char::from_u32(r) {
            for lower in c.to_lowercase() {
                let v = lower as u32;
                if !vs.contains(&v) {
                    vs.push(v);
                }
            }
            for upper in c.to_uppercase() {
                let v = upper as u32;
                if !vs.contains(&v) {
                    vs.push(v);
                }
            }
        }
        vs.truncate(2);
        vs
    };
    let a = variants_for(runes[0]);
    let b = variants_for(runes[1]);
    let c = variants_for(runes[2]);
    let mut out = Vec::with_capacity(a.len() * b.len() * c.len());
    for &ra in &a {
        for &rb in &b {
            for &rc in &c {
                out.push(crate::binary::encoding::runes_to_ngram([ra, rb, rc]));
            }
        }
    }
    out.sort_unstable();
    out.dedup();
    out
}

#[allow(dead_code)]
fn _unused(_: fn([u32; 3]) -> [u32; 3]) {
    let _ = ngram_to_runes;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{InputDocument, ShardBuilder};
    use std::sync::Mutex;

    // IN_MEMORY_CONTENT is process-global; serialize the tests that touch it.
    static ENV_GUARD: Mutex<()> = Mutex::new(());

    fn demo_shard_bytes() -> Vec<u8> {
        let mut builder = ShardBuilder::new("demo/repo", vec!["HEAD".to_string()]);
        builder.add_document(InputDocument::new("a.txt", *b"hello world", 1));
        builder.build()
    }

    #[test]
    fn pinned_file_names_are_copied_into_a_heap_buffer() {
        let _guard = ENV_GUARD.lock().unwrap();
        std::env::set_var("IN_MEMORY_CONTENT", "filenames");
        let shard = Shard::open_bytes(demo_shard_bytes()).unwrap();
        std::env::remove_var("IN_MEMORY_CONTENT");

        assert!(shard.pinned_blobs.contains_key(&SectionId::FileNames));
        assert_eq!(shard.doc_name(0).unwrap(), b"a.txt");
    }

    #[test]
    fn unpinned_shard_serves_file_names_from_the_accessor() {
        let _guard = ENV_GUARD.lock().unwrap();
        std::env::remove_var("IN_MEMORY_CONTENT");
        let shard = Shard::open_bytes(demo_shard_bytes()).unwrap();

        assert!(shard.pinned_blobs.is_empty());
        assert_eq!(shard.doc_name(0).unwrap(), b"a.txt");
    }
}
