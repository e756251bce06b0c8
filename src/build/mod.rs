// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Shard builder: assembles an in-memory document set into the bit-exact
//! shard layout (spec §4.9/§6).
//!
//! Not an incremental or concurrent indexing pipeline — directory crawling,
//! language detection, and symbol-tag extraction stay external collaborators.
//! This is the minimal writer needed to exercise the accessor and matchtree
//! end to end: it computes ngram postings, rune-offset
//! checkpoints, file-end-rune tables, newline tables, branch masks, and a
//! per-document checksum, then serializes the TOC and tail pointer.

use std::collections::BTreeMap;

use crc32fast::Hasher;
use tracing::debug;

use crate::binary::encoding::{encode_deltas, encode_varint, runes_to_ngram};
use crate::binary::header::{SectionId, RUNE_OFFSET_STRIDE};
use crate::binary::postings::{encode_content_posting, encode_name_posting};
use crate::binary::toc::SectionSpan;
use crate::binary::{assemble, Metadata, RepoMetadata, SectionData};

/// One document queued for a shard, as supplied by the caller before
/// `build()` lays it out.
pub struct InputDocument {
    pub name: String,
    pub content: Vec<u8>,
    pub branch_mask: u64,
    pub sub_repo_index: u32,
    pub language_code: u32,
    /// Doc-relative `(start_rune, end_rune)` symbol sections, sorted and
    /// disjoint.
    pub symbol_sections: Vec<(u32, u32)>,
}

impl InputDocument {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>, branch_mask: u64) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            branch_mask,
            sub_repo_index: 0,
            language_code: 0,
            symbol_sections: Vec::new(),
        }
    }
}

#[derive(Default)]
pub struct ShardBuilder {
    repo: RepoMetadata,
    docs: Vec<InputDocument>,
}

impl ShardBuilder {
    pub fn new(repo_name: impl Into<String>, branches: Vec<String>) -> Self {
        Self {
            repo: RepoMetadata {
                name: repo_name.into(),
                branches,
                ..Default::default()
            },
            docs: Vec::new(),
        }
    }

    pub fn add_document(&mut self, doc: InputDocument) {
        self.docs.push(doc);
    }

    pub fn with_url_template(mut self, url_template: impl Into<String>) -> Self {
        self.repo.url_template = Some(url_template.into());
        self
    }

    /// Build the shard's bytes. Documents are laid out in the order they
    /// were added; that order is the shard's permanent document-id space.
    pub fn build(self) -> Vec<u8> {
        let doc_count = self.docs.len() as u32;
        debug!(doc_count, repo = %self.repo.name, "building shard");

        let mut file_contents_data = Vec::new();
        let mut file_contents_index = vec![0u32];
        let mut file_names_data = Vec::new();
        let mut file_names_index = vec![0u32];
        let mut newlines_data = Vec::new();
        let mut newlines_index = vec![0u32];
        let mut rune_doc_sections_data = Vec::new();
        let mut rune_doc_sections_index = vec![0u32];
        let mut file_sections_index = vec![0u32];

        let mut branch_masks = Vec::with_capacity(self.docs.len());
        let mut languages = Vec::with_capacity(self.docs.len());
        let mut file_end_runes = Vec::with_capacity(self.docs.len());
        let mut name_end_runes = Vec::with_capacity(self.docs.len());
        let mut content_checksums = Vec::with_capacity(self.docs.len());

        // ngram key -> sorted-unique rune positions in the concatenated corpus
        let mut content_ngrams: BTreeMap<u64, Vec<u32>> = BTreeMap::new();
        let mut name_ngrams: BTreeMap<u64, Vec<u32>> = BTreeMap::new();

        let mut content_rune_cursor = 0u32;
        let mut name_rune_cursor = 0u32;
        let mut content_rune_offsets = Vec::new();
        let mut name_rune_offsets = Vec::new();

        for doc in &self.docs {
            branch_masks.push(doc.branch_mask);
            languages.push(doc.language_code);

            file_contents_data.extend_from_slice(&doc.content);
            file_contents_index.push(file_contents_data.len() as u32);

            file_names_data.extend_from_slice(doc.name.as_bytes());
            file_names_index.push(file_names_data.len() as u32);

            let content_runes: Vec<char> = String::from_utf8_lossy(&doc.content).chars().collect();
            let name_runes: Vec<char> = doc.name.chars().collect();

            record_rune_offsets(&doc.content, &mut content_rune_offsets, &mut content_rune_cursor);
            record_rune_offsets(doc.name.as_bytes(), &mut name_rune_offsets, &mut name_rune_cursor);

            index_ngrams(&content_runes, content_rune_cursor - content_runes.len() as u32, &mut content_ngrams);
            index_ngrams(&name_runes, name_rune_cursor - name_runes.len() as u32, &mut name_ngrams);

            file_end_runes.push(content_rune_cursor);
            name_end_runes.push(name_rune_cursor);

            let newlines = newline_offsets(&doc.content);
            let mut buf = Vec::new();
            encode_varint(newlines.len() as u64, &mut buf);
            encode_deltas(&newlines, &mut buf);
            newlines_data.extend_from_slice(&buf);
            newlines_index.push(newlines_data.len() as u32);

            let mut sections_buf = Vec::new();
            if !doc.symbol_sections.is_empty() {
                encode_varint(doc.symbol_sections.len() as u64, &mut sections_buf);
                let mut prev_end = 0u32;
                for &(start, end) in &doc.symbol_sections {
                    encode_varint((start - prev_end) as u64, &mut sections_buf);
                    encode_varint((end - start) as u64, &mut sections_buf);
                    prev_end = end;
                }
            }
            rune_doc_sections_data.extend_from_slice(&sections_buf);
            rune_doc_sections_index.push(rune_doc_sections_data.len() as u32);

            // This builder does not track doc-relative byte sections
            // (title/body split); every document spans its whole content.
            file_sections_index.push(file_sections_index.last().copied().unwrap_or(0));

            let mut hasher = Hasher::new();
            hasher.update(&doc.content);
            content_checksums.push(u64::from(hasher.finalize()));
        }

        let content_ngram_text = encode_ngram_keys(&content_ngrams);
        let (content_postings_data, content_postings_index) = encode_content_postings(&content_ngrams);
        let name_ngram_text = encode_ngram_keys(&name_ngrams);
        let (name_postings_data, name_postings_index) = encode_name_postings(&name_ngrams);

        let sections = vec![
            SectionData::Simple {
                id: SectionId::Metadata,
                bytes: Metadata::current(doc_count, self.repo.branches.len().max(1) as u32).encode(),
            },
            SectionData::Simple {
                id: SectionId::RepoMetadata,
                bytes: self.repo.encode(),
            },
            SectionData::Compound {
                id: SectionId::FileContents,
                data: file_contents_data,
                index: encode_index(&file_contents_index),
            },
            SectionData::Compound {
                id: SectionId::FileNames,
                data: file_names_data,
                index: encode_index(&file_names_index),
            },
            SectionData::Compound {
                id: SectionId::FileSections,
                data: Vec::new(),
                index: encode_index(&file_sections_index),
            },
            SectionData::Compound {
                id: SectionId::Newlines,
                data: newlines_data,
                index: encode_index(&newlines_index),
            },
            SectionData::Compound {
                id: SectionId::RuneDocSections,
                data: rune_doc_sections_data,
                index: encode_index(&rune_doc_sections_index),
            },
            SectionData::Simple {
                id: SectionId::NgramText,
                bytes: content_ngram_text,
            },
            SectionData::Compound {
                id: SectionId::Postings,
                data: content_postings_data,
                index: encode_index(&content_postings_index),
            },
            SectionData::Simple {
                id: SectionId::NameNgramText,
                bytes: name_ngram_text,
            },
            SectionData::Compound {
                id: SectionId::NamePostings,
                data: name_postings_data,
                index: encode_index(&name_postings_index),
            },
            SectionData::Simple {
                id: SectionId::BranchMasks,
                bytes: encode_u64_array(&branch_masks),
            },
            SectionData::Simple {
                id: SectionId::Languages,
                bytes: encode_u32_array(&languages),
            },
            SectionData::Simple {
                id: SectionId::FileEndRunes,
                bytes: encode_u32_array(&file_end_runes),
            },
            SectionData::Simple {
                id: SectionId::NameEndRunes,
                bytes: encode_u32_array(&name_end_runes),
            },
            SectionData::Simple {
                id: SectionId::ContentChecksums,
                bytes: encode_u64_array(&content_checksums),
            },
            SectionData::Simple {
                id: SectionId::RuneOffsets,
                bytes: encode_u32_array(&content_rune_offsets),
            },
            SectionData::Simple {
                id: SectionId::NameRuneOffsets,
                bytes: encode_u32_array(&name_rune_offsets),
            },
        ];

        assemble(sections)
    }
}

/// Append this document's rune-offset checkpoints: one at every doc-relative
/// rune index divisible by `RUNE_OFFSET_STRIDE`, inclusive of the
/// document's own end (rune index == its rune count). That trailing
/// checkpoint is what makes `Shard::checkpoint_span`'s
/// `rune_count / STRIDE + 1` count line up: it's "how many multiples of
/// STRIDE fall in `0..=rune_count`", not "how many fall in `0..rune_count`".
fn record_rune_offsets(content: &[u8], offsets: &mut Vec<u32>, rune_cursor: &mut u32) {
    let text = String::from_utf8_lossy(content);
    let mut boundary = 0u32;
    let mut i = 0u32;
    for ch in text.chars() {
        if i % RUNE_OFFSET_STRIDE == 0 {
            offsets.push(boundary);
        }
        boundary += ch.len_utf8() as u32;
        i += 1;
    }
    if i % RUNE_OFFSET_STRIDE == 0 {
        offsets.push(boundary);
    }
    *rune_cursor += i;
}

fn index_ngrams(runes: &[char], doc_start_rune: u32, table: &mut BTreeMap<u64, Vec<u32>>) {
    if runes.len() < 3 {
        return;
    }
    for (i, w) in runes.windows(3).enumerate() {
        let key = runes_to_ngram([w[0] as u32, w[1] as u32, w[2] as u32]);
        table.entry(key).or_default().push(doc_start_rune + i as u32);
    }
}

fn encode_ngram_keys(table: &BTreeMap<u64, Vec<u32>>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(table.len() * 8);
    for key in table.keys() {
        buf.extend_from_slice(&key.to_be_bytes());
    }
    buf
}

fn encode_content_postings(table: &BTreeMap<u64, Vec<u32>>) -> (Vec<u8>, Vec<u32>) {
    let mut data = Vec::new();
    let mut index = vec![0u32];
    for positions in table.values() {
        let encoded = encode_content_posting(positions);
        data.extend_from_slice(&encoded);
        index.push(data.len() as u32);
    }
    (data, index)
}

fn encode_name_postings(table: &BTreeMap<u64, Vec<u32>>) -> (Vec<u8>, Vec<u32>) {
    let mut data = Vec::new();
    let mut index = vec![0u32];
    for positions in table.values() {
        let encoded = encode_name_posting(positions);
        data.extend_from_slice(&encoded);
        index.push(data.len() as u32);
    }
    (data, index)
}

fn encode_index(values: &[u32]) -> Vec<u8> {
    encode_u32_array(values)
}

fn encode_u32_array(values: &[u32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 4);
    for v in values {
        buf.extend_from_slice(&v.to_be_bytes());
    }
    buf
}

fn encode_u64_array(values: &[u64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 8);
    for v in values {
        buf.extend_from_slice(&v.to_be_bytes());
    }
    buf
}

/// Byte offsets of every `\n` in `content`, used for line-number and
/// line-boundary lookups at search time.
fn newline_offsets(content: &[u8]) -> Vec<u32> {
    content
        .iter()
        .enumerate()
        .filter(|&(_, &b)| b == b'\n')
        .map(|(i, _)| i as u32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::Shard;

    fn build_simple_shard() -> Vec<u8> {
        let mut builder = ShardBuilder::new("demo/repo", vec!["HEAD".to_string()]);
        builder.add_document(InputDocument::new("a.txt", *b"hello world", 1));
        builder.add_document(InputDocument::new("b.txt", *b"goodbye world", 1));
        builder.build()
    }

    #[test]
    fn build_round_trips_through_shard_open() {
        let bytes = build_simple_shard();
        let shard = Shard::open_bytes(bytes).unwrap();
        assert_eq!(shard.doc_count(), 2);
        assert_eq!(shard.doc_content(0).unwrap(), b"hello world");
        assert_eq!(shard.doc_content(1).unwrap(), b"goodbye world");
        assert_eq!(shard.doc_name(0).unwrap(), b"a.txt");
    }

    #[test]
    fn build_populates_content_postings() {
        let bytes = build_simple_shard();
        let shard = Shard::open_bytes(bytes).unwrap();
        let key = runes_to_ngram(['w' as u32, 'o' as u32, 'r' as u32]);
        let postings = shard.content_posting(key).unwrap();
        assert_eq!(postings.len(), 2, "'wor' appears once in each document");
    }

    #[test]
    fn build_tracks_newlines() {
        let mut builder = ShardBuilder::new("demo", vec!["HEAD".to_string()]);
        builder.add_document(InputDocument::new("a.txt", *b"line one\nline two\n", 1));
        let bytes = builder.build();
        let shard = Shard::open_bytes(bytes).unwrap();
        assert_eq!(shard.doc_newlines(0).unwrap(), vec![8, 17]);
    }
}
