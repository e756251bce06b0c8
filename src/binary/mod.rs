// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Binary format for shard index files.
//!
//! A shard file is a sequence of named data sections followed by a Table of
//! Contents and an 8-byte tail pointer (see [`toc`] and spec §6). This
//! module owns assembling sections into a final byte stream and parsing the
//! tail/TOC back out; the meaning of each section (postings, ngram tables,
//! document metadata, ...) lives in [`crate::shard`] and [`crate::build`].

pub mod encoding;
pub mod header;
pub mod postings;
pub mod toc;

use serde::{Deserialize, Serialize};

use crate::error::{corrupt, Result};

use header::{INDEX_FORMAT_VERSION, FEATURE_VERSION, MAX_FILE_SIZE};
use toc::{SectionSpan, Toc};

/// The metadata section: format versions plus whatever the repo-metadata
/// section doesn't cover. Serialized as JSON — small, infrequently read,
/// and trivially forward/backward compatible field-by-field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub index_format_version: u32,
    pub feature_version: u32,
    pub doc_count: u32,
    pub branch_count: u32,
}

impl Metadata {
    pub fn current(doc_count: u32, branch_count: u32) -> Self {
        Self {
            index_format_version: INDEX_FORMAT_VERSION,
            feature_version: FEATURE_VERSION,
            doc_count,
            branch_count,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("Metadata serialization is infallible")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| corrupt(format!("metadata decode: {e}")))
    }

    /// This reader accepts the current version and the one before it.
    pub fn is_supported(&self) -> bool {
        self.index_format_version == INDEX_FORMAT_VERSION
            || self.index_format_version + 1 == INDEX_FORMAT_VERSION
    }
}

/// Repository-level metadata: name, URL templates, sub-repositories,
/// branch names (index == branch bit).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RepoMetadata {
    pub name: String,
    pub url_template: Option<String>,
    pub branches: Vec<String>,
    pub sub_repos: Vec<String>,
}

impl RepoMetadata {
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("RepoMetadata serialization is infallible")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| corrupt(format!("repo-metadata decode: {e}")))
    }
}

/// A named data section ready to be laid out: either a single blob
/// (`Simple`) or a data blob plus an index of per-item `u32` offsets
/// (`Compound`).
pub enum SectionData {
    Simple { id: header::SectionId, bytes: Vec<u8> },
    Compound {
        id: header::SectionId,
        data: Vec<u8>,
        index: Vec<u8>,
    },
}

/// Assemble a complete shard file from its sections: lays out each data
/// blob back-to-back, builds the TOC recording where each landed, then
/// appends the TOC blob and the 8-byte tail pointer.
pub fn assemble(sections: Vec<SectionData>) -> Vec<u8> {
    let mut file = Vec::new();
    let mut toc = Toc::new();

    for section in sections {
        match section {
            SectionData::Simple { id, bytes } => {
                let offset = file.len() as u32;
                let size = bytes.len() as u32;
                file.extend_from_slice(&bytes);
                toc.set_simple(id, SectionSpan { offset, size });
            }
            SectionData::Compound { id, data, index } => {
                let data_offset = file.len() as u32;
                let data_size = data.len() as u32;
                file.extend_from_slice(&data);
                let index_offset = file.len() as u32;
                let index_size = index.len() as u32;
                file.extend_from_slice(&index);
                toc.set_compound(
                    id,
                    SectionSpan {
                        offset: data_offset,
                        size: data_size,
                    },
                    SectionSpan {
                        offset: index_offset,
                        size: index_size,
                    },
                );
            }
        }
    }

    let toc_offset = file.len() as u32;
    let toc_bytes = toc.encode();
    let toc_size = toc_bytes.len() as u32;
    file.extend_from_slice(&toc_bytes);
    file.extend_from_slice(&toc_offset.to_be_bytes());
    file.extend_from_slice(&toc_size.to_be_bytes());
    file
}

/// Read the tail pointer and TOC blob out of a complete shard file's bytes.
pub fn read_toc(bytes: &[u8]) -> Result<Toc> {
    if (bytes.len() as u64) > MAX_FILE_SIZE {
        return Err(corrupt("shard file exceeds maximum size"));
    }
    if bytes.len() < 8 {
        return Err(corrupt("shard file shorter than the tail pointer"));
    }
    let tail = &bytes[bytes.len() - 8..];
    let toc_offset = u32::from_be_bytes(tail[0..4].try_into().unwrap()) as usize;
    let toc_size = u32::from_be_bytes(tail[4..8].try_into().unwrap()) as usize;

    let toc_end = toc_offset
        .checked_add(toc_size)
        .ok_or_else(|| corrupt("TOC offset/size overflow"))?;
    if toc_end > bytes.len() - 8 {
        return Err(corrupt("TOC blob extends past end of file"));
    }

    Toc::decode(&bytes[toc_offset..toc_end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use header::SectionId;

    #[test]
    fn assemble_and_read_toc_roundtrip() {
        let sections = vec![
            SectionData::Simple {
                id: SectionId::Metadata,
                bytes: Metadata::current(2, 1).encode(),
            },
            SectionData::Simple {
                id: SectionId::RepoMetadata,
                bytes: RepoMetadata {
                    name: "demo".into(),
                    ..Default::default()
                }
                .encode(),
            },
            SectionData::Compound {
                id: SectionId::FileContents,
                data: b"hello world".to_vec(),
                index: vec![0, 0, 0, 0, 0, 0, 0, 11u8],
            },
        ];
        let file = assemble(sections);
        let toc = read_toc(&file).unwrap();

        let meta_span = toc.simple(SectionId::Metadata).unwrap();
        let meta =
            Metadata::decode(&file[meta_span.offset as usize..(meta_span.offset + meta_span.size) as usize])
                .unwrap();
        assert_eq!(meta.doc_count, 2);

        let (data_span, index_span) = toc.compound(SectionId::FileContents).unwrap();
        assert_eq!(
            &file[data_span.offset as usize..(data_span.offset + data_span.size) as usize],
            b"hello world"
        );
        assert_eq!(index_span.size, 8);
    }

    #[test]
    fn corrupt_tail_pointer_is_rejected() {
        let bytes = vec![0u8; 4]; // too short for even the tail
        assert!(read_toc(&bytes).is_err());
    }
}
