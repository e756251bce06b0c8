// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Shard format constants, section ordering, and security limits.
//!
//! The shard file itself has no fixed-size header: everything is described
//! by the Table of Contents at the end of the file (see [`crate::binary::toc`]).
//! What's fixed here is the *meaning* of each TOC slot — the declaration
//! order every reader and writer must agree on — plus the two version
//! fields carried in the metadata section and the resource limits applied
//! while decoding untrusted shard bytes.

/// Current on-disk format version. The accessor also accepts `VERSION - 1`.
pub const INDEX_FORMAT_VERSION: u32 = 2;

/// Feature version, bumped independently of the layout version when new
/// optional sections are added without reordering existing ones.
pub const FEATURE_VERSION: u32 = 1;

/// Stride (power of two) at which the rune-offset maps record byte offsets.
pub const RUNE_OFFSET_STRIDE: u32 = 128;

// ============================================================================
// SECURITY LIMITS (prevent resource exhaustion from malicious/corrupt input)
// ============================================================================

pub const MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024; // 1 GiB
pub const MAX_DOC_COUNT: u32 = 10_000_000;
pub const MAX_SECTION_COUNT: u32 = 64;
pub const MAX_POSTING_SIZE: usize = 50_000_000;

// ============================================================================
// SECTION ORDERING
// ============================================================================

/// Every named slot in the TOC, in declaration order. Compound sections
/// (data + an index of per-item offsets) occupy two consecutive TOC slots;
/// [`SectionId::simple_slots`] reports how many slots a given id consumes.
///
/// `Metadata` and `RepoMetadata` are always the first two slots and must
/// remain readable even when the overall slot count doesn't match what this
/// reader expects (an older or newer shard) — see [`crate::binary::toc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SectionId {
    Metadata = 0,
    RepoMetadata,
    FileContents,
    FileNames,
    FileSections,
    Newlines,
    NgramText,
    Postings,
    NameNgramText,
    NamePostings,
    BranchMasks,
    SubRepos,
    RuneOffsets,
    NameRuneOffsets,
    FileEndRunes,
    NameEndRunes,
    ContentChecksums,
    Languages,
    RuneDocSections,
    SymbolMap,
    SymbolKindMap,
    SymbolMetadata,
    FileEndSymbol,
}

impl SectionId {
    pub const ALL: [SectionId; 23] = [
        SectionId::Metadata,
        SectionId::RepoMetadata,
        SectionId::FileContents,
        SectionId::FileNames,
        SectionId::FileSections,
        SectionId::Newlines,
        SectionId::NgramText,
        SectionId::Postings,
        SectionId::NameNgramText,
        SectionId::NamePostings,
        SectionId::BranchMasks,
        SectionId::SubRepos,
        SectionId::RuneOffsets,
        SectionId::NameRuneOffsets,
        SectionId::FileEndRunes,
        SectionId::NameEndRunes,
        SectionId::ContentChecksums,
        SectionId::Languages,
        SectionId::RuneDocSections,
        SectionId::SymbolMap,
        SectionId::SymbolKindMap,
        SectionId::SymbolMetadata,
        SectionId::FileEndSymbol,
    ];

    /// Whether this section is stored as a compound (data blob + index blob
    /// of per-item `u32` offsets) rather than a single simple blob.
    pub const fn is_compound(self) -> bool {
        matches!(
            self,
            SectionId::FileContents
                | SectionId::FileNames
                | SectionId::FileSections
                | SectionId::Newlines
                | SectionId::Postings
                | SectionId::NamePostings
                | SectionId::RuneDocSections
        )
    }

    /// Section names recognized by the `IN_MEMORY_CONTENT` environment
    /// variable. `filecontents` and `postings` are deliberately absent:
    /// those are always served from mmap, never pinned.
    pub fn env_name(self) -> Option<&'static str> {
        match self {
            SectionId::FileNames => Some("filenames"),
            SectionId::NgramText => Some("ngramtext"),
            SectionId::NameNgramText => Some("namengramtext"),
            SectionId::BranchMasks => Some("branchmasks"),
            _ => None,
        }
    }
}
