// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Table of Contents: the single source of truth for shard file layout.
//!
//! Every piece of code that reads or writes a section MUST go through
//! [`Toc`]. This prevents the "updated the write path but forgot the read
//! path" class of bug that a hand-maintained set of offsets invites.
//!
//! On disk: `[data bytes...][count:u32 BE][count * (offset:u32, size:u32) BE][toc_offset:u32 BE][toc_size:u32 BE]`.
//! The last 8 bytes of the file always point at the TOC blob; the TOC blob
//! is otherwise at whatever offset the writer happened to put it (right
//! after the data bytes). Slot identity is purely positional: there is no
//! name or key on the wire, only the fixed sequence of slots implied by
//! [`SectionId::ALL`]'s declaration order (two consecutive slots — data
//! then index — for each compound section, one slot for each simple one).

use crate::error::{corrupt, Result};

use super::header::{SectionId, MAX_SECTION_COUNT};

/// One `(offset, size)` pair for a single TOC slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionSpan {
    pub offset: u32,
    pub size: u32,
}

/// The canonical slot count, derived from `SectionId::ALL` and
/// `SectionId::is_compound`: two consecutive slots (data then index) per
/// compound section, one slot per simple section.
const fn slot_count() -> usize {
    // const fn can't call SectionId::ALL.iter().map(...).sum(), so walk by hand.
    let ids = SectionId::ALL;
    let mut i = 0;
    let mut count = 0;
    while i < ids.len() {
        count += if ids[i].is_compound() { 2 } else { 1 };
        i += 1;
    }
    count
}

const SLOT_COUNT: usize = slot_count();

/// Position of `id`'s single slot (simple section). Panics if `id` is
/// compound — use [`compound_positions`] instead.
fn simple_position(id: SectionId) -> usize {
    let mut pos = 0;
    for candidate in SectionId::ALL {
        if candidate == id {
            assert!(!candidate.is_compound(), "{id:?} is a compound section");
            return pos;
        }
        pos += if candidate.is_compound() { 2 } else { 1 };
    }
    unreachable!("{id:?} is not in SectionId::ALL")
}

/// `(data_position, index_position)` for a compound section.
fn compound_positions(id: SectionId) -> (usize, usize) {
    let mut pos = 0;
    for candidate in SectionId::ALL {
        if candidate == id {
            assert!(candidate.is_compound(), "{id:?} is not a compound section");
            return (pos, pos + 1);
        }
        pos += if candidate.is_compound() { 2 } else { 1 };
    }
    unreachable!("{id:?} is not in SectionId::ALL")
}

/// A decoded (or about-to-be-encoded) table of contents: a fixed-size,
/// positionally addressed array of spans, one per slot implied by
/// [`SectionId::ALL`] order.
#[derive(Debug, Clone)]
pub struct Toc {
    spans: Vec<SectionSpan>,
}

impl Default for Toc {
    fn default() -> Self {
        Self {
            spans: vec![SectionSpan::default(); SLOT_COUNT],
        }
    }
}

impl Toc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn simple(&self, id: SectionId) -> Option<SectionSpan> {
        // `.get` rather than direct indexing: a shard written by the
        // immediately preceding format version can carry fewer slots than
        // this binary's `SectionId::ALL`, and a slot past the end of an
        // older TOC is absent, not a bug.
        let span = *self.spans.get(simple_position(id))?;
        non_empty(span)
    }

    pub fn set_simple(&mut self, id: SectionId, span: SectionSpan) {
        self.spans[simple_position(id)] = span;
    }

    pub fn compound(&self, id: SectionId) -> Option<(SectionSpan, SectionSpan)> {
        let (data_pos, index_pos) = compound_positions(id);
        let data = non_empty(*self.spans.get(data_pos)?)?;
        // An index can legitimately be empty (a section with zero
        // documents), so only the data half gates presence.
        let index = self.spans.get(index_pos).copied().unwrap_or_default();
        Some((data, index))
    }

    pub fn set_compound(&mut self, id: SectionId, data: SectionSpan, index: SectionSpan) {
        let (data_pos, index_pos) = compound_positions(id);
        self.spans[data_pos] = data;
        self.spans[index_pos] = index;
    }

    /// Encode this TOC's blob: `count:u32 BE` then `count * (offset:u32 BE, size:u32 BE)`,
    /// the bit-exact layout — no names, no keys, position is identity.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.spans.len() * 8);
        buf.extend_from_slice(&(self.spans.len() as u32).to_be_bytes());
        for span in &self.spans {
            buf.extend_from_slice(&span.offset.to_be_bytes());
            buf.extend_from_slice(&span.size.to_be_bytes());
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(corrupt("TOC blob shorter than the section count field"));
        }
        let count = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if count > MAX_SECTION_COUNT * 3 {
            return Err(corrupt(format!("TOC section count {count} exceeds limit")));
        }
        let expected = 4 + count as usize * 8;
        if bytes.len() < expected {
            return Err(corrupt("TOC truncated"));
        }
        let mut spans = Vec::with_capacity(count as usize);
        let mut pos = 4usize;
        for _ in 0..count {
            let offset = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap());
            let size = u32::from_be_bytes(bytes[pos + 4..pos + 8].try_into().unwrap());
            spans.push(SectionSpan { offset, size });
            pos += 8;
        }
        Ok(Self { spans })
    }
}

/// A slot an older/incomplete writer left unwritten reads back as an
/// all-zero span; treat that as "absent" rather than a zero-length section
/// at file offset 0 (offset 0 is always claimed by the first section this
/// crate ever writes, `Metadata`).
fn non_empty(span: SectionSpan) -> Option<SectionSpan> {
    if span.offset == 0 && span.size == 0 {
        None
    } else {
        Some(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips_every_slot() {
        let mut toc = Toc::new();
        toc.set_simple(SectionId::Metadata, SectionSpan { offset: 0, size: 10 });
        toc.set_simple(SectionId::RepoMetadata, SectionSpan { offset: 10, size: 20 });
        toc.set_compound(
            SectionId::FileContents,
            SectionSpan { offset: 30, size: 40 },
            SectionSpan { offset: 70, size: 8 },
        );

        let bytes = toc.encode();
        // 4-byte count, then SLOT_COUNT * 8 bytes of (offset, size).
        assert_eq!(bytes.len(), 4 + SLOT_COUNT * 8);

        let decoded = Toc::decode(&bytes).unwrap();
        assert_eq!(decoded.simple(SectionId::Metadata), Some(SectionSpan { offset: 0, size: 10 }));
        assert_eq!(
            decoded.simple(SectionId::RepoMetadata),
            Some(SectionSpan { offset: 10, size: 20 })
        );
        assert_eq!(
            decoded.compound(SectionId::FileContents),
            Some((
                SectionSpan { offset: 30, size: 40 },
                SectionSpan { offset: 70, size: 8 }
            ))
        );
    }

    #[test]
    fn unwritten_slots_read_back_as_absent() {
        let toc = Toc::new();
        assert_eq!(toc.simple(SectionId::BranchMasks), None);
        assert_eq!(toc.compound(SectionId::Postings), None);
    }

    #[test]
    fn decode_rejects_truncated_blob() {
        let mut toc = Toc::new();
        toc.set_simple(SectionId::Metadata, SectionSpan { offset: 0, size: 10 });
        let mut bytes = toc.encode();
        bytes.truncate(bytes.len() - 4);
        assert!(Toc::decode(&bytes).is_err());
    }
}
