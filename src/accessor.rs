// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Shard accessor: the `read(offset, size)` contract shared by the
//! mmap-backed and in-memory backends.
//!
//! Both backends expose exactly the same trait so the rest of the engine
//! never has to care whether a given byte range comes from a memory map or
//! a heap-resident `Vec<u8>`. Pinning specific sections in heap memory
//! (via `IN_MEMORY_CONTENT`) is a decision made once, at shard-open time, in
//! [`crate::shard::Shard::open`] — the accessor itself just serves bytes.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use crate::error::{corrupt, Result};

/// Random-access byte source backing a shard file.
pub trait ShardAccessor: Send + Sync {
    fn read(&self, offset: u32, len: u32) -> Result<&[u8]>;
    fn size(&self) -> u32;
}

/// mmap-backed accessor: the default for shard files that live on disk.
/// The map is established once at open time and lives for the accessor's
/// whole lifetime, matching the "mmap-backed for its entire lifetime" shard
/// lifecycle in the data model.
pub struct MmapAccessor {
    map: Mmap,
}

impl MmapAccessor {
    #[allow(unsafe_code)]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        // The crate denies unsafe_code everywhere else; `Mmap::map`'s safety
        // contract (no concurrent truncation of the backing file) is
        // delegated entirely to memmap2, and this is the one site that
        // invokes it.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self { map })
    }
}

impl ShardAccessor for MmapAccessor {
    fn read(&self, offset: u32, len: u32) -> Result<&[u8]> {
        let start = offset as usize;
        let end = start
            .checked_add(len as usize)
            .ok_or_else(|| corrupt("read range overflow"))?;
        self.map
            .get(start..end)
            .ok_or_else(|| corrupt("read range out of bounds"))
    }

    fn size(&self) -> u32 {
        self.map.len() as u32
    }
}

/// Heap-resident accessor: used for shards built in-process (tests, the
/// `index` CLI subcommand before it's flushed to disk) and for any section
/// pinned via `IN_MEMORY_CONTENT`.
pub struct InMemoryAccessor {
    bytes: Vec<u8>,
}

impl InMemoryAccessor {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl ShardAccessor for InMemoryAccessor {
    fn read(&self, offset: u32, len: u32) -> Result<&[u8]> {
        let start = offset as usize;
        let end = start
            .checked_add(len as usize)
            .ok_or_else(|| corrupt("read range overflow"))?;
        self.bytes
            .get(start..end)
            .ok_or_else(|| corrupt("read range out of bounds"))
    }

    fn size(&self) -> u32 {
        self.bytes.len() as u32
    }
}

/// Parsed `IN_MEMORY_CONTENT` environment variable: section names that
/// should be pinned into heap memory rather than served lazily from mmap.
/// Unknown names are kept out of the resulting set and logged as a warning
/// by the caller; `filecontents`/`postings` can never be pinned.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPins {
    names: HashSet<String>,
}

impl InMemoryPins {
    pub fn from_env() -> Self {
        match std::env::var("IN_MEMORY_CONTENT") {
            Ok(val) => Self::parse(&val),
            Err(_) => Self::default(),
        }
    }

    pub fn parse(value: &str) -> Self {
        let mut names = HashSet::new();
        for raw in value.split(',') {
            let name = raw.trim();
            if name.is_empty() {
                continue;
            }
            if crate::binary::header::SectionId::ALL
                .iter()
                .any(|id| id.env_name() == Some(name))
            {
                names.insert(name.to_string());
            } else {
                tracing::warn!(section = name, "IN_MEMORY_CONTENT: unknown section name, ignoring");
            }
        }
        Self { names }
    }

    pub fn contains(&self, id: crate::binary::header::SectionId) -> bool {
        id.env_name().is_some_and(|name| self.names.contains(name))
    }
}

pub type SharedAccessor = Arc<dyn ShardAccessor>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_accessor_reads_ranges() {
        let acc = InMemoryAccessor::new(b"hello world".to_vec());
        assert_eq!(acc.read(0, 5).unwrap(), b"hello");
        assert_eq!(acc.read(6, 5).unwrap(), b"world");
        assert!(acc.read(6, 100).is_err());
    }

    #[test]
    fn pins_ignore_unknown_names_and_never_pin_filecontents() {
        let pins = InMemoryPins::parse("filenames, bogus, branchmasks");
        assert!(pins.contains(crate::binary::header::SectionId::FileNames));
        assert!(pins.contains(crate::binary::header::SectionId::BranchMasks));
        assert!(!pins.contains(crate::binary::header::SectionId::FileContents));
    }
}
