// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Posting-list encode/decode for ngram tables.
//!
//! Content postings are delta+varint encoded rune offsets (strictly
//! increasing, so deltas are small and compress well). File-name postings
//! are typically small enough that they're stored as plain big-endian `u32`
//! arrays instead — no delta overhead, no decode loop, just a slice cast.

use crate::error::{corrupt, Result};

use super::encoding::{decode_deltas, encode_deltas};
use super::header::MAX_POSTING_SIZE;

/// Encode a strictly increasing posting list as `count:varint` followed by
/// delta-varint-coded offsets.
pub fn encode_content_posting(positions: &[u32]) -> Vec<u8> {
    let mut buf = Vec::new();
    super::encoding::encode_varint(positions.len() as u64, &mut buf);
    encode_deltas(positions, &mut buf);
    buf
}

pub fn decode_content_posting(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let (count, pos) = super::encoding::decode_varint(bytes)?;
    let count = count as usize;
    if count > MAX_POSTING_SIZE {
        return Err(corrupt(format!("posting list too large: {count}")));
    }
    let (values, _consumed) = decode_deltas(&bytes[pos..], count)?;
    Ok(values)
}

/// File-name postings are stored as plain big-endian `u32` arrays: small
/// lists, no benefit from delta coding, and the in-memory hit iterator reads
/// them back verbatim.
pub fn encode_name_posting(positions: &[u32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(positions.len() * 4);
    for &p in positions {
        buf.extend_from_slice(&p.to_be_bytes());
    }
    buf
}

pub fn decode_name_posting(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(corrupt("name posting length not a multiple of 4"));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes(c.try_into().unwrap()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_posting_roundtrip() {
        let xs = vec![3u32, 10, 10_001, 10_002, 50_000];
        let encoded = encode_content_posting(&xs);
        let decoded = decode_content_posting(&encoded).unwrap();
        assert_eq!(decoded, xs);
    }

    #[test]
    fn name_posting_roundtrip() {
        let xs = vec![1u32, 2, 9999];
        let encoded = encode_name_posting(&xs);
        let decoded = decode_name_posting(&encoded).unwrap();
        assert_eq!(decoded, xs);
    }

    #[test]
    fn empty_posting_roundtrips() {
        assert_eq!(decode_content_posting(&[]).unwrap(), Vec::<u32>::new());
        assert_eq!(decode_name_posting(&[]).unwrap(), Vec::<u32>::new());
    }
}
