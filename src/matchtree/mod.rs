// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Matchtree: the algebraic evaluation core.
//!
//! A [`Query`](crate::query::Query) is compiled (see [`build`]) into a
//! [`MatchNode`] tree. Every node satisfies the same three-operation
//! contract (`next_doc`, `prepare`, `matches`) so the shard searcher's
//! driver loop never needs to know which variant it's holding.

pub mod build;
pub mod simplify;

use std::collections::HashMap;

use regex::Regex;

use crate::content::{case_fold_eq, ContentProvider};
use crate::dociter::{doc_start, locate_doc};
use crate::error::Result;
use crate::shard::{case_fold_ngram_variants, Shard};

/// Evaluation cost ceiling, cheapest first. The driver calls `matches` once
/// per tier, in this order, stopping early once a tier returns a sure
/// answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CostTier {
    Const = 0,
    Memory = 1,
    Content = 2,
    Regex = 3,
}

impl CostTier {
    pub const ALL: [CostTier; 4] = [CostTier::Const, CostTier::Memory, CostTier::Content, CostTier::Regex];
}

/// Per-document memo of already-resolved `(node id) -> (value, sure)`
/// results, keyed by the id assigned to each node at compile time.
#[derive(Default)]
pub struct Known {
    resolved: HashMap<u32, (bool, bool)>,
}

impl Known {
    pub fn clear(&mut self) {
        self.resolved.clear();
    }

    fn get(&self, id: u32) -> Option<(bool, bool)> {
        self.resolved.get(&id).copied()
    }

    fn set(&mut self, id: u32, value: bool, sure: bool) {
        if sure {
            self.resolved.insert(id, (value, sure));
        }
    }
}

/// A single posting-list co-walk, as used by a substring (or symbol)
/// matchtree leaf. Positions are global rune offsets across the shard;
/// `cursor1`/`cursor2` only ever advance, matching the monotonic-document
/// driver contract.
struct PostingCoWalk {
    p1: Vec<u32>,
    p2: Vec<u32>,
    cursor1: usize,
    cursor2: usize,
    params: crate::dociter::DocIterParams,
    doc_hint: usize,
}

impl PostingCoWalk {
    fn new(p1: Vec<u32>, p2: Vec<u32>, params: crate::dociter::DocIterParams) -> Self {
        Self {
            p1,
            p2,
            cursor1: 0,
            cursor2: 0,
            params,
            doc_hint: 0,
        }
    }

    /// Peek (without consuming) the next aligned, non-straddling candidate.
    fn peek(&mut self, file_end_runes: &[u32]) -> Option<(u32, u32)> {
        loop {
            let p1 = *self.p1.get(self.cursor1)?;
            let p2 = *self.p2.get(self.cursor2)?;
            let d = self.params.distance;
            if p1 + d < p2 {
                self.cursor1 += 1;
                continue;
            }
            if p1 + d > p2 {
                self.cursor2 += 1;
                continue;
            }
            let doc_id = locate_doc(file_end_runes, p1, self.doc_hint)?;
            self.doc_hint = doc_id;
            let file_start = doc_start(file_end_runes, doc_id);
            let file_end = file_end_runes[doc_id];
            let straddles =
                p1 < file_start + self.params.left_pad || p1 + d + 3 + self.params.right_pad > file_end;
            if straddles {
                self.cursor1 += 1;
                self.cursor2 += 1;
                continue;
            }
            let rune_offset = p1 - file_start - self.params.left_pad;
            return Some((doc_id as u32, rune_offset));
        }
    }

    fn next_doc(&mut self, file_end_runes: &[u32]) -> u32 {
        self.peek(file_end_runes).map(|(d, _)| d).unwrap_or(u32::MAX)
    }

    /// Consume and return every candidate rune offset belonging to `doc`.
    fn drain_doc(&mut self, file_end_runes: &[u32], doc: u32) -> Vec<u32> {
        let mut out = Vec::new();
        loop {
            match self.peek(file_end_runes) {
                Some((d, offset)) if d == doc => {
                    out.push(offset);
                    self.cursor1 += 1;
                    self.cursor2 += 1;
                }
                _ => break,
            }
        }
        out
    }
}

/// One candidate match span within the current document, gathered during
/// match evaluation and later deduped/merged/split into line matches.
#[derive(Debug, Clone, Copy)]
pub struct SpanCandidate {
    pub byte_offset: u32,
    pub byte_len: u32,
    pub is_file_name: bool,
}

pub struct SubstringNode {
    pattern: String,
    pattern_rune_count: u32,
    case_sensitive: bool,
    file_name: bool,
    covers_content: bool,
    walk: PostingCoWalk,
    candidates: Vec<u32>, // rune offsets within the current document
    current_doc: u32,
    last_matched: bool,
}

impl SubstringNode {
    pub fn gather(&self, cp: &mut ContentProvider) -> Result<Vec<SpanCandidate>> {
        let mut spans = Vec::new();
        for &rune_offset in &self.candidates {
            let start_byte = cp.find_offset(self.file_name, rune_offset)?;
            let end_byte = cp.find_offset(self.file_name, rune_offset + self.pattern_rune_count)?;
            spans.push(SpanCandidate {
                byte_offset: start_byte,
                byte_len: end_byte - start_byte,
                is_file_name: self.file_name,
            });
        }
        Ok(spans)
    }
}

pub struct RegexNode {
    regex: Regex,
    file_name: bool,
    /// The over-approximating ngram subtree (see `build::approximate_regex`),
    /// AND-combined and excluded from span collection (`NoVisit`).
    approximation: Option<Box<MatchNode>>,
    spans: Vec<SpanCandidate>,
    last_matched: bool,
}

pub struct BranchNode {
    mask: u64,
}

pub struct LanguageNode {
    docs: Vec<u32>,
    cursor: usize,
}

/// Closed-enum dispatch over every matchtree node variant.
pub enum MatchNode {
    And(u32, Vec<MatchNode>),
    AndLine(u32, Vec<MatchNode>),
    Or(u32, Vec<MatchNode>),
    Not(u32, Box<MatchNode>),
    Substring(SubstringNode),
    Regex(RegexNode),
    Branch(BranchNode),
    Language(LanguageNode),
    ConstTrue,
    ConstFalse,
    NoVisit(Box<MatchNode>),
    Symbol(Box<MatchNode>, Vec<(u32, u32)>),
}

impl MatchNode {
    pub fn next_doc(&mut self, shard: &Shard) -> u32 {
        match self {
            MatchNode::And(_, children) | MatchNode::AndLine(_, children) => {
                children.iter_mut().map(|c| c.next_doc(shard)).max().unwrap_or(u32::MAX)
            }
            MatchNode::Or(_, children) => children
                .iter_mut()
                .map(|c| c.next_doc(shard))
                .min()
                .unwrap_or(u32::MAX),
            MatchNode::Not(_, _) => 0,
            MatchNode::Substring(s) => s.walk.next_doc(&shard.file_end_runes),
            MatchNode::Regex(r) => r
                .approximation
                .as_mut()
                .map(|a| a.next_doc(shard))
                .unwrap_or(0),
            MatchNode::Branch(_) => 0,
            MatchNode::Language(l) => l.docs.get(l.cursor).copied().unwrap_or(u32::MAX),
            MatchNode::ConstTrue => 0,
            MatchNode::ConstFalse => u32::MAX,
            MatchNode::NoVisit(inner) => inner.next_doc(shard),
            MatchNode::Symbol(inner, _) => inner.next_doc(shard),
        }
    }

    pub fn prepare(&mut self, shard: &Shard, doc: u32) {
        match self {
            MatchNode::And(_, children) | MatchNode::AndLine(_, children) | MatchNode::Or(_, children) => {
                for c in children {
                    c.prepare(shard, doc);
                }
            }
            MatchNode::Not(_, child) => child.prepare(shard, doc),
            MatchNode::Substring(s) => {
                s.current_doc = doc;
                s.candidates = s.walk.drain_doc(&shard.file_end_runes, doc);
            }
            MatchNode::Regex(r) => {
                if let Some(a) = r.approximation.as_mut() {
                    a.prepare(shard, doc);
                }
                r.spans.clear();
            }
            MatchNode::Branch(_) => {}
            MatchNode::Language(l) => {
                while l.docs.get(l.cursor).is_some_and(|&d| d < doc) {
                    l.cursor += 1;
                }
            }
            MatchNode::ConstTrue | MatchNode::ConstFalse => {}
            MatchNode::NoVisit(inner) => inner.prepare(shard, doc),
            MatchNode::Symbol(inner, _) => inner.prepare(shard, doc),
        }
    }

    pub fn matches(
        &mut self,
        shard: &Shard,
        cp: &mut ContentProvider,
        cost: CostTier,
        known: &mut Known,
    ) -> (bool, bool) {
        match self {
            MatchNode::And(id, children) => {
                if let Some(r) = known.get(*id) {
                    return r;
                }
                let mut all_sure_true = true;
                let mut any_sure_false = false;
                let mut all_sure = true;
                for c in children.iter_mut() {
                    let (v, sure) = c.matches(shard, cp, cost, known);
                    if sure && !v {
                        any_sure_false = true;
                    }
                    if !(sure && v) {
                        all_sure_true = false;
                    }
                    if !sure {
                        all_sure = false;
                    }
                }
                let (value, sure) = if any_sure_false {
                    (false, true)
                } else if all_sure_true {
                    (true, true)
                } else {
                    (false, all_sure)
                };
                known.set(*id, value, sure);
                (value, sure)
            }
            MatchNode::AndLine(id, children) => {
                if let Some(r) = known.get(*id) {
                    return r;
                }
                // Only meaningful at Content tier and above: requires byte
                // offsets, which substring children only populate once
                // gathered. We fall back to plain AND semantics for
                // sure/unsure propagation and additionally require the
                // children's candidate rune offsets to share a line once
                // all are sure-true.
                let (mut value, mut sure) = (true, true);
                for c in children.iter_mut() {
                    let (v, s) = c.matches(shard, cp, cost, known);
                    value &= v;
                    sure &= s;
                    if s && !v {
                        sure = true;
                        value = false;
                        break;
                    }
                }
                if value && sure && cost >= CostTier::Content {
                    if let Ok(line_match) = shares_a_line(children, cp) {
                        value = line_match;
                    }
                }
                known.set(*id, value, sure);
                (value, sure)
            }
            MatchNode::Or(id, children) => {
                if let Some(r) = known.get(*id) {
                    return r;
                }
                let mut any_sure_true = false;
                let mut all_sure = true;
                let mut any_true_unsure = false;
                for c in children.iter_mut() {
                    let (v, sure) = c.matches(shard, cp, cost, known);
                    if sure && v {
                        any_sure_true = true;
                    }
                    if !sure {
                        all_sure = false;
                        if v {
                            any_true_unsure = true;
                        }
                    }
                }
                let value = any_sure_true || any_true_unsure;
                let sure = any_sure_true || all_sure;
                known.set(*id, value, sure);
                (value, sure)
            }
            MatchNode::Not(id, child) => {
                if let Some(r) = known.get(*id) {
                    return r;
                }
                let (v, sure) = child.matches(shard, cp, cost, known);
                let result = (!v, sure);
                known.set(*id, result.0, result.1);
                result
            }
            MatchNode::Substring(s) => {
                if s.candidates.is_empty() {
                    s.last_matched = false;
                    return (false, true);
                }
                let needed_tier = if s.covers_content {
                    CostTier::Const
                } else if s.file_name {
                    CostTier::Memory
                } else {
                    CostTier::Content
                };
                if cost < needed_tier {
                    return (false, false);
                }
                if s.covers_content {
                    s.last_matched = true;
                    return (true, true);
                }
                let verified = verify_substring(s, cp);
                match verified {
                    Ok(v) => {
                        s.last_matched = v;
                        (v, true)
                    }
                    Err(_) => {
                        s.last_matched = false;
                        (false, true)
                    }
                }
            }
            MatchNode::Regex(r) => {
                if let Some(a) = r.approximation.as_mut() {
                    let (v, sure) = a.matches(shard, cp, cost, known);
                    if sure && !v {
                        r.last_matched = false;
                        return (false, true);
                    }
                }
                if cost < CostTier::Regex {
                    return (false, false);
                }
                match cp.data(r.file_name) {
                    Ok(bytes) => {
                        let text = String::from_utf8_lossy(bytes);
                        r.spans = r
                            .regex
                            .find_iter(&text)
                            .map(|m| SpanCandidate {
                                byte_offset: m.start() as u32,
                                byte_len: (m.end() - m.start()) as u32,
                                is_file_name: r.file_name,
                            })
                            .collect();
                        r.last_matched = !r.spans.is_empty();
                        (r.last_matched, true)
                    }
                    Err(_) => {
                        r.last_matched = false;
                        (false, true)
                    }
                }
            }
            MatchNode::Branch(b) => {
                if cost < CostTier::Const {
                    return (false, false);
                }
                let mask = shard.branch_masks.get(cp.doc_id() as usize).copied().unwrap_or(0);
                (mask & b.mask != 0, true)
            }
            MatchNode::Language(_) => (true, true),
            MatchNode::ConstTrue => (true, true),
            MatchNode::ConstFalse => (false, true),
            MatchNode::NoVisit(inner) => inner.matches(shard, cp, cost, known),
            MatchNode::Symbol(inner, sections) => {
                let (v, sure) = inner.matches(shard, cp, cost, known);
                if !v || !sure {
                    return (v, sure);
                }
                match inner.as_mut() {
                    MatchNode::Substring(s) => {
                        let kept: Vec<u32> = s
                            .candidates
                            .iter()
                            .copied()
                            .filter(|&off| sections.iter().any(|&(start, end)| off >= start && off < end))
                            .collect();
                        s.candidates = kept;
                        (!s.candidates.is_empty(), true)
                    }
                    _ => (v, sure),
                }
            }
        }
    }

    /// `(total atoms, matched atoms)` across every substring/regex leaf in
    /// this tree, used to compute a file's atom-fraction score term.
    pub fn count_atoms(&self) -> (usize, usize) {
        match self {
            MatchNode::And(_, children) | MatchNode::AndLine(_, children) | MatchNode::Or(_, children) => children
                .iter()
                .map(|c| c.count_atoms())
                .fold((0, 0), |(t, m), (ct, cm)| (t + ct, m + cm)),
            MatchNode::Not(_, child) => child.count_atoms(),
            MatchNode::Substring(s) => (1, s.last_matched as usize),
            MatchNode::Regex(r) => (1, r.last_matched as usize),
            MatchNode::Branch(_) | MatchNode::Language(_) | MatchNode::ConstTrue | MatchNode::ConstFalse => (0, 0),
            MatchNode::NoVisit(inner) => inner.count_atoms(),
            MatchNode::Symbol(inner, _) => inner.count_atoms(),
        }
    }

    /// Collect span candidates from every visited non-`NoVisit` subtree.
    pub fn gather(&self, cp: &mut ContentProvider, out: &mut Vec<SpanCandidate>) -> Result<()> {
        match self {
            MatchNode::And(_, children) | MatchNode::AndLine(_, children) | MatchNode::Or(_, children) => {
                for c in children {
                    c.gather(cp, out)?;
                }
            }
            MatchNode::Not(_, _) => {}
            MatchNode::Substring(s) => out.extend(s.gather(cp)?),
            MatchNode::Regex(r) => out.extend(r.spans.iter().copied()),
            MatchNode::Branch(_) | MatchNode::Language(_) | MatchNode::ConstTrue | MatchNode::ConstFalse => {}
            MatchNode::NoVisit(_) => {}
            MatchNode::Symbol(inner, _) => inner.gather(cp, out)?,
        }
        Ok(())
    }
}

fn verify_substring(s: &SubstringNode, cp: &mut ContentProvider) -> Result<bool> {
    for &rune_offset in &s.candidates {
        let start = cp.find_offset(s.file_name, rune_offset)?;
        let end = cp.find_offset(s.file_name, rune_offset + s.pattern_rune_count)?;
        let bytes = cp.data(s.file_name)?;
        let region = bytes
            .get(start as usize..end as usize)
            .ok_or_else(|| crate::error::corrupt("match span out of bounds"))?;
        if case_fold_eq(region, &s.pattern, s.case_sensitive) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn shares_a_line(children: &[MatchNode], cp: &mut ContentProvider) -> Result<bool> {
    let newlines = cp.newlines()?.to_vec();
    let line_of = |byte_offset: u32| -> usize { newlines.partition_point(|&nl| nl < byte_offset) };
    let mut common: Option<std::collections::HashSet<usize>> = None;
    for child in children {
        if let MatchNode::Substring(s) = child {
            let mut lines = std::collections::HashSet::new();
            for &rune_offset in &s.candidates {
                let byte_offset = cp.find_offset(s.file_name, rune_offset)?;
                lines.insert(line_of(byte_offset));
            }
            common = Some(match common {
                Some(prev) => prev.intersection(&lines).copied().collect(),
                None => lines,
            });
        }
    }
    Ok(common.map(|s| !s.is_empty()).unwrap_or(true))
}

/// Enumerate the packed ngram key at each rune offset of `runes`.
pub(crate) fn ngram_keys(runes: &[u32]) -> Vec<(u32, u64)> {
    runes
        .windows(3)
        .enumerate()
        .map(|(i, w)| (i as u32, crate::binary::encoding::runes_to_ngram([w[0], w[1], w[2]])))
        .collect()
}

pub(crate) fn expand_case_variants(key: u64, case_sensitive: bool) -> Vec<u64> {
    if case_sensitive {
        vec![key]
    } else {
        case_fold_ngram_variants(crate::binary::encoding::ngram_to_runes(key))
    }
}

#[cfg(test)]
mod co_walk_tests {
    use super::*;
    use crate::dociter::DocIterParams;

    #[test]
    fn finds_aligned_pairs_within_one_document() {
        // pattern "water": ngrams wat/ate/ter. Say we picked "wat" at i1=0
        // and "ter" at i2=2, distance=2. file covers runes [0,30).
        let file_end_runes = [30u32];
        let first_positions = vec![5u32, 20];
        let last_positions = vec![7u32, 22]; // both pairs aligned at +2 distance
        let params = DocIterParams::new(0, 2, 5);
        let mut walk = PostingCoWalk::new(first_positions, last_positions, params);

        let (doc, offset) = walk.peek(&file_end_runes).unwrap();
        assert_eq!(doc, 0);
        assert_eq!(offset, 5);
        walk.cursor1 += 1;
        walk.cursor2 += 1;
        let (_, offset2) = walk.peek(&file_end_runes).unwrap();
        assert_eq!(offset2, 20);
        walk.cursor1 += 1;
        walk.cursor2 += 1;
        assert!(walk.peek(&file_end_runes).is_none());
    }

    #[test]
    fn rejects_candidates_straddling_a_document_boundary() {
        let file_end_runes = [10u32, 20];
        // doc0 is runes [0,10), doc1 is [10,20).
        // distance 2 pushes p2 past doc0's boundary into doc1.
        let first_positions = vec![9u32];
        let last_positions = vec![11u32];
        let params = DocIterParams::new(0, 2, 5);
        let mut walk = PostingCoWalk::new(first_positions, last_positions, params);
        assert!(walk.peek(&file_end_runes).is_none());
    }
}
