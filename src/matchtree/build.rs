// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Compiles a [`Query`] tree into a [`MatchNode`] tree bound to a specific
//! shard: picks the two rarest ngrams for each substring leaf, compiles
//! regexes and their over-approximations, and resolves branch/language
//! atoms against the shard's own metadata.

use regex::RegexBuilder;
use regex_syntax::hir::{Hir, HirKind};
use regex_syntax::ParserBuilder;

use crate::binary::encoding::runes_to_ngram;
use crate::dociter::DocIterParams;
use crate::error::{SorexError, Result};
use crate::query::Query;
use crate::shard::Shard;

use super::{BranchNode, LanguageNode, MatchNode, PostingCoWalk, SubstringNode};

/// Monotonic id source so every compiled node gets a distinct memo key.
struct IdGen(u32);

impl IdGen {
    fn next(&mut self) -> u32 {
        let id = self.0;
        self.0 += 1;
        id
    }
}

/// Stable hash of a language name into the per-document language code
/// stored in the shard's `languages` table. Builder and query compiler both
/// go through this function so a name always resolves to the same code.
pub fn language_code(name: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for b in name.to_ascii_lowercase().as_bytes() {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

pub fn compile(query: &Query, shard: &Shard) -> Result<MatchNode> {
    let mut ids = IdGen(0);
    compile_inner(query, shard, &mut ids)
}

fn compile_inner(query: &Query, shard: &Shard, ids: &mut IdGen) -> Result<MatchNode> {
    match query {
        Query::And(children) => {
            let compiled = children
                .iter()
                .map(|c| compile_inner(c, shard, ids))
                .collect::<Result<Vec<_>>>()?;
            let id = ids.next();
            if all_content_substrings(children) {
                Ok(MatchNode::AndLine(id, compiled))
            } else {
                Ok(MatchNode::And(id, compiled))
            }
        }
        Query::Or(children) => {
            let compiled = children
                .iter()
                .map(|c| compile_inner(c, shard, ids))
                .collect::<Result<Vec<_>>>()?;
            Ok(MatchNode::Or(ids.next(), compiled))
        }
        Query::Not(child) => {
            let compiled = compile_inner(child, shard, ids)?;
            Ok(MatchNode::Not(ids.next(), Box::new(compiled)))
        }
        Query::Const(b) => Ok(if *b { MatchNode::ConstTrue } else { MatchNode::ConstFalse }),
        Query::Substring {
            pattern,
            case_sensitive,
            file_name,
            content: _,
        } => compile_substring(pattern, *case_sensitive, *file_name, shard),
        Query::Regexp {
            regexp,
            file_name,
            case_sensitive,
        } => compile_regex(regexp, *file_name, *case_sensitive, shard, ids),
        Query::Branch { pattern } => {
            let mask = branch_mask(shard, pattern);
            Ok(MatchNode::Branch(BranchNode { mask }))
        }
        Query::Language { language } => {
            let code = language_code(language);
            let docs: Vec<u32> = shard
                .languages
                .iter()
                .enumerate()
                .filter(|(_, &c)| c == code)
                .map(|(i, _)| i as u32)
                .collect();
            Ok(MatchNode::Language(LanguageNode { docs, cursor: 0 }))
        }
        Query::Symbol(inner) => {
            if !matches!(inner.as_ref(), Query::Substring { .. }) {
                // Spec's own example of an unsupported query shape: a regex
                // (or any other non-substring atom) inside a symbol scope.
                return Err(SorexError::UnsupportedQueryShape(
                    "Symbol atom must wrap a Substring, not a Regexp or other query".to_string(),
                ));
            }
            let compiled = compile_inner(inner, shard, ids)?;
            // Sections are clipped per-document at `prepare` time using the
            // document's own symbol sections; stash an empty table here and
            // let the searcher populate it via `MatchNode::Symbol`'s
            // `prepare`, which pulls sections fresh from the shard.
            Ok(MatchNode::Symbol(Box::new(compiled), Vec::new()))
        }
        Query::Repo { pattern } => {
            // Should have been rewritten to Const by pre-query simplification;
            // if it reaches here, fall back to the same contains() check.
            Ok(if shard.repo_name().contains(pattern.as_str()) {
                MatchNode::ConstTrue
            } else {
                MatchNode::ConstFalse
            })
        }
    }
}

fn branch_mask(shard: &Shard, pattern: &str) -> u64 {
    let mut mask = 0u64;
    for (i, branch) in shard.repo_metadata.branches.iter().enumerate() {
        if i >= 64 {
            break;
        }
        if branch == "HEAD" && i == 0 {
            if "HEAD".contains(pattern) || pattern == "HEAD" {
                mask |= 1 << i;
            }
            continue;
        }
        if branch.contains(pattern) {
            mask |= 1 << i;
        }
    }
    mask
}

fn rune_vec(pattern: &str) -> Vec<u32> {
    pattern.chars().map(|c| c as u32).collect()
}

/// Whether an `And`'s children are all plain content substrings, making the
/// line-intersection optimization (`MatchNode::AndLine`) safe to apply.
/// Disabled as soon as any sibling is a file-name query, per the spec's own
/// conservative call on that interaction.
fn all_content_substrings(children: &[Query]) -> bool {
    !children.is_empty()
        && children.iter().all(|c| {
            matches!(
                c,
                Query::Substring {
                    content: true,
                    file_name: false,
                    ..
                }
            )
        })
}

fn compile_substring(pattern: &str, case_sensitive: bool, file_name: bool, shard: &Shard) -> Result<MatchNode> {
    let runes = rune_vec(pattern);
    if runes.len() < 3 {
        if file_name {
            // Short file-name queries fall back to a brute-force regex scan
            // (spec: "the ngram index cannot be used").
            let regex = RegexBuilder::new(&regex::escape(pattern))
                .case_insensitive(!case_sensitive)
                .build()
                .map_err(|e| SorexError::UnsupportedQueryShape(e.to_string()))?;
            return Ok(MatchNode::Regex(super::RegexNode {
                regex,
                file_name: true,
                approximation: None,
                spans: Vec::new(),
                last_matched: false,
            }));
        }
        return Err(SorexError::QueryTooShort {
            pattern: pattern.to_string(),
            suggestion: format!(".*{}.*", regex::escape(pattern)),
        });
    }

    let ngrams: Vec<(u32, u64)> = runes
        .windows(3)
        .enumerate()
        .map(|(i, w)| (i as u32, runes_to_ngram([w[0], w[1], w[2]])))
        .collect();

    let mut scored = Vec::with_capacity(ngrams.len());
    for (pos, key) in &ngrams {
        let window = [runes[*pos as usize], runes[*pos as usize + 1], runes[*pos as usize + 2]];
        let freq = if file_name {
            shard.name_ngram_frequency(*key, window, case_sensitive)?
        } else {
            shard.content_ngram_frequency(*key, window, case_sensitive)?
        };
        scored.push((freq, *pos, *key, window));
    }
    scored.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    let (first, second) = if scored.len() == 1 {
        (scored[0], scored[0])
    } else {
        let mut top2 = [scored[0], scored[1]];
        top2.sort_by_key(|e| e.1);
        (top2[0], top2[1])
    };
    let (_, i1, key1, window1) = first;
    let (_, i2, key2, window2) = second;

    let p1 = shard.posting_union(key1, window1, case_sensitive, file_name)?;
    let p2 = shard.posting_union(key2, window2, case_sensitive, file_name)?;
    let params = DocIterParams::new(i1, i2, runes.len() as u32);
    let walk = PostingCoWalk::new(p1, p2, params);

    Ok(MatchNode::Substring(SubstringNode {
        pattern: pattern.to_string(),
        pattern_rune_count: runes.len() as u32,
        case_sensitive,
        file_name,
        covers_content: params.covers_content,
        walk,
        candidates: Vec::new(),
        current_doc: 0,
        last_matched: false,
    }))
}

/// Regex-to-query approximation (spec §4.6): derive an over-approximating
/// ngram query from a regex's literal structure — `Concat` children must
/// *all* appear somewhere in the document (AND), `Alternate` children mean
/// *any one* suffices (OR) — so documents can be pruned before the regex
/// engine runs. Must never reject a document the real regex would accept:
/// anything not provably a required literal run (character classes,
/// zero-or-more repetitions, anchors) degrades to `Const(true)`.
pub fn approximate_regex(ast: &RegexApprox, case_sensitive: bool, file_name: bool) -> Query {
    match ast {
        RegexApprox::Literal(lit) => {
            if lit.chars().count() >= 3 {
                Query::Substring {
                    pattern: lit.clone(),
                    case_sensitive,
                    file_name,
                    content: !file_name,
                }
            } else {
                Query::Const(true)
            }
        }
        RegexApprox::Optional => Query::Const(true),
        RegexApprox::Concat(children) => {
            Query::and(children.iter().map(|c| approximate_regex(c, case_sensitive, file_name)))
        }
        RegexApprox::Alternate(children) => {
            Query::or(children.iter().map(|c| approximate_regex(c, case_sensitive, file_name)))
        }
    }
}

/// Structural approximation of a regex AST, built by walking a
/// `regex-syntax` `Hir` (see [`hir_to_approx`]). Every node the real regex
/// could match zero-width or optionally becomes `Optional` rather than
/// being dropped, so the resulting query can only over-approximate.
pub enum RegexApprox {
    Literal(String),
    Optional,
    Concat(Vec<RegexApprox>),
    Alternate(Vec<RegexApprox>),
}

/// Walks a parsed regex AST into a [`RegexApprox`]. Parsed case-sensitively
/// regardless of the query's actual case sensitivity — `regex-syntax`
/// expands case-insensitive literals into per-character classes, which
/// would defeat literal extraction entirely; case folding is instead
/// applied downstream, at the ngram-posting level, by [`compile_substring`].
fn hir_to_approx(hir: &Hir) -> RegexApprox {
    match hir.kind() {
        HirKind::Empty | HirKind::Look(_) | HirKind::Class(_) => RegexApprox::Optional,
        HirKind::Literal(lit) => match std::str::from_utf8(&lit.0) {
            Ok(s) => RegexApprox::Literal(s.to_string()),
            Err(_) => RegexApprox::Optional,
        },
        // `min == 0` means the whole repetition can match zero times, so
        // nothing inside it is guaranteed to appear.
        HirKind::Repetition(rep) => {
            if rep.min == 0 {
                RegexApprox::Optional
            } else {
                hir_to_approx(&rep.sub)
            }
        }
        HirKind::Capture(cap) => hir_to_approx(&cap.sub),
        HirKind::Concat(subs) => RegexApprox::Concat(subs.iter().map(hir_to_approx).collect()),
        HirKind::Alternation(subs) => RegexApprox::Alternate(subs.iter().map(hir_to_approx).collect()),
    }
}

/// Compiles an `approximate_regex` query into a matchtree node. Deliberately
/// separate from `compile_inner`: the approximation's `And` nodes must stay
/// plain `And` (a regex's literal fragments need only co-occur somewhere in
/// the document, not share a line), so it must never go through
/// `compile_inner`'s `AndLine` promotion.
fn compile_approx(query: &Query, shard: &Shard, ids: &mut IdGen) -> Result<MatchNode> {
    match query {
        Query::Const(b) => Ok(if *b { MatchNode::ConstTrue } else { MatchNode::ConstFalse }),
        Query::Substring {
            pattern,
            case_sensitive,
            file_name,
            ..
        } => compile_substring(pattern, *case_sensitive, *file_name, shard),
        Query::And(children) => {
            let compiled = children
                .iter()
                .map(|c| compile_approx(c, shard, ids))
                .collect::<Result<Vec<_>>>()?;
            Ok(MatchNode::And(ids.next(), compiled))
        }
        Query::Or(children) => {
            let compiled = children
                .iter()
                .map(|c| compile_approx(c, shard, ids))
                .collect::<Result<Vec<_>>>()?;
            Ok(MatchNode::Or(ids.next(), compiled))
        }
        // approximate_regex only ever emits the variants above.
        _ => Ok(MatchNode::ConstTrue),
    }
}

fn compile_regex(pattern: &str, file_name: bool, case_sensitive: bool, shard: &Shard, ids: &mut IdGen) -> Result<MatchNode> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| SorexError::UnsupportedQueryShape(e.to_string()))?;

    let approx_query = ParserBuilder::new()
        .case_insensitive(false)
        .build()
        .parse(pattern)
        .map(|hir| hir_to_approx(&hir))
        .map(|ast| approximate_regex(&ast, case_sensitive, file_name))
        .map(|q| crate::matchtree::simplify::simplify(q, shard.repo_name()))
        .unwrap_or(Query::Const(true));

    let approximation = match approx_query {
        Query::Const(true) => None,
        other => Some(Box::new(MatchNode::NoVisit(Box::new(compile_approx(&other, shard, ids)?)))),
    };

    Ok(MatchNode::Regex(super::RegexNode {
        regex,
        file_name,
        approximation,
        spans: Vec::new(),
        last_matched: false,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{InputDocument, ShardBuilder};

    fn demo_shard() -> Shard {
        let mut builder = ShardBuilder::new("demo/repo", vec!["HEAD".to_string()]);
        builder.add_document(InputDocument::new("a.txt", *b"connect database now", 1));
        Shard::open_bytes(builder.build()).unwrap()
    }

    #[test]
    fn and_of_content_substrings_becomes_andline() {
        let shard = demo_shard();
        let query = Query::And(vec![Query::substring("connect"), Query::substring("database")]);
        let compiled = compile(&query, &shard).unwrap();
        assert!(matches!(compiled, MatchNode::AndLine(_, _)));
    }

    #[test]
    fn and_with_file_name_sibling_stays_plain_and() {
        let shard = demo_shard();
        let query = Query::And(vec![
            Query::substring("connect"),
            Query::Substring {
                pattern: "a.txt".to_string(),
                case_sensitive: false,
                file_name: true,
                content: false,
            },
        ]);
        let compiled = compile(&query, &shard).unwrap();
        assert!(matches!(compiled, MatchNode::And(_, _)));
    }

    #[test]
    fn hir_alternation_becomes_approx_alternate() {
        let hir = ParserBuilder::new()
            .case_insensitive(false)
            .build()
            .parse("cathedral|bazaar")
            .unwrap();
        let approx = hir_to_approx(&hir);
        assert!(matches!(approx, RegexApprox::Alternate(ref children) if children.len() == 2));
    }

    #[test]
    fn alternation_regex_does_not_false_negative_on_either_branch() {
        // A document containing only the second alternative must still be
        // found: the over-approximation must be an OR of both literals, not
        // a single-literal AND-only prefilter.
        let mut builder = ShardBuilder::new("demo/repo", vec!["HEAD".to_string()]);
        builder.add_document(InputDocument::new("only_bazaar.txt", *b"the bazaar is open", 1));
        builder.add_document(InputDocument::new("neither.txt", *b"nothing relevant here", 1));
        let shard = Shard::open_bytes(builder.build()).unwrap();

        let query = Query::Regexp {
            regexp: "cathedral|bazaar".to_string(),
            file_name: false,
            case_sensitive: false,
        };
        let result = crate::search::search(&shard, query, &crate::search::SearchOptions::default(), None).unwrap();
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].file_name, "only_bazaar.txt");
    }

    #[test]
    fn symbol_over_regex_is_a_hard_error() {
        let shard = demo_shard();
        let query = Query::Symbol(Box::new(Query::Regexp {
            regexp: "data.*".to_string(),
            file_name: false,
            case_sensitive: false,
        }));
        let err = compile(&query, &shard).unwrap_err();
        assert!(matches!(err, SorexError::UnsupportedQueryShape(_)));
    }

    #[test]
    fn symbol_over_substring_compiles_fine() {
        let shard = demo_shard();
        let query = Query::Symbol(Box::new(Query::substring("connect")));
        assert!(compile(&query, &shard).is_ok());
    }
}
