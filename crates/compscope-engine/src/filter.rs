//! Filter resolution: signed token strings -> one base-population bitmap.
//!
//! Pure set algebra over the catalog:
//!
//! ```text
//! result = (AND over positive bitmaps) AND-NOT (OR over negative bitmaps)
//! ```
//!
//! With no positive tokens the intersection starts from the universe (all
//! indexed matches). Unknown or malformed tokens resolve to the **empty**
//! bitmap rather than an error, so an interactive caller typing a filter
//! character by character sees `n = 0` instead of failures.
//!
//! If the same base token appears with both signs, negation wins: the token
//! is dropped from the positive set and kept in the negative set, which
//! keeps the result deterministic and order-independent.

use roaring::RoaringBitmap;

use crate::index::MatchIndex;
use crate::token::{SignedToken, Token};

/// A resolved filter: the base population plus the parsed token sets. The
/// graph builder needs the sets to exclude already-filtered tokens from
/// candidacy.
#[derive(Debug, Clone)]
pub struct ResolvedFilter {
    pub bitmap: RoaringBitmap,
    pub positive: Vec<Token>,
    pub negative: Vec<Token>,
}

impl ResolvedFilter {
    /// Whether a candidate token (or its base) is already part of the filter.
    pub fn contains(&self, token: &Token) -> bool {
        let base = token.base();
        self.positive
            .iter()
            .chain(self.negative.iter())
            .any(|t| *t == *token || t.base() == base)
    }
}

/// Parse a comma-separated filter string into signed tokens, skipping blank
/// entries and malformed tokens (they contribute an empty bitmap via the
/// unknown-token path anyway, and the interactive caller gets `n = 0`).
pub fn parse_filter(filter: &str) -> Vec<SignedToken> {
    filter
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| match SignedToken::parse(entry) {
            Ok(signed) => signed,
            Err(err) => {
                tracing::debug!(%err, "malformed filter token");
                // A malformed entry behaves like a token no catalog entry can
                // match: positive empties the result, negative subtracts
                // nothing. The sign is preserved either way.
                let negated = matches!(entry.trim().chars().next(), Some('-') | Some('!'));
                SignedToken {
                    token: Token::Unit {
                        name: String::from("\u{0}invalid"),
                        stars: None,
                    },
                    negated,
                }
            }
        })
        .collect()
}

/// Resolve a filter string against the index.
pub fn resolve_filter(index: &MatchIndex, filter: &str) -> ResolvedFilter {
    let signed = parse_filter(filter);

    let mut positive: Vec<Token> = Vec::new();
    let mut negative: Vec<Token> = Vec::new();
    for st in signed {
        if st.negated {
            if !negative.contains(&st.token) {
                negative.push(st.token);
            }
        } else if !positive.contains(&st.token) {
            positive.push(st.token);
        }
    }
    // Contradictory signs: negation wins.
    positive.retain(|t| !negative.contains(t));

    let mut bitmap = index.universe();
    for token in &positive {
        match index.bitmap(token) {
            Some(bm) => bitmap &= bm,
            None => {
                bitmap.clear();
                break;
            }
        }
    }

    if !bitmap.is_empty() && !negative.is_empty() {
        let mut excluded = RoaringBitmap::new();
        for token in &negative {
            if let Some(bm) = index.bitmap(token) {
                excluded |= bm;
            }
        }
        bitmap -= &excluded;
    }

    ResolvedFilter {
        bitmap,
        positive,
        negative,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexBuilder;
    use proptest::prelude::*;

    fn toks(specs: &[&str]) -> Vec<Token> {
        specs.iter().map(|s| Token::parse(s).unwrap()).collect()
    }

    fn fixture() -> MatchIndex {
        let mut b = IndexBuilder::new();
        b.push_match(1, &toks(&["U:ahri:2", "I:deathcap", "T:sorcerer:4"]));
        b.push_match(2, &toks(&["U:ahri:2", "T:sorcerer:2"]));
        b.push_match(5, &toks(&["U:ahri:1", "I:deathcap"]));
        b.push_match(8, &toks(&["U:garen:2", "I:bfsword"]));
        b.push_match(3, &toks(&["U:garen:3", "I:deathcap", "T:bruiser:2"]));
        b.build()
    }

    #[test]
    fn empty_filter_is_the_universe() {
        let index = fixture();
        let resolved = resolve_filter(&index, "");
        assert_eq!(resolved.bitmap.len(), 5);
        assert!(resolved.positive.is_empty());
        assert!(resolved.negative.is_empty());
    }

    #[test]
    fn positive_tokens_intersect() {
        let index = fixture();
        let resolved = resolve_filter(&index, "U:ahri,I:deathcap");
        assert_eq!(
            resolved.bitmap.iter().collect::<Vec<_>>(),
            vec![0, 2]
        );
    }

    #[test]
    fn negative_tokens_subtract() {
        let index = fixture();
        let resolved = resolve_filter(&index, "U:ahri,-I:deathcap");
        assert_eq!(resolved.bitmap.iter().collect::<Vec<_>>(), vec![1]);

        // Equals (bitmap of ahri) minus (bitmap of deathcap).
        let ahri = index.bitmap(&Token::parse("U:ahri").unwrap()).unwrap();
        let cap = index.bitmap(&Token::parse("I:deathcap").unwrap()).unwrap();
        assert_eq!(resolved.bitmap, ahri.clone() - cap);
    }

    #[test]
    fn unknown_tokens_resolve_empty() {
        let index = fixture();
        assert!(resolve_filter(&index, "U:nobody").bitmap.is_empty());
        assert!(resolve_filter(&index, "garbage").bitmap.is_empty());
        // Negative unknown or malformed tokens subtract nothing.
        assert_eq!(resolve_filter(&index, "-U:nobody").bitmap.len(), 5);
        assert_eq!(resolve_filter(&index, "-garbage").bitmap.len(), 5);
    }

    #[test]
    fn negation_wins_over_contradiction() {
        let index = fixture();
        let a = resolve_filter(&index, "U:ahri,-U:ahri");
        let b = resolve_filter(&index, "-U:ahri,U:ahri");
        assert_eq!(a.bitmap, b.bitmap);
        assert_eq!(a.bitmap, resolve_filter(&index, "-U:ahri").bitmap);
        assert!(a.positive.is_empty());
    }

    #[test]
    fn monotonic_narrowing() {
        let index = fixture();
        let base = resolve_filter(&index, "U:ahri");
        let narrowed = resolve_filter(&index, "U:ahri,T:sorcerer");
        assert!(narrowed.bitmap.is_subset(&base.bitmap));
    }

    // Filter entries drawn from the fixture vocabulary plus junk, with both
    // signs, so permutations exercise real set algebra.
    fn filter_entry() -> impl Strategy<Value = String> {
        let token = prop::sample::select(vec![
            "U:ahri",
            "U:ahri:2",
            "U:garen",
            "I:deathcap",
            "I:bfsword",
            "T:sorcerer",
            "T:bruiser:2",
            "U:nobody",
            "bogus",
        ]);
        (token, prop::bool::ANY).prop_map(|(t, neg)| {
            if neg {
                format!("-{t}")
            } else {
                t.to_string()
            }
        })
    }

    proptest! {
        #[test]
        fn order_independence(entries in prop::collection::vec(filter_entry(), 0..6)) {
            let index = fixture();
            let forward = entries.join(",");
            let mut reversed_entries = entries.clone();
            reversed_entries.reverse();
            let reversed = reversed_entries.join(",");
            prop_assert_eq!(
                resolve_filter(&index, &forward).bitmap,
                resolve_filter(&index, &reversed).bitmap
            );
        }

        #[test]
        fn adding_a_positive_token_never_grows(
            entries in prop::collection::vec(filter_entry(), 0..4),
            extra in filter_entry(),
        ) {
            let index = fixture();
            let base = resolve_filter(&index, &entries.join(","));
            let extra = extra
                .trim_start_matches(|c| c == '-' || c == '!')
                .to_string();
            let mut widened = entries.clone();
            widened.push(extra);
            let narrowed = resolve_filter(&index, &widened.join(","));
            prop_assert!(narrowed.bitmap.is_subset(&base.bitmap));
        }
    }
}
