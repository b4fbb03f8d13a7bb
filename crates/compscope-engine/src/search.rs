//! Search index builder: the flat token table consumed by client-side
//! typeahead.
//!
//! Ranking lives entirely in the client; the only server-side signal is the
//! token's indexed population size, which the table carries as `count`.

use serde::{Deserialize, Serialize};

use crate::index::MatchIndex;
use crate::token::TokenKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEntry {
    pub token: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub count: u64,
}

/// Emit one entry per catalog token, most popular first (token order breaks
/// ties so the table is stable across runs).
pub fn build_search_index(index: &MatchIndex) -> Vec<SearchEntry> {
    let mut entries: Vec<SearchEntry> = index
        .catalog()
        .map(|(token, record)| SearchEntry {
            token: token.to_string(),
            label: token.label(),
            kind: token.kind(),
            count: record.count,
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.token.cmp(&b.token)));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexBuilder;
    use crate::token::Token;

    #[test]
    fn entries_cover_the_catalog_sorted_by_count() {
        let mut b = IndexBuilder::new();
        let ahri = Token::parse("U:ahri:2").unwrap();
        let cap = Token::parse("I:deathcap").unwrap();
        b.push_match(1, &[ahri.clone(), cap.clone()]);
        b.push_match(3, &[ahri.clone()]);
        let index = b.build();

        let entries = build_search_index(&index);
        assert_eq!(entries.len(), index.catalog_len());
        for pair in entries.windows(2) {
            assert!(pair[0].count >= pair[1].count);
        }

        let base = entries.iter().find(|e| e.token == "U:ahri").unwrap();
        assert_eq!(base.count, 2);
        assert_eq!(base.kind, TokenKind::Unit);
        assert_eq!(base.label, "Ahri");
    }

    #[test]
    fn serializes_with_type_field() {
        let mut b = IndexBuilder::new();
        b.push_match(1, &[Token::parse("T:sorcerer").unwrap()]);
        let entries = build_search_index(&b.build());
        let json = serde_json::to_value(&entries[0]).unwrap();
        assert_eq!(json["type"], "trait");
        assert_eq!(json["count"], 1);
    }
}
