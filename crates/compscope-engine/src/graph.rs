//! Graph builder: per-request scan of the full catalog scoring each token's
//! marginal effect on outcome against the base population.
//!
//! For every candidate token `T` (matching the active kind/item filters and
//! not already in the filter), compute `base ∩ bitmap(T)`; below the sample
//! floor the candidate is too noisy and is silently dropped, otherwise it is
//! ranked by `delta = avg_with − avg_base` (placement is lower-is-better, so
//! `delta ≤ 0` is an improvement).
//!
//! The catalog runs into the thousands of tokens, so the scan is
//! data-parallel over the catalog with a deterministic sort afterwards.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::filter::ResolvedFilter;
use crate::index::MatchIndex;
use crate::stats::sum_and_count;
use crate::token::{ItemClass, Token, TokenKind};

/// Default candidate sample floor: intersections smaller than this are
/// sampling noise, not signal.
pub const DEFAULT_MIN_SAMPLE: u64 = 30;
pub const DEFAULT_TOP_K: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Largest `|delta|` first, helpful or harmful.
    Impact,
    /// Only improvements (`delta <= 0`), best first.
    Helpful,
    /// Only regressions (`delta > 0`), worst first.
    Harmful,
}

#[derive(Debug, Clone)]
pub struct GraphOptions {
    pub top_k: usize,
    pub sort_mode: SortMode,
    /// Candidate kinds to consider; empty means all kinds.
    pub active_kinds: Vec<TokenKind>,
    /// Item subtype filter; empty means all classes. Applies to `Item` and
    /// `Equipped` candidates only.
    pub item_classes: Vec<ItemClass>,
    /// Item-family prefix filter on the canonical item name.
    pub item_prefix: Option<String>,
    pub min_sample: u64,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            sort_mode: SortMode::Impact,
            active_kinds: Vec::new(),
            item_classes: Vec::new(),
            item_prefix: None,
            min_sample: DEFAULT_MIN_SAMPLE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub token: String,
    pub label: String,
    pub kind: TokenKind,
    pub is_center: bool,
    pub n: u64,
    pub avg_placement: Option<f64>,
}

/// How a candidate relates to the base: `Equipped` tokens are pairings, the
/// rest are plain co-occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Equipped,
    Cooccur,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub token: String,
    pub delta: f64,
    pub avg_with: f64,
    pub avg_base: f64,
    pub n_with: u64,
    pub n_base: u64,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

struct Candidate {
    token: Token,
    delta: f64,
    avg_with: f64,
    n_with: u64,
}

fn candidate_matches(token: &Token, options: &GraphOptions) -> bool {
    if !options.active_kinds.is_empty() && !options.active_kinds.contains(&token.kind()) {
        return false;
    }
    if !options.item_classes.is_empty() {
        match token.item_class() {
            Some(class) if options.item_classes.contains(&class) => {}
            _ => return false,
        }
    }
    if let Some(prefix) = &options.item_prefix {
        match token.item_name() {
            Some(name) if name.starts_with(prefix.as_str()) => {}
            _ => return false,
        }
    }
    true
}

/// Build the relationship graph for a resolved base population.
pub fn build_graph(index: &MatchIndex, filter: &ResolvedFilter, options: &GraphOptions) -> Graph {
    let base = &filter.bitmap;
    let (base_sum, base_n) = sum_and_count(index, base);
    let avg_base = if base_n > 0 {
        Some(base_sum as f64 / base_n as f64)
    } else {
        None
    };

    let mut nodes: Vec<GraphNode> = filter
        .positive
        .iter()
        .chain(filter.negative.iter())
        .map(|token| {
            let record = index.record(token);
            GraphNode {
                token: token.to_string(),
                label: token.label(),
                kind: token.kind(),
                is_center: true,
                n: record.map(|r| r.count).unwrap_or(0),
                avg_placement: crate::stats::avg_for_token(index, token),
            }
        })
        .collect();

    let Some(avg_base) = avg_base else {
        // Empty base: nothing to rank against.
        return Graph {
            nodes,
            edges: Vec::new(),
        };
    };

    let catalog: Vec<(&Token, &crate::index::TokenRecord)> = index.catalog().collect();
    let mut candidates: Vec<Candidate> = catalog
        .into_par_iter()
        .filter_map(|(token, record)| {
            if record.count < options.min_sample
                || !candidate_matches(token, options)
                || filter.contains(token)
            {
                return None;
            }
            let with = base & &record.bitmap;
            let (sum, n_with) = sum_and_count(index, &with);
            if n_with < options.min_sample {
                return None;
            }
            let avg_with = sum as f64 / n_with as f64;
            Some(Candidate {
                token: token.clone(),
                delta: avg_with - avg_base,
                avg_with,
                n_with,
            })
        })
        .collect();

    match options.sort_mode {
        SortMode::Impact => {
            candidates.sort_by(|a, b| {
                b.delta
                    .abs()
                    .partial_cmp(&a.delta.abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.token.cmp(&b.token))
            });
        }
        SortMode::Helpful => {
            candidates.retain(|c| c.delta <= 0.0);
            candidates.sort_by(|a, b| {
                a.delta
                    .partial_cmp(&b.delta)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.token.cmp(&b.token))
            });
        }
        SortMode::Harmful => {
            candidates.retain(|c| c.delta > 0.0);
            candidates.sort_by(|a, b| {
                b.delta
                    .partial_cmp(&a.delta)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.token.cmp(&b.token))
            });
        }
    }
    candidates.truncate(options.top_k);

    let mut edges = Vec::with_capacity(candidates.len());
    for c in candidates {
        let kind = match c.token.kind() {
            TokenKind::Equipped => EdgeKind::Equipped,
            _ => EdgeKind::Cooccur,
        };
        nodes.push(GraphNode {
            token: c.token.to_string(),
            label: c.token.label(),
            kind: c.token.kind(),
            is_center: false,
            n: c.n_with,
            avg_placement: Some(c.avg_with),
        });
        edges.push(GraphEdge {
            token: c.token.to_string(),
            delta: c.delta,
            avg_with: c.avg_with,
            avg_base,
            n_with: c.n_with,
            n_base: base_n,
            kind,
        });
    }

    Graph { nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::resolve_filter;
    use crate::index::{IndexBuilder, MatchIndex};
    use approx::assert_relative_eq;

    fn toks(specs: &[&str]) -> Vec<Token> {
        specs.iter().map(|s| Token::parse(s).unwrap()).collect()
    }

    /// 40 ahri matches: 20 with deathcap (placements 1..=2 alternating, good),
    /// 20 with bfsword (placements 7..=8 alternating, bad).
    fn fixture() -> MatchIndex {
        let mut b = IndexBuilder::new();
        for i in 0..20 {
            b.push_match(1 + (i % 2) as u8, &toks(&["U:ahri:2", "I:deathcap"]));
        }
        for i in 0..20 {
            b.push_match(7 + (i % 2) as u8, &toks(&["U:ahri:2", "I:bfsword"]));
        }
        b.build()
    }

    fn options(min_sample: u64) -> GraphOptions {
        GraphOptions {
            min_sample,
            ..GraphOptions::default()
        }
    }

    #[test]
    fn center_tokens_are_excluded_from_candidates() {
        let index = fixture();
        let filter = resolve_filter(&index, "U:ahri");
        let graph = build_graph(&index, &filter, &options(10));

        assert!(graph.nodes.iter().any(|n| n.is_center && n.token == "U:ahri"));
        // Neither the base token nor its star variant may reappear as an edge.
        assert!(!graph.edges.iter().any(|e| e.token.starts_with("U:ahri")));
    }

    #[test]
    fn deltas_have_the_right_sign() {
        let index = fixture();
        let filter = resolve_filter(&index, "U:ahri");
        let graph = build_graph(&index, &filter, &options(10));

        let cap = graph.edges.iter().find(|e| e.token == "I:deathcap").unwrap();
        let sword = graph.edges.iter().find(|e| e.token == "I:bfsword").unwrap();
        assert!(cap.delta < 0.0, "deathcap improves placement");
        assert!(sword.delta > 0.0, "bfsword worsens placement");
        assert_relative_eq!(cap.avg_base, 4.5);
        assert_eq!(cap.n_base, 40);
        assert_eq!(cap.kind, EdgeKind::Cooccur);
    }

    #[test]
    fn helpful_and_harmful_restrict_by_sign() {
        let index = fixture();
        let filter = resolve_filter(&index, "U:ahri");

        let mut opts = options(10);
        opts.sort_mode = SortMode::Helpful;
        let helpful = build_graph(&index, &filter, &opts);
        assert!(helpful.edges.iter().all(|e| e.delta <= 0.0));

        opts.sort_mode = SortMode::Harmful;
        let harmful = build_graph(&index, &filter, &opts);
        assert!(harmful.edges.iter().all(|e| e.delta > 0.0));
    }

    #[test]
    fn top_k_truncates_by_impact() {
        let index = fixture();
        let filter = resolve_filter(&index, "");
        let mut opts = options(10);
        opts.top_k = 2;
        let graph = build_graph(&index, &filter, &opts);
        assert!(graph.edges.len() <= 2);
        // Edges come back ordered by |delta| descending.
        for pair in graph.edges.windows(2) {
            assert!(pair[0].delta.abs() >= pair[1].delta.abs());
        }
    }

    #[test]
    fn min_sample_floor_drops_noisy_candidates() {
        let index = fixture();
        let filter = resolve_filter(&index, "");
        let graph = build_graph(&index, &filter, &options(1000));
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn kind_filter_limits_candidates() {
        let index = fixture();
        let filter = resolve_filter(&index, "");
        let mut opts = options(10);
        opts.active_kinds = vec![TokenKind::Item];
        let graph = build_graph(&index, &filter, &opts);
        assert!(!graph.edges.is_empty());
        assert!(graph
            .edges
            .iter()
            .all(|e| e.token.starts_with("I:")));
    }

    #[test]
    fn item_class_filter_limits_candidates() {
        let index = fixture();
        let filter = resolve_filter(&index, "");
        let mut opts = options(10);
        opts.item_classes = vec![ItemClass::Component];
        let graph = build_graph(&index, &filter, &opts);
        // Only bfsword is a component in the fixture.
        assert!(graph.edges.iter().all(|e| e.token == "I:bfsword"));
        assert!(!graph.edges.is_empty());
    }

    #[test]
    fn empty_base_yields_centers_only() {
        let index = fixture();
        let filter = resolve_filter(&index, "U:nobody");
        let graph = build_graph(&index, &filter, &options(10));
        assert!(graph.edges.is_empty());
        assert!(graph.nodes.iter().all(|n| n.is_center));
    }

    #[test]
    fn edge_averages_match_brute_force() {
        let index = fixture();
        let filter = resolve_filter(&index, "U:ahri");
        let graph = build_graph(&index, &filter, &options(10));

        for edge in &graph.edges {
            let token = Token::parse(&edge.token).unwrap();
            let with = &filter.bitmap & index.bitmap(&token).unwrap();
            let sum: u64 = with
                .iter()
                .map(|i| u64::from(index.placement(i).unwrap()))
                .sum();
            assert_relative_eq!(
                edge.avg_with,
                sum as f64 / with.len() as f64,
                epsilon = 1e-9
            );
            assert_eq!(edge.n_with, with.len());
        }
    }
}
