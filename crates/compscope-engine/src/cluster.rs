//! Cluster engine: greedy signature clustering of a base population into
//! representative sub-archetypes.
//!
//! The algorithm works over **base unit tokens** (star levels stripped):
//!
//! 1. among not-yet-assigned members, seed with the most frequent unit that
//!    clears the minimum remaining-share floor;
//! 2. grow the signature by repeatedly adding the unit with the highest
//!    conditional frequency inside the candidate bitmap, while it stays
//!    above the co-occurrence floor and the signature is short;
//! 3. the cluster is the remaining pool intersected with every signature
//!    bitmap; its members leave the pool and the loop repeats.
//!
//! Ties between equally frequent units break lexicographically on the
//! canonical token string, so clustering a fixed filter is a pure function.
//! Leftover members form an implicit "other" bucket that is never returned:
//! reported clusters are pairwise disjoint and their union is a subset of
//! the base population.

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::index::MatchIndex;
use crate::stats::{stats_for, OutcomeStats};
use crate::token::{Token, TokenKind};

pub const DEFAULT_MAX_CLUSTERS: usize = 8;
pub const MAX_CLUSTERS_CAP: usize = 12;
pub const DEFAULT_MIN_SHARE: f64 = 0.08;
pub const DEFAULT_MIN_CLUSTER_SIZE: u64 = 30;
pub const DEFAULT_COOCCUR_SHARE: f64 = 0.60;
pub const DEFAULT_MAX_SIGNATURE: usize = 4;
pub const DEFAULT_PREVIEW_LIMIT: usize = 12;

#[derive(Debug, Clone)]
pub struct ClusterOptions {
    pub max_clusters: usize,
    /// Seed floor: a signature must cover this share of the remaining pool.
    pub min_share: f64,
    pub min_cluster_size: u64,
    /// Conditional co-occurrence floor for growing a signature.
    pub cooccur_share: f64,
    pub max_signature: usize,
    /// Row cap for the top_units/top_traits/top_items previews.
    pub preview_limit: usize,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            max_clusters: DEFAULT_MAX_CLUSTERS,
            min_share: DEFAULT_MIN_SHARE,
            min_cluster_size: DEFAULT_MIN_CLUSTER_SIZE,
            cooccur_share: DEFAULT_COOCCUR_SHARE,
            max_signature: DEFAULT_MAX_SIGNATURE,
            preview_limit: DEFAULT_PREVIEW_LIMIT,
        }
    }
}

/// One ranked entity inside a cluster, with its prevalence lift vs the base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiftRow {
    pub token: String,
    pub label: String,
    pub pct_in_cluster: f64,
    pub base_pct: f64,
    /// `pct_in_cluster / base_pct`; `base_pct` is never zero for a token
    /// that appears in the cluster, since the cluster is a subset of base.
    pub lift: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: usize,
    pub size: u64,
    /// `size / base_n`.
    pub share: f64,
    pub stats: OutcomeStats,
    /// `avg_placement − base avg_placement`; negative is better than base.
    pub delta_vs_base: Option<f64>,
    pub signature_tokens: Vec<String>,
    pub defining_units: Vec<LiftRow>,
    pub top_units: Vec<LiftRow>,
    pub top_traits: Vec<LiftRow>,
    pub top_items: Vec<LiftRow>,
    #[serde(skip)]
    pub bitmap: RoaringBitmap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterResponse {
    pub clusters: Vec<Cluster>,
    pub warning: Option<String>,
}

/// Frequency of every base-unit token within `pool`, as (token, bitmap-of-
/// pool-members). Only units are eligible signature material.
fn unit_frequencies<'a>(
    index: &'a MatchIndex,
    pool: &RoaringBitmap,
) -> Vec<(&'a Token, RoaringBitmap)> {
    let mut rows: Vec<(&Token, RoaringBitmap)> = index
        .catalog()
        .filter_map(|(token, record)| {
            if !matches!(token, Token::Unit { stars: None, .. }) {
                return None;
            }
            let members = pool & &record.bitmap;
            if members.is_empty() {
                None
            } else {
                Some((token, members))
            }
        })
        .collect();
    // Deterministic scan order regardless of hash-map iteration.
    rows.sort_by(|a, b| a.0.cmp(b.0));
    rows
}

/// Pick the next signature unit: highest member count, lexicographic token
/// on ties, subject to the share floor. Returns the unit with its members.
fn best_unit<'a>(
    rows: &[(&'a Token, RoaringBitmap)],
    candidate: &RoaringBitmap,
    exclude: &[&Token],
    floor: u64,
) -> Option<(&'a Token, RoaringBitmap)> {
    let mut best: Option<(&Token, RoaringBitmap)> = None;
    for (token, members) in rows {
        if exclude.contains(token) {
            continue;
        }
        let members = candidate & members;
        let count = members.len();
        if count < floor {
            continue;
        }
        match &best {
            Some((_, b)) if b.len() >= count => {}
            _ => best = Some((*token, members)),
        }
    }
    best
}

fn lift_rows(
    index: &MatchIndex,
    cluster: &RoaringBitmap,
    base: &RoaringBitmap,
    kind: TokenKind,
    presence_floor: f64,
    limit: usize,
) -> Vec<LiftRow> {
    let cluster_n = cluster.len() as f64;
    let base_n = base.len() as f64;
    if cluster_n == 0.0 || base_n == 0.0 {
        return Vec::new();
    }

    let mut rows: Vec<LiftRow> = index
        .catalog()
        .filter_map(|(token, record)| {
            if token.kind() != kind || *token != token.base() {
                return None;
            }
            let in_cluster = (cluster & &record.bitmap).len() as f64 / cluster_n;
            if in_cluster < presence_floor {
                return None;
            }
            let in_base = (base & &record.bitmap).len() as f64 / base_n;
            if in_base == 0.0 {
                return None;
            }
            Some(LiftRow {
                token: token.to_string(),
                label: token.label(),
                pct_in_cluster: in_cluster,
                base_pct: in_base,
                lift: in_cluster / in_base,
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        b.lift
            .partial_cmp(&a.lift)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.token.cmp(&b.token))
    });
    rows.truncate(limit);
    rows
}

/// Partition a base population into archetypes.
pub fn build_clusters(
    index: &MatchIndex,
    base: &RoaringBitmap,
    options: &ClusterOptions,
) -> ClusterResponse {
    let base_n = base.len();
    if base_n < options.min_cluster_size {
        return ClusterResponse {
            clusters: Vec::new(),
            warning: Some(format!(
                "population too small to cluster ({base_n} matches, need at least {})",
                options.min_cluster_size
            )),
        };
    }

    let base_stats = stats_for(index, base);
    let max_clusters = options.max_clusters.min(MAX_CLUSTERS_CAP);

    let mut clusters = Vec::new();
    let mut remaining = base.clone();

    while clusters.len() < max_clusters {
        let rows = unit_frequencies(index, &remaining);
        let seed_floor =
            ((remaining.len() as f64 * options.min_share).ceil() as u64).max(options.min_cluster_size);

        let Some((seed, seed_members)) = best_unit(&rows, &remaining, &[], seed_floor) else {
            break;
        };

        let mut signature = vec![seed];
        let mut candidate = seed_members;

        while signature.len() < options.max_signature {
            let grow_floor = ((candidate.len() as f64 * options.cooccur_share).ceil() as u64)
                .max(options.min_cluster_size);
            let Some((unit, members)) = best_unit(&rows, &candidate, &signature, grow_floor)
            else {
                break;
            };
            signature.push(unit);
            candidate = members;
        }

        if candidate.len() < options.min_cluster_size {
            break;
        }

        let stats = stats_for(index, &candidate);
        let delta_vs_base = match (stats.avg_placement, base_stats.avg_placement) {
            (Some(c), Some(b)) => Some(c - b),
            _ => None,
        };

        let mut signature_tokens: Vec<String> =
            signature.iter().map(|t| t.to_string()).collect();
        signature_tokens.sort();

        let top_units = lift_rows(index, &candidate, base, TokenKind::Unit, 0.25, options.preview_limit);
        let defining_units = top_units
            .iter()
            .filter(|row| row.pct_in_cluster >= 0.50)
            .cloned()
            .collect();

        remaining -= &candidate;
        clusters.push(Cluster {
            id: clusters.len(),
            size: candidate.len(),
            share: candidate.len() as f64 / base_n as f64,
            stats,
            delta_vs_base,
            signature_tokens,
            defining_units,
            top_units,
            top_traits: lift_rows(
                index,
                &candidate,
                base,
                TokenKind::Trait,
                0.20,
                options.preview_limit,
            ),
            top_items: lift_rows(
                index,
                &candidate,
                base,
                TokenKind::Item,
                0.20,
                options.preview_limit,
            ),
            bitmap: candidate,
        });
    }

    ClusterResponse {
        clusters,
        warning: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::resolve_filter;
    use crate::index::IndexBuilder;

    fn toks(specs: &[&str]) -> Vec<Token> {
        specs.iter().map(|s| Token::parse(s).unwrap()).collect()
    }

    /// Two crisp archetypes plus background noise:
    /// - 60 "sorcerer" matches: ahri + lux + deathcap, good placements
    /// - 50 "bruiser" matches: garen + sett + bfsword, bad placements
    /// - 15 mixed leftovers that belong to neither
    fn fixture() -> MatchIndex {
        let mut b = IndexBuilder::new();
        for i in 0..60u8 {
            b.push_match(
                1 + (i % 3),
                &toks(&["U:ahri:2", "U:lux:2", "I:deathcap", "T:sorcerer:4"]),
            );
        }
        for i in 0..50u8 {
            b.push_match(
                5 + (i % 3),
                &toks(&["U:garen:2", "U:sett:2", "I:bfsword", "T:bruiser:2"]),
            );
        }
        for i in 0..15u8 {
            b.push_match(4 + (i % 2), &toks(&["U:zed:1"]));
        }
        b.build()
    }

    fn small_options() -> ClusterOptions {
        ClusterOptions {
            min_cluster_size: 20,
            ..ClusterOptions::default()
        }
    }

    #[test]
    fn finds_both_archetypes() {
        let index = fixture();
        let base = resolve_filter(&index, "").bitmap;
        let response = build_clusters(&index, &base, &small_options());

        assert!(response.warning.is_none());
        assert_eq!(response.clusters.len(), 2);

        let sorc = &response.clusters[0];
        assert_eq!(sorc.size, 60);
        assert!(sorc.signature_tokens.contains(&"U:ahri".to_string()));
        assert!(sorc.signature_tokens.contains(&"U:lux".to_string()));
        assert!(sorc.delta_vs_base.unwrap() < 0.0, "sorcerers beat the base");

        let bruiser = &response.clusters[1];
        assert_eq!(bruiser.size, 50);
        assert!(bruiser.signature_tokens.contains(&"U:garen".to_string()));
        assert!(bruiser.delta_vs_base.unwrap() > 0.0);
    }

    #[test]
    fn clusters_are_disjoint_and_contained() {
        let index = fixture();
        let base = resolve_filter(&index, "").bitmap;
        let response = build_clusters(&index, &base, &small_options());

        let mut union = RoaringBitmap::new();
        for cluster in &response.clusters {
            assert!((&union & &cluster.bitmap).is_empty(), "clusters overlap");
            union |= &cluster.bitmap;
        }
        assert!(union.is_subset(&base));
        // The zed leftovers form the implicit "other" bucket.
        assert!(union.len() < base.len());
    }

    #[test]
    fn lift_rows_rank_defining_entities() {
        let index = fixture();
        let base = resolve_filter(&index, "").bitmap;
        let response = build_clusters(&index, &base, &small_options());
        let sorc = &response.clusters[0];

        assert!(sorc
            .top_traits
            .iter()
            .any(|row| row.token == "T:sorcerer"));
        assert!(sorc.top_items.iter().any(|row| row.token == "I:deathcap"));
        for row in &sorc.top_units {
            assert!(row.lift >= 1.0, "cluster units should be enriched vs base");
            assert!(row.pct_in_cluster > 0.0 && row.base_pct > 0.0);
        }
        assert!(!sorc.defining_units.is_empty());
        for pair in sorc.top_units.windows(2) {
            assert!(pair[0].lift >= pair[1].lift);
        }
    }

    #[test]
    fn tiny_population_warns_instead_of_clustering() {
        let index = fixture();
        let base = resolve_filter(&index, "U:zed").bitmap;
        let response = build_clusters(&index, &base, &ClusterOptions::default());
        assert!(response.clusters.is_empty());
        assert!(response.warning.is_some());
    }

    #[test]
    fn clustering_is_deterministic() {
        let index = fixture();
        let base = resolve_filter(&index, "").bitmap;
        let a = build_clusters(&index, &base, &small_options());
        let b = build_clusters(&index, &base, &small_options());
        let sig = |r: &ClusterResponse| {
            r.clusters
                .iter()
                .map(|c| (c.signature_tokens.clone(), c.size))
                .collect::<Vec<_>>()
        };
        assert_eq!(sig(&a), sig(&b));
    }

    #[test]
    fn respects_max_cluster_count() {
        let index = fixture();
        let base = resolve_filter(&index, "").bitmap;
        let options = ClusterOptions {
            max_clusters: 1,
            min_cluster_size: 20,
            ..ClusterOptions::default()
        };
        let response = build_clusters(&index, &base, &options);
        assert_eq!(response.clusters.len(), 1);
    }
}
