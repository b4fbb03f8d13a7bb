//! Playbook analyzer: within one cluster, which tokens drive wins and which
//! cause eighths, plus a resolved "comp view" of dominant trait tiers and
//! best item holders.
//!
//! Drivers and killers come from a with/without split: for each candidate
//! token present in enough of the cluster, compare win rate and eighth rate
//! between members that have the token and members that don't. Both sides
//! of the split must clear the sample floor, otherwise the row is sampling
//! noise and is silently dropped.

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::index::MatchIndex;
use crate::stats::{stats_for, OutcomeStats};
use crate::token::Token;

pub const DEFAULT_MIN_PRESENCE: f64 = 0.10;
pub const DEFAULT_MIN_SAMPLE: u64 = 20;
pub const DEFAULT_NOISE_THRESHOLD: f64 = 0.02;
pub const DEFAULT_MAX_ROWS: usize = 8;
pub const DEFAULT_TRAIT_SHARE: f64 = 0.35;
pub const DEFAULT_MIN_POPULATION: u64 = 50;
const TRAIT_PILL_LIMIT: usize = 8;

#[derive(Debug, Clone)]
pub struct PlaybookOptions {
    /// A candidate must appear in at least this share of the cluster.
    pub min_presence: f64,
    /// Both sides of the with/without split must have this many members.
    pub min_sample: u64,
    /// Combined rate movement (`delta_win − delta_eighth`) below this is
    /// indistinguishable from noise and produces no row.
    pub noise_threshold: f64,
    pub max_rows: usize,
    /// Share of the cluster a trait tier needs before its pill is shown.
    pub trait_share: f64,
    /// Below this population size the analyzer warns instead of ranking.
    pub min_population: u64,
}

impl Default for PlaybookOptions {
    fn default() -> Self {
        Self {
            min_presence: DEFAULT_MIN_PRESENCE,
            min_sample: DEFAULT_MIN_SAMPLE,
            noise_threshold: DEFAULT_NOISE_THRESHOLD,
            max_rows: DEFAULT_MAX_ROWS,
            trait_share: DEFAULT_TRAIT_SHARE,
            min_population: DEFAULT_MIN_POPULATION,
        }
    }
}

/// One driver or killer row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookRow {
    pub token: String,
    pub label: String,
    pub pct_in_cluster: f64,
    pub n_with: u64,
    pub delta_win: f64,
    pub delta_eighth: f64,
    /// `delta_win − delta_eighth`; positive helps, negative hurts.
    pub score: f64,
}

/// Dominant trait pill: the highest tier actually achieved by a meaningful
/// share of the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraitPill {
    pub token: String,
    pub label: String,
    pub tier: u8,
    pub share: f64,
}

/// Suggested equip target: the unit most frequently holding an item among
/// winning cluster members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemHolder {
    pub item: String,
    pub unit: String,
    pub label: String,
    pub share: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompView {
    pub traits: Vec<TraitPill>,
    pub items: Vec<ItemHolder>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    pub drivers: Vec<PlaybookRow>,
    pub killers: Vec<PlaybookRow>,
    pub comp_view: CompView,
    pub base: OutcomeStats,
    pub warning: Option<String>,
}

fn rate_delta(with: &OutcomeStats, without: &OutcomeStats) -> (f64, f64) {
    (
        with.win_rate - without.win_rate,
        with.eighth_rate - without.eighth_rate,
    )
}

/// Analyze one cluster (or ad-hoc) population.
pub fn build_playbook(
    index: &MatchIndex,
    cluster: &RoaringBitmap,
    options: &PlaybookOptions,
) -> Playbook {
    let base = stats_for(index, cluster);

    if base.n < options.min_population {
        let warning = format!(
            "population too small for stable estimates ({} matches, need at least {})",
            base.n, options.min_population
        );
        return Playbook {
            drivers: Vec::new(),
            killers: Vec::new(),
            comp_view: CompView::default(),
            base,
            warning: Some(warning),
        };
    }

    let cluster_n = base.n as f64;
    let mut drivers = Vec::new();
    let mut killers = Vec::new();

    let mut catalog: Vec<(&Token, &crate::index::TokenRecord)> = index.catalog().collect();
    catalog.sort_by(|a, b| a.0.cmp(b.0));

    for (token, record) in catalog {
        // Base variants only; qualifier variants would duplicate every row.
        if *token != token.base() {
            continue;
        }
        let with_bm = cluster & &record.bitmap;
        let n_with = with_bm.len();
        if (n_with as f64 / cluster_n) < options.min_presence {
            continue;
        }
        let without_bm = cluster - &with_bm;
        if n_with < options.min_sample || without_bm.len() < options.min_sample {
            continue;
        }

        let with_stats = stats_for(index, &with_bm);
        let without_stats = stats_for(index, &without_bm);
        let (delta_win, delta_eighth) = rate_delta(&with_stats, &without_stats);
        let score = delta_win - delta_eighth;

        let row = PlaybookRow {
            token: token.to_string(),
            label: token.label(),
            pct_in_cluster: n_with as f64 / cluster_n,
            n_with,
            delta_win,
            delta_eighth,
            score,
        };

        if score > options.noise_threshold {
            drivers.push(row);
        } else if score < -options.noise_threshold {
            killers.push(row);
        }
    }

    drivers.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.token.cmp(&b.token))
    });
    killers.sort_by(|a, b| {
        a.score
            .partial_cmp(&b.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.token.cmp(&b.token))
    });
    drivers.truncate(options.max_rows);
    killers.truncate(options.max_rows);

    Playbook {
        comp_view: comp_view(index, cluster, options),
        drivers,
        killers,
        base,
        warning: None,
    }
}

/// Resolve the cluster's dominant trait tiers and best item holders.
fn comp_view(index: &MatchIndex, cluster: &RoaringBitmap, options: &PlaybookOptions) -> CompView {
    let cluster_n = cluster.len() as f64;
    if cluster_n == 0.0 {
        return CompView::default();
    }

    // Traits: per trait name, the single highest tier achieved by at least
    // `trait_share` of the cluster. "Present at any tier" is not enough.
    let mut best_tier: HashMap<&str, (u8, f64)> = HashMap::new();
    for (token, record) in index.catalog() {
        let Token::Trait {
            name,
            tier: Some(tier),
        } = token
        else {
            continue;
        };
        let share = (cluster & &record.bitmap).len() as f64 / cluster_n;
        if share < options.trait_share {
            continue;
        }
        match best_tier.get(name.as_str()) {
            Some((t, _)) if *t >= *tier => {}
            _ => {
                best_tier.insert(name, (*tier, share));
            }
        }
    }
    let mut traits: Vec<TraitPill> = best_tier
        .into_iter()
        .map(|(name, (tier, share))| {
            let token = Token::Trait {
                name: name.to_string(),
                tier: Some(tier),
            };
            TraitPill {
                label: token.label(),
                token: token.to_string(),
                tier,
                share,
            }
        })
        .collect();
    traits.sort_by(|a, b| {
        b.share
            .partial_cmp(&a.share)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.token.cmp(&b.token))
    });
    traits.truncate(TRAIT_PILL_LIMIT);

    // Items: per held item, the unit most frequently holding it among the
    // winners. Fall back to all members when the cluster has no wins yet.
    let winners: RoaringBitmap = cluster
        .iter()
        .filter(|&i| index.placement(i) == Some(1))
        .collect();
    let scope = if winners.is_empty() { cluster } else { &winners };

    // item name -> (best unit, holder count)
    let mut best_holder: HashMap<&str, (&str, u64)> = HashMap::new();
    let mut item_presence: HashMap<&str, u64> = HashMap::new();
    for (token, record) in index.catalog() {
        match token {
            Token::Item { name } => {
                let n = (cluster & &record.bitmap).len();
                if n > 0 {
                    item_presence.insert(name, n);
                }
            }
            Token::Equipped {
                unit,
                item,
                copies: None,
            } => {
                let held = (scope & &record.bitmap).len();
                if held == 0 {
                    continue;
                }
                match best_holder.get(item.as_str()) {
                    Some((u, n)) if *n > held || (*n == held && *u <= unit.as_str()) => {}
                    _ => {
                        best_holder.insert(item, (unit, held));
                    }
                }
            }
            _ => {}
        }
    }

    let presence_floor = (cluster_n * options.min_presence).ceil() as u64;
    let mut items: Vec<ItemHolder> = best_holder
        .into_iter()
        .filter(|(item, _)| {
            item_presence
                .get(*item)
                .map(|&n| n >= presence_floor.max(1))
                .unwrap_or(false)
        })
        .map(|(item, (unit, held))| {
            let token = Token::Equipped {
                unit: unit.to_string(),
                item: item.to_string(),
                copies: None,
            };
            ItemHolder {
                item: format!("I:{item}"),
                unit: format!("U:{unit}"),
                label: token.label(),
                share: held as f64 / scope.len() as f64,
            }
        })
        .collect();
    items.sort_by(|a, b| {
        b.share
            .partial_cmp(&a.share)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.item.cmp(&b.item))
    });

    CompView { traits, items }
}
