//! Outcome statistics over arbitrary match bitmaps.
//!
//! Placement is lower-is-better: 1 is a win, 8 is last. An empty population
//! has no average; `avg_placement` is `None` (JSON `null`), never NaN, so
//! downstream sorting can't be corrupted by a division by zero.

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::index::MatchIndex;
use crate::token::Token;

/// Aggregate outcome statistics for one population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeStats {
    pub n: u64,
    pub avg_placement: Option<f64>,
    pub win_rate: f64,
    pub top4_rate: f64,
    pub eighth_rate: f64,
    /// `placement_hist[k]` counts members with placement `k + 1`.
    pub placement_hist: [u64; 8],
}

impl OutcomeStats {
    pub fn empty() -> Self {
        Self {
            n: 0,
            avg_placement: None,
            win_rate: 0.0,
            top4_rate: 0.0,
            eighth_rate: 0.0,
            placement_hist: [0; 8],
        }
    }
}

/// One pass over the set bits with a parallel gather from the placement
/// column. This runs per request on ad-hoc bitmaps, so it stays a tight
/// bit-scan with no allocation beyond the output struct.
pub fn stats_for(index: &MatchIndex, bitmap: &RoaringBitmap) -> OutcomeStats {
    let mut hist = [0u64; 8];
    let placements = index.placements();
    for position in bitmap.iter() {
        // Positions outside the placement column can only come from a foreign
        // bitmap; the resolver never produces one.
        if let Some(&p) = placements.get(position as usize) {
            hist[usize::from(p) - 1] += 1;
        }
    }

    let n: u64 = hist.iter().sum();
    if n == 0 {
        return OutcomeStats::empty();
    }

    let sum: u64 = hist
        .iter()
        .enumerate()
        .map(|(k, &count)| (k as u64 + 1) * count)
        .sum();
    let top4: u64 = hist[..4].iter().sum();

    OutcomeStats {
        n,
        avg_placement: Some(sum as f64 / n as f64),
        win_rate: hist[0] as f64 / n as f64,
        top4_rate: top4 as f64 / n as f64,
        eighth_rate: hist[7] as f64 / n as f64,
        placement_hist: hist,
    }
}

/// Count and placement sum for a bitmap, without building the histogram.
/// The graph builder calls this once per surviving candidate.
pub fn sum_and_count(index: &MatchIndex, bitmap: &RoaringBitmap) -> (u64, u64) {
    let placements = index.placements();
    let mut sum = 0u64;
    let mut count = 0u64;
    for position in bitmap.iter() {
        if let Some(&p) = placements.get(position as usize) {
            sum += u64::from(p);
            count += 1;
        }
    }
    (sum, count)
}

/// O(1) average placement for a single catalog token, served from the cached
/// aggregates without touching the bitmap.
pub fn avg_for_token(index: &MatchIndex, token: &Token) -> Option<f64> {
    let record = index.record(token)?;
    if record.count == 0 {
        return None;
    }
    Some(record.placement_sum as f64 / record.count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexBuilder;
    use approx::assert_relative_eq;

    fn fixture() -> MatchIndex {
        let mut b = IndexBuilder::new();
        let ahri = vec![Token::parse("U:ahri").unwrap()];
        for placement in [1, 1, 4, 5, 8] {
            b.push_match(placement, &ahri);
        }
        b.build()
    }

    #[test]
    fn aggregates_whole_population() {
        let index = fixture();
        let stats = stats_for(&index, &index.universe());

        assert_eq!(stats.n, 5);
        assert_relative_eq!(stats.avg_placement.unwrap(), 19.0 / 5.0);
        assert_relative_eq!(stats.win_rate, 2.0 / 5.0);
        assert_relative_eq!(stats.top4_rate, 3.0 / 5.0);
        assert_relative_eq!(stats.eighth_rate, 1.0 / 5.0);
        assert_eq!(stats.placement_hist, [2, 0, 0, 1, 1, 0, 0, 1]);
    }

    #[test]
    fn histogram_sums_to_n() {
        let index = fixture();
        let stats = stats_for(&index, &index.universe());
        assert_eq!(stats.placement_hist.iter().sum::<u64>(), stats.n);
    }

    #[test]
    fn empty_population_is_a_sentinel_not_nan() {
        let index = fixture();
        let stats = stats_for(&index, &RoaringBitmap::new());
        assert_eq!(stats, OutcomeStats::empty());
        assert!(stats.avg_placement.is_none());
    }

    #[test]
    fn cached_token_average_matches_scan() {
        let index = fixture();
        let ahri = Token::parse("U:ahri").unwrap();
        let fast = avg_for_token(&index, &ahri).unwrap();
        let slow = stats_for(&index, index.bitmap(&ahri).unwrap())
            .avg_placement
            .unwrap();
        assert_relative_eq!(fast, slow);
    }

    #[test]
    fn unknown_token_has_no_average() {
        let index = fixture();
        assert!(avg_for_token(&index, &Token::parse("U:garen").unwrap()).is_none());
    }
}
