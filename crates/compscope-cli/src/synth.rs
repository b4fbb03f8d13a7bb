//! Synthetic match-index generators used by CLI tooling.
//!
//! Kept out of the engine crate so demo/perf tooling can evolve without
//! polluting the library API. Everything here is deterministic for a fixed
//! seed.

use anyhow::{anyhow, Result};
use compscope_engine::{IndexBuilder, MatchIndex, Token};

#[derive(Debug, Clone)]
pub(crate) struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    pub(crate) fn new(seed: u64) -> Self {
        // Avoid the degenerate all-zero state.
        let state = if seed == 0 { 0x9e3779b97f4a7c15 } else { seed };
        Self { state }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        // xorshift64* (simple, fast, deterministic).
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    pub(crate) fn gen_range(&mut self, upper: usize) -> usize {
        if upper == 0 {
            return 0;
        }
        (self.next_u64() % (upper as u64)) as usize
    }

    pub(crate) fn gen_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Build a synthetic index with a handful of latent archetypes so graph,
/// cluster, and playbook output all have structure to find.
///
/// Each archetype owns a slice of the unit/item/trait vocabulary and a
/// placement bias; matches sample mostly from their archetype's slice with
/// some cross-contamination.
pub(crate) fn build_synthetic_index(
    matches: usize,
    units: usize,
    items: usize,
    traits: usize,
    seed: u64,
) -> Result<MatchIndex> {
    if matches == 0 {
        return Err(anyhow!("--matches must be > 0"));
    }
    if units < 8 || items < 4 || traits < 2 {
        return Err(anyhow!("vocabulary too small: need >= 8 units, 4 items, 2 traits"));
    }

    let unit_names: Vec<String> = (0..units).map(|i| format!("unit{i}")).collect();
    let item_names: Vec<String> = (0..items).map(|i| format!("item{i}")).collect();
    let trait_names: Vec<String> = (0..traits).map(|i| format!("trait{i}")).collect();

    let archetypes = 4usize;
    let mut rng = XorShift64::new(seed);
    let mut builder = IndexBuilder::new();

    for _ in 0..matches {
        let arch = rng.gen_range(archetypes);
        let unit_pool = units / archetypes;
        let item_pool = items / archetypes;

        let mut tokens: Vec<Token> = Vec::new();

        // Core units of the archetype plus one or two strays.
        let core = 4 + rng.gen_range(2);
        for k in 0..core {
            let name = &unit_names[arch * unit_pool + (k % unit_pool)];
            let stars = 1 + rng.gen_range(3) as u8;
            tokens.push(Token::Unit {
                name: name.clone(),
                stars: Some(stars),
            });
        }
        let stray = &unit_names[rng.gen_range(units)];
        tokens.push(Token::Unit {
            name: stray.clone(),
            stars: Some(1),
        });

        for k in 0..2 + rng.gen_range(2) {
            let item = &item_names[arch * item_pool + (k % item_pool)];
            tokens.push(Token::Item { name: item.clone() });
            // Hang items on the archetype's lead unit half the time.
            if rng.gen_f64() < 0.5 {
                tokens.push(Token::Equipped {
                    unit: unit_names[arch * unit_pool].clone(),
                    item: item.clone(),
                    copies: None,
                });
            }
        }

        let tr = &trait_names[arch % traits];
        let tier = 2 + 2 * rng.gen_range(3) as u8;
        tokens.push(Token::Trait {
            name: tr.clone(),
            tier: Some(tier),
        });

        // Archetype 0 is strong, 3 is weak; noise on top.
        let bias = arch as f64 / (archetypes - 1) as f64;
        let placement = (1.0 + bias * 5.0 + rng.gen_f64() * 3.0).round() as u8;
        builder.push_match(placement.clamp(1, 8), &tokens);
    }

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_is_deterministic() {
        let a = build_synthetic_index(500, 16, 8, 4, 7).unwrap();
        let b = build_synthetic_index(500, 16, 8, 4, 7).unwrap();
        assert_eq!(a.len(), b.len());
        assert_eq!(a.catalog_len(), b.catalog_len());
        assert_eq!(a.placements(), b.placements());
    }

    #[test]
    fn generated_index_is_consistent() {
        let index = build_synthetic_index(300, 16, 8, 4, 42).unwrap();
        assert_eq!(index.len(), 300);
        assert!(index.verify_aggregates().is_empty());
    }

    #[test]
    fn rejects_degenerate_shapes() {
        assert!(build_synthetic_index(0, 16, 8, 4, 1).is_err());
        assert!(build_synthetic_index(100, 2, 8, 4, 1).is_err());
    }
}
