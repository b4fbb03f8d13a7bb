//! MatchIndex: the token-indexed bitmap store.
//!
//! The index is the engine's only persistent state: a mapping from every
//! canonical [`Token`] to the roaring bitmap of match positions containing
//! it, a placement column indexed by match position, and per-token aggregate
//! caches (`count`, `placement_sum`) so single-token averages are O(1).
//!
//! Lifecycle:
//! - built once by an external conversion step (or [`IndexBuilder`] for
//!   synthetic fixtures and tests)
//! - serialized as a single binary artifact (`CSIX` magic + version header
//!   + bincode payload)
//! - loaded whole into memory at process start, then **immutable** — query
//!   code only ever sees `&MatchIndex`, so unbounded concurrent readers need
//!   no locks.

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;

use crate::token::Token;

const MAGIC: &[u8; 4] = b"CSIX";
const VERSION: u32 = 1;

/// Why an index artifact failed to load. Fatal at startup: the engine must
/// refuse to serve rather than serve a partially loaded index.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("io error reading index artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a compscope index artifact (bad magic)")]
    BadMagic,
    #[error("unsupported index artifact version: {0}")]
    UnsupportedVersion(u32),
    #[error("truncated index artifact")]
    Truncated,
    #[error("corrupt index artifact: {0}")]
    Corrupt(#[from] bincode::Error),
    #[error("index artifact placement {0} outside 1..=8")]
    PlacementOutOfRange(u8),
    #[error("index artifact bitmap position {0} outside the placement column")]
    PositionOutOfBounds(u32),
}

/// Per-token bitmap plus cached aggregates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenRecord {
    pub bitmap: RoaringBitmap,
    pub count: u64,
    pub placement_sum: u64,
}

/// The loaded, immutable index.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MatchIndex {
    /// Token catalog: canonical token -> bitmap + aggregate cache.
    catalog: HashMap<Token, TokenRecord>,
    /// Placement column: `placements[i] in 1..=8` for every match position.
    placements: Vec<u8>,
}

impl MatchIndex {
    /// Total number of indexed matches.
    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Number of distinct catalog tokens.
    pub fn catalog_len(&self) -> usize {
        self.catalog.len()
    }

    /// Bitmap of all indexed match positions.
    pub fn universe(&self) -> RoaringBitmap {
        let mut all = RoaringBitmap::new();
        all.insert_range(0..self.placements.len() as u32);
        all
    }

    /// Look up a token's bitmap. Unknown tokens are simply absent.
    pub fn bitmap(&self, token: &Token) -> Option<&RoaringBitmap> {
        self.catalog.get(token).map(|r| &r.bitmap)
    }

    pub fn record(&self, token: &Token) -> Option<&TokenRecord> {
        self.catalog.get(token)
    }

    /// Placement for one match position.
    pub fn placement(&self, position: u32) -> Option<u8> {
        self.placements.get(position as usize).copied()
    }

    pub fn placements(&self) -> &[u8] {
        &self.placements
    }

    /// Iterate the full catalog (graph builder, search index).
    pub fn catalog(&self) -> impl Iterator<Item = (&Token, &TokenRecord)> {
        self.catalog.iter()
    }

    /// Re-check the aggregate-cache consistency invariant: every record's
    /// cached `(count, placement_sum)` must equal a fresh reduction over its
    /// bitmap. Returns the tokens that drift, empty when consistent.
    pub fn verify_aggregates(&self) -> Vec<Token> {
        let mut drifted = Vec::new();
        for (token, record) in &self.catalog {
            let count = record.bitmap.len();
            let sum: u64 = record
                .bitmap
                .iter()
                .map(|i| u64::from(self.placements[i as usize]))
                .sum();
            if count != record.count || sum != record.placement_sum {
                drifted.push(token.clone());
            }
        }
        drifted.sort();
        drifted
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Serialize to the binary artifact format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ArtifactError> {
        let payload = bincode::serialize(&(&self.catalog, &self.placements))?;

        let mut out = Vec::with_capacity(payload.len() + 16);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Deserialize from the binary artifact format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArtifactError> {
        if bytes.len() < 16 {
            return Err(ArtifactError::Truncated);
        }
        if &bytes[0..4] != MAGIC {
            return Err(ArtifactError::BadMagic);
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into().expect("4-byte slice"));
        if version != VERSION {
            return Err(ArtifactError::UnsupportedVersion(version));
        }
        let payload_len =
            u64::from_le_bytes(bytes[8..16].try_into().expect("8-byte slice")) as usize;
        let payload = bytes
            .get(16..16 + payload_len)
            .ok_or(ArtifactError::Truncated)?;

        let (catalog, placements): (HashMap<Token, TokenRecord>, Vec<u8>) =
            bincode::deserialize(payload)?;

        // A decodable payload can still violate the column invariants; query
        // code indexes the placement column without rechecking them, so a bad
        // artifact must die here, not at serve time.
        if let Some(&p) = placements.iter().find(|&&p| !(1..=8).contains(&p)) {
            return Err(ArtifactError::PlacementOutOfRange(p));
        }
        let column_len = placements.len() as u32;
        for record in catalog.values() {
            if let Some(max) = record.bitmap.max() {
                if max >= column_len {
                    return Err(ArtifactError::PositionOutOfBounds(max));
                }
            }
        }

        Ok(Self {
            catalog,
            placements,
        })
    }

    /// Load an artifact from disk. This is the single blocking startup step;
    /// failure is fatal to the caller.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let start = Instant::now();
        let bytes = std::fs::read(path)?;
        let index = Self::from_bytes(&bytes)?;
        tracing::info!(
            path = %path.display(),
            matches = index.len(),
            tokens = index.catalog_len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "loaded match index"
        );
        Ok(index)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ArtifactError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// Incremental builder used by the conversion step, the synthetic generator,
/// and test fixtures. Not used at serve time.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    catalog: HashMap<Token, TokenRecord>,
    placements: Vec<u8>,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one match. Tokens are indexed as given **and** under their
    /// qualifier-stripped base, so `U:ahri:2` also answers `U:ahri`.
    /// Placements outside `1..=8` are clamped.
    pub fn push_match(&mut self, placement: u8, tokens: &[Token]) -> u32 {
        let position = self.placements.len() as u32;
        let placement = placement.clamp(1, 8);
        self.placements.push(placement);

        for token in tokens {
            self.insert(token.clone(), position, placement);
            let base = token.base();
            if base != *token {
                self.insert(base, position, placement);
            }
        }
        position
    }

    fn insert(&mut self, token: Token, position: u32, placement: u8) {
        let record = self.catalog.entry(token).or_default();
        // The same token can legitimately repeat within a match (two copies
        // of an item on different units collapse to one Item token); the
        // bitmap insert dedupes, and the caches must stay in lockstep.
        if record.bitmap.insert(position) {
            record.count += 1;
            record.placement_sum += u64::from(placement);
        }
    }

    pub fn build(self) -> MatchIndex {
        MatchIndex {
            catalog: self.catalog,
            placements: self.placements,
        }
    }
}
