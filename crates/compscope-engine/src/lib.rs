//! Compscope engine: in-memory match analytics over a token-indexed bitmap
//! store.
//!
//! Based on:
//! - Roaring Bitmaps for set operations (Lemire et al.)
//! - classic OLAP bit-sliced indexing for ad-hoc filter aggregation
//!
//! The engine answers interactive queries over a corpus of completed match
//! records: boolean token filters resolve to a population bitmap, and
//! everything else — outcome statistics, the marginal-effect relationship
//! graph, archetype clustering, driver/killer playbooks, the typeahead
//! table — is computed from that bitmap per request. Nothing is precomputed
//! per filter; sub-second ad-hoc combinations are the point.
//!
//! ## Module Organization
//!
//! - `token`: canonical token grammar and parser
//! - `index`: the immutable bitmap store and its binary artifact
//! - `filter`: filter-string resolution (set algebra)
//! - `stats`: outcome aggregation
//! - `graph`: marginal-effect graph builder
//! - `cluster`: greedy signature clustering
//! - `playbook`: driver/killer analysis and comp view
//! - `search`: typeahead table
//!
//! The loaded [`MatchIndex`] is an explicit owned object passed by reference
//! into every operation — no globals, so tests run many independent indexes
//! side by side and serving replicas are just clones of the loaded artifact.

pub mod cluster;
pub mod filter;
pub mod graph;
pub mod index;
pub mod playbook;
pub mod search;
pub mod stats;
pub mod token;

use serde::{Deserialize, Serialize};
use std::path::Path;

// Re-export key types
pub use cluster::{Cluster, ClusterOptions, ClusterResponse, LiftRow};
pub use filter::{parse_filter, resolve_filter, ResolvedFilter};
pub use graph::{EdgeKind, Graph, GraphEdge, GraphNode, GraphOptions, SortMode};
pub use index::{ArtifactError, IndexBuilder, MatchIndex, TokenRecord};
pub use playbook::{CompView, ItemHolder, Playbook, PlaybookOptions, PlaybookRow, TraitPill};
pub use search::{build_search_index, SearchEntry};
pub use stats::{stats_for, OutcomeStats};
pub use token::{ItemClass, SignedToken, Token, TokenKind, TokenParseError};

/// Base population summary attached to every graph response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseSummary {
    pub n: u64,
    pub avg_placement: Option<f64>,
}

/// Graph response shape consumed by the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseQueryResponse {
    pub base: BaseSummary,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// The request-facing facade: one loaded, immutable index plus the query
/// entrypoints. `&Engine` is freely shareable across worker threads — every
/// request computes independently and nothing here mutates after load.
pub struct Engine {
    index: MatchIndex,
}

impl Engine {
    /// Load the index artifact. Failure here is fatal: callers must refuse
    /// to serve rather than run against a partially loaded index.
    pub fn load(path: impl AsRef<Path>) -> Result<Engine, ArtifactError> {
        Ok(Engine {
            index: MatchIndex::load(path)?,
        })
    }

    pub fn from_index(index: MatchIndex) -> Engine {
        Engine { index }
    }

    pub fn index(&self) -> &MatchIndex {
        &self.index
    }

    /// Filter + statistics + relationship graph.
    pub fn base_query(&self, filter: &str, options: &GraphOptions) -> BaseQueryResponse {
        let resolved = resolve_filter(&self.index, filter);
        let stats = stats_for(&self.index, &resolved.bitmap);
        let graph = graph::build_graph(&self.index, &resolved, options);
        BaseQueryResponse {
            base: BaseSummary {
                n: stats.n,
                avg_placement: stats.avg_placement,
            },
            nodes: graph.nodes,
            edges: graph.edges,
        }
    }

    /// Filter + statistics only.
    pub fn stats_query(&self, filter: &str) -> OutcomeStats {
        let resolved = resolve_filter(&self.index, filter);
        stats_for(&self.index, &resolved.bitmap)
    }

    /// Filter + archetype discovery.
    pub fn cluster_query(&self, filter: &str, options: &ClusterOptions) -> ClusterResponse {
        let resolved = resolve_filter(&self.index, filter);
        cluster::build_clusters(&self.index, &resolved.bitmap, options)
    }

    /// Playbook for a filter-described population: either a cluster's
    /// signature tokens or an ad-hoc (e.g. community-sourced) token list.
    pub fn playbook_query(&self, filter: &str, options: &PlaybookOptions) -> Playbook {
        let resolved = resolve_filter(&self.index, filter);
        playbook::build_playbook(&self.index, &resolved.bitmap, options)
    }

    /// The full typeahead table.
    pub fn search_index(&self) -> Vec<SearchEntry> {
        build_search_index(&self.index)
    }
}
