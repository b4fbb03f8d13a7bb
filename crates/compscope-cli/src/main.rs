//! Compscope CLI
//!
//! Command-line interface for:
//! - Generating synthetic index artifacts for demos and perf checks
//! - Verifying artifact integrity (aggregate-cache consistency)
//! - Running ad-hoc filter/graph/cluster/playbook queries against an artifact
//! - Dumping the typeahead search table

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use compscope_engine::{
    ClusterOptions, Engine, GraphOptions, ItemClass, MatchIndex, PlaybookOptions, SortMode,
    TokenKind,
};
use std::path::PathBuf;

mod synth;

#[derive(Parser)]
#[command(name = "compscope")]
#[command(author, version, about = "Compscope: match-corpus analytics engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SortArg {
    Impact,
    Helpful,
    Harmful,
}

impl From<SortArg> for SortMode {
    fn from(arg: SortArg) -> SortMode {
        match arg {
            SortArg::Impact => SortMode::Impact,
            SortArg::Helpful => SortMode::Helpful,
            SortArg::Harmful => SortMode::Harmful,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Unit,
    Item,
    Trait,
    Equipped,
}

impl From<KindArg> for TokenKind {
    fn from(arg: KindArg) -> TokenKind {
        match arg {
            KindArg::Unit => TokenKind::Unit,
            KindArg::Item => TokenKind::Item,
            KindArg::Trait => TokenKind::Trait,
            KindArg::Equipped => TokenKind::Equipped,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ItemClassArg {
    Component,
    Full,
    Radiant,
    Artifact,
    Emblem,
}

impl From<ItemClassArg> for ItemClass {
    fn from(arg: ItemClassArg) -> ItemClass {
        match arg {
            ItemClassArg::Component => ItemClass::Component,
            ItemClassArg::Full => ItemClass::Full,
            ItemClassArg::Radiant => ItemClass::Radiant,
            ItemClassArg::Artifact => ItemClass::Artifact,
            ItemClassArg::Emblem => ItemClass::Emblem,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a deterministic synthetic index artifact.
    Synth {
        /// Output artifact path
        #[arg(short, long)]
        out: PathBuf,
        #[arg(long, default_value_t = 100_000)]
        matches: usize,
        #[arg(long, default_value_t = 60)]
        units: usize,
        #[arg(long, default_value_t = 40)]
        items: usize,
        #[arg(long, default_value_t = 12)]
        traits: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Load an artifact and re-check the aggregate-cache invariant.
    Verify {
        #[arg(short, long)]
        index: PathBuf,
    },

    /// Base statistics for a filter.
    Stats {
        #[arg(short, long)]
        index: PathBuf,
        /// Comma-separated signed tokens, e.g. "U:ahri,-I:deathcap"
        #[arg(short, long, default_value = "")]
        filter: String,
        #[arg(long)]
        json: bool,
    },

    /// Relationship graph for a filter.
    Query {
        #[arg(short, long)]
        index: PathBuf,
        #[arg(short, long, default_value = "")]
        filter: String,
        #[arg(long, default_value_t = 15)]
        top_k: usize,
        #[arg(long, value_enum, default_value_t = SortArg::Impact)]
        sort: SortArg,
        /// Restrict candidates to these token kinds (repeatable).
        #[arg(long = "kind")]
        kinds: Vec<KindArg>,
        /// Restrict item candidates to these subtypes (repeatable).
        #[arg(long = "item-class")]
        item_classes: Vec<ItemClassArg>,
        /// Item-family prefix, e.g. "radiant"
        #[arg(long)]
        item_prefix: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Archetype clusters for a filter.
    Clusters {
        #[arg(short, long)]
        index: PathBuf,
        #[arg(short, long, default_value = "")]
        filter: String,
        #[arg(long, default_value_t = 8)]
        max: usize,
        #[arg(long)]
        json: bool,
    },

    /// Drivers, killers, and comp view for a cluster-describing filter.
    Playbook {
        #[arg(short, long)]
        index: PathBuf,
        #[arg(short, long)]
        filter: String,
        #[arg(long)]
        json: bool,
    },

    /// Dump the typeahead search table.
    SearchIndex {
        #[arg(short, long)]
        index: PathBuf,
        /// Write JSON here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Synth {
            out,
            matches,
            units,
            items,
            traits,
            seed,
        } => {
            let index = synth::build_synthetic_index(matches, units, items, traits, seed)?;
            index
                .save(&out)
                .with_context(|| format!("writing {}", out.display()))?;
            println!(
                "{} {} matches, {} tokens -> {}",
                "synth:".green().bold(),
                index.len(),
                index.catalog_len(),
                out.display()
            );
            Ok(())
        }

        Commands::Verify { index } => {
            let index = load(&index)?;
            let drifted = index.verify_aggregates();
            if drifted.is_empty() {
                println!(
                    "{} {} tokens over {} matches, aggregates consistent",
                    "ok:".green().bold(),
                    index.catalog_len(),
                    index.len()
                );
                Ok(())
            } else {
                for token in &drifted {
                    eprintln!("{} cached aggregates drift for {token}", "drift:".red());
                }
                Err(anyhow!("{} tokens failed aggregate verification", drifted.len()))
            }
        }

        Commands::Stats {
            index,
            filter,
            json,
        } => {
            let engine = Engine::from_index(load(&index)?);
            let stats = engine.stats_query(&filter);
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&filter, &stats);
            }
            Ok(())
        }

        Commands::Query {
            index,
            filter,
            top_k,
            sort,
            kinds,
            item_classes,
            item_prefix,
            json,
        } => {
            let engine = Engine::from_index(load(&index)?);
            let options = GraphOptions {
                top_k,
                sort_mode: sort.into(),
                active_kinds: kinds.into_iter().map(Into::into).collect(),
                item_classes: item_classes.into_iter().map(Into::into).collect(),
                item_prefix,
                ..GraphOptions::default()
            };
            let response = engine.base_query(&filter, &options);
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!(
                    "{} n={} avg={}",
                    "base:".bold(),
                    response.base.n,
                    fmt_avg(response.base.avg_placement)
                );
                for edge in &response.edges {
                    let delta = format!("{:+.3}", edge.delta);
                    let delta = if edge.delta <= 0.0 {
                        delta.green()
                    } else {
                        delta.red()
                    };
                    println!(
                        "  {delta}  {:<30} n={:<7} avg={:.3}",
                        edge.token, edge.n_with, edge.avg_with
                    );
                }
            }
            Ok(())
        }

        Commands::Clusters {
            index,
            filter,
            max,
            json,
        } => {
            let engine = Engine::from_index(load(&index)?);
            let options = ClusterOptions {
                max_clusters: max,
                ..ClusterOptions::default()
            };
            let response = engine.cluster_query(&filter, &options);
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                if let Some(warning) = &response.warning {
                    println!("{} {warning}", "warning:".yellow().bold());
                }
                for cluster in &response.clusters {
                    println!(
                        "{} [{}] size={} share={:.1}% avg={} delta={}",
                        "cluster".bold(),
                        cluster.signature_tokens.join(" + "),
                        cluster.size,
                        cluster.share * 100.0,
                        fmt_avg(cluster.stats.avg_placement),
                        cluster
                            .delta_vs_base
                            .map(|d| format!("{d:+.3}"))
                            .unwrap_or_else(|| "-".into()),
                    );
                }
            }
            Ok(())
        }

        Commands::Playbook {
            index,
            filter,
            json,
        } => {
            let engine = Engine::from_index(load(&index)?);
            let playbook = engine.playbook_query(&filter, &PlaybookOptions::default());
            if json {
                println!("{}", serde_json::to_string_pretty(&playbook)?);
            } else {
                if let Some(warning) = &playbook.warning {
                    println!("{} {warning}", "warning:".yellow().bold());
                }
                println!("{}", "drivers:".green().bold());
                for row in &playbook.drivers {
                    println!(
                        "  {:<30} win {:+.1}% eighth {:+.1}%",
                        row.token,
                        row.delta_win * 100.0,
                        row.delta_eighth * 100.0
                    );
                }
                println!("{}", "killers:".red().bold());
                for row in &playbook.killers {
                    println!(
                        "  {:<30} win {:+.1}% eighth {:+.1}%",
                        row.token,
                        row.delta_win * 100.0,
                        row.delta_eighth * 100.0
                    );
                }
                println!("{}", "comp view:".bold());
                for pill in &playbook.comp_view.traits {
                    println!("  {} ({:.0}%)", pill.label, pill.share * 100.0);
                }
                for holder in &playbook.comp_view.items {
                    println!("  {} -> {}", holder.item, holder.unit);
                }
            }
            Ok(())
        }

        Commands::SearchIndex { index, out } => {
            let engine = Engine::from_index(load(&index)?);
            let entries = engine.search_index();
            let json = serde_json::to_string_pretty(&entries)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("{} {} entries -> {}", "ok:".green().bold(), entries.len(), path.display());
                }
                None => println!("{json}"),
            }
            Ok(())
        }
    }
}

fn load(path: &PathBuf) -> Result<MatchIndex> {
    MatchIndex::load(path).with_context(|| format!("loading index artifact {}", path.display()))
}

fn fmt_avg(avg: Option<f64>) -> String {
    avg.map(|a| format!("{a:.3}")).unwrap_or_else(|| "-".into())
}

fn print_stats(filter: &str, stats: &compscope_engine::OutcomeStats) {
    let shown = if filter.is_empty() { "(all)" } else { filter };
    println!("{} {shown}", "filter:".bold());
    println!("  n            {}", stats.n);
    println!("  avg place    {}", fmt_avg(stats.avg_placement));
    println!("  win rate     {:.1}%", stats.win_rate * 100.0);
    println!("  top4 rate    {:.1}%", stats.top4_rate * 100.0);
    println!("  eighth rate  {:.1}%", stats.eighth_rate * 100.0);
    println!("  histogram    {:?}", stats.placement_hist);
}
