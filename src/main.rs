//! Librarian CLI: duplicate-awareness scanner for plugin marketplaces.
//! Scans a `<marketplace>/<plugin>` corpus for near-duplicate markdown,
//! persists an indexed report, and answers overlap queries against it.

mod cluster;
mod config;
mod find;
mod installed;
mod lsh;
mod minhash;
mod query;
mod report;
mod sanity;
mod scan;
mod shingle;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "librarian",
    about = "Librarian: duplicate-awareness for plugin marketplaces",
    version = env!("LIBRARIAN_BUILD_VERSION")
)]
struct Cli {
    /// Corpus root containing <marketplace>/<plugin> directories.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Report artifact path. Default: <root>/.librarian/report.json
    #[arg(long)]
    report: Option<PathBuf>,

    /// Config file. Default: <root>/librarian.yaml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit JSON instead of text on query commands.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the corpus and write the similarity report
    Scan {
        /// Override the configured similarity threshold.
        #[arg(long)]
        threshold: Option<f64>,
        /// Override the configured number of MinHash permutations.
        #[arg(long)]
        permutations: Option<usize>,
        /// Override the configured shingle size.
        #[arg(long)]
        shingle_size: Option<usize>,
    },
    /// Show which clusters contain files matching a pattern
    Where {
        /// Glob on filenames (e.g. 'SKILL.md', '*.md') or substring on paths.
        pattern: String,
    },
    /// Classify target files against a reference subset
    Compare {
        /// Candidate subset: marketplace or marketplace/plugin.
        target: String,
        /// Stable subset: marketplace or marketplace/plugin.
        reference: String,
    },
    /// Classify target files against the installed inventory
    Impact {
        /// Candidate subset: marketplace or marketplace/plugin.
        target: String,
        /// Inventory file. Default: <root>/installed.yaml
        #[arg(long)]
        installed_file: Option<PathBuf>,
    },
    /// Print report statistics
    Stats {
        /// How many top filenames to show.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// List the installed inventory
    Installed {
        /// Inventory file. Default: <root>/installed.yaml
        #[arg(long)]
        installed_file: Option<PathBuf>,
    },
    /// Keyword search over plugin frontmatter
    Find { keyword: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let report_path = cli
        .report
        .clone()
        .unwrap_or_else(|| cli.root.join(".librarian/report.json"));
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.root.join("librarian.yaml"));

    match &cli.command {
        Commands::Scan {
            threshold,
            permutations,
            shingle_size,
        } => cmd_scan(
            &cli.root,
            &report_path,
            &config_path,
            *threshold,
            *permutations,
            *shingle_size,
        )?,
        Commands::Where { pattern } => cmd_where(&report_path, pattern, cli.json)?,
        Commands::Compare { target, reference } => {
            cmd_compare(&report_path, target, reference, cli.json)?
        }
        Commands::Impact {
            target,
            installed_file,
        } => {
            let inventory_path = installed_file
                .clone()
                .unwrap_or_else(|| cli.root.join(installed::INSTALLED_REL));
            cmd_impact(&report_path, target, &inventory_path, cli.json)?
        }
        Commands::Stats { top } => cmd_stats(&report_path, *top, cli.json)?,
        Commands::Installed { installed_file } => {
            let inventory_path = installed_file
                .clone()
                .unwrap_or_else(|| cli.root.join(installed::INSTALLED_REL));
            cmd_installed(&inventory_path, cli.json)?
        }
        Commands::Find { keyword } => cmd_find(&cli.root, &config_path, keyword, cli.json)?,
    }
    Ok(())
}

fn cmd_scan(
    root: &Path,
    report_path: &Path,
    config_path: &Path,
    threshold: Option<f64>,
    permutations: Option<usize>,
    shingle_size: Option<usize>,
) -> Result<()> {
    let mut config = config::load(config_path)?;
    if let Some(t) = threshold {
        anyhow::ensure!(t > 0.0 && t <= 1.0, "--threshold must be in (0, 1]");
        config.similarity_threshold = t;
    }
    if let Some(p) = permutations {
        anyhow::ensure!(p > 0, "--permutations must be positive");
        config.num_permutations = p;
    }
    if let Some(s) = shingle_size {
        anyhow::ensure!(s > 0, "--shingle-size must be positive");
        config.shingle_size = s;
    }

    let (report, skips) = scan::run_scan(root, report_path, &config)?;
    let summary = &report.summary;
    println!(
        "scanned {} files across {} marketplaces",
        summary.total_files_scanned, summary.unique_marketplaces
    );
    println!(
        "{} clusters: {} files in clusters, {} unclustered",
        summary.unique_clusters, summary.files_in_clusters, summary.unclustered_files
    );
    for (kind, stats) in &summary.by_type {
        println!("  {}: {} clusters / {} files", kind, stats.clusters, stats.files);
    }
    println!("confidence: {}", report.metadata.confidence.as_str());
    for warning in &report.metadata.warnings {
        println!("warning: {}", warning);
    }
    if skips.total() > 0 {
        eprintln!(
            "note: skipped {} files ({} too short, {} unreadable, {} outside marketplace/plugin layout)",
            skips.total(),
            skips.too_short,
            skips.unreadable,
            skips.outside_hierarchy
        );
    }
    println!("report written to {}", report_path.display());
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_where(report_path: &Path, pattern: &str, json: bool) -> Result<()> {
    let loaded = report::load(report_path)?;
    let result = query::where_query(&loaded, pattern)?;
    if json {
        return print_json(&result);
    }
    if result.clusters.is_empty() && result.unclustered.is_empty() {
        println!("no files match '{}'", pattern);
        return Ok(());
    }
    for c in &result.clusters {
        println!(
            "cluster {} [{}] size={} avg={:.2} official={} marketplaces={}",
            c.cluster_id,
            c.kind.as_str(),
            c.size,
            c.avg_similarity,
            if c.has_official { "yes" } else { "no" },
            c.marketplaces.join(",")
        );
        for loc in &c.locations {
            println!("  {}/{}", loc.marketplace, loc.path);
        }
    }
    if !result.unclustered.is_empty() {
        println!("unclustered matches:");
        for f in &result.unclustered {
            println!("  {}/{}", f.marketplace, f.path);
        }
    }
    Ok(())
}

fn print_compare(outcome: &query::CompareOutcome, verbose_rows: bool) {
    println!("target files: {}", outcome.target_total);
    println!("  redundant-with-reference: {}", outcome.redundant_with_reference);
    println!("  redundant-internal: {}", outcome.redundant_internal);
    println!("  novel: {}", outcome.novel);
    if verbose_rows {
        for row in &outcome.rows {
            match row.cluster_id {
                Some(id) => println!(
                    "  [{}] {}/{} (cluster {})",
                    row.class.as_str(),
                    row.marketplace,
                    row.path,
                    id
                ),
                None => println!("  [{}] {}/{}", row.class.as_str(), row.marketplace, row.path),
            }
        }
    }
}

fn cmd_compare(report_path: &Path, target: &str, reference: &str, json: bool) -> Result<()> {
    let loaded = report::load(report_path)?;
    let targets = vec![query::Selector::parse(target)?];
    let references = vec![query::Selector::parse(reference)?];
    let outcome = query::compare(&loaded, &targets, &references)?;
    if json {
        return print_json(&outcome);
    }
    print_compare(&outcome, true);
    Ok(())
}

#[derive(Serialize)]
struct ImpactView {
    novelty_ratio: f64,
    #[serde(flatten)]
    outcome: query::CompareOutcome,
}

fn cmd_impact(report_path: &Path, target: &str, inventory_path: &Path, json: bool) -> Result<()> {
    let loaded = report::load(report_path)?;
    let targets = vec![query::Selector::parse(target)?];
    let entries = installed::load(inventory_path)?;
    let references = installed::to_selectors(&entries);
    let outcome = query::compare(&loaded, &targets, &references)?;
    let ratio = outcome.novelty_ratio();
    if json {
        return print_json(&ImpactView {
            novelty_ratio: ratio,
            outcome,
        });
    }
    print_compare(&outcome, false);
    println!(
        "novelty: {:.1}% ({} of {} target files are new relative to {} installed entries)",
        ratio * 100.0,
        outcome.novel,
        outcome.target_total,
        entries.len()
    );
    Ok(())
}

fn cmd_stats(report_path: &Path, top: usize, json: bool) -> Result<()> {
    let loaded = report::load(report_path)?;
    let view = query::stats(&loaded, top);
    if json {
        return print_json(&view);
    }
    if loaded.partial_file_table {
        println!("note: legacy report; unclustered files were not recorded");
    }
    println!("files scanned: {}", view.total_files_scanned);
    println!("files in clusters: {}", view.files_in_clusters);
    println!("unclustered files: {}", view.unclustered_files);
    println!("clusters: {}", view.unique_clusters);
    println!("marketplaces: {}", view.unique_marketplaces);
    for (kind, clusters, files) in &view.by_type {
        println!("  {}: {} clusters / {} files", kind, clusters, files);
    }
    println!("confidence: {}", view.confidence);
    for warning in &view.warnings {
        println!("warning: {}", warning);
    }
    if !view.top_filenames.is_empty() {
        println!("top filenames by cluster occurrence:");
        for (name, count) in &view.top_filenames {
            println!("  {} ({})", name, count);
        }
    }
    Ok(())
}

fn cmd_installed(inventory_path: &Path, json: bool) -> Result<()> {
    let entries = installed::load(inventory_path)?;
    if json {
        return print_json(&installed::to_selectors(&entries));
    }
    if entries.is_empty() {
        println!("no installed inventory at {}", inventory_path.display());
        return Ok(());
    }
    for e in &entries {
        match &e.plugin {
            Some(plugin) => println!("{}/{}", e.marketplace, plugin),
            None => println!("{} (all plugins)", e.marketplace),
        }
    }
    Ok(())
}

fn cmd_find(root: &Path, config_path: &Path, keyword: &str, json: bool) -> Result<()> {
    let config = config::load(config_path)?;
    let hits = find::find(root, &config, keyword)?;
    if json {
        return print_json(&hits);
    }
    if hits.is_empty() {
        println!("no frontmatter matches for '{}'", keyword);
        return Ok(());
    }
    for h in &hits {
        let name = h.name.as_deref().unwrap_or("-");
        let description = h.description.as_deref().unwrap_or("");
        println!("{}/{}  {}  {}", h.marketplace, h.path, name, description);
    }
    Ok(())
}
