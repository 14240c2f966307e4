mod fetcher;
mod output;
mod pipeline;
mod settings;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::warn;

use fetcher::{FetchOutcome, MintGardenClient};
use output::OutputFormat;
use pipeline::summary::{summarize, unlinked_count};
use pipeline::dedupe::dedupe;
use pipeline::extract::extract;
use pipeline::DedupeStrategy;
use settings::Settings;

#[derive(Parser)]
#[command(name = "mintgarden_owners", about = "NFT ownership export for MintGarden collections")]
struct Cli {
    /// Per-request timeout in seconds (overrides MINTGARDEN_TIMEOUT_SECS)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CollectionArgs {
    /// MintGarden collection id (col1...)
    #[arg(short, long)]
    collection_id: String,
    /// Ask the API for owned NFTs only
    #[arg(short, long)]
    require_owner: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a collection and write one row per NFT to a spreadsheet
    Export {
        #[command(flatten)]
        collection: CollectionArgs,
        /// Destination file (.xlsx or .csv), relative to the current directory
        #[arg(short, long, default_value = "output.xlsx")]
        output_file: PathBuf,
        /// Keep one row per owner
        #[arg(short, long)]
        unique: bool,
        /// Owner identity used by --unique
        #[arg(long, value_enum, default_value_t = DedupeStrategy::Did)]
        dedupe_by: DedupeStrategy,
        /// Add an Owners sheet grouping addresses per DID (xlsx only)
        #[arg(long)]
        summary: bool,
        /// Refuse to write anything if the fetch stopped early
        #[arg(long)]
        strict: bool,
    },
    /// Owners overview table
    Owners {
        #[command(flatten)]
        collection: CollectionArgs,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load settings")?;

    let result = run(cli, settings);

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn run(cli: Cli, mut settings: Settings) -> Result<()> {
    if let Some(secs) = cli.timeout_secs {
        settings.timeout_secs = secs;
    }

    match cli.command {
        Commands::Export {
            collection,
            output_file,
            unique,
            dedupe_by,
            summary,
            strict,
        } => {
            let format = OutputFormat::from_path(&output_file)?;
            let summary = if summary && !format.supports_summary() {
                warn!("--summary needs .xlsx output; ignoring it for {:?}", output_file);
                false
            } else {
                summary
            };

            let outcome = fetch(&settings, &collection)?;
            if let Some(e) = &outcome.failure {
                if strict {
                    bail!("Fetch incomplete after {} pages, nothing written: {}", outcome.pages, e);
                }
                warn!(
                    "Writing partial result: {} items from {} pages ({})",
                    outcome.items.len(),
                    outcome.pages,
                    e
                );
            }

            let fetched = outcome.items.len();
            let rows = extract(outcome.items);
            // Owner counts span every fetched NFT, not just the rows kept by --unique.
            let owners = summary.then(|| summarize(&rows));
            let rows = if unique { dedupe(rows, dedupe_by) } else { rows };

            let dest = resolve_output(&output_file)?;
            format
                .writer(owners)
                .write(&rows, &dest)
                .with_context(|| format!("Failed to write {}", dest.display()))?;

            println!(
                "Wrote {} rows ({} NFTs over {} pages) to {}",
                rows.len(),
                fetched,
                outcome.pages,
                dest.display()
            );
            Ok(())
        }
        Commands::Owners { collection, limit } => {
            let outcome = fetch(&settings, &collection)?;
            let partial = !outcome.is_complete();
            if let Some(e) = &outcome.failure {
                warn!("Showing partial result: {}", e);
            }

            let rows = pipeline::process(outcome.items, None);
            if rows.is_empty() {
                println!("No NFTs found.");
                return Ok(());
            }

            let mut owners = summarize(&rows);
            owners.sort_by(|a, b| b.nft_count.cmp(&a.nft_count));

            println!(
                "{:>3} | {:<40} | {:>5} | {:>5} | {:<24}",
                "#", "Owner DID", "Addrs", "NFTs", "First address"
            );
            println!("{}", "-".repeat(88));

            for (i, o) in owners.iter().take(limit).enumerate() {
                let first = o.addresses.first().map(String::as_str).unwrap_or("-");
                println!(
                    "{:>3} | {:<40} | {:>5} | {:>5} | {:<24}",
                    i + 1,
                    truncate(&o.owner_encoded_id, 40),
                    o.addresses.len(),
                    o.nft_count,
                    truncate(first, 24)
                );
            }

            println!(
                "\n{} owners | {} NFTs | {} without a DID{}",
                owners.len(),
                rows.len(),
                unlinked_count(&rows),
                if partial { " | partial" } else { "" }
            );
            Ok(())
        }
    }
}

fn fetch(settings: &Settings, collection: &CollectionArgs) -> Result<FetchOutcome> {
    if !fetcher::is_collection_id(&collection.collection_id) {
        bail!(
            "Invalid collection id {:?}: expected a MintGarden id like col1...",
            collection.collection_id
        );
    }
    let client = MintGardenClient::new(settings)?;
    Ok(fetcher::fetch_collection(
        &client,
        &collection.collection_id,
        collection.require_owner,
    ))
}

fn resolve_output(path: &Path) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
    Ok(cwd.join(path))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
