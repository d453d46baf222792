use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use registry_ledger::generator::DEFAULT_SEED;
use registry_ledger::{
    ChangeRecord, MutationRatios, Pipeline, PipelineConfig, SnapshotGenerator, SnapshotStore,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "registry-ledger: company registry snapshot consolidation and change ledger",
    long_about = None
)]
struct Cli {
    /// TOML config file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Consolidate, diff and commit the given snapshot dates in order
    Run {
        #[arg(required = true)]
        dates: Vec<String>,
    },

    /// Write demo snapshots: the first date is a fresh seed, each later
    /// date mutates the one before it
    Generate {
        #[arg(long, default_value_t = 140)]
        per_state: usize,

        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,

        #[arg(required = true)]
        dates: Vec<String>,
    },

    /// Export the master table as CSV
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show one company's master record and change history
    History { id: String },

    /// List ledger rows observed in a date range
    Changes {
        #[arg(long)]
        since: String,

        #[arg(long)]
        until: Option<String>,
    },

    /// Show the last committed snapshot date
    Status,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "registry_ledger=debug,info"
        } else {
            "registry_ledger=info,warn"
        })
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { dates } => run_pipeline(config, &dates)?,
        Commands::Generate { per_state, seed, dates } => generate(&config, per_state, seed, &dates)?,
        Commands::Export { out } => export(&config, out)?,
        Commands::History { id } => history(&config, &id)?,
        Commands::Changes { since, until } => changes(&config, &since, until.as_deref())?,
        Commands::Status => status(&config)?,
    }

    Ok(())
}

fn run_pipeline(config: PipelineConfig, dates: &[String]) -> Result<()> {
    println!("🔁 Registry Ledger - Pipeline");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut pipeline = Pipeline::open(config)?;
    let report = pipeline.run(dates)?;

    for date in &report.skipped {
        println!("⏭️  {} already committed", date);
    }
    for outcome in &report.processed {
        if outcome.seeded {
            println!("🌱 {} seeded master table with {} records", outcome.date, outcome.record_count);
        } else {
            println!(
                "✓ {} {} records | +{} new, -{} deregistered, {} field updates",
                outcome.date,
                outcome.record_count,
                outcome.new_entities,
                outcome.removed,
                outcome.field_updates
            );
        }
    }

    if let Some(summary) = &report.summary {
        println!("\n{}", summary.render_text());
    }
    if let Some((json_path, txt_path)) = &report.summary_paths {
        println!("📝 Summary: {} / {}", json_path.display(), txt_path.display());
    }
    if let Some(path) = &report.enrichment_path {
        println!("🔎 Enrichment: {}", path.display());
    }
    println!("📦 Master: {}", pipeline.config().master_csv_path().display());

    Ok(())
}

fn generate(config: &PipelineConfig, per_state: usize, seed: u64, dates: &[String]) -> Result<()> {
    let mut generator = SnapshotGenerator::new(config.jurisdictions.clone(), seed);
    let mut previous_dir: Option<PathBuf> = None;

    for date in dates {
        let dir = config.snapshot_dir(date);
        let rows = match &previous_dir {
            None => generator.write_seed(&dir, per_state)?,
            Some(prev) => generator.write_mutation(prev, &dir, MutationRatios::default())?,
        };
        println!("✓ {} → {} ({} rows)", date, dir.display(), rows);
        previous_dir = Some(dir);
    }

    Ok(())
}

fn open_store(config: &PipelineConfig) -> Result<SnapshotStore> {
    SnapshotStore::open(&config.db_path())
}

fn export(config: &PipelineConfig, out: Option<PathBuf>) -> Result<()> {
    let store = open_store(config)?;
    let path = out.unwrap_or_else(|| config.master_csv_path());
    let rows = store.export_csv(&path)?;
    println!("✓ Exported {} records to {}", rows, path.display());
    Ok(())
}

fn print_change(change: &ChangeRecord) {
    match (&change.field, &change.old_value, &change.new_value) {
        (Some(field), Some(old), Some(new)) => println!(
            "  {} {} {}: {} → {}",
            change.observed_date, change.entity_id, field, old, new
        ),
        _ => println!("  {} {} {}", change.observed_date, change.entity_id, change.change_kind),
    }
}

fn history(config: &PipelineConfig, id: &str) -> Result<()> {
    let store = open_store(config)?;

    match store.find_by_id(id)? {
        Some(record) => {
            println!("🏢 {} - {}", record.id, record.name);
            println!(
                "   Status: {} ({}) | State: {} | RoC: {}",
                record.status,
                record.registry_status().label(),
                record.jurisdiction,
                record.registering_office
            );
            println!(
                "   Authorized: {} | Paid-up: {}",
                record.authorized_capital, record.paid_up_capital
            );
        }
        None => {
            println!("❌ {} not found in master table", id);
            return Ok(());
        }
    }

    let changes = store.changes_for_entity(id)?;
    println!("\n📜 {} change(s)", changes.len());
    for change in &changes {
        print_change(change);
    }

    Ok(())
}

fn changes(config: &PipelineConfig, since: &str, until: Option<&str>) -> Result<()> {
    let store = open_store(config)?;
    let rows = match until {
        Some(until) => store.changes_between(since, until)?,
        None => store.changes_since(since)?,
    };

    println!("📜 {} change(s) since {}", rows.len(), since);
    for change in &rows {
        print_change(change);
    }
    Ok(())
}

fn status(config: &PipelineConfig) -> Result<()> {
    let store = open_store(config)?;

    match store.last_commit()? {
        Some(commit) => {
            println!("✓ Last committed snapshot: {}", commit.snapshot_date);
            println!("   Commit: {}", commit.commit_id);
            println!("   Records: {} | Changes: {}", commit.record_count, commit.change_count);
            println!("   Committed at: {}", commit.committed_at);
        }
        None => println!("∅ No snapshot committed yet"),
    }
    println!("   Master table: {} records", store.count_records()?);
    println!("   Ledger: {} rows", store.count_changes()?);

    Ok(())
}
