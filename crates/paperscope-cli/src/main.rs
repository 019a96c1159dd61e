mod refine;

use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use paperscope_core::storage::{load_dataset, save_dataset};
use paperscope_core::{
    AppConfig, CoreError, Dataset, EnrichmentStatus, ExitCode, FileStore, IdentifierKind,
    ReviewSession,
};
use paperscope_science::formats::generate_bibliography;
use paperscope_science::{
    EnrichmentPolicy, EnrichmentRequest, EnrichmentService, ExportFilter, Exporter, MergeEngine,
    PubmedLookup, ScienceError, parse_merge_input,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "paperscope",
    about = "Merge, review, enrich and export literature search results",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format (for scripts).
    /// Also enabled by setting PAPERSCOPE_JSON=1.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge raw search hits and datasets into one deduplicated dataset.
    Merge {
        /// Source batch files, search-results documents or datasets.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Existing dataset to merge into (created if missing).
        #[arg(long)]
        into: Option<PathBuf>,
        /// Output path. Defaults to the `--into` dataset.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Keep going when identifier values conflict.
        #[arg(long)]
        allow_conflicts: bool,
    },

    /// Review records one at a time with single key presses.
    Refine { dataset: PathBuf },

    /// Backfill a missing identifier kind through PubMed.
    Enrich {
        dataset: PathBuf,
        #[arg(long, default_value = "pubmed_id", value_parser = parse_kind)]
        source: IdentifierKind,
        #[arg(long, default_value = "doi", value_parser = parse_kind)]
        target: IdentifierKind,
        /// Retry records whose previous lookup already settled.
        #[arg(long)]
        force: bool,
    },

    /// Export access links and citation entries.
    Export {
        dataset: PathBuf,
        /// selected, not-rejected or all
        #[arg(long, default_value = "selected")]
        filter: ExportFilter,
        /// Write the link table as CSV.
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Write citation entries as BibTeX.
        #[arg(long)]
        bibtex: Option<PathBuf>,
    },

    /// Show review and enrichment progress of a dataset.
    Status { dataset: PathBuf },

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Print the config file path.
    Path,
}

fn parse_kind(s: &str) -> std::result::Result<IdentifierKind, String> {
    s.parse()
}

// ─── Entry point ────────────────────────────────────────────────────────────

fn main() {
    init_tracing();
    let start = Instant::now();
    let cli = Cli::parse();
    let json_output = cli.json || std::env::var("PAPERSCOPE_JSON").as_deref() == Ok("1");

    if let Err(err) = run(cli.command, json_output, start) {
        let code = exit_code(&err);
        if json_output {
            let _ = print_json(&serde_json::json!({
                "status": "error",
                "error": format!("{code:?}"),
                "message": format!("{err:#}"),
                "meta": {"duration_ms": start.elapsed().as_millis()}
            }));
        } else {
            eprintln!("error: {err:#}");
        }
        std::process::exit(code as i32);
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("paperscope=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    if let Some(e) = err.downcast_ref::<ScienceError>() {
        return e.exit_code();
    }
    if let Some(e) = err.downcast_ref::<CoreError>() {
        return ExitCode::from(e);
    }
    if err.downcast_ref::<io::Error>().is_some() {
        return ExitCode::FileSystemError;
    }
    ExitCode::GeneralError
}

fn run(command: Commands, json_output: bool, start: Instant) -> Result<()> {
    let config = AppConfig::load()?;

    match command {
        // ── Merge ──────────────────────────────────────────────────────────
        Commands::Merge {
            inputs,
            into,
            output,
            allow_conflicts,
        } => {
            let Some(output) = output.or_else(|| into.clone()) else {
                anyhow::bail!("nowhere to write: pass --output or --into");
            };

            let base = match &into {
                Some(path) if path.exists() => load_dataset(path)?,
                _ => Dataset::new(),
            };

            let mut parsed = Vec::with_capacity(inputs.len());
            for path in &inputs {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                let input = parse_merge_input(&text)
                    .with_context(|| format!("parsing {}", path.display()))?;
                parsed.push(input);
            }

            let outcome = MergeEngine::from_config(&config.merge)
                .with_categories(&config.review.categories)
                .merge(base, parsed);
            let stats = outcome.stats;
            let warnings = outcome.warnings.len();
            let dataset = if allow_conflicts || config.merge.allow_conflicts {
                outcome.dataset
            } else {
                outcome.into_strict()?
            };

            save_dataset(&output, &dataset)?;
            info!(path = %output.display(), records = dataset.len(), "dataset written");

            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": {"output": output, "records": dataset.len(), "stats": stats, "conflicts": warnings},
                    "meta": {"duration_ms": dur}
                }))?;
            } else {
                println!(
                    "Merged {} hits into {} records ({} new, {} merged, {} conflicts) → {}",
                    stats.inputs,
                    dataset.len(),
                    stats.created,
                    stats.merged,
                    warnings,
                    output.display()
                );
            }
        }

        // ── Refine ─────────────────────────────────────────────────────────
        Commands::Refine { dataset: path } => {
            let mut dataset = load_dataset(&path)?;
            let mut session =
                ReviewSession::start(&mut dataset, FileStore::new(&path), config.review.clone())?;
            let end = refine::run_interactive(&mut session)?;
            let progress = session.dataset().progress();

            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": {"end": format!("{end:?}").to_lowercase(), "progress": progress},
                    "meta": {"duration_ms": dur}
                }))?;
            } else {
                println!(
                    "Session {:?}: {} selected, {} rejected, {} unreviewed of {}.",
                    end, progress.selected, progress.rejected, progress.unreviewed, progress.total
                );
            }
        }

        // ── Enrich ─────────────────────────────────────────────────────────
        Commands::Enrich {
            dataset: path,
            source,
            target,
            force,
        } => {
            let lookup = PubmedLookup::new(&config.enrichment)?;
            let service = EnrichmentService::new(lookup, EnrichmentPolicy::from(&config.enrichment));
            let request = EnrichmentRequest::new(source, target).forced(force);

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let report = runtime.block_on(async {
                let shutdown = async {
                    if tokio::signal::ctrl_c().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                };
                service.enrich_file(&path, &request, shutdown).await
            })?;

            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":report,"meta":{"duration_ms":dur}}))?;
            } else {
                println!(
                    "{} found, {} not found, {} deferred, {} skipped{}",
                    report.found,
                    report.not_found,
                    report.deferred,
                    report.skipped,
                    if report.interrupted { " (interrupted)" } else { "" }
                );
                for dup in &report.possible_duplicates {
                    println!("  possible duplicate: {} and {} share {}", dup.record, dup.other, dup.value);
                }
            }
        }

        // ── Export ─────────────────────────────────────────────────────────
        Commands::Export {
            dataset: path,
            filter,
            csv,
            bibtex,
        } => {
            let dataset = load_dataset(&path)?;
            let export = Exporter::from_config(&config.export).export(&dataset, filter);

            if let Some(csv_path) = &csv {
                write_csv(csv_path, &export.rows)?;
            }
            if let Some(bib_path) = &bibtex {
                std::fs::write(bib_path, generate_bibliography(&export.citations))
                    .with_context(|| format!("writing {}", bib_path.display()))?;
            }

            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":export,"meta":{"duration_ms":dur}}))?;
            } else {
                if csv.is_none() && bibtex.is_none() {
                    let mut writer = csv::Writer::from_writer(io::stdout());
                    for row in &export.rows {
                        writer.serialize(row)?;
                    }
                    writer.flush()?;
                }
                eprintln!(
                    "{} records ({filter}): {} without DOI, {} with PubMed or arXiv id",
                    export.summary.selected, export.summary.missing_doi, export.summary.with_secondary
                );
            }
        }

        // ── Status ─────────────────────────────────────────────────────────
        Commands::Status { dataset: path } => {
            let dataset = load_dataset(&path)?;
            let progress = dataset.progress();
            let missing_doi = dataset
                .iter()
                .filter(|r| r.identifiers.doi().is_none())
                .count();
            let mut enrichment: std::collections::BTreeMap<String, [usize; 3]> =
                std::collections::BTreeMap::new();
            for record in dataset.iter() {
                for (kind, status) in &record.enrichment_status {
                    let slot = match status {
                        EnrichmentStatus::Found => 0,
                        EnrichmentStatus::NotFound => 1,
                        EnrichmentStatus::NotAttempted => 2,
                    };
                    enrichment.entry(kind.to_string()).or_default()[slot] += 1;
                }
            }

            let dur = start.elapsed().as_millis();
            if json_output {
                let enrichment: serde_json::Map<String, serde_json::Value> = enrichment
                    .iter()
                    .map(|(k, [found, not_found, pending])| {
                        (k.clone(), serde_json::json!({"found":found,"not_found":not_found,"not_attempted":pending}))
                    })
                    .collect();
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": {"progress": progress, "missing_doi": missing_doi, "enrichment": enrichment},
                    "meta": {"duration_ms": dur}
                }))?;
            } else {
                println!("{}", path.display());
                println!("  Records:     {}", progress.total);
                println!("  Selected:    {}", progress.selected);
                println!("  Rejected:    {}", progress.rejected);
                println!("  Unreviewed:  {}", progress.unreviewed);
                println!("  Missing DOI: {missing_doi}");
                for (kind, [found, not_found, pending]) in &enrichment {
                    println!("  Enrichment {kind}: {found} found, {not_found} not found, {pending} pending");
                }
            }
        }

        // ── Config ─────────────────────────────────────────────────────────
        Commands::Config { action } => {
            let dur = start.elapsed().as_millis();
            match action {
                ConfigAction::Show => {
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":config,"meta":{"duration_ms":dur}}))?;
                    } else {
                        print!("{}", toml::to_string_pretty(&config)?);
                    }
                }
                ConfigAction::Path => {
                    let path = AppConfig::config_path();
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":{"path":path,"exists":path.exists()},"meta":{"duration_ms":dur}}))?;
                    } else {
                        println!("{}", path.display());
                    }
                }
            }
        }
    }

    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn write_csv(path: &Path, rows: &[paperscope_science::ExportRow]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("writing {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = rows.len(), "link table written");
    Ok(())
}
