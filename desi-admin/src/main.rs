//! DESI administration tool
//!
//! Usage:
//!   desi-admin import --report usage_report.enc --seeds seeds.json
//!   desi-admin generate-key --count 5
//!   desi-admin validate-key DESI-XXXXXXXX-YYYYYYYY-CCCC
//!   desi-admin serve --port 8080 --db collector.db

use std::{path::PathBuf, sync::Arc};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use desi_admin::{build_router, import_report, CandidateSeeds, CollectorStore};
use desi_crypto::{KdfParams, DEFAULT_ITERATIONS};
use desi_license::LicenseKey;
use desi_report::{ImportOptions, ImportOutcome, ImportRegistry};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "desi-admin")]
#[command(about = "DESI usage collector and report import tool")]
struct Args {
    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decrypt a customer report and record it in the import registry
    Import {
        /// Encrypted report file (.enc)
        #[arg(short, long)]
        report: PathBuf,

        /// JSON file with candidate license keys and machine ids
        #[arg(short, long)]
        seeds: PathBuf,

        /// Import registry database
        #[arg(long, default_value = "imports.db")]
        registry: PathBuf,

        /// Accept reports written by clients in degraded cipher mode
        #[arg(long)]
        allow_degraded: bool,

        /// PBKDF2 iterations the clients were configured with
        #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
        kdf_iterations: u32,
    },

    /// Generate new license keys
    GenerateKey {
        #[arg(short, long, default_value = "1")]
        count: usize,
    },

    /// Check a license key's format and checksum
    ValidateKey { key: String },

    /// Run the HTTP collector for pushed usage batches
    Serve {
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Collector database
        #[arg(long, default_value = "collector.db")]
        db: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    match args.command {
        Command::Import {
            report,
            seeds,
            registry,
            allow_degraded,
            kdf_iterations,
        } => {
            let seeds = CandidateSeeds::load(&seeds)
                .with_context(|| format!("Failed to read seed file {}", seeds.display()))?;
            let registry = ImportRegistry::open(&registry).context("Failed to open import registry")?;
            let summary = import_report(
                &report,
                &seeds,
                &registry,
                ImportOptions { allow_degraded },
                &KdfParams::with_iterations(kdf_iterations),
            )
            .with_context(|| format!("Failed to import {}", report.display()))?;

            let usage = &summary.decrypted.report;
            println!("License:    {}", usage.license_key);
            println!("Machine:    {}", usage.machine_id);
            println!("Period:     {} .. {}", usage.period.start, usage.period.end);
            println!("Records:    {}", usage.usage_stats.total_records);
            println!("Samples:    {}", usage.usage_stats.unique_samples);
            println!(
                "Integrity:  {} ({}/{} valid)",
                if usage.integrity.integrity_ok { "ok" } else { "FAILED" },
                usage.integrity.valid,
                usage.integrity.total
            );
            if summary.decrypted.degraded {
                println!("WARNING: report was not encrypted (degraded client)");
            }
            match summary.outcome {
                ImportOutcome::Imported(_) => println!("Imported."),
                ImportOutcome::Duplicate { first_imported_at, .. } => {
                    println!("Duplicate: already imported at {first_imported_at}");
                }
            }
        }
        Command::GenerateKey { count } => {
            for _ in 0..count {
                println!("{}", LicenseKey::generate());
            }
        }
        Command::ValidateKey { key } => match LicenseKey::parse(&key) {
            Ok(parsed) => println!("{parsed}: valid"),
            Err(e) => {
                println!("{}: invalid ({e})", key.trim());
                std::process::exit(1);
            }
        },
        Command::Serve { port, db } => {
            let store = Arc::new(
                CollectorStore::open(&db)
                    .with_context(|| format!("Failed to open collector db {}", db.display()))?,
            );
            let app = build_router(store);
            let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
                .await
                .context("Failed to bind HTTP port")?;
            info!("Collector listening on port {}", port);
            axum::serve(listener, app).await.context("HTTP server failed")?;
        }
    }
    Ok(())
}
