//! sqlite-pg-migrate CLI - SQLite to PostgreSQL data migration.

use clap::{Parser, Subcommand};
use sqlite_pg_migrate::{Config, MigrateError, Orchestrator, TableStatus};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlite-pg-migrate")]
#[command(about = "Schema-driven SQLite to PostgreSQL data migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override the source SQLite file
    #[arg(long, env = "SQLITE_PG_MIGRATE_SOURCE")]
    source: Option<String>,

    /// Override the target password
    #[arg(long, env = "SQLITE_PG_MIGRATE_TARGET_PASSWORD", hide_env_values = true)]
    target_password: Option<String>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate every selected table
    Run {
        /// Project and count rows without writing to the target
        #[arg(long)]
        dry_run: bool,

        /// Restrict the run to these tables (repeatable)
        #[arg(long = "table", value_name = "TABLE")]
        tables: Vec<String>,
    },

    /// Show table order and column plans without moving data
    Plan {
        /// Restrict the plan to these tables (repeatable)
        #[arg(long = "table", value_name = "TABLE")]
        tables: Vec<String>,
    },

    /// Compare row counts between source and target
    Compare,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    if let Some(path) = cli.source {
        config.source.path = path;
    }
    if let Some(password) = cli.target_password {
        config.target.password = password;
    }

    match cli.command {
        Commands::Run { dry_run, tables } => {
            if !tables.is_empty() {
                config.migration.tables = tables;
            }
            config.validate()?;

            let orchestrator = Orchestrator::new(config).await?;
            let report = tokio::select! {
                report = orchestrator.run(dry_run) => report?,
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("\nReceived Ctrl-C. Stopping; rerun to continue where this run left off.");
                    return Err(MigrateError::Cancelled);
                }
            };
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                let status_msg = if dry_run {
                    "Dry run completed!"
                } else {
                    "Migration completed!"
                };
                println!("\n{}", status_msg);
                println!("  Run ID: {}", report.run_id);
                println!("  Status: {}", report.status);
                println!("  Duration: {:.2}s", report.duration_seconds);
                println!("  Tables: {}", report.tables.len());
                println!("  Source rows: {}", report.total_source_rows);
                println!("  Inserted: {}", report.inserted);
                println!("  Duplicates: {}", report.duplicates);
                println!("  Skipped: {}", report.skipped);
                println!("  Failed: {}", report.failed);
                for table in &report.tables {
                    if let TableStatus::Skipped { reason } = &table.status {
                        println!("  {} skipped: {}", table.table, reason);
                    }
                    for line in table.reason_summary() {
                        println!("  {}: {}", table.table, line);
                    }
                }
                if !report.failed_tables.is_empty() {
                    println!("  Failed tables: {:?}", report.failed_tables);
                }
            }
        }

        Commands::Plan { tables } => {
            if !tables.is_empty() {
                config.migration.tables = tables;
            }
            config.validate()?;

            let orchestrator = Orchestrator::new(config).await?;
            let plan = orchestrator.plan().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                println!("Migration order: {}", plan.order.join(" -> "));
                for table in &plan.tables {
                    match &table.skip_reason {
                        Some(reason) => println!("\n{}: skipped ({})", table.table, reason),
                        None => println!("\n{} ({} source rows)", table.table, table.source_rows),
                    }
                    for column in &table.columns {
                        println!(
                            "  {:<24} {:<10} {}{}",
                            column.name,
                            column.target_type,
                            column.rule,
                            if column.not_null { " [required]" } else { "" }
                        );
                    }
                }
            }
        }

        Commands::Compare => {
            config.validate()?;
            let orchestrator = Orchestrator::new(config).await?;
            let results = orchestrator.compare().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!("Row count comparison:");
                for r in &results {
                    println!(
                        "  {} {}: source={} target={}",
                        if r.matches { "✓" } else { "✗" },
                        r.table,
                        r.source_rows,
                        r.target_rows
                    );
                }
            }
        }

        Commands::HealthCheck => {
            config.validate()?;
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.health_check().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (SQLite): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (PostgreSQL): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::connection(
                    "source or target",
                    "health check failed",
                ));
            }
        }
    }

    Ok(())
}

/// Logs go to stderr so `--output-json` keeps stdout parseable. `RUST_LOG`,
/// when set, overrides `--verbosity`.
fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
