//! mssql-mirror CLI - diff two SQL Server catalogs and write idempotent scripts.

use clap::{Parser, Subcommand};
use mssql_mirror::{Config, MirrorError, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "mssql-mirror")]
#[command(about = "Diff SQL Server catalogs and generate idempotent T-SQL scripts")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

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
    /// Load both catalogs and write the patch, create, seed, update and alter scripts
    Run {
        /// Override the output (and offline snapshot) directory
        #[arg(long)]
        output: Option<PathBuf>,

        /// Also write the source snapshot (model.json, data.json)
        #[arg(long)]
        dump: bool,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MirrorError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(MirrorError::Config)?;

    // Overrides must land before validation: --output can turn a source-less
    // config into a valid offline one.
    let content = std::fs::read_to_string(&cli.config)?;
    let mut config = Config::parse(&content)?;
    if let Commands::Run { output, dump } = &cli.command {
        if let Some(dir) = output {
            config.output.path = Some(dir.clone());
        }
        config.output.dump |= *dump;
    }
    config.validate()?;
    info!("Loaded configuration from {:?}", cli.config);

    let orchestrator = Orchestrator::new(config)?;

    match cli.command {
        Commands::Run { .. } => {
            let result = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("\nMirror completed!");
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!(
                    "  Source: {}{}",
                    result.source_database,
                    if result.offline { " (snapshot)" } else { "" }
                );
                println!("  Target: {}", result.target_database);
                for script in &result.scripts {
                    println!(
                        "  {}: {} batches -> {}",
                        script.phase,
                        script.batches,
                        script.path.display()
                    );
                }
                if let Some(dir) = &result.snapshot {
                    println!("  Snapshot: {}", dir.display());
                }
            }
        }

        Commands::HealthCheck => {
            let result = orchestrator.health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                match result.source_connected {
                    Some(connected) => println!(
                        "  Source: {} ({}ms)",
                        if connected { "OK" } else { "FAILED" },
                        result.source_latency_ms
                    ),
                    None => println!("  Source: offline snapshot"),
                }
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target: {} ({}ms)",
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
                return Err(MirrorError::load("health check", "one or more connections failed"));
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
