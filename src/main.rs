//! # kbctl
//!
//! Command-line front end for the knowledge base orchestrator.
//!
//! ## Usage
//!
//! ```bash
//! kbctl --config ./config/kb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbctl validate` | Parse and validate the configuration only |
//! | `kbctl provision` | Create or adopt every resource |
//! | `kbctl ingest` | Run one sync job per connector |
//! | `kbctl id` | Print the knowledge base and connector identifiers |
//! | `kbctl upload <dir>` | Upload local documents into a bucket |
//! | `kbctl teardown` | Delete the deployment in reverse order |
//! | `kbctl completions <shell>` | Print a shell completion script |
//!
//! Step status goes to stderr; results go to stdout.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use kb_orchestrator::clients::Clients;
use kb_orchestrator::config::{self, Config};
use kb_orchestrator::memory::{MemoryCloud, MEMORY_REGION};
use kb_orchestrator::models::IngestionStatus;
use kb_orchestrator::progress::ProgressMode;
use kb_orchestrator::retry::RecordingSleeper;
use kb_orchestrator::{Orchestrator, ResourceSpec, TeardownOptions};

/// Provision, ingest into, and tear down a managed retrieval knowledge base.
///
/// All commands read a TOML configuration file. See
/// `config/kb.example.toml` for every option.
#[derive(Parser)]
#[command(name = "kbctl", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kb.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Step status on stderr. Defaults to human output when stderr is a terminal.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressArg>,

    /// Run against an in-memory provider instead of the cloud.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Auto,
    Human,
    Json,
    Off,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate the configuration without any remote call.
    Validate,

    /// Create or adopt every resource the knowledge base needs.
    ///
    /// Safe to re-run: existing resources are adopted by name.
    Provision {
        /// Print the full deployment as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start one ingestion job per connector and wait for each to finish.
    Ingest {
        #[arg(long)]
        json: bool,
    },

    /// Print the knowledge base and connector identifiers.
    Id {
        #[arg(long)]
        json: bool,
    },

    /// Upload a local directory into a bucket.
    Upload {
        /// Directory to upload. Keys are paths relative to it.
        dir: PathBuf,

        /// Target bucket. Defaults to the first OBJECT_STORE source.
        #[arg(long)]
        bucket: Option<String>,

        /// Glob of files to include (repeatable). Defaults to everything.
        #[arg(long)]
        include: Vec<String>,

        /// Glob of files to skip (repeatable).
        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Delete the deployment. Connectors and the knowledge base are always
    /// removed; the flags select what else goes.
    Teardown {
        /// Empty and delete the source and intermediate buckets.
        #[arg(long)]
        delete_storage: bool,

        /// Keep the log group and log delivery.
        #[arg(long)]
        keep_log_group: bool,

        /// Keep the execution role and its policies.
        #[arg(long)]
        keep_identity: bool,

        /// Keep the vector collection or graph.
        #[arg(long)]
        keep_index: bool,

        /// Delete a packaged transform function and its role.
        #[arg(long)]
        delete_transform: bool,

        #[arg(long)]
        json: bool,
    },

    /// Print a shell completion script.
    Completions {
        shell: Shell,
    },
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match cli.verbose {
        0 => "kb_orchestrator=info,kbctl=info",
        1 => "kb_orchestrator=debug,kbctl=debug",
        _ => "kb_orchestrator=trace,kbctl=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(io::stderr)
                .init();
        }
    }
}

fn progress_mode(arg: Option<ProgressArg>) -> ProgressMode {
    match arg {
        None | Some(ProgressArg::Auto) => ProgressMode::default_for_tty(),
        Some(ProgressArg::Human) => ProgressMode::Human,
        Some(ProgressArg::Json) => ProgressMode::Json,
        Some(ProgressArg::Off) => ProgressMode::Off,
    }
}

async fn build(cli: &Cli, cfg: &Config, spec: ResourceSpec) -> Result<Orchestrator> {
    let reporter = progress_mode(cli.progress).reporter();
    let orchestrator = if cli.dry_run {
        tracing::info!("dry run: using the in-memory provider");
        Orchestrator::with_clients(
            Clients::from_provider(Arc::new(MemoryCloud::new())),
            MEMORY_REGION,
            cfg,
            spec,
            Arc::new(RecordingSleeper::new()),
            reporter,
        )
        .await?
    } else {
        Orchestrator::connect(cfg, spec, reporter).await?
    };
    Ok(orchestrator)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "kbctl", &mut io::stdout());
        return Ok(());
    }

    init_tracing(&cli);

    let cfg = config::load_config(&cli.config)?;
    let spec = ResourceSpec::from_config(&cfg)
        .with_context(|| format!("Invalid configuration in {}", cli.config.display()))?;

    if let Commands::Validate = &cli.command {
        println!(
            "Configuration OK: knowledge base '{}', backend {}, {} data source(s), dimension {}.",
            spec.name(),
            spec.backend(),
            spec.data_sources().len(),
            spec.dimension()
        );
        return Ok(());
    }

    let orchestrator = build(&cli, &cfg, spec).await?;

    match cli.command {
        Commands::Validate | Commands::Completions { .. } => {}
        Commands::Provision { json } => {
            let deployment = orchestrator.provision().await?;
            if json {
                print_json(&deployment)?;
            } else {
                println!("Knowledge base: {}", deployment.entity.id);
                println!("ARN:            {}", deployment.entity.arn);
                println!("Role:           {}", deployment.identity.role_arn);
                if !deployment.buckets.is_empty() {
                    println!("Buckets:        {}", deployment.buckets.join(", "));
                }
                for connector in &deployment.entity.connectors {
                    println!("Connector:      {} ({})", connector.name, connector.id);
                }
                for warning in &deployment.warnings {
                    println!("Warning:        {}", warning);
                }
            }
        }
        Commands::Ingest { json } => {
            let results = orchestrator.run_ingestion().await?;
            if json {
                print_json(&results)?;
            } else {
                for r in &results {
                    let status = r.status.map(|s| s.as_str()).unwrap_or("NOT_STARTED");
                    match &r.error {
                        Some(e) => println!("{}: {} ({})", r.connector_name, status, e),
                        None => println!("{}: {}", r.connector_name, status),
                    }
                }
            }
            let failed = results
                .iter()
                .filter(|r| r.status != Some(IngestionStatus::Complete))
                .count();
            if failed > 0 {
                bail!("{} of {} ingestion job(s) did not complete", failed, results.len());
            }
        }
        Commands::Id { json } => {
            let ids = orchestrator.get_identifier().await?;
            if json {
                print_json(&ids)?;
            } else {
                println!("{}", ids.knowledge_base_id);
            }
        }
        Commands::Upload {
            dir,
            bucket,
            include,
            exclude,
        } => {
            let summary = orchestrator
                .upload_documents(&dir, bucket.as_deref(), &include, &exclude)
                .await?;
            println!(
                "Uploaded {} file(s) to s3://{}",
                summary.keys.len(),
                summary.bucket
            );
        }
        Commands::Teardown {
            delete_storage,
            keep_log_group,
            keep_identity,
            keep_index,
            delete_transform,
            json,
        } => {
            let options = TeardownOptions {
                delete_storage,
                delete_log_group: !keep_log_group,
                delete_identity: !keep_identity,
                delete_index: !keep_index,
                delete_transform,
            };
            let report = orchestrator.teardown(options).await;
            if json {
                print_json(&report)?;
            } else {
                for record in &report.steps {
                    println!("{:<10} {}", record.outcome.label(), record.step);
                }
            }
            let failures = report.failures().count();
            if failures > 0 {
                bail!("teardown finished with {} failed step(s); re-run to retry", failures);
            }
        }
    }

    Ok(())
}
