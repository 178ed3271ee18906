//! # Stampede CLI
//!
//! Command-line runner for stampede load scenarios.
//!
//! ## Usage
//!
//! ```bash
//! # list the stock scenarios
//! stampede list
//!
//! # run the ten-key race burst against a local target
//! stampede run burst-key-pool --base-url http://localhost:8080 \
//!     --email op@example.com --password secret
//!
//! # credentials from a local override file, summary to JSON
//! stampede run conflict-payload --env-file env/local.json -o results.json
//! ```
//!
//! The exit code reflects the threshold verdict: 0 when every declared
//! threshold passes, 1 otherwise.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use stampede_core::{presets, EnvFile, Runner, TargetEnv};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "stampede")]
#[command(version)]
#[command(about = "Idempotency-key load harness", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario against the target
    Run {
        /// Scenario preset name (see `stampede list`)
        scenario: String,

        /// Target base URL
        #[arg(long, env = "STAMPEDE_BASE_URL")]
        base_url: Option<String>,

        /// Login email for the setup call
        #[arg(long, env = "STAMPEDE_EMAIL")]
        email: Option<String>,

        /// Login password for the setup call
        #[arg(long, env = "STAMPEDE_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// JSON override file with BASE / EMAIL / PASSWORD
        #[arg(long)]
        env_file: Option<PathBuf>,

        /// Write the run summary as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List available scenario presets
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::List => {
            println!("{:<20} {}", "NAME", "SUMMARY");
            for spec in presets::all() {
                println!("{:<20} {}", spec.name, spec.summary);
            }
        }
        Commands::Run {
            scenario,
            base_url,
            email,
            password,
            env_file,
            output,
        } => {
            let file = env_file
                .as_deref()
                .map(EnvFile::load)
                .transpose()
                .context("loading env file")?;
            let env = TargetEnv::resolve(file, base_url, email, password)?;
            let spec = presets::by_name(&scenario)?;

            info!(scenario = %spec.name, target = %env.base_url, "starting run");

            let runner = Runner::new(spec.clone(), env)?;
            let summary = runner.run().await?;

            summary.print_report();
            let report = summary.evaluate(&spec.thresholds);
            report.print_report();

            if let Some(path) = output {
                let json = serde_json::to_string_pretty(&summary)
                    .context("serializing run summary")?;
                std::fs::write(&path, json)
                    .with_context(|| format!("writing {}", path.display()))?;
                info!("results saved to {}", path.display());
            }

            if !report.passed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
