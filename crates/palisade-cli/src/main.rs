//! Palisade CLI - exercise a policy without a host
//!
//! Usage:
//!   palisade check lodash/fp              Evaluate a module specifier
//!   palisade --config policy.json check x Evaluate against a policy file
//!   palisade path ~/.ssh/id_rsa           Ask the file shield about a path
//!   palisade host 169.254.169.254         Ask the network shield about a host
//!   palisade similar lodahs               Run the typosquat check
//!
//! Exits 0 when the request would be allowed and 2 when it would be blocked.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use palisade::policy::{PolicyEngine, PolicyHandler, ResolveContext, root_package_name};
use palisade::shield::{FileRules, NetworkRules};
use palisade::{Action, PolicyConfiguration, SimilarityResult, check_typosquat, load_config};

const BLOCKED: u8 = 2;

/// Palisade - evaluate module, file and network requests against a policy
#[derive(Parser, Debug)]
#[command(name = "palisade")]
#[command(about = "Evaluate requests against a Palisade policy")]
struct Args {
    /// JSON policy document (nested or flat shape)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a module specifier
    Check {
        /// Specifier as written in the import
        specifier: String,
        /// File doing the import
        #[arg(long)]
        parent: Option<PathBuf>,
    },
    /// Check a path against the file shield
    Path {
        /// Path to check
        path: PathBuf,
    },
    /// Check a host or address against the network shield
    Host {
        /// Hostname or IP literal
        host: String,
    },
    /// Compare a package name against popular packages
    Similar {
        /// Package name
        name: String,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let args = Args::parse();

    let blocked = match args.command {
        Command::Check { specifier, parent } => {
            let config = match &args.config {
                Some(path) => load_config(path)
                    .with_context(|| format!("failed to load policy {}", path.display()))?,
                None => PolicyConfiguration::default(),
            };
            let engine = PolicyEngine::new(config)?;
            let context = ResolveContext { parent };
            let decision = engine.evaluate(&specifier, &context);

            println!("{:?}: {}", decision.action, decision.reason());
            if decision.action == Action::Analyze
                && let Some(warning) = similar_packages(&specifier).warning
            {
                println!("warning: {}", warning);
            }
            decision.is_blocked()
        }
        Command::Path { path } => {
            let blocked = FileRules::default().is_blocked_path(&path);
            println!("{}: {}", path.display(), verdict(blocked));
            blocked
        }
        Command::Host { host } => {
            let blocked = NetworkRules::default().is_blocked_address(&host);
            println!("{}: {}", host, verdict(blocked));
            blocked
        }
        Command::Similar { name } => {
            let result = similar_packages(&name);
            for (known, distance) in &result.matches {
                println!("{} (distance {})", known, distance);
            }
            if let Some(warning) = &result.warning {
                println!("warning: {}", warning);
            }
            result.is_suspicious
        }
    };

    tracing::debug!(blocked, "done");
    Ok(if blocked {
        ExitCode::from(BLOCKED)
    } else {
        ExitCode::SUCCESS
    })
}

/// Compare the package a specifier names, not its subpath.
fn similar_packages(specifier: &str) -> SimilarityResult {
    check_typosquat(root_package_name(specifier))
}

fn verdict(blocked: bool) -> &'static str {
    if blocked { "blocked" } else { "allowed" }
}
