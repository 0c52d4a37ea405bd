//! `stepchain`: run the admin page bootstrap against a pool server.
//!
//! Loads the configured script batches, fetches the page models, and exits
//! non-zero with the collected error log if the chain stalls.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use stepchain_admin::{AdminApp, AdminSession};
use stepchain_config::BootConfig;
use stepchain_loader::ResourceLoader;
use stepchain_sequencer::{ChainEnv, ChainOutcome};
use stepchain_types::{ErrorLog, ReportSink};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const USAGE: &str = "usage: stepchain [--config PATH]";

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

enum Command {
    Run { config: Option<PathBuf> },
    Help,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Command> {
    let mut config = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-c" | "--config" => {
                let Some(path) = args.next() else {
                    bail!("--config needs a path\n{USAGE}");
                };
                config = Some(PathBuf::from(path));
            }
            other => bail!("unexpected argument '{other}'\n{USAGE}"),
        }
    }
    Ok(Command::Run { config })
}

fn load_config(explicit: Option<PathBuf>) -> Result<BootConfig> {
    if let Some(path) = explicit {
        let config = BootConfig::from_path(&path)
            .with_context(|| format!("loading config from {}", path.display()))?;
        tracing::info!(path = %path.display(), "Loaded config");
        return Ok(config);
    }

    match BootConfig::load().context("loading config")? {
        Some((config, path)) => {
            tracing::info!(path = %path.display(), "Loaded config");
            Ok(config)
        }
        None => {
            tracing::info!("No config file found, using defaults");
            Ok(BootConfig::default())
        }
    }
}

async fn boot(config: &BootConfig) -> Result<ExitCode> {
    let base = config.base_url().context("invalid server.base_url")?;
    let loader = ResourceLoader::with_timeout(base.clone(), config.loader.timeout())
        .context("building resource loader")?;
    let app = AdminApp::from_config(config).context("building admin app")?;

    let log = Arc::new(ErrorLog::new());
    let sink: Arc<dyn ReportSink> = log.clone();
    let env = ChainEnv::new(sink).with_loader(Arc::new(loader));

    tracing::info!(base = %base, "Bootstrapping admin page");
    match app.run_ui().execute(&env).await {
        ChainOutcome::Completed { steps } => {
            let Some(session) = env.context().get::<AdminSession>(AdminSession::KEY) else {
                bail!("bootstrap completed without a session");
            };
            println!(
                "ready after {steps} steps: {} devices, {} pxe configs",
                session.devices.devices.len(),
                session.pxe_configs.names.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        ChainOutcome::Stalled { step, abandoned } => {
            eprintln!(
                "bootstrap stalled at step {} ({})",
                step + 1,
                abandoned.join(", ")
            );
            if log.is_visible() {
                eprintln!("{}", log.render());
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();

    match parse_args(env::args().skip(1))? {
        Command::Help => {
            println!("{USAGE}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { config } => {
            let config = load_config(config)?;
            boot(&config).await
        }
    }
}
