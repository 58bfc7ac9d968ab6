//! credcache - interactive shell over an in-memory credential cache
//!
//! Secrets are prompted without echo, encrypted into the session cache and
//! consumed on retrieval. Host lock and idle events can be simulated with the
//! `lock`, `idle` and `active` commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tracing::info;

use credcache_cli::{Shell, TerminalPrompt};
use credential_cache::{CredentialSession, SettingsManager};

/// Credential cache shell
#[derive(Parser, Debug)]
#[command(name = "credcache")]
#[command(version)]
#[command(about = "Interactive shell for the encrypted credential cache")]
struct Args {
    /// Directory holding settings.json
    #[arg(long, env = "CREDCACHE_SETTINGS_DIR")]
    settings_dir: Option<PathBuf>,

    /// Clear the cache when the host reports idle, not only on lock.
    /// `--clear-on-idle false` turns off a saved setting.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    clear_on_idle: Option<bool>,

    /// Clear after this many minutes without host activity (0 = never)
    #[arg(long)]
    auto_clear_minutes: Option<u32>,

    /// Persist the command-line overrides to the settings file
    #[arg(long)]
    save: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Log to stderr so shell replies on stdout stay readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let settings_dir = args
        .settings_dir
        .or_else(SettingsManager::default_dir)
        .context("Could not determine a settings directory; pass --settings-dir")?;
    let mut manager = SettingsManager::new(&settings_dir)
        .with_context(|| format!("Failed to load settings from {:?}", settings_dir))?;

    let mut settings = manager.get().clone();
    if let Some(clear_on_idle) = args.clear_on_idle {
        settings.clear_on_idle = clear_on_idle;
    }
    if let Some(minutes) = args.auto_clear_minutes {
        settings.auto_clear_timeout_minutes = minutes;
    }
    settings.validate()?;

    if args.save {
        manager.update(settings.clone()).await?;
        info!("Saved settings to {:?}", settings_dir);
    }

    let session = CredentialSession::open(&settings)?;
    info!(
        "Session {} ready (clear on idle: {}, auto-clear: {} min). Type `help` for commands.",
        session.id(),
        settings.clear_on_idle,
        settings.auto_clear_timeout_minutes
    );

    let shell = Shell::new(session, Arc::new(TerminalPrompt));
    shell
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
}
