//! mailtail - stream Gmail messages in a time range as JSON lines
//!
//! With a range that ends in the past, prints every message in it once and
//! exits. With `--to end` (or a future end) keeps polling and prints new
//! messages as they arrive.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{error, info, warn};
use mailpoll::{
    GmailAuth, GmailClient, GmailCredentials, PollConfig, StaticToken, SystemClock, WindowPoller,
};
use std::path::Path;
use std::process::ExitCode;

mod cli;
mod output;

use cli::Cli;
use output::JsonLinesSink;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Err(e) = config::init() {
        warn!("Failed to initialize config directory: {:#}", e);
    }

    if cli.logout {
        let auth = GmailAuth::new(load_credentials(cli.credentials.as_deref())?)?;
        auth.logout()?;
        info!("Removed cached tokens at {}", auth.token_path().display());
        return Ok(());
    }

    let mut poll_config = PollConfig::load().context("Failed to load poll configuration")?;
    cli.apply_overrides(&mut poll_config);

    let now = Utc::now();
    let plan = cli.read_options(now).resolve(now)?;
    let zone = poll_config.zone()?;
    info!(
        "Reading {} to {:?} (day boundaries at UTC{})",
        plan.range.from, plan.range.to, zone
    );

    let client = match &cli.token {
        Some(token) => GmailClient::new(StaticToken(token.clone()), poll_config.mailbox.clone()),
        None => GmailClient::new(
            GmailAuth::new(load_credentials(cli.credentials.as_deref())?)?,
            poll_config.mailbox.clone(),
        ),
    }
    .with_page_size(poll_config.page_size)
    .with_timeout(poll_config.http_timeout());

    let poller = WindowPoller::for_plan(client, zone, &plan).with_settings(poll_config.settings());

    let mut sink = JsonLinesSink::new(std::io::stdout().lock());
    let stats = poller.run(plan.initial_state(), &SystemClock, &mut sink)?;

    info!(
        "Done: {} records in {} batches over {} polls ({} retries, {}ms)",
        stats.records_emitted,
        stats.batches_emitted,
        stats.cycles,
        stats.retries,
        stats.duration_ms
    );
    Ok(())
}

fn load_credentials(path: Option<&Path>) -> Result<GmailCredentials> {
    if let Some(path) = path {
        return GmailCredentials::from_file(path)
            .with_context(|| format!("Failed to load credentials from {}", path.display()));
    }

    GmailCredentials::load().with_context(|| {
        let path = GmailCredentials::default_credentials_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "google-credentials.json".to_string());
        format!(
            "Gmail credentials not found. Place OAuth credentials at {} \
             or set GMAIL_CLIENT_ID and GMAIL_CLIENT_SECRET",
            path
        )
    })
}
