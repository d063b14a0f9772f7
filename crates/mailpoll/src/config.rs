//! Configuration loading
//!
//! OAuth credentials are loaded from (in order of priority):
//! 1. Compile-time embedded credentials (for release builds)
//! 2. JSON file (Google Cloud Console format) in the config directory
//! 3. Runtime environment variables (fallback)
//!
//! Poll tuning comes from `poll.json` in the config directory; every field
//! is optional.

use anyhow::{Context, Result};
use chrono::{Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::poll::{BoundaryMode, PollSettings};

/// Credentials filename in the config directory
const CREDENTIALS_FILE: &str = "google-credentials.json";

/// Poll settings filename in the config directory
const POLL_CONFIG_FILE: &str = "poll.json";

/// OAuth credentials for Gmail API access
#[derive(Debug, Clone)]
pub struct GmailCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Google Cloud Console credential file format
#[derive(Deserialize)]
struct GoogleCredentialFile {
    installed: Option<InstalledCredentials>,
    web: Option<InstalledCredentials>,
}

#[derive(Deserialize)]
struct InstalledCredentials {
    client_id: String,
    client_secret: String,
}

impl GmailCredentials {
    /// Load credentials: compile-time, then config file, then environment
    pub fn load() -> Result<Self> {
        if let Some(creds) = Self::from_compile_time() {
            return Ok(creds);
        }

        if config::config_exists(CREDENTIALS_FILE) {
            let creds: GoogleCredentialFile = config::load_json(CREDENTIALS_FILE)?;
            return Self::from_credential_file(creds);
        }

        Self::from_env()
    }

    /// Credentials embedded at build time via `GOOGLE_CLIENT_ID` and
    /// `GOOGLE_CLIENT_SECRET`
    pub fn from_compile_time() -> Option<Self> {
        let client_id = option_env!("GOOGLE_CLIENT_ID")?;
        let client_secret = option_env!("GOOGLE_CLIENT_SECRET")?;

        if client_id.is_empty() || client_secret.is_empty() {
            return None;
        }

        Some(Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let creds: GoogleCredentialFile = config::load_json_file(path)?;
        Self::from_credential_file(creds)
    }

    fn from_credential_file(creds: GoogleCredentialFile) -> Result<Self> {
        let installed = creds
            .installed
            .or(creds.web)
            .context("Credentials file missing 'installed' or 'web' section")?;

        Ok(Self {
            client_id: installed.client_id,
            client_secret: installed.client_secret,
        })
    }

    /// Load credentials from `GMAIL_CLIENT_ID` / `GMAIL_CLIENT_SECRET`
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GMAIL_CLIENT_ID")
            .context("GMAIL_CLIENT_ID environment variable not set")?;
        let client_secret = std::env::var("GMAIL_CLIENT_SECRET")
            .context("GMAIL_CLIENT_SECRET environment variable not set")?;

        Ok(Self {
            client_id,
            client_secret,
        })
    }

    /// Default credentials file path
    pub fn default_credentials_path() -> Option<PathBuf> {
        config::config_path(CREDENTIALS_FILE)
    }
}

/// Poll tuning as stored in `poll.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Gmail user id; "me" is the authorized account
    pub mailbox: String,
    /// Offset of the zone Gmail uses for `after:`/`before:` dates
    pub utc_offset_minutes: i32,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Ids per listing page (1-500)
    pub page_size: u32,
    pub http_timeout_secs: u64,
    pub boundary_mode: BoundaryMode,
}

impl Default for PollConfig {
    fn default() -> Self {
        let settings = PollSettings::default();
        Self {
            mailbox: "me".to_string(),
            utc_offset_minutes: 0,
            max_retries: settings.max_retries,
            retry_backoff_ms: settings.retry_backoff.num_milliseconds() as u64,
            page_size: 100,
            http_timeout_secs: 30,
            boundary_mode: settings.boundary_mode,
        }
    }
}

impl PollConfig {
    /// Load `poll.json` from the config directory, defaults if absent
    pub fn load() -> Result<Self> {
        config::load_json_or_default(POLL_CONFIG_FILE)
    }

    /// Zone for day quantization
    pub fn zone(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).with_context(|| {
            format!("UTC offset out of range: {} minutes", self.utc_offset_minutes)
        })
    }

    pub fn settings(&self) -> PollSettings {
        PollSettings {
            boundary_mode: self.boundary_mode,
            max_retries: self.max_retries,
            retry_backoff: Duration::milliseconds(
                i64::try_from(self.retry_backoff_ms).unwrap_or(i64::MAX),
            ),
        }
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_secs)
    }
}
