//! Gmail OAuth2 authentication
//!
//! Implements the installed-app authorization code flow. The browser is sent
//! to Google's consent page and a one-shot local HTTP listener receives the
//! redirect. Tokens are cached as JSON in the config directory and refreshed
//! before they expire.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};

use crate::config::GmailCredentials;

/// Anything able to hand out a bearer token for the Gmail API
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> Result<String>;
}

/// A fixed bearer token, e.g. one minted by another tool
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenSource for StaticToken {
    fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// OAuth2 client credentials plus on-disk token cache
pub struct GmailAuth {
    credentials: GmailCredentials,
    token_path: PathBuf,
}

/// Token as cached on disk
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    refresh_token: Option<String>,
    /// Unix seconds
    expires_at: Option<i64>,
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

impl GmailAuth {
    const AUTH_URL: &'static str = "https://accounts.google.com/o/oauth2/v2/auth";
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Read-only access is all the poller needs
    const GMAIL_READONLY_SCOPE: &'static str = "https://www.googleapis.com/auth/gmail.readonly";

    const TOKEN_FILE: &'static str = "gmail-tokens.json";

    /// Tokens closer than this to expiry are refreshed
    const EXPIRY_BUFFER_SECS: i64 = 300;

    const PORT_RANGE_START: u16 = 8080;
    const PORT_RANGE_END: u16 = 8090;

    /// Create an authenticator caching tokens in the config directory
    pub fn new(credentials: GmailCredentials) -> Result<Self> {
        let token_path =
            config::config_path(Self::TOKEN_FILE).context("Could not determine config directory")?;
        Ok(Self::with_token_path(credentials, token_path))
    }

    /// Create an authenticator caching tokens at an explicit path
    pub fn with_token_path(credentials: GmailCredentials, token_path: PathBuf) -> Self {
        Self {
            credentials,
            token_path,
        }
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Remove cached tokens
    pub fn logout(&self) -> Result<()> {
        if self.token_path.exists() {
            std::fs::remove_file(&self.token_path)
                .with_context(|| format!("Failed to remove {}", self.token_path.display()))?;
        }
        Ok(())
    }

    fn load_token(&self) -> Result<StoredToken> {
        config::load_json_file(&self.token_path)
    }

    fn store(&self, token: &TokenResponse) -> Result<()> {
        let stored = StoredToken {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token
                .expires_in
                .map(|secs| Utc::now().timestamp() + secs as i64),
        };
        config::save_json_file(&self.token_path, &stored)
    }

    /// Exchange a refresh token. `Ok(None)` when the grant was rejected and
    /// only a new interactive authorization can help.
    fn refresh(&self, refresh_token: &str) -> Result<Option<TokenResponse>> {
        let result = ureq::post(Self::TOKEN_URL).send_form([
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ]);
        let mut response = match result {
            Ok(response) => response,
            Err(e) if grant_rejected(&e) => {
                log::warn!("Refresh token rejected: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e).context("Failed to refresh access token"),
        };

        let mut token: TokenResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse refresh token response")?;

        // Google omits the refresh token on refresh; keep the old one
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(Some(token))
    }

    fn authorize_interactively(&self) -> Result<TokenResponse> {
        let (listener, port) = bind_callback_listener()?;
        let redirect_uri = format!("http://localhost:{}", port);

        let auth_url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            Self::AUTH_URL,
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(&redirect_uri),
            urlencoding::encode(Self::GMAIL_READONLY_SCOPE),
        );

        log::info!("Gmail authorization required, opening browser");
        log::info!("If the browser doesn't open, visit: {}", auth_url);
        if let Err(e) = open::that(&auth_url) {
            log::warn!("Failed to open browser: {}", e);
        }

        let code = wait_for_code(&listener)?;

        let mut response = ureq::post(Self::TOKEN_URL)
            .send_form([
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("code", code.as_str()),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .context("Failed to exchange authorization code")?;

        let token: TokenResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse token response")?;

        log::info!("Gmail authorization complete");
        Ok(token)
    }
}

impl TokenSource for GmailAuth {
    /// Cached token if fresh, else refreshed, else a new interactive grant
    ///
    /// Transient refresh failures are returned to the caller; only a grant
    /// the token endpoint rejects leads to the browser flow.
    fn access_token(&self) -> Result<String> {
        if let Ok(stored) = self.load_token() {
            if token_is_fresh(&stored, Utc::now().timestamp()) {
                return Ok(stored.access_token);
            }
            if let Some(refresh_token) = stored.refresh_token
                && let Some(token) = self.refresh(&refresh_token)?
            {
                self.store(&token)?;
                return Ok(token.access_token);
            }
        }

        let token = self.authorize_interactively()?;
        self.store(&token)?;
        Ok(token.access_token)
    }
}

fn token_is_fresh(token: &StoredToken, now: i64) -> bool {
    token
        .expires_at
        .is_some_and(|expires_at| expires_at > now + GmailAuth::EXPIRY_BUFFER_SECS)
}

/// The token endpoint answers 400 (`invalid_grant`) or 401 (`invalid_client`)
/// once the refresh token is no longer valid
fn grant_rejected(err: &ureq::Error) -> bool {
    matches!(err, ureq::Error::StatusCode(400 | 401))
}

fn bind_callback_listener() -> Result<(TcpListener, u16)> {
    (GmailAuth::PORT_RANGE_START..=GmailAuth::PORT_RANGE_END)
        .find_map(|port| {
            TcpListener::bind(("127.0.0.1", port))
                .ok()
                .map(|listener| (listener, port))
        })
        .with_context(|| {
            format!(
                "Could not bind to any port in range {}-{}",
                GmailAuth::PORT_RANGE_START,
                GmailAuth::PORT_RANGE_END
            )
        })
}

/// Accept the OAuth redirect and pull the `code` out of its request line
fn wait_for_code(listener: &TcpListener) -> Result<String> {
    let (mut stream, _) = listener.accept().context("Failed to accept connection")?;

    let mut request_line = String::new();
    BufReader::new(&stream)
        .read_line(&mut request_line)
        .context("Failed to read OAuth callback")?;

    let code = query_param(&request_line, "code");
    let error = query_param(&request_line, "error");

    let (status, body) = if code.is_some() {
        ("200 OK", "Authorization complete. You can close this window.")
    } else {
        ("400 Bad Request", "Authorization failed. Please try again.")
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n<html><body><h1>{}</h1></body></html>",
        status, body
    );
    stream.write_all(response.as_bytes()).ok();

    if let Some(err) = error {
        anyhow::bail!("OAuth error: {}", err);
    }
    code.context("No authorization code received")
}

/// Extract a query parameter from an HTTP request line (`GET /?a=b HTTP/1.1`)
fn query_param(request_line: &str, key: &str) -> Option<String> {
    let target = request_line.split_whitespace().nth(1)?;
    let (_, query) = target.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        if k == key {
            urlencoding::decode(v).ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> GmailCredentials {
        GmailCredentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
        }
    }

    #[test]
    fn test_query_param() {
        let line = "GET /?state=x&code=4%2F0Abc&scope=gmail HTTP/1.1\r\n";
        assert_eq!(query_param(line, "code").as_deref(), Some("4/0Abc"));
        assert_eq!(query_param(line, "error"), None);
        assert_eq!(query_param("GET / HTTP/1.1", "code"), None);
    }

    #[test]
    fn test_token_freshness() {
        let token = StoredToken {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_at: Some(10_000),
        };
        assert!(token_is_fresh(&token, 9_000));
        assert!(!token_is_fresh(&token, 9_800));

        let no_expiry = StoredToken {
            expires_at: None,
            ..token
        };
        assert!(!token_is_fresh(&no_expiry, 0));
    }

    #[test]
    fn test_cached_token_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let stored = StoredToken {
            access_token: "cached-token".to_string(),
            refresh_token: None,
            expires_at: Some(Utc::now().timestamp() + 3600),
        };
        config::save_json_file(&path, &stored).unwrap();

        let auth = GmailAuth::with_token_path(credentials(), path);
        assert_eq!(auth.access_token().unwrap(), "cached-token");
    }

    #[test]
    fn test_logout_removes_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, "{}").unwrap();

        let auth = GmailAuth::with_token_path(credentials(), path.clone());
        auth.logout().unwrap();
        assert!(!path.exists());
        auth.logout().unwrap();
    }

    #[test]
    fn test_only_rejected_grant_needs_reauthorization() {
        assert!(grant_rejected(&ureq::Error::StatusCode(400)));
        assert!(grant_rejected(&ureq::Error::StatusCode(401)));
        assert!(!grant_rejected(&ureq::Error::StatusCode(500)));
        assert!(!grant_rejected(&ureq::Error::StatusCode(503)));
        assert!(!grant_rejected(&ureq::Error::ConnectionFailed));
    }

    #[test]
    fn test_static_token() {
        assert_eq!(StaticToken("t".to_string()).access_token().unwrap(), "t");
    }
}
