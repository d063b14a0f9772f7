//! Gmail API HTTP client
//!
//! Lists message ids matching a search query and fetches their details via
//! the batch endpoint. Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use std::time::Duration;

use super::api::{ListMessagesResponse, MessageDetail};
use super::batch;
use super::TokenSource;
use crate::models::MessageId;
use crate::source::MessageSource;

/// Gmail API client bound to one mailbox
pub struct GmailClient {
    tokens: Box<dyn TokenSource>,
    agent: ureq::Agent,
    mailbox: String,
    page_size: u32,
}

impl GmailClient {
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";
    const BATCH_URL: &'static str = "https://gmail.googleapis.com/batch/gmail/v1";
    const BATCH_BOUNDARY: &'static str = "mailpoll_batch";

    /// Only the fields the precision filter and records need
    pub const DETAIL_FIELDS: &'static str = "internalDate,id,snippet,payload/headers";

    pub const DEFAULT_PAGE_SIZE: u32 = 100;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a client for `mailbox` ("me" for the authorized user)
    pub fn new(tokens: impl TokenSource + 'static, mailbox: impl Into<String>) -> Self {
        Self {
            tokens: Box::new(tokens),
            agent: build_agent(Self::DEFAULT_TIMEOUT),
            mailbox: mailbox.into(),
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the listing page size (clamped to Gmail's 1-500)
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, 500);
        self
    }

    /// Set the overall timeout applied to every HTTP call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    fn list_url(&self, query: &str, page_token: Option<&str>) -> Result<url::Url> {
        let page_size = self.page_size.to_string();
        let mut url = url::Url::parse_with_params(
            &format!(
                "{}/users/{}/messages",
                Self::BASE_URL,
                urlencoding::encode(&self.mailbox)
            ),
            &[("q", query), ("maxResults", page_size.as_str())],
        )
        .context("Failed to build list messages URL")?;

        if let Some(token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", token);
        }
        Ok(url)
    }

    fn detail_path(&self, id: &MessageId) -> String {
        format!(
            "/gmail/v1/users/{}/messages/{}?fields={}",
            urlencoding::encode(&self.mailbox),
            urlencoding::encode(id.as_str()),
            Self::DETAIL_FIELDS
        )
    }
}

impl MessageSource for GmailClient {
    fn list_messages(&self, query: &str, page_token: Option<&str>) -> Result<ListMessagesResponse> {
        let access_token = self.tokens.access_token()?;
        let url = self.list_url(query, page_token)?;

        let mut response = self
            .agent
            .get(url.as_str())
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .context("Failed to send list messages request")?;

        let list: ListMessagesResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse list messages response")?;

        Ok(list)
    }

    fn get_messages_batch(&self, ids: &[MessageId]) -> Result<Vec<MessageDetail>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let access_token = self.tokens.access_token()?;
        let paths: Vec<String> = ids.iter().map(|id| self.detail_path(id)).collect();
        let body = batch::encode_request(Self::BATCH_BOUNDARY, &paths);

        let mut response = self
            .agent
            .post(Self::BATCH_URL)
            .header("Authorization", &format!("Bearer {}", access_token))
            .header(
                "Content-Type",
                &format!("multipart/mixed; boundary={}", Self::BATCH_BOUNDARY),
            )
            .send(body)
            .context("Failed to send batch request")?;

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let boundary = batch::boundary_from_content_type(&content_type)
            .with_context(|| format!("Batch response has no boundary: {:?}", content_type))?
            .to_string();

        let text = response
            .body_mut()
            .read_to_string()
            .context("Failed to read batch response")?;

        let parts = batch::decode_response(&boundary, &text)?;
        batch::ensure_success(&parts)?;

        parts
            .iter()
            .map(|part| {
                serde_json::from_str::<MessageDetail>(&part.body)
                    .context("Failed to parse message in batch response")
            })
            .collect()
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}
