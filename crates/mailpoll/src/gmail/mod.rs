//! Gmail API integration
//!
//! This module provides:
//! - OAuth2 authentication and the [`TokenSource`] abstraction
//! - Gmail API client for listing and batch-fetching messages
//! - The multipart codec used by the batch endpoint

mod auth;
pub mod batch;
mod client;

pub use auth::{GmailAuth, StaticToken, TokenSource};
pub use client::GmailClient;

/// Gmail API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Response from listing messages
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListMessagesResponse {
        pub messages: Option<Vec<MessageRef>>,
        pub next_page_token: Option<String>,
        pub result_size_estimate: Option<u32>,
    }

    /// Reference to a message (just ID and thread ID)
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
        #[serde(default)]
        pub thread_id: String,
    }

    /// Partial message as returned with
    /// `fields=internalDate,id,snippet,payload/headers`
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageDetail {
        pub id: String,
        /// Milliseconds since the epoch, as a decimal string
        pub internal_date: String,
        #[serde(default)]
        pub snippet: String,
        pub payload: Option<MessagePayload>,
    }

    /// Message payload, reduced to its headers
    #[derive(Debug, Clone, Deserialize)]
    pub struct MessagePayload {
        pub headers: Option<Vec<Header>>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Clone, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    impl MessageDetail {
        /// Build a detail with no snippet or headers
        pub fn new(id: impl Into<String>, internal_date_ms: i64) -> Self {
            Self {
                id: id.into(),
                internal_date: internal_date_ms.to_string(),
                snippet: String::new(),
                payload: None,
            }
        }

        pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
            self.snippet = snippet.into();
            self
        }

        pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
            let payload = self.payload.get_or_insert(MessagePayload { headers: None });
            payload.headers.get_or_insert_with(Vec::new).push(Header {
                name: name.into(),
                value: value.into(),
            });
            self
        }

        /// Value of the first header named exactly `name`
        pub fn header(&self, name: &str) -> Option<&str> {
            self.payload
                .as_ref()?
                .headers
                .as_ref()?
                .iter()
                .find(|h| h.name == name)
                .map(|h| h.value.as_str())
        }
    }

}
