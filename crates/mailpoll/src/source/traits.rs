//! Message source trait definition

use crate::gmail::api::{ListMessagesResponse, MessageDetail};
use crate::models::MessageId;
use anyhow::Result;

/// A paginated, searchable message index
///
/// Implementations are stateless from the caller's point of view: every call
/// is an independent request.
pub trait MessageSource {
    /// List ids matching a Gmail search `query`, one page at a time
    fn list_messages(&self, query: &str, page_token: Option<&str>) -> Result<ListMessagesResponse>;

    /// Fetch timestamp, snippet and headers for `ids` in one round-trip.
    /// Result order need not match `ids`.
    fn get_messages_batch(&self, ids: &[MessageId]) -> Result<Vec<MessageDetail>>;
}

impl<S: MessageSource + ?Sized> MessageSource for &S {
    fn list_messages(&self, query: &str, page_token: Option<&str>) -> Result<ListMessagesResponse> {
        (**self).list_messages(query, page_token)
    }

    fn get_messages_batch(&self, ids: &[MessageId]) -> Result<Vec<MessageDetail>> {
        (**self).get_messages_batch(ids)
    }
}

impl<S: MessageSource + ?Sized> MessageSource for Box<S> {
    fn list_messages(&self, query: &str, page_token: Option<&str>) -> Result<ListMessagesResponse> {
        (**self).list_messages(query, page_token)
    }

    fn get_messages_batch(&self, ids: &[MessageId]) -> Result<Vec<MessageDetail>> {
        (**self).get_messages_batch(ids)
    }
}
