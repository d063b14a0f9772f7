//! Paginated listing plus batched detail fetch

use anyhow::{Context, Result};

use super::Query;
use crate::gmail::api::MessageDetail;
use crate::models::MessageId;
use crate::source::MessageSource;

/// Gmail accepts at most this many sub-requests per batch call
pub const MAX_BATCH_SIZE: usize = 100;

/// Fetch details for every message matching `query`
///
/// Pages are walked in order; page N+1 is only listed once all of page N's
/// details have arrived. An empty page ends the walk.
pub fn fetch_details<S: MessageSource + ?Sized>(
    source: &S,
    query: &Query,
) -> Result<Vec<MessageDetail>> {
    let mut details = Vec::new();
    let mut page_token: Option<String> = None;
    let mut page = 0usize;

    loop {
        page += 1;
        let response = source
            .list_messages(query.as_str(), page_token.as_deref())
            .with_context(|| format!("Failed to list page {} for query {:?}", page, query.as_str()))?;

        let ids: Vec<MessageId> = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| MessageId::new(m.id))
            .collect();

        if ids.is_empty() {
            break;
        }
        log::debug!("Page {}: {} candidate messages", page, ids.len());

        for chunk in ids.chunks(MAX_BATCH_SIZE) {
            let batch = source
                .get_messages_batch(chunk)
                .with_context(|| format!("Failed to fetch {} message details", chunk.len()))?;
            details.extend(batch);
        }

        match response.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(details)
}
