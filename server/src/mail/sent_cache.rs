use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::error::AppResult;

use super::MailClient;

/// In-memory view of recently sent mail, keyed by conversation id.
///
/// Lets reply detection run against one bulk fetch instead of a provider
/// call per waiting-for item. Staleness is the caller's concern: check
/// `is_stale` and `refresh` before reading when freshness matters.
pub struct SentItemsCache {
    mail: Arc<dyn MailClient>,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    last_sent: HashMap<String, DateTime<Utc>>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl SentItemsCache {
    pub fn new(mail: Arc<dyn MailClient>) -> Self {
        SentItemsCache {
            mail,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Rebuild the index from sent items within the last `hours`.
    pub async fn refresh(&self, hours: u32) -> AppResult<usize> {
        let since = Utc::now() - Duration::hours(hours as i64);
        let items = self.mail.get_sent_items(since).await?;

        let mut last_sent: HashMap<String, DateTime<Utc>> = HashMap::new();
        for item in items {
            last_sent
                .entry(item.conversation_id)
                .and_modify(|t| {
                    if item.sent_at > *t {
                        *t = item.sent_at;
                    }
                })
                .or_insert(item.sent_at);
        }

        let count = last_sent.len();
        let mut state = self.state.lock().unwrap();
        state.last_sent = last_sent;
        state.refreshed_at = Some(Utc::now());

        tracing::debug!(conversations = count, hours, "sent items cache refreshed");
        Ok(count)
    }

    pub fn has_replied(&self, conversation_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .last_sent
            .contains_key(conversation_id)
    }

    pub fn get_last_reply_time(&self, conversation_id: &str) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .unwrap()
            .last_sent
            .get(conversation_id)
            .copied()
    }

    /// True when the cache has never been filled or the last refresh is
    /// older than `max_age_minutes`.
    pub fn is_stale(&self, max_age_minutes: i64) -> bool {
        let state = self.state.lock().unwrap();
        match state.refreshed_at {
            None => true,
            Some(at) => Utc::now() - at > Duration::minutes(max_age_minutes),
        }
    }
}
