use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::{
    classifier::snippet::truncate_chars,
    conf::AppConfig,
    error::AppResult,
    store::Store,
};

pub const SENDER_HISTORY_LIMIT: u64 = 50;
pub const THREAD_CONTEXT_MESSAGES: u64 = 5;

/// A conversationIndex is a 22-byte header plus one 5-byte block per reply.
const INDEX_HEADER_BYTES: usize = 22;
const INDEX_BLOCK_BYTES: usize = 5;

/// Reply depth encoded in the opaque conversationIndex value. Unparseable
/// input counts as depth 0.
pub fn calculate_thread_depth(conversation_index: &str) -> u32 {
    let Ok(bytes) = BASE64.decode(conversation_index.trim()) else {
        return 0;
    };
    if bytes.len() <= INDEX_HEADER_BYTES {
        return 0;
    }
    ((bytes.len() - INDEX_HEADER_BYTES) / INDEX_BLOCK_BYTES) as u32
}

pub fn extract_domain(email: &str) -> Option<String> {
    email.rsplit_once('@').map(|(_, domain)| domain.to_lowercase())
}

#[derive(Debug, Clone)]
pub struct ThreadMessage {
    pub id: String,
    pub sender_email: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub snippet: Option<String>,
}

/// Folder distribution over a sender's recent classified mail.
#[derive(Debug, Clone)]
pub struct SenderHistory {
    pub total: usize,
    pub distribution: IndexMap<String, usize>,
}

impl SenderHistory {
    pub fn from_folders(folders: Vec<String>) -> Self {
        let total = folders.len();
        let mut distribution: IndexMap<String, usize> = IndexMap::new();
        for folder in folders {
            *distribution.entry(folder).or_insert(0) += 1;
        }
        distribution.sort_by(|_, a, _, b| b.cmp(a));
        SenderHistory {
            total,
            distribution,
        }
    }

    pub fn top_folder(&self) -> Option<(&str, usize)> {
        self.distribution
            .first()
            .map(|(folder, count)| (folder.as_str(), *count))
    }

    /// A sender qualifies as an auto-rule candidate once ten or more emails
    /// concentrate at least 90% into a single folder.
    pub fn is_auto_rule_candidate(&self) -> bool {
        match self.top_folder() {
            Some((_, top_count)) => {
                self.total >= 10 && top_count as f64 / self.total as f64 >= 0.90
            }
            None => false,
        }
    }

    pub fn format_for_prompt(&self) -> Option<String> {
        if self.total == 0 {
            return None;
        }
        let shares: Vec<String> = self
            .distribution
            .iter()
            .take(3)
            .map(|(folder, count)| {
                format!("{}% -> {}", (*count * 100) / self.total, folder)
            })
            .collect();
        Some(format!("{} prior emails ({})", self.total, shares.join(", ")))
    }
}

/// Assembled classification context for one email.
#[derive(Debug, Clone, Default)]
pub struct ThreadContext {
    pub thread_depth: u32,
    pub inherited_folder: Option<String>,
    pub messages: Vec<ThreadMessage>,
    pub sender_history: Option<SenderHistory>,
}

pub struct ThreadContextManager {
    store: Arc<Store>,
}

impl ThreadContextManager {
    pub fn new(store: Arc<Store>) -> Self {
        ThreadContextManager { store }
    }

    pub async fn build(
        &self,
        email: &entity::email::Model,
        cfg: &AppConfig,
    ) -> AppResult<ThreadContext> {
        let thread_depth = email
            .conversation_index
            .as_deref()
            .map(calculate_thread_depth)
            .unwrap_or(0);

        let mut inherited_folder = None;
        let mut messages = Vec::new();
        if let Some(conversation_id) = &email.conversation_id {
            inherited_folder = self
                .store
                .get_inherited_folder(conversation_id, email.received_at, &email.id)
                .await?;

            messages = self
                .store
                .get_thread_emails(conversation_id, Some(&email.id), THREAD_CONTEXT_MESSAGES)
                .await?
                .into_iter()
                .map(|m| ThreadMessage {
                    id: m.id,
                    sender_email: m.sender_email,
                    received_at: m.received_at,
                    snippet: m
                        .snippet
                        .map(|s| truncate_chars(&s, cfg.snippet.context_max_length)),
                })
                .collect();
        }

        let sender_history = match &email.sender_email {
            Some(sender) => {
                let folders = self
                    .store
                    .get_sender_folder_history(sender, SENDER_HISTORY_LIMIT)
                    .await?;
                if folders.is_empty() {
                    None
                } else {
                    Some(SenderHistory::from_folders(folders))
                }
            }
            None => None,
        };

        Ok(ThreadContext {
            thread_depth,
            inherited_folder,
            messages,
            sender_history,
        })
    }
}
