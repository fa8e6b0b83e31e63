use std::sync::Arc;

use crate::{
    classifier::prompts::{ACTION_WAITING_FOR, PRIORITIES},
    conf::AppConfig,
    error::AppResult,
    mail::MailClient,
    store::Store,
};

pub const BOOTSTRAPPED_FLAG: &str = "categories_bootstrapped";

const CATEGORY_COLORS: [&str; 5] = ["preset0", "preset3", "preset4", "preset7", "preset9"];

#[derive(Debug, Clone, Copy, Default)]
pub struct BootstrapStats {
    pub categories_created: usize,
    pub emails_scanned: usize,
    pub senders_seen: usize,
}

/// Initial mailbox discovery: make sure the provider category taxonomy
/// exists, then sweep recent mail into the store so sender statistics and
/// auto-rule candidates have data to work from.
pub struct BootstrapEngine {
    store: Arc<Store>,
    mail: Arc<dyn MailClient>,
}

impl BootstrapEngine {
    pub fn new(store: Arc<Store>, mail: Arc<dyn MailClient>) -> Self {
        BootstrapEngine { store, mail }
    }

    pub async fn run(&self, cfg: &AppConfig, days: u32) -> AppResult<BootstrapStats> {
        let mut stats = BootstrapStats {
            categories_created: self.ensure_categories().await?,
            ..Default::default()
        };

        let delta = self.mail.get_delta(None, days * 24).await?;
        let mut senders = std::collections::HashSet::new();
        for message in delta.messages {
            let snippet = message
                .body_text
                .as_deref()
                .or(message.body_html.as_deref())
                .map(|body| {
                    crate::classifier::snippet::clean_snippet(
                        body,
                        message.body_html.is_some(),
                        cfg.snippet.max_length,
                    )
                });

            self.store
                .save_email(entity::email::Model {
                    id: message.id.clone(),
                    conversation_id: message.conversation_id.clone(),
                    conversation_index: message.conversation_index.clone(),
                    subject: message.subject.clone(),
                    sender_email: message.sender_email.clone(),
                    sender_name: message.sender_name.clone(),
                    received_at: message.received_at,
                    snippet,
                    current_folder: message.current_folder.clone(),
                    web_link: message.web_link.clone(),
                    importance: message.importance.clone(),
                    is_read: message.is_read,
                    flag_status: message.flag_status.clone(),
                    has_user_reply: false,
                    inherited_folder: None,
                    processed_at: None,
                    classification_json: None,
                    classification_attempts: 0,
                    classification_status:
                        entity::sea_orm_active_enums::ClassificationStatus::Pending,
                })
                .await?;
            stats.emails_scanned += 1;

            if let Some(sender) = &message.sender_email {
                self.store
                    .record_sender_observation(sender, message.sender_name.as_deref())
                    .await?;
                senders.insert(sender.clone());
            }
        }
        stats.senders_seen = senders.len();

        self.store
            .log_action(
                "bootstrap",
                None,
                Some(serde_json::json!({
                    "days": days,
                    "emails_scanned": stats.emails_scanned,
                    "senders_seen": stats.senders_seen,
                })),
                Some("bootstrap"),
            )
            .await?;

        tracing::info!(
            emails = stats.emails_scanned,
            senders = stats.senders_seen,
            categories_created = stats.categories_created,
            "bootstrap sweep complete"
        );

        Ok(stats)
    }

    /// Create the priority and waiting-for categories that are missing from
    /// the provider's master list. Safe to re-run.
    async fn ensure_categories(&self) -> AppResult<usize> {
        if self.store.get_state(BOOTSTRAPPED_FLAG).await?.as_deref() == Some("true") {
            return Ok(0);
        }

        let existing = self.mail.list_categories().await?;
        let wanted = PRIORITIES
            .iter()
            .copied()
            .chain(std::iter::once(ACTION_WAITING_FOR));

        let mut created = 0;
        for (i, name) in wanted.enumerate() {
            if existing.iter().any(|c| c == name) {
                continue;
            }
            let color = CATEGORY_COLORS[i % CATEGORY_COLORS.len()];
            self.mail.create_category(name, color).await?;
            created += 1;
        }

        self.store.set_state(BOOTSTRAPPED_FLAG, "true").await?;
        Ok(created)
    }
}
