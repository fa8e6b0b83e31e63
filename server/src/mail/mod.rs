pub mod client;
pub mod sent_cache;

pub use client::GraphMailClient;
pub use sent_cache::SentItemsCache;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entity::sea_orm_active_enums::{FlagStatus, Importance};

use crate::error::AppResult;

/// One message as observed from the mail store.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub id: String,
    pub conversation_id: Option<String>,
    pub conversation_index: Option<String>,
    pub subject: Option<String>,
    pub sender_email: Option<String>,
    pub sender_name: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
    pub current_folder: Option<String>,
    pub web_link: Option<String>,
    pub importance: Importance,
    pub is_read: bool,
    pub flag_status: FlagStatus,
}

impl Default for MailMessage {
    fn default() -> Self {
        MailMessage {
            id: String::new(),
            conversation_id: None,
            conversation_index: None,
            subject: None,
            sender_email: None,
            sender_name: None,
            received_at: None,
            body_html: None,
            body_text: None,
            current_folder: None,
            web_link: None,
            importance: Importance::Normal,
            is_read: false,
            flag_status: FlagStatus::NotFlagged,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeltaPage {
    pub messages: Vec<MailMessage>,
    pub next_token: Option<String>,
}

/// Per-message outcome of a batch move. The provider mints a new message id
/// on move, reported through `new_id`.
#[derive(Debug, Clone)]
pub struct MoveResult {
    pub id: String,
    pub success: bool,
    pub status: u16,
    pub new_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SentItem {
    pub conversation_id: String,
    pub sent_at: DateTime<Utc>,
}

/// Capability surface required from the external mail store.
#[async_trait]
pub trait MailClient: Send + Sync {
    /// Cursor-paged fetch of new or changed messages since the last call.
    async fn get_delta(
        &self,
        since_token: Option<&str>,
        lookback_hours: u32,
    ) -> AppResult<DeltaPage>;

    /// Resolve a slash-separated folder path to the provider folder id,
    /// creating intermediate folders that do not exist yet.
    async fn get_folder_id(&self, path: &str) -> AppResult<String>;

    /// Move a batch of messages. Returns one result per requested move.
    async fn batch_move(&self, moves: &[(String, String)]) -> AppResult<Vec<MoveResult>>;

    async fn get_sent_items(&self, since: DateTime<Utc>) -> AppResult<Vec<SentItem>>;

    /// Resolve the immutable id for a (possibly mutable) message id.
    async fn get_message_immutable_id(&self, mutable_id: &str) -> AppResult<String>;

    async fn list_categories(&self) -> AppResult<Vec<String>>;

    async fn create_category(&self, name: &str, color: &str) -> AppResult<()>;
}
