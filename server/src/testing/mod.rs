use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    conf::AppConfig,
    error::{AppError, AppResult},
    llm::{ContentBlock, LlmClient, MessagesRequest, MessagesResponse, Usage},
    mail::{DeltaPage, MailClient, MailMessage, MoveResult, SentItem},
    store::Store,
};

pub async fn test_store() -> Arc<Store> {
    Arc::new(Store::connect_in_memory().await.unwrap())
}

/// Config with every section at its defaults.
pub fn test_config() -> AppConfig {
    serde_yaml::from_str("schema_version: 1").unwrap()
}

pub fn sample_email(id: &str) -> entity::email::Model {
    use entity::sea_orm_active_enums::{ClassificationStatus, FlagStatus, Importance};

    entity::email::Model {
        id: id.to_string(),
        conversation_id: None,
        conversation_index: None,
        subject: Some("Test Email".to_string()),
        sender_email: Some("test@example.com".to_string()),
        sender_name: Some("Test Sender".to_string()),
        received_at: Some(Utc::now()),
        snippet: Some("test snippet".to_string()),
        current_folder: None,
        web_link: None,
        importance: Importance::Normal,
        is_read: false,
        flag_status: FlagStatus::NotFlagged,
        has_user_reply: false,
        inherited_folder: None,
        processed_at: None,
        classification_json: None,
        classification_attempts: 0,
        classification_status: ClassificationStatus::Pending,
    }
}

pub fn sample_mail_message(id: &str) -> MailMessage {
    MailMessage {
        id: id.to_string(),
        conversation_id: Some(format!("conv-{id}")),
        subject: Some("Quarterly tonnage update".to_string()),
        sender_email: Some("ops@steelworks.example".to_string()),
        sender_name: Some("Steelworks Ops".to_string()),
        received_at: Some(Utc::now()),
        body_text: Some("Latest tonnage figures attached. Please review.".to_string()),
        ..Default::default()
    }
}

pub fn text_response(text: &str) -> MessagesResponse {
    MessagesResponse {
        content: vec![ContentBlock::Text {
            text: text.to_string(),
        }],
        model: None,
        stop_reason: Some("end_turn".to_string()),
        usage: Usage::default(),
    }
}

pub fn tool_use_response(name: &str, input: serde_json::Value) -> MessagesResponse {
    MessagesResponse {
        content: vec![ContentBlock::ToolUse {
            id: "tu_test".to_string(),
            name: name.to_string(),
            input,
        }],
        model: None,
        stop_reason: Some("tool_use".to_string()),
        usage: Usage::default(),
    }
}

/// Scripted LLM: answers from a queue and records every request.
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<MessagesResponse, AppError>>>,
    requests: Mutex<Vec<MessagesRequest>>,
}

impl MockLlmClient {
    pub fn new(responses: Vec<MessagesResponse>) -> Self {
        MockLlmClient {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_error(&self, error: AppError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn push_response(&self, response: MessagesResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn messages_create(&self, request: MessagesRequest) -> AppResult<MessagesResponse> {
        self.requests.lock().unwrap().push(request);
        match self.responses.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Err(AppError::LlmApi {
                status: 0,
                message: "mock response queue exhausted".to_string(),
            }),
        }
    }
}

/// Scripted mail store: queued delta pages, per-move outcomes, recorded
/// batch calls.
#[derive(Default)]
pub struct MockMailClient {
    delta_pages: Mutex<VecDeque<DeltaPage>>,
    folder_ids: Mutex<HashMap<String, String>>,
    move_overrides: Mutex<HashMap<String, MoveResult>>,
    batch_error_status: Mutex<Option<u16>>,
    pub recorded_moves: Mutex<Vec<Vec<(String, String)>>>,
    sent_items: Mutex<Vec<SentItem>>,
    immutable_ids: Mutex<HashMap<String, Result<String, u16>>>,
    categories: Mutex<Vec<String>>,
}

impl MockMailClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_delta(&self, messages: Vec<MailMessage>, next_token: Option<&str>) {
        self.delta_pages.lock().unwrap().push_back(DeltaPage {
            messages,
            next_token: next_token.map(|t| t.to_string()),
        });
    }

    pub fn set_folder_id(&self, path: &str, id: &str) {
        self.folder_ids
            .lock()
            .unwrap()
            .insert(path.to_string(), id.to_string());
    }

    pub fn set_move_result(&self, message_id: &str, result: MoveResult) {
        self.move_overrides
            .lock()
            .unwrap()
            .insert(message_id.to_string(), result);
    }

    pub fn fail_batch(&self, status: u16) {
        *self.batch_error_status.lock().unwrap() = Some(status);
    }

    pub fn add_sent_item(&self, conversation_id: &str, sent_at: DateTime<Utc>) {
        self.sent_items.lock().unwrap().push(SentItem {
            conversation_id: conversation_id.to_string(),
            sent_at,
        });
    }

    pub fn set_immutable_id(&self, mutable_id: &str, result: Result<&str, u16>) {
        self.immutable_ids.lock().unwrap().insert(
            mutable_id.to_string(),
            result.map(|s| s.to_string()),
        );
    }

    pub fn batch_calls(&self) -> Vec<Vec<(String, String)>> {
        self.recorded_moves.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailClient for MockMailClient {
    async fn get_delta(
        &self,
        _since_token: Option<&str>,
        _lookback_hours: u32,
    ) -> AppResult<DeltaPage> {
        Ok(self
            .delta_pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn get_folder_id(&self, path: &str) -> AppResult<String> {
        Ok(self
            .folder_ids
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_else(|| format!("folder-id-{path}")))
    }

    async fn batch_move(&self, moves: &[(String, String)]) -> AppResult<Vec<MoveResult>> {
        self.recorded_moves.lock().unwrap().push(moves.to_vec());

        if let Some(status) = *self.batch_error_status.lock().unwrap() {
            return Err(AppError::MailApi {
                status,
                code: None,
                message: "batch move failed".to_string(),
            });
        }

        let overrides = self.move_overrides.lock().unwrap();
        Ok(moves
            .iter()
            .map(|(message_id, _)| {
                overrides.get(message_id).cloned().unwrap_or(MoveResult {
                    id: message_id.clone(),
                    success: true,
                    status: 200,
                    new_id: Some(message_id.clone()),
                })
            })
            .collect())
    }

    async fn get_sent_items(&self, since: DateTime<Utc>) -> AppResult<Vec<SentItem>> {
        Ok(self
            .sent_items
            .lock()
            .unwrap()
            .iter()
            .filter(|item| item.sent_at >= since)
            .cloned()
            .collect())
    }

    async fn get_message_immutable_id(&self, mutable_id: &str) -> AppResult<String> {
        match self.immutable_ids.lock().unwrap().get(mutable_id) {
            Some(Ok(id)) => Ok(id.clone()),
            Some(Err(status)) => Err(AppError::MailApi {
                status: *status,
                code: None,
                message: "immutable id lookup failed".to_string(),
            }),
            None => Ok(mutable_id.to_string()),
        }
    }

    async fn list_categories(&self) -> AppResult<Vec<String>> {
        Ok(self.categories.lock().unwrap().clone())
    }

    async fn create_category(&self, name: &str, _color: &str) -> AppResult<()> {
        self.categories.lock().unwrap().push(name.to_string());
        Ok(())
    }
}
