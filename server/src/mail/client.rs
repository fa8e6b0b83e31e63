use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use entity::sea_orm_active_enums::{FlagStatus, Importance};
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{AppError, AppResult},
    rate_limiters::{get_bucket, TokenBucket, MS_GRAPH_BUCKET, MS_GRAPH_CAPACITY, MS_GRAPH_RATE},
    HttpClient,
};

use super::{DeltaPage, MailClient, MailMessage, MoveResult, SentItem};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

macro_rules! graph_url {
    ($($segment:expr),*) => {
        {
            const GRAPH_ENDPOINT: &str = "https://graph.microsoft.com/v1.0/me";
            let segments: Vec<String> = vec![$($segment.to_string()),*];
            format!("{}/{}", GRAPH_ENDPOINT, segments.join("/"))
        }
    };
}

/// Microsoft Graph implementation of [`MailClient`].
///
/// Token acquisition happens outside this process; the client is handed a
/// ready bearer token (env `GRAPH_ACCESS_TOKEN` or the configured token
/// cache file). Every request flows through the shared `ms_graph` bucket.
pub struct GraphMailClient {
    http_client: HttpClient,
    access_token: String,
    rate_limiter: Arc<TokenBucket>,
}

impl GraphMailClient {
    pub fn new(http_client: HttpClient, access_token: String) -> Self {
        GraphMailClient {
            http_client,
            access_token,
            rate_limiter: get_bucket(MS_GRAPH_BUCKET, MS_GRAPH_RATE, MS_GRAPH_CAPACITY),
        }
    }

    pub fn from_env(http_client: HttpClient, token_cache_path: Option<&str>) -> AppResult<Self> {
        if let Ok(token) = std::env::var("GRAPH_ACCESS_TOKEN") {
            if !token.is_empty() {
                return Ok(Self::new(http_client, token));
            }
        }
        if let Some(path) = token_cache_path {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                AppError::Authentication(format!("failed to read token cache {path}: {e}"))
            })?;
            let cache: TokenCache = serde_json::from_str(&raw).map_err(|e| {
                AppError::Authentication(format!("token cache {path} is not valid JSON: {e}"))
            })?;
            return Ok(Self::new(http_client, cache.access_token));
        }
        Err(AppError::Authentication(
            "no mail credentials: set GRAPH_ACCESS_TOKEN or auth.token_cache_path".to_string(),
        ))
    }

    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        prefer: Option<&str>,
    ) -> AppResult<serde_json::Value> {
        self.rate_limiter.consume(1).await?;
        let mut req = self
            .http_client
            .get(url)
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(prefer) = prefer {
            req = req.header("Prefer", prefer);
        }
        let resp = req.send().await?;
        Self::read_response(resp).await
    }

    async fn post_json(&self, url: &str, body: serde_json::Value) -> AppResult<serde_json::Value> {
        self.rate_limiter.consume(1).await?;
        let resp = self
            .http_client
            .post(url)
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        Self::read_response(resp).await
    }

    async fn read_response(resp: reqwest::Response) -> AppResult<serde_json::Value> {
        let status = resp.status().as_u16();
        let body: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);

        if (200..300).contains(&status) {
            return Ok(body);
        }

        let code = body
            .pointer("/error/code")
            .and_then(|c| c.as_str())
            .map(|c| c.to_string());
        let message = body
            .pointer("/error/message")
            .and_then(|m| m.as_str())
            .unwrap_or("request failed")
            .to_string();

        Err(match status {
            401 | 403 => AppError::Authentication(message),
            412 => AppError::Conflict(message),
            _ => AppError::MailApi {
                status,
                code,
                message,
            },
        })
    }

    async fn find_or_create_child(
        &self,
        parent: Option<&str>,
        display_name: &str,
    ) -> AppResult<String> {
        let list_url = match parent {
            Some(id) => graph_url!("mailFolders", id, "childFolders"),
            None => graph_url!("mailFolders"),
        };
        let filter = format!("displayName eq '{}'", display_name.replace('\'', "''"));
        let body = self
            .get_json(&list_url, &[("$filter", filter)], None)
            .await?;

        if let Some(id) = body
            .pointer("/value/0/id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
        {
            return Ok(id);
        }

        let created = self
            .post_json(&list_url, json!({ "displayName": display_name }))
            .await?;
        created
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::MailApi {
                status: 0,
                code: None,
                message: format!("folder create response missing id for '{display_name}'"),
            })
    }
}

#[async_trait]
impl MailClient for GraphMailClient {
    async fn get_delta(
        &self,
        since_token: Option<&str>,
        lookback_hours: u32,
    ) -> AppResult<DeltaPage> {
        let mut url = graph_url!("mailFolders", "inbox", "messages", "delta");
        let mut query: Vec<(&str, String)> = match since_token {
            Some(token) => vec![("$deltatoken", token.to_string())],
            None => {
                let since = Utc::now() - chrono::Duration::hours(lookback_hours as i64);
                vec![(
                    "$filter",
                    format!(
                        "receivedDateTime ge {}",
                        since.to_rfc3339_opts(SecondsFormat::Secs, true)
                    ),
                )]
            }
        };

        let mut messages = Vec::new();
        let next_token = loop {
            let body = self.get_json(&url, &query, None).await?;
            // Continuation links carry their own query string
            query = Vec::new();
            let page: GraphMessagePage = serde_json::from_value(body)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("delta page decode failed: {e}")))?;

            messages.extend(page.value.into_iter().map(GraphMessage::into_mail_message));

            if let Some(next) = page.next_link {
                url = next;
                continue;
            }
            break page.delta_link.as_deref().and_then(extract_delta_token);
        };

        Ok(DeltaPage {
            messages,
            next_token,
        })
    }

    async fn get_folder_id(&self, path: &str) -> AppResult<String> {
        let mut parent: Option<String> = None;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let id = self.find_or_create_child(parent.as_deref(), segment).await?;
            parent = Some(id);
        }
        parent.ok_or_else(|| AppError::MailApi {
            status: 0,
            code: None,
            message: format!("empty folder path '{path}'"),
        })
    }

    async fn batch_move(&self, moves: &[(String, String)]) -> AppResult<Vec<MoveResult>> {
        if moves.is_empty() {
            return Ok(vec![]);
        }

        let requests: Vec<serde_json::Value> = moves
            .iter()
            .map(|(message_id, folder_id)| {
                json!({
                    "id": message_id,
                    "method": "POST",
                    "url": format!("/me/messages/{}/move", message_id),
                    "headers": { "Content-Type": "application/json" },
                    "body": { "destinationId": folder_id },
                })
            })
            .collect();

        let body = self
            .post_json(
                "https://graph.microsoft.com/v1.0/$batch",
                json!({ "requests": requests }),
            )
            .await?;

        let responses = body
            .get("responses")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        let results = moves
            .iter()
            .map(|(message_id, _)| {
                let entry = responses
                    .iter()
                    .find(|r| r.get("id").and_then(|i| i.as_str()) == Some(message_id.as_str()));
                match entry {
                    Some(entry) => {
                        let status =
                            entry.get("status").and_then(|s| s.as_u64()).unwrap_or(0) as u16;
                        let new_id = entry
                            .pointer("/body/id")
                            .and_then(|i| i.as_str())
                            .map(|s| s.to_string());
                        MoveResult {
                            id: message_id.clone(),
                            success: (200..300).contains(&status),
                            status,
                            new_id,
                        }
                    }
                    None => MoveResult {
                        id: message_id.clone(),
                        success: false,
                        status: 0,
                        new_id: None,
                    },
                }
            })
            .collect();

        Ok(results)
    }

    async fn get_sent_items(&self, since: DateTime<Utc>) -> AppResult<Vec<SentItem>> {
        let mut url = graph_url!("mailFolders", "sentitems", "messages");
        let mut query: Vec<(&str, String)> = vec![
            ("$select", "conversationId,sentDateTime".to_string()),
            ("$top", "100".to_string()),
            (
                "$filter",
                format!(
                    "sentDateTime ge {}",
                    since.to_rfc3339_opts(SecondsFormat::Secs, true)
                ),
            ),
        ];

        let mut items = Vec::new();
        loop {
            let body = self.get_json(&url, &query, None).await?;
            query = Vec::new();
            let page: GraphSentPage = serde_json::from_value(body).map_err(|e| {
                AppError::Internal(anyhow::anyhow!("sent items decode failed: {e}"))
            })?;

            items.extend(page.value.into_iter().filter_map(|m| {
                Some(SentItem {
                    conversation_id: m.conversation_id?,
                    sent_at: m.sent_date_time?,
                })
            }));

            match page.next_link {
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(items)
    }

    async fn get_message_immutable_id(&self, mutable_id: &str) -> AppResult<String> {
        let body = self
            .get_json(
                &graph_url!("messages", mutable_id),
                &[("$select", "id".to_string())],
                Some("IdType=\"ImmutableId\""),
            )
            .await?;
        body.get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::MailApi {
                status: 0,
                code: None,
                message: format!("immutable id response missing id for '{mutable_id}'"),
            })
    }

    async fn list_categories(&self) -> AppResult<Vec<String>> {
        let body = self
            .get_json(&graph_url!("outlook", "masterCategories"), &[], None)
            .await?;
        let names = body
            .get("value")
            .and_then(|v| v.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| e.get("displayName").and_then(|n| n.as_str()))
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();
        Ok(names)
    }

    async fn create_category(&self, name: &str, color: &str) -> AppResult<()> {
        self.post_json(
            &graph_url!("outlook", "masterCategories"),
            json!({ "displayName": name, "color": color }),
        )
        .await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct TokenCache {
    access_token: String,
}

#[derive(Deserialize)]
struct GraphMessagePage {
    #[serde(default)]
    value: Vec<GraphMessage>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
    #[serde(rename = "@odata.deltaLink")]
    delta_link: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    conversation_id: Option<String>,
    conversation_index: Option<String>,
    subject: Option<String>,
    from: Option<GraphRecipient>,
    received_date_time: Option<DateTime<Utc>>,
    body: Option<GraphBody>,
    body_preview: Option<String>,
    parent_folder_id: Option<String>,
    web_link: Option<String>,
    importance: Option<String>,
    is_read: Option<bool>,
    flag: Option<GraphFlag>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRecipient {
    email_address: Option<GraphEmailAddress>,
}

#[derive(Deserialize)]
struct GraphEmailAddress {
    address: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphBody {
    content_type: Option<String>,
    content: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphFlag {
    flag_status: Option<String>,
}

#[derive(Deserialize)]
struct GraphSentPage {
    #[serde(default)]
    value: Vec<GraphSentMessage>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphSentMessage {
    conversation_id: Option<String>,
    sent_date_time: Option<DateTime<Utc>>,
}

impl GraphMessage {
    fn into_mail_message(self) -> MailMessage {
        let (body_html, body_text) = match self.body {
            Some(body) => {
                let is_html = body
                    .content_type
                    .as_deref()
                    .is_some_and(|t| t.eq_ignore_ascii_case("html"));
                if is_html {
                    (body.content, self.body_preview)
                } else {
                    (None, body.content.or(self.body_preview))
                }
            }
            None => (None, self.body_preview),
        };

        let (sender_email, sender_name) = self
            .from
            .and_then(|f| f.email_address)
            .map(|a| (a.address, a.name))
            .unwrap_or((None, None));

        MailMessage {
            id: self.id,
            conversation_id: self.conversation_id,
            conversation_index: self.conversation_index,
            subject: self.subject,
            sender_email,
            sender_name,
            received_at: self.received_date_time,
            body_html,
            body_text,
            current_folder: self.parent_folder_id,
            web_link: self.web_link,
            importance: match self.importance.as_deref() {
                Some("low") => Importance::Low,
                Some("high") => Importance::High,
                _ => Importance::Normal,
            },
            is_read: self.is_read.unwrap_or(false),
            flag_status: match self.flag.and_then(|f| f.flag_status).as_deref() {
                Some("flagged") => FlagStatus::Flagged,
                Some("complete") => FlagStatus::Complete,
                _ => FlagStatus::NotFlagged,
            },
        }
    }
}

fn extract_delta_token(delta_link: &str) -> Option<String> {
    let url = reqwest::Url::parse(delta_link).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "$deltatoken")
        .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_token_extracted_from_delta_link() {
        let link = "https://graph.microsoft.com/v1.0/me/mailFolders/inbox/messages/delta?$deltatoken=abc123";
        assert_eq!(extract_delta_token(link), Some("abc123".to_string()));
    }

    #[test]
    fn message_body_mapped_by_content_type() {
        let msg: GraphMessage = serde_json::from_value(json!({
            "id": "m1",
            "subject": "Hello",
            "body": { "contentType": "html", "content": "<p>Hi</p>" },
            "bodyPreview": "Hi",
            "importance": "high",
            "isRead": true,
        }))
        .unwrap();
        let mail = msg.into_mail_message();
        assert_eq!(mail.body_html.as_deref(), Some("<p>Hi</p>"));
        assert_eq!(mail.body_text.as_deref(), Some("Hi"));
        assert_eq!(mail.importance, Importance::High);
        assert!(mail.is_read);
    }
}
