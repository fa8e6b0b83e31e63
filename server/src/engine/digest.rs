use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use crate::{
    conf::{AppConfig, DigestDelivery},
    error::{AppError, AppResult},
    llm::{LlmClient, MessageParam, MessagesRequest, ToolChoice},
    store::{LlmLogEntry, Store},
};

use crate::classifier::prompts::{generate_digest_tool, DIGEST_SYSTEM_PROMPT};

const LAST_RUN_KEY: &str = "last_digest_run";
const COOLDOWN_HOURS: i64 = 1;
const RULE_HEAVY: &str = "========================================";
const RULE_LIGHT: &str = "----------------------------------------";

#[derive(Debug, Clone)]
pub struct DigestResult {
    pub text: String,
    pub overdue_replies: usize,
    pub overdue_waiting: usize,
    pub pending_suggestions: u64,
    pub failed_classifications: u64,
    pub generated_at: DateTime<Utc>,
}

/// Daily aggregation of obligations and activity, formatted by the LLM with
/// a deterministic plaintext fallback.
pub struct DigestGenerator {
    store: Arc<Store>,
    llm: Arc<dyn LlmClient>,
}

impl DigestGenerator {
    pub fn new(store: Arc<Store>, llm: Arc<dyn LlmClient>) -> Self {
        DigestGenerator { store, llm }
    }

    /// Returns `None` when the hourly cooldown suppresses a duplicate run.
    pub async fn generate(&self, cfg: &AppConfig) -> AppResult<Option<DigestResult>> {
        if let Some(last_run) = self.store.get_state_timestamp(LAST_RUN_KEY).await? {
            if Utc::now() - last_run < Duration::hours(COOLDOWN_HOURS) {
                tracing::info!(last_run = %last_run, "digest already generated within the last hour");
                return Ok(None);
            }
        }

        let aging = &cfg.aging;

        let overdue_replies = self
            .store
            .get_overdue_replies(aging.needs_reply_warning_hours)
            .await?;
        let critical_cutoff = Utc::now() - Duration::hours(aging.needs_reply_critical_hours);
        let overdue_reply_entries: Vec<Value> = overdue_replies
            .iter()
            .map(|reply| {
                let level = match reply.received_at {
                    Some(received) if received <= critical_cutoff => "critical",
                    _ => "warning",
                };
                json!({
                    "subject": reply.subject,
                    "sender_email": reply.sender_email,
                    "level": level,
                })
            })
            .collect();

        let waiting_items = self.store.get_active_waiting_for().await?;
        let now = Utc::now();
        let overdue_waiting: Vec<Value> = waiting_items
            .iter()
            .filter_map(|item| {
                let age_hours = (now - item.waiting_since).num_seconds() / 3600;
                if age_hours < aging.waiting_for_nudge_hours {
                    return None;
                }
                let level = if age_hours >= aging.waiting_for_escalate_hours {
                    "critical"
                } else {
                    "nudge"
                };
                Some(json!({
                    "description": item.description,
                    "expected_from": item
                        .expected_from
                        .as_deref()
                        .map(|s| s.chars().take(20).collect::<String>()),
                    "hours_waiting": age_hours,
                    "level": level,
                }))
            })
            .collect();

        let stats = self.store.get_processing_stats(now - Duration::days(1)).await?;
        let pending = self.store.count_pending_suggestions().await?;
        let failed = self.store.count_failed_classifications().await?;

        let overdue_reply_count = overdue_reply_entries.len();
        let overdue_waiting_count = overdue_waiting.len();

        let data = json!({
            "overdue_replies": overdue_reply_entries,
            "overdue_waiting": overdue_waiting,
            "stats": stats,
            "pending_suggestions": pending,
            "failed_classifications": failed,
        });

        let text = match self.format_with_llm(cfg, &data).await {
            Some(text) => text,
            None => plain_text_digest(&data),
        };

        self.store
            .set_state(LAST_RUN_KEY, &Utc::now().to_rfc3339())
            .await?;

        Ok(Some(DigestResult {
            text,
            overdue_replies: overdue_reply_count,
            overdue_waiting: overdue_waiting_count,
            pending_suggestions: pending,
            failed_classifications: failed,
            generated_at: Utc::now(),
        }))
    }

    /// Write or print the digest. File delivery goes through a temp file and
    /// an atomic rename; a partial file is removed on failure.
    pub async fn deliver(
        &self,
        cfg: &AppConfig,
        digest: &DigestResult,
    ) -> AppResult<Option<PathBuf>> {
        match cfg.digest.delivery {
            DigestDelivery::Stdout => {
                println!("{}", digest.text);
                Ok(None)
            }
            DigestDelivery::File => {
                let dir = PathBuf::from(&cfg.digest.output_dir);
                std::fs::create_dir_all(&dir).map_err(|e| {
                    AppError::Internal(anyhow::anyhow!(
                        "failed to create digest directory {}: {e}",
                        dir.display()
                    ))
                })?;

                let name = format!("digest_{}.txt", digest.generated_at.format("%Y%m%d_%H%M"));
                let target = dir.join(&name);
                let tmp = dir.join(format!(".{name}.tmp"));

                if let Err(e) = std::fs::write(&tmp, &digest.text) {
                    let _ = std::fs::remove_file(&tmp);
                    return Err(AppError::Internal(anyhow::anyhow!(
                        "failed to write digest {}: {e}",
                        tmp.display()
                    )));
                }
                if let Err(e) = std::fs::rename(&tmp, &target) {
                    let _ = std::fs::remove_file(&tmp);
                    return Err(AppError::Internal(anyhow::anyhow!(
                        "failed to move digest into place {}: {e}",
                        target.display()
                    )));
                }

                tracing::info!(path = %target.display(), "digest written");
                Ok(Some(target))
            }
        }
    }

    async fn format_with_llm(&self, cfg: &AppConfig, data: &Value) -> Option<String> {
        let model = cfg
            .models
            .digest
            .clone()
            .unwrap_or_else(|| cfg.models.triage.clone());

        let prompt = format!(
            "Generate a daily digest from this email processing data:\n\n{}\n\n\
             If everything is clear (no overdue items, no failures), produce a brief \
             \"all clear\" summary. Otherwise, highlight the most important items that \
             need attention.",
            serde_json::to_string_pretty(data).unwrap_or_default()
        );

        let request = MessagesRequest {
            model: model.clone(),
            max_tokens: 1024,
            system: Some(DIGEST_SYSTEM_PROMPT.to_string()),
            messages: vec![MessageParam::user_text(prompt)],
            tools: vec![generate_digest_tool()],
            tool_choice: Some(ToolChoice::Tool {
                name: "generate_digest".to_string(),
            }),
        };

        let response = match self.llm.messages_create(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "digest formatting failed, falling back to plain text");
                return None;
            }
        };

        let entry = LlmLogEntry {
            task_type: "digest".to_string(),
            model: Some(model),
            tool_call_json: response
                .tool_input("generate_digest")
                .map(|input| input.to_string()),
            input_tokens: Some(response.usage.input_tokens),
            output_tokens: Some(response.usage.output_tokens),
            ..Default::default()
        };
        if let Err(e) = self.store.log_llm_request(entry).await {
            tracing::warn!(error = %e, "failed to log digest llm request");
        }

        let sections = response.tool_input("generate_digest")?;
        assemble_sections(sections)
    }
}

fn assemble_sections(tool_input: &Value) -> Option<String> {
    let mut sections = Vec::new();

    if let Some(summary) = non_empty(tool_input, "summary") {
        sections.push(format!("DAILY DIGEST\n{RULE_HEAVY}\n{summary}"));
    }
    if let Some(text) = non_empty(tool_input, "overdue_replies_section") {
        sections.push(format!("\nOVERDUE REPLIES\n{RULE_LIGHT}\n{text}"));
    }
    if let Some(text) = non_empty(tool_input, "waiting_for_section") {
        sections.push(format!("\nWAITING FOR\n{RULE_LIGHT}\n{text}"));
    }
    if let Some(text) = non_empty(tool_input, "activity_section") {
        sections.push(format!("\nACTIVITY\n{RULE_LIGHT}\n{text}"));
    }
    if let Some(text) = non_empty(tool_input, "pending_section") {
        sections.push(format!("\nPENDING REVIEW\n{RULE_LIGHT}\n{text}"));
    }

    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n"))
    }
}

fn non_empty<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// Deterministic fallback used whenever the LLM path fails.
fn plain_text_digest(data: &Value) -> String {
    let mut lines = vec![format!("DAILY DIGEST\n{RULE_HEAVY}")];

    let overdue = data["overdue_replies"].as_array().cloned().unwrap_or_default();
    let waiting = data["overdue_waiting"].as_array().cloned().unwrap_or_default();
    let pending = data["pending_suggestions"].as_u64().unwrap_or(0);
    let failed = data["failed_classifications"].as_u64().unwrap_or(0);

    if overdue.is_empty() && waiting.is_empty() && pending == 0 && failed == 0 {
        lines.push("\nAll clear - no items need attention.".to_string());
        return lines.join("\n");
    }

    if !overdue.is_empty() {
        lines.push(format!("\nOVERDUE REPLIES ({})", overdue.len()));
        lines.push(RULE_LIGHT.to_string());
        for item in &overdue {
            lines.push(format!(
                "  [{}] {} from {}",
                item["level"].as_str().unwrap_or("warning").to_uppercase(),
                item["subject"].as_str().unwrap_or("No subject"),
                item["sender_email"].as_str().unwrap_or("unknown"),
            ));
        }
    }

    if !waiting.is_empty() {
        lines.push(format!("\nWAITING FOR ({})", waiting.len()));
        lines.push(RULE_LIGHT.to_string());
        for item in &waiting {
            lines.push(format!(
                "  [{}] {} from {} ({}h)",
                item["level"].as_str().unwrap_or("nudge").to_uppercase(),
                item["description"].as_str().unwrap_or("No description"),
                item["expected_from"].as_str().unwrap_or("unknown"),
                item["hours_waiting"].as_i64().unwrap_or(0),
            ));
        }
    }

    if let Some(stats) = data.get("stats") {
        lines.push("\nACTIVITY (last 24h)".to_string());
        lines.push(RULE_LIGHT.to_string());
        lines.push(format!(
            "  Classified: {}",
            stats["classified"].as_u64().unwrap_or(0)
        ));
        lines.push(format!(
            "  Auto-ruled: {}",
            stats["auto_ruled"].as_u64().unwrap_or(0)
        ));
        lines.push(format!(
            "  Auto-approved: {}",
            stats["auto_approved"].as_u64().unwrap_or(0)
        ));
        lines.push(format!(
            "  User-approved: {}",
            stats["user_approved"].as_u64().unwrap_or(0)
        ));
    }

    if pending > 0 {
        lines.push(format!(
            "\nPENDING REVIEW: {pending} suggestions awaiting review"
        ));
    }
    if failed > 0 {
        lines.push(format!("\nFAILED CLASSIFICATIONS: {failed}"));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_clear_when_nothing_outstanding() {
        let data = json!({
            "overdue_replies": [],
            "overdue_waiting": [],
            "stats": {},
            "pending_suggestions": 0,
            "failed_classifications": 0,
        });
        let text = plain_text_digest(&data);
        assert!(text.contains("All clear"));
    }

    #[test]
    fn plain_text_lists_overdue_items() {
        let data = json!({
            "overdue_replies": [
                {"subject": "Quote request", "sender_email": "client@example.com", "level": "critical"}
            ],
            "overdue_waiting": [
                {"description": "Contract signature", "expected_from": "legal@example.com", "hours_waiting": 72, "level": "nudge"}
            ],
            "stats": {"classified": 4, "auto_ruled": 1, "auto_approved": 2, "user_approved": 0},
            "pending_suggestions": 3,
            "failed_classifications": 1,
        });
        let text = plain_text_digest(&data);
        assert!(text.contains("[CRITICAL] Quote request from client@example.com"));
        assert!(text.contains("[NUDGE] Contract signature"));
        assert!(text.contains("Classified: 4"));
        assert!(text.contains("PENDING REVIEW: 3"));
        assert!(text.contains("FAILED CLASSIFICATIONS: 1"));
    }

    #[test]
    fn sections_assembled_in_order() {
        let input = json!({
            "summary": "2 items need attention.",
            "waiting_for_section": "Contract signature (72h)",
        });
        let text = assemble_sections(&input).unwrap();
        assert!(text.starts_with("DAILY DIGEST"));
        let summary_pos = text.find("2 items").unwrap();
        let waiting_pos = text.find("WAITING FOR").unwrap();
        assert!(summary_pos < waiting_pos);
        assert!(!text.contains("ACTIVITY"));
    }

    #[test]
    fn empty_sections_fall_back() {
        assert!(assemble_sections(&json!({})).is_none());
        assert!(assemble_sections(&json!({"summary": "  "})).is_none());
    }
}
