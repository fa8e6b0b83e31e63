use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use serde::Deserialize;

use crate::{
    conf::AppConfig,
    engine::thread::ThreadContext,
    error::{AppError, AppResult},
    llm::{LlmClient, MessageParam, MessagesRequest, MessagesResponse, ToolChoice},
    store::{LlmLogEntry, Store},
};

use super::prompts::{self, classify_email_tool};

#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationResult {
    pub folder: String,
    pub priority: String,
    pub action_type: String,
    pub confidence: f32,
    pub reasoning: String,
}

/// LLM-backed classifier. Holds the current system prompt, refreshed at the
/// top of each cycle so taxonomy and preference changes take effect without
/// a restart.
pub struct EmailClassifier {
    llm: Arc<dyn LlmClient>,
    store: Arc<Store>,
    system_prompt: RwLock<String>,
}

impl EmailClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, store: Arc<Store>) -> Self {
        EmailClassifier {
            llm,
            store,
            system_prompt: RwLock::new(String::new()),
        }
    }

    pub async fn refresh_system_prompt(&self, cfg: &AppConfig) -> AppResult<()> {
        let preferences = self
            .store
            .get_state("classification_preferences")
            .await?
            .unwrap_or_default();
        let prompt = prompts::build_system_prompt(cfg, &preferences, Utc::now());
        *self.system_prompt.write().unwrap() = prompt;
        Ok(())
    }

    /// Classify one email with bounded retries.
    ///
    /// Transient provider errors (5xx, 429, dropped connections) and
    /// malformed tool output are retried with jittered exponential backoff
    /// up to `triage.classification_attempts_max`. Terminal failure surfaces
    /// as a `Classification` error; the caller records the failed status.
    pub async fn classify(
        &self,
        email: &entity::email::Model,
        ctx: &ThreadContext,
        cfg: &AppConfig,
        cycle_id: &str,
    ) -> AppResult<ClassificationResult> {
        let mut system = self.system_prompt.read().unwrap().clone();
        if system.is_empty() {
            system = prompts::build_system_prompt(cfg, "", Utc::now());
        }

        let request = MessagesRequest {
            model: cfg.models.triage.clone(),
            max_tokens: 1024,
            system: Some(system),
            messages: vec![MessageParam::user_text(prompts::build_user_message(email, ctx))],
            tools: vec![classify_email_tool()],
            tool_choice: Some(ToolChoice::Tool {
                name: "classify_email".to_string(),
            }),
        };

        let max_attempts = cfg.triage.classification_attempts_max.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let started = Instant::now();
            match self.llm.messages_create(request.clone()).await {
                Ok(response) => {
                    let duration_ms = started.elapsed().as_millis() as i64;
                    let parsed = extract_result(&response);
                    self.log_round_trip(
                        cfg,
                        email,
                        cycle_id,
                        &request,
                        Some(&response),
                        duration_ms,
                        parsed.as_ref().err().map(|e| e.as_str()),
                    )
                    .await;

                    match parsed {
                        Ok(result) => return Ok(result),
                        Err(message) => {
                            tracing::warn!(
                                email_id = %email.id,
                                attempt,
                                error = %message,
                                "malformed classification output"
                            );
                            last_error = message;
                        }
                    }
                }
                Err(e) => {
                    let duration_ms = started.elapsed().as_millis() as i64;
                    self.log_round_trip(
                        cfg,
                        email,
                        cycle_id,
                        &request,
                        None,
                        duration_ms,
                        Some(&e.to_string()),
                    )
                    .await;

                    if !e.is_transient() {
                        return Err(e);
                    }
                    tracing::warn!(
                        email_id = %email.id,
                        attempt,
                        error = %e,
                        "transient classification error"
                    );
                    last_error = e.to_string();
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
        }

        Err(AppError::Classification {
            email_id: Some(email.id.clone()),
            attempts: max_attempts,
            message: last_error,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn log_round_trip(
        &self,
        cfg: &AppConfig,
        email: &entity::email::Model,
        cycle_id: &str,
        request: &MessagesRequest,
        response: Option<&MessagesResponse>,
        duration_ms: i64,
        error: Option<&str>,
    ) {
        if !cfg.llm_logging.enabled {
            return;
        }

        let entry = LlmLogEntry {
            task_type: "triage".to_string(),
            model: Some(request.model.clone()),
            email_id: Some(email.id.clone()),
            triage_cycle_id: Some(cycle_id.to_string()),
            prompt_json: cfg
                .llm_logging
                .log_prompts
                .then(|| serde_json::to_string(&request.messages).ok())
                .flatten(),
            response_json: cfg
                .llm_logging
                .log_responses
                .then(|| response.and_then(|r| serde_json::to_string(&r.content).ok()))
                .flatten(),
            tool_call_json: response
                .and_then(|r| r.tool_input("classify_email"))
                .map(|input| input.to_string()),
            input_tokens: response.map(|r| r.usage.input_tokens),
            output_tokens: response.map(|r| r.usage.output_tokens),
            duration_ms: Some(duration_ms),
            error: error.map(|e| e.to_string()),
        };

        // Log failures must never break classification
        if let Err(e) = self.store.log_llm_request(entry).await {
            tracing::warn!(error = %e, "failed to write llm request log");
        }
    }
}

fn extract_result(response: &MessagesResponse) -> Result<ClassificationResult, String> {
    let input = response
        .tool_input("classify_email")
        .ok_or_else(|| "response carries no classify_email tool call".to_string())?;

    let result: ClassificationResult = serde_json::from_value(input.clone())
        .map_err(|e| format!("tool input does not match schema: {e}"))?;

    if result.folder.trim().is_empty() {
        return Err("tool input has an empty folder".to_string());
    }
    if !(0.0..=1.0).contains(&result.confidence) {
        return Err(format!(
            "confidence {} outside [0, 1]",
            result.confidence
        ));
    }
    Ok(result)
}

fn backoff_delay(attempt: i32) -> Duration {
    let base = 2_u64.saturating_pow(attempt as u32);
    let jitter = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_secs_f64(base as f64 * jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ContentBlock;
    use serde_json::json;

    fn response_with_input(input: serde_json::Value) -> MessagesResponse {
        MessagesResponse {
            content: vec![ContentBlock::ToolUse {
                id: "tu_1".to_string(),
                name: "classify_email".to_string(),
                input,
            }],
            model: None,
            stop_reason: None,
            usage: Default::default(),
        }
    }

    #[test]
    fn valid_tool_input_parses() {
        let response = response_with_input(json!({
            "folder": "Projects/X",
            "priority": "P2 - Important",
            "action_type": "Review",
            "confidence": 0.92,
            "reasoning": "Project signals match."
        }));
        let result = extract_result(&response).unwrap();
        assert_eq!(result.folder, "Projects/X");
        assert!((result.confidence - 0.92).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_tool_call_is_malformed() {
        let response = MessagesResponse {
            content: vec![ContentBlock::Text {
                text: "I think it's a newsletter".to_string(),
            }],
            model: None,
            stop_reason: None,
            usage: Default::default(),
        };
        assert!(extract_result(&response).is_err());
    }

    #[test]
    fn out_of_range_confidence_is_malformed() {
        let response = response_with_input(json!({
            "folder": "Projects/X",
            "priority": "P2 - Important",
            "action_type": "Review",
            "confidence": 1.7,
            "reasoning": "overconfident"
        }));
        assert!(extract_result(&response).is_err());
    }

    #[test]
    fn backoff_grows_with_attempts() {
        let first = backoff_delay(1);
        let third = backoff_delay(3);
        assert!(first >= Duration::from_secs(1));
        assert!(third > first);
    }
}
