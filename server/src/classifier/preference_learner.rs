use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::{
    conf::AppConfig,
    error::AppResult,
    llm::{LlmClient, MessageParam, MessagesRequest},
    store::{CorrectionRecord, Store},
};

use super::prompts::build_preference_update_prompt;

pub const PREFERENCES_KEY: &str = "classification_preferences";
const LAST_UPDATE_KEY: &str = "last_preference_update";
const COOLDOWN_MINUTES: i64 = 5;
const MAX_CORRECTIONS: u64 = 100;
const SUBJECT_TRUNCATE: usize = 50;
const SENDER_TRUNCATE: usize = 20;

#[derive(Debug, Clone)]
pub struct PreferenceUpdateResult {
    pub corrections_analyzed: usize,
    pub preferences_before: String,
    pub preferences_after: String,
    pub changed: bool,
}

/// Synthesizes natural-language classification preferences from user
/// corrections. The output feeds back into the classifier's system prompt.
pub struct PreferenceLearner {
    store: Arc<Store>,
    llm: Arc<dyn LlmClient>,
}

impl PreferenceLearner {
    pub fn new(store: Arc<Store>, llm: Arc<dyn LlmClient>) -> Self {
        PreferenceLearner { store, llm }
    }

    /// Gate: enabled, enough corrections in the lookback window, and not
    /// inside the cooldown. Returns `None` when skipped.
    pub async fn check_and_update(
        &self,
        cfg: &AppConfig,
    ) -> AppResult<Option<PreferenceUpdateResult>> {
        if !cfg.learning.enabled {
            return Ok(None);
        }

        let since = Utc::now() - Duration::days(cfg.learning.lookback_days);
        let count = self.store.get_correction_count_since(since).await?;
        if (count as usize) < cfg.learning.min_corrections_to_update {
            tracing::debug!(
                corrections = count,
                threshold = cfg.learning.min_corrections_to_update,
                "preference update skipped"
            );
            return Ok(None);
        }

        Ok(Some(self.update_preferences(cfg).await?))
    }

    pub async fn update_preferences(&self, cfg: &AppConfig) -> AppResult<PreferenceUpdateResult> {
        let current = self
            .store
            .get_state(PREFERENCES_KEY)
            .await?
            .unwrap_or_default();

        if let Some(last) = self.store.get_state_timestamp(LAST_UPDATE_KEY).await? {
            if Utc::now() - last < Duration::minutes(COOLDOWN_MINUTES) {
                tracing::debug!("preference update inside cooldown");
                return Ok(unchanged(0, current));
            }
        }

        let corrections = self
            .store
            .get_recent_corrections(cfg.learning.lookback_days, MAX_CORRECTIONS)
            .await?;
        if corrections.is_empty() {
            return Ok(unchanged(0, current));
        }

        let current_for_prompt = if current.trim().is_empty() {
            "No preferences learned yet.".to_string()
        } else {
            current.clone()
        };

        let prompt = build_preference_update_prompt(
            cfg.learning.lookback_days,
            &format_corrections(&corrections),
            &current_for_prompt,
            cfg.learning.max_preferences_words,
        );

        let request = MessagesRequest {
            model: cfg.models.triage.clone(),
            max_tokens: 1024,
            system: None,
            messages: vec![MessageParam::user_text(prompt)],
            tools: vec![],
            tool_choice: None,
        };

        let response = match self.llm.messages_create(request).await {
            Ok(response) => response,
            Err(e) => {
                // Prior preferences are never wiped by a failed update
                tracing::warn!(error = %e, "preference update failed, keeping existing preferences");
                return Ok(unchanged(corrections.len(), current));
            }
        };

        let mut new_preferences = response.text().trim().to_string();
        if new_preferences.is_empty() {
            tracing::warn!("preference update returned empty text");
            return Ok(unchanged(corrections.len(), current));
        }

        let word_count = new_preferences.split_whitespace().count();
        if word_count > cfg.learning.max_preferences_words {
            new_preferences = new_preferences
                .split_whitespace()
                .take(cfg.learning.max_preferences_words)
                .collect::<Vec<_>>()
                .join(" ");
            tracing::warn!(
                original_words = word_count,
                max_words = cfg.learning.max_preferences_words,
                "preference text truncated"
            );
        }

        let changed = new_preferences != current;
        if changed {
            self.store
                .set_state(PREFERENCES_KEY, &new_preferences)
                .await?;
            tracing::info!(
                corrections_analyzed = corrections.len(),
                words = new_preferences.split_whitespace().count(),
                "classification preferences updated"
            );
        }
        self.store
            .set_state(LAST_UPDATE_KEY, &Utc::now().to_rfc3339())
            .await?;

        Ok(PreferenceUpdateResult {
            corrections_analyzed: corrections.len(),
            preferences_before: current,
            preferences_after: new_preferences,
            changed,
        })
    }
}

fn unchanged(corrections_analyzed: usize, current: String) -> PreferenceUpdateResult {
    PreferenceUpdateResult {
        corrections_analyzed,
        preferences_before: current.clone(),
        preferences_after: current,
        changed: false,
    }
}

/// Render corrections for the prompt. Subjects and sender addresses are
/// truncated to limit PII exposure.
fn format_corrections(corrections: &[CorrectionRecord]) -> String {
    let mut lines: Vec<String> = Vec::new();

    for (i, c) in corrections.iter().enumerate() {
        let mut parts: Vec<String> = Vec::new();
        if c.suggested_folder != c.approved_folder {
            parts.push(format!(
                "  Folder: {} -> {}",
                c.suggested_folder.as_deref().unwrap_or("-"),
                c.approved_folder.as_deref().unwrap_or("-"),
            ));
        }
        if c.suggested_priority != c.approved_priority {
            parts.push(format!(
                "  Priority: {} -> {}",
                c.suggested_priority.as_deref().unwrap_or("-"),
                c.approved_priority.as_deref().unwrap_or("-"),
            ));
        }
        if c.suggested_action_type != c.approved_action_type {
            parts.push(format!(
                "  Action: {} -> {}",
                c.suggested_action_type.as_deref().unwrap_or("-"),
                c.approved_action_type.as_deref().unwrap_or("-"),
            ));
        }

        if !parts.is_empty() {
            let subject: String = c
                .subject
                .as_deref()
                .unwrap_or("No subject")
                .chars()
                .take(SUBJECT_TRUNCATE)
                .collect();
            let sender: String = c
                .sender_email
                .as_deref()
                .unwrap_or("unknown")
                .chars()
                .take(SENDER_TRUNCATE)
                .collect();
            lines.push(format!("Correction {}: \"{subject}\" from {sender}", i + 1));
            lines.extend(parts);
            lines.push(String::new());
        }
    }

    if lines.is_empty() {
        "No corrections found.".to_string()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correction(suggested: &str, approved: &str) -> CorrectionRecord {
        CorrectionRecord {
            suggested_folder: Some(suggested.to_string()),
            suggested_priority: Some("P3 - Routine".to_string()),
            suggested_action_type: Some("Review".to_string()),
            approved_folder: Some(approved.to_string()),
            approved_priority: Some("P3 - Routine".to_string()),
            approved_action_type: Some("Review".to_string()),
            subject: Some("A very long subject line that should be cut at fifty characters exactly".to_string()),
            sender_email: Some("extremely-long-sender-address@example.com".to_string()),
        }
    }

    #[test]
    fn corrections_show_only_changed_fields() {
        let text = format_corrections(&[correction("Projects/A", "Projects/B")]);
        assert!(text.contains("Folder: Projects/A -> Projects/B"));
        assert!(!text.contains("Priority:"));
        assert!(!text.contains("Action:"));
    }

    #[test]
    fn identical_triples_are_omitted() {
        let text = format_corrections(&[correction("Projects/A", "Projects/A")]);
        assert_eq!(text, "No corrections found.");
    }

    #[test]
    fn pii_is_truncated() {
        let text = format_corrections(&[correction("Projects/A", "Projects/B")]);
        assert!(text.contains("extremely-long-sende"));
        assert!(!text.contains("extremely-long-sender"));
        let subject_line = text.lines().next().unwrap();
        // 50 chars of subject plus the surrounding quote characters
        assert!(subject_line.len() < 50 + 40);
    }
}
