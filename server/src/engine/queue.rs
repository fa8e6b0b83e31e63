use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use crate::{
    classifier::prompts::ACTION_WAITING_FOR,
    conf::AppConfig,
    error::AppResult,
    mail::MailClient,
    store::Store,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApplyOutcome {
    pub approved: usize,
    pub failed_moves: usize,
}

/// Applies the timed auto-approval gate and expiry to the suggestion queue.
pub struct SuggestionQueue {
    store: Arc<Store>,
    mail: Arc<dyn MailClient>,
}

impl SuggestionQueue {
    pub fn new(store: Arc<Store>, mail: Arc<dyn MailClient>) -> Self {
        SuggestionQueue { store, mail }
    }

    /// Move every eligible pending suggestion in one provider batch, then
    /// CAS each reported success to `auto_approved`. Failures stay pending
    /// and are not retried this cycle; a batch-wide error leaves everything
    /// pending.
    pub async fn auto_apply(&self, cfg: &AppConfig) -> AppResult<AutoApplyOutcome> {
        let candidates = self
            .store
            .get_auto_approvable_suggestions(
                cfg.suggestion_queue.auto_approve_confidence,
                cfg.suggestion_queue.auto_approve_delay_hours,
            )
            .await?;

        if candidates.is_empty() {
            return Ok(AutoApplyOutcome::default());
        }

        let mut folder_ids: HashMap<String, String> = HashMap::new();
        for suggestion in &candidates {
            let Some(folder) = suggestion.suggested_folder.as_deref() else {
                continue;
            };
            if folder_ids.contains_key(folder) {
                continue;
            }
            match self.mail.get_folder_id(folder).await {
                Ok(id) => {
                    folder_ids.insert(folder.to_string(), id);
                }
                Err(e) => {
                    tracing::warn!(folder, error = %e, "folder resolution failed, skipping its suggestions");
                }
            }
        }

        let eligible: Vec<_> = candidates
            .iter()
            .filter_map(|suggestion| {
                let folder = suggestion.suggested_folder.as_deref()?;
                let folder_id = folder_ids.get(folder)?;
                Some((suggestion, folder_id.clone()))
            })
            .collect();

        if eligible.is_empty() {
            return Ok(AutoApplyOutcome::default());
        }

        let moves: Vec<(String, String)> = eligible
            .iter()
            .map(|(s, folder_id)| (s.email_id.clone(), folder_id.clone()))
            .collect();

        let results = match self.mail.batch_move(&moves).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(
                    count = moves.len(),
                    error = %e,
                    "batch move failed, all suggestions remain pending"
                );
                return Ok(AutoApplyOutcome {
                    approved: 0,
                    failed_moves: moves.len(),
                });
            }
        };

        let by_id: HashMap<&str, &crate::mail::MoveResult> =
            results.iter().map(|r| (r.id.as_str(), r)).collect();

        let mut outcome = AutoApplyOutcome::default();
        for (suggestion, folder_id) in eligible {
            match by_id.get(suggestion.email_id.as_str()) {
                Some(result) if result.success => {
                    if !self
                        .store
                        .mark_suggestion_auto_approved(suggestion.id)
                        .await?
                    {
                        continue;
                    }
                    outcome.approved += 1;

                    self.store
                        .log_action(
                            "move",
                            Some(&suggestion.email_id),
                            Some(json!({
                                "suggestion_id": suggestion.id,
                                "folder": suggestion.suggested_folder,
                                "folder_id": folder_id,
                                "confidence": suggestion.confidence,
                            })),
                            Some("auto_approved"),
                        )
                        .await?;

                    if suggestion.suggested_action_type.as_deref() == Some(ACTION_WAITING_FOR) {
                        self.register_waiting_for(cfg, &suggestion.email_id).await?;
                    }

                    // The provider mints a new id on move; keep our records
                    // pointing at the live message
                    if let Some(new_id) = &result.new_id {
                        if new_id != &suggestion.email_id {
                            self.store.update_email_id(&suggestion.email_id, new_id).await?;
                        }
                    }
                }
                Some(result) => {
                    outcome.failed_moves += 1;
                    tracing::warn!(
                        email_id = %suggestion.email_id,
                        status = result.status,
                        "move failed, suggestion left pending"
                    );
                }
                None => {
                    outcome.failed_moves += 1;
                    tracing::warn!(
                        email_id = %suggestion.email_id,
                        "no move result returned, suggestion left pending"
                    );
                }
            }
        }

        if outcome.approved > 0 || outcome.failed_moves > 0 {
            tracing::info!(
                approved = outcome.approved,
                failed = outcome.failed_moves,
                "auto-approval pass complete"
            );
        }

        Ok(outcome)
    }

    /// Bulk-expire pending suggestions older than the configured window.
    pub async fn expire(&self, cfg: &AppConfig) -> AppResult<u64> {
        let expired = self
            .store
            .expire_old_suggestions(cfg.suggestion_queue.expire_after_days)
            .await?;
        if expired > 0 {
            tracing::info!(expired, "stale pending suggestions expired");
        }
        Ok(expired)
    }

    async fn register_waiting_for(&self, cfg: &AppConfig, email_id: &str) -> AppResult<()> {
        let Some(email) = self.store.get_email(email_id).await? else {
            return Ok(());
        };
        let description = email
            .subject
            .clone()
            .unwrap_or_else(|| "Awaiting reply".to_string());
        self.store
            .create_waiting_for(
                Some(email_id),
                email.conversation_id.as_deref(),
                email.sender_email.as_deref(),
                &description,
                cfg.aging.waiting_for_nudge_hours as i32,
            )
            .await?;
        Ok(())
    }
}
