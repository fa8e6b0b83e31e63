use std::sync::Arc;

use chrono::Utc;
use entity::{sea_orm_active_enums::WaitingStatus, waiting_for};

use crate::{
    conf::AppConfig,
    error::AppResult,
    mail::SentItemsCache,
    store::Store,
};

/// Counts for one waiting-for scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaitingForCheckResult {
    pub resolved: usize,
    pub nudged: usize,
    pub escalated: usize,
    pub unchanged: usize,
    pub errors: usize,
}

enum ItemOutcome {
    Resolved,
    AlreadyResolved,
    Critical,
    Nudge,
    Normal,
}

/// Scans active waiting-for obligations each cycle: detects replies through
/// the sent-items cache and classifies the rest by aging thresholds.
pub struct WaitingForTracker {
    store: Arc<Store>,
    sent_cache: Arc<SentItemsCache>,
}

impl WaitingForTracker {
    pub fn new(store: Arc<Store>, sent_cache: Arc<SentItemsCache>) -> Self {
        WaitingForTracker { store, sent_cache }
    }

    pub async fn check_all(&self, cfg: &AppConfig, cycle_id: &str) -> WaitingForCheckResult {
        let items = match self.store.get_active_waiting_for().await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(cycle_id, error = %e, "failed to fetch waiting-for items");
                return WaitingForCheckResult {
                    errors: 1,
                    ..Default::default()
                };
            }
        };

        if items.is_empty() {
            return WaitingForCheckResult::default();
        }

        let mut result = WaitingForCheckResult::default();
        for item in &items {
            match self.check_item(cfg, item).await {
                Ok(ItemOutcome::Resolved) => {
                    result.resolved += 1;
                    tracing::info!(
                        waiting_for_id = item.id,
                        expected_from = %truncate(item.expected_from.as_deref().unwrap_or(""), 20),
                        cycle_id,
                        "waiting-for resolved by reply"
                    );
                }
                Ok(ItemOutcome::AlreadyResolved) => {}
                Ok(ItemOutcome::Critical) => result.escalated += 1,
                Ok(ItemOutcome::Nudge) => result.nudged += 1,
                Ok(ItemOutcome::Normal) => result.unchanged += 1,
                Err(e) => {
                    result.errors += 1;
                    tracing::warn!(
                        waiting_for_id = item.id,
                        cycle_id,
                        error = %e,
                        "waiting-for check failed"
                    );
                }
            }
        }

        tracing::info!(
            total = items.len(),
            resolved = result.resolved,
            nudged = result.nudged,
            escalated = result.escalated,
            unchanged = result.unchanged,
            errors = result.errors,
            cycle_id,
            "waiting-for scan complete"
        );

        result
    }

    async fn check_item(
        &self,
        cfg: &AppConfig,
        item: &waiting_for::Model,
    ) -> AppResult<ItemOutcome> {
        if self.reply_detected(cfg, item).await {
            return Ok(
                if self
                    .store
                    .resolve_waiting_for(item.id, WaitingStatus::Received)
                    .await?
                {
                    ItemOutcome::Resolved
                } else {
                    ItemOutcome::AlreadyResolved
                },
            );
        }

        let hours_waiting =
            (Utc::now() - item.waiting_since).num_seconds() as f64 / 3600.0;
        Ok(if hours_waiting >= cfg.aging.waiting_for_escalate_hours as f64 {
            ItemOutcome::Critical
        } else if hours_waiting >= cfg.aging.waiting_for_nudge_hours as f64 {
            ItemOutcome::Nudge
        } else {
            ItemOutcome::Normal
        })
    }

    /// A reply counts only when the user sent it after the obligation was
    /// created.
    async fn reply_detected(&self, cfg: &AppConfig, item: &waiting_for::Model) -> bool {
        let Some(conversation_id) = item.conversation_id.as_deref() else {
            return false;
        };

        if self.sent_cache.is_stale(1) {
            if let Err(e) = self
                .sent_cache
                .refresh(cfg.triage.lookback_hours * 2)
                .await
            {
                tracing::warn!(error = %e, "sent cache refresh failed during waiting-for scan");
            }
        }

        if !self.sent_cache.has_replied(conversation_id) {
            return false;
        }

        match self.sent_cache.get_last_reply_time(conversation_id) {
            Some(reply_time) => reply_time >= item.waiting_since,
            None => false,
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
