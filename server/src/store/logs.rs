use chrono::Utc;
use entity::{action_log, llm_request_log, prelude::*};
use sea_orm::{entity::*, query::*};
use serde::Serialize;

use crate::error::AppResult;

use super::Store;

/// One LLM round-trip, as recorded in `llm_request_log`.
#[derive(Debug, Clone, Default)]
pub struct LlmLogEntry {
    pub task_type: String,
    pub model: Option<String>,
    pub email_id: Option<String>,
    pub triage_cycle_id: Option<String>,
    pub prompt_json: Option<String>,
    pub response_json: Option<String>,
    pub tool_call_json: Option<String>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingStats {
    pub classified: u64,
    pub auto_ruled: u64,
    pub auto_approved: u64,
    pub user_approved: u64,
}

impl Store {
    pub async fn log_llm_request(&self, entry: LlmLogEntry) -> AppResult<()> {
        LlmRequestLog::insert(llm_request_log::ActiveModel {
            id: NotSet,
            timestamp: Set(Utc::now()),
            task_type: Set(entry.task_type),
            model: Set(entry.model),
            email_id: Set(entry.email_id),
            triage_cycle_id: Set(entry.triage_cycle_id),
            prompt_json: Set(entry.prompt_json),
            response_json: Set(entry.response_json),
            tool_call_json: Set(entry.tool_call_json),
            input_tokens: Set(entry.input_tokens),
            output_tokens: Set(entry.output_tokens),
            duration_ms: Set(entry.duration_ms),
            error: Set(entry.error),
        })
        .exec(&self.conn)
        .await?;
        Ok(())
    }

    pub async fn log_action(
        &self,
        action_type: &str,
        email_id: Option<&str>,
        details: Option<serde_json::Value>,
        triggered_by: Option<&str>,
    ) -> AppResult<()> {
        ActionLog::insert(action_log::ActiveModel {
            id: NotSet,
            timestamp: Set(Utc::now()),
            action_type: Set(action_type.to_string()),
            email_id: Set(email_id.map(|s| s.to_string())),
            details_json: Set(details.map(|d| d.to_string())),
            triggered_by: Set(triggered_by.map(|s| s.to_string())),
        })
        .exec(&self.conn)
        .await?;
        Ok(())
    }

    pub async fn get_action_logs(&self, limit: u64) -> AppResult<Vec<action_log::Model>> {
        Ok(ActionLog::find()
            .order_by_desc(action_log::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await?)
    }

    /// Activity counters over the action log since `since`.
    pub async fn get_processing_stats(
        &self,
        since: chrono::DateTime<Utc>,
    ) -> AppResult<ProcessingStats> {
        let rows = ActionLog::find()
            .filter(action_log::Column::Timestamp.gte(since))
            .all(&self.conn)
            .await?;

        let mut stats = ProcessingStats::default();
        for row in rows {
            match (row.action_type.as_str(), row.triggered_by.as_deref()) {
                ("classify", _) => stats.classified += 1,
                ("auto_rule", _) => stats.auto_ruled += 1,
                ("move", Some("auto_approved")) => stats.auto_approved += 1,
                ("move", Some("user_approved")) => stats.user_approved += 1,
                _ => {}
            }
        }
        Ok(stats)
    }
}
