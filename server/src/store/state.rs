use chrono::Utc;
use entity::{agent_state, prelude::*};
use sea_orm::{entity::*, query::*, sea_query::OnConflict};

use crate::error::AppResult;

use super::Store;

impl Store {
    pub async fn get_state(&self, key: &str) -> AppResult<Option<String>> {
        Ok(AgentState::find_by_id(key)
            .one(&self.conn)
            .await?
            .and_then(|row| row.value))
    }

    pub async fn set_state(&self, key: &str, value: &str) -> AppResult<()> {
        AgentState::insert(agent_state::ActiveModel {
            key: Set(key.to_string()),
            value: Set(Some(value.to_string())),
            updated_at: Set(Utc::now()),
        })
        .on_conflict(
            OnConflict::column(agent_state::Column::Key)
                .update_columns([agent_state::Column::Value, agent_state::Column::UpdatedAt])
                .to_owned(),
        )
        .exec(&self.conn)
        .await?;
        Ok(())
    }

    /// Timestamp state helper: parse an RFC 3339 value stored under `key`.
    pub async fn get_state_timestamp(
        &self,
        key: &str,
    ) -> AppResult<Option<chrono::DateTime<Utc>>> {
        let raw = self.get_state(key).await?;
        Ok(raw.and_then(|value| {
            chrono::DateTime::parse_from_rfc3339(&value)
                .map(|t| t.with_timezone(&Utc))
                .ok()
        }))
    }
}
