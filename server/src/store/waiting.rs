use chrono::Utc;
use entity::{prelude::*, sea_orm_active_enums::WaitingStatus, waiting_for};
use sea_orm::{entity::*, query::*, sea_query::Expr};

use crate::error::AppResult;

use super::Store;

impl Store {
    /// Create a waiting-for obligation. At most one `waiting` row may exist
    /// per conversation; a duplicate request returns `None`.
    pub async fn create_waiting_for(
        &self,
        email_id: Option<&str>,
        conversation_id: Option<&str>,
        expected_from: Option<&str>,
        description: &str,
        nudge_after_hours: i32,
    ) -> AppResult<Option<i32>> {
        if let Some(conversation_id) = conversation_id {
            let existing = WaitingFor::find()
                .filter(waiting_for::Column::ConversationId.eq(conversation_id))
                .filter(waiting_for::Column::Status.eq(WaitingStatus::Waiting))
                .one(&self.conn)
                .await?;
            if existing.is_some() {
                return Ok(None);
            }
        }

        let result = WaitingFor::insert(waiting_for::ActiveModel {
            id: NotSet,
            email_id: Set(email_id.map(|s| s.to_string())),
            conversation_id: Set(conversation_id.map(|s| s.to_string())),
            waiting_since: Set(Utc::now()),
            expected_from: Set(expected_from.map(|s| s.to_string())),
            description: Set(Some(description.to_string())),
            status: Set(WaitingStatus::Waiting),
            nudge_after_hours: Set(nudge_after_hours),
            resolved_at: Set(None),
        })
        .exec(&self.conn)
        .await?;

        Ok(Some(result.last_insert_id))
    }

    pub async fn get_waiting_for(&self, id: i32) -> AppResult<Option<waiting_for::Model>> {
        Ok(WaitingFor::find_by_id(id).one(&self.conn).await?)
    }

    pub async fn get_active_waiting_for(&self) -> AppResult<Vec<waiting_for::Model>> {
        Ok(WaitingFor::find()
            .filter(waiting_for::Column::Status.eq(WaitingStatus::Waiting))
            .order_by_asc(waiting_for::Column::WaitingSince)
            .all(&self.conn)
            .await?)
    }

    /// CAS `waiting -> received | expired`. Returns whether the transition
    /// happened, so duplicate resolutions can be counted correctly.
    pub async fn resolve_waiting_for(&self, id: i32, status: WaitingStatus) -> AppResult<bool> {
        let result = WaitingFor::update_many()
            .col_expr(waiting_for::Column::Status, Expr::value(status))
            .col_expr(
                waiting_for::Column::ResolvedAt,
                Expr::value(Some(Utc::now())),
            )
            .filter(waiting_for::Column::Id.eq(id))
            .filter(waiting_for::Column::Status.eq(WaitingStatus::Waiting))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
