use chrono::Utc;
use entity::{prelude::*, sea_orm_active_enums::TaskSyncStatus, task_sync};
use sea_orm::{entity::*, query::*, sea_query::Expr};

use crate::error::AppResult;

use super::Store;

impl Store {
    /// Link an email to an external task item. An email carries at most one
    /// active link; linking again returns the existing row id.
    pub async fn link_task(
        &self,
        email_id: &str,
        task_id: &str,
        task_list_id: Option<&str>,
    ) -> AppResult<i32> {
        if let Some(existing) = self.get_active_task_for_email(email_id).await? {
            return Ok(existing.id);
        }

        let result = TaskSync::insert(task_sync::ActiveModel {
            id: NotSet,
            email_id: Set(email_id.to_string()),
            task_id: Set(task_id.to_string()),
            task_list_id: Set(task_list_id.map(|s| s.to_string())),
            status: Set(TaskSyncStatus::Active),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        })
        .exec(&self.conn)
        .await?;

        Ok(result.last_insert_id)
    }

    pub async fn get_active_task_for_email(
        &self,
        email_id: &str,
    ) -> AppResult<Option<task_sync::Model>> {
        Ok(TaskSync::find()
            .filter(task_sync::Column::EmailId.eq(email_id))
            .filter(task_sync::Column::Status.eq(TaskSyncStatus::Active))
            .one(&self.conn)
            .await?)
    }

    /// CAS `active -> completed | deleted`.
    pub async fn set_task_status(&self, id: i32, status: TaskSyncStatus) -> AppResult<bool> {
        let result = TaskSync::update_many()
            .col_expr(task_sync::Column::Status, Expr::value(status))
            .col_expr(task_sync::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(task_sync::Column::Id.eq(id))
            .filter(task_sync::Column::Status.eq(TaskSyncStatus::Active))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
