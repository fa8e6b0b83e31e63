use chrono::Utc;
use entity::{email, prelude::*, sea_orm_active_enums::ClassificationStatus};
use sea_orm::{
    entity::*, query::*, sea_query::{Expr, OnConflict}, TransactionTrait,
};

use crate::error::AppResult;

use super::Store;

impl Store {
    /// Upsert by provider id. Classification bookkeeping columns are left
    /// alone on conflict so a refetched message cannot reset triage state.
    pub async fn save_email(&self, model: email::Model) -> AppResult<()> {
        let active = email::ActiveModel {
            id: Set(model.id),
            conversation_id: Set(model.conversation_id),
            conversation_index: Set(model.conversation_index),
            subject: Set(model.subject),
            sender_email: Set(model.sender_email),
            sender_name: Set(model.sender_name),
            received_at: Set(model.received_at),
            snippet: Set(model.snippet),
            current_folder: Set(model.current_folder),
            web_link: Set(model.web_link),
            importance: Set(model.importance),
            is_read: Set(model.is_read),
            flag_status: Set(model.flag_status),
            has_user_reply: Set(model.has_user_reply),
            inherited_folder: Set(model.inherited_folder),
            processed_at: Set(model.processed_at),
            classification_json: Set(model.classification_json),
            classification_attempts: Set(model.classification_attempts),
            classification_status: Set(model.classification_status),
        };

        Email::insert(active)
            .on_conflict(
                OnConflict::column(email::Column::Id)
                    .update_columns([
                        email::Column::ConversationId,
                        email::Column::ConversationIndex,
                        email::Column::Subject,
                        email::Column::SenderEmail,
                        email::Column::SenderName,
                        email::Column::ReceivedAt,
                        email::Column::Snippet,
                        email::Column::CurrentFolder,
                        email::Column::WebLink,
                        email::Column::Importance,
                        email::Column::IsRead,
                        email::Column::FlagStatus,
                        email::Column::HasUserReply,
                    ])
                    .to_owned(),
            )
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    pub async fn get_email(&self, id: &str) -> AppResult<Option<email::Model>> {
        Ok(Email::find_by_id(id).one(&self.conn).await?)
    }

    pub async fn get_all_email_ids(&self) -> AppResult<Vec<String>> {
        let ids = Email::find()
            .select_only()
            .column(email::Column::Id)
            .into_tuple::<String>()
            .all(&self.conn)
            .await?;
        Ok(ids)
    }

    /// Transition `pending -> classified` and stamp `processed_at`.
    pub async fn mark_email_classified(
        &self,
        id: &str,
        inherited_folder: Option<&str>,
        classification_json: Option<String>,
    ) -> AppResult<()> {
        let mut update = Email::update_many()
            .col_expr(
                email::Column::ClassificationStatus,
                Expr::value(ClassificationStatus::Classified),
            )
            .col_expr(email::Column::ProcessedAt, Expr::value(Some(Utc::now())))
            .filter(email::Column::Id.eq(id));

        if let Some(folder) = inherited_folder {
            update = update.col_expr(
                email::Column::InheritedFolder,
                Expr::value(Some(folder.to_string())),
            );
        }
        if let Some(json) = classification_json {
            update = update.col_expr(
                email::Column::ClassificationJson,
                Expr::value(Some(json)),
            );
        }

        update.exec(&self.conn).await?;
        Ok(())
    }

    /// Record a failed classification attempt: bump the counter and set the
    /// status to `failed` so a later cycle retries it.
    pub async fn mark_classification_failed(&self, id: &str) -> AppResult<()> {
        Email::update_many()
            .col_expr(
                email::Column::ClassificationStatus,
                Expr::value(ClassificationStatus::Failed),
            )
            .col_expr(
                email::Column::ClassificationAttempts,
                Expr::col(email::Column::ClassificationAttempts).add(1),
            )
            .filter(email::Column::Id.eq(id))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    pub async fn get_thread_emails(
        &self,
        conversation_id: &str,
        exclude_id: Option<&str>,
        limit: u64,
    ) -> AppResult<Vec<email::Model>> {
        let mut query = Email::find()
            .filter(email::Column::ConversationId.eq(conversation_id))
            .order_by_desc(email::Column::ReceivedAt)
            .limit(limit);
        if let Some(exclude) = exclude_id {
            query = query.filter(email::Column::Id.ne(exclude));
        }
        Ok(query.all(&self.conn).await?)
    }

    pub async fn get_failed_emails(&self, limit: u64) -> AppResult<Vec<email::Model>> {
        Ok(Email::find()
            .filter(email::Column::ClassificationStatus.eq(ClassificationStatus::Failed))
            .order_by_desc(email::Column::ReceivedAt)
            .limit(limit)
            .all(&self.conn)
            .await?)
    }

    pub async fn count_failed_classifications(&self) -> AppResult<u64> {
        Ok(Email::find()
            .filter(email::Column::ClassificationStatus.eq(ClassificationStatus::Failed))
            .count(&self.conn)
            .await?)
    }

    /// Rewrite an email's primary key and repoint every dependent row in one
    /// transaction. Returns false when the old id is unknown.
    ///
    /// Insert-copy / repoint / delete ordering keeps foreign keys satisfied
    /// at every statement.
    pub async fn update_email_id(&self, old_id: &str, new_id: &str) -> AppResult<bool> {
        use entity::{suggestion, task_sync, waiting_for};

        if old_id == new_id {
            return Ok(false);
        }

        let txn = self.conn.begin().await?;

        let Some(model) = Email::find_by_id(old_id).one(&txn).await? else {
            txn.rollback().await?;
            return Ok(false);
        };

        let mut copy = model.into_active_model().reset_all();
        copy.id = Set(new_id.to_string());
        Email::insert(copy).exec(&txn).await?;

        Suggestion::update_many()
            .col_expr(suggestion::Column::EmailId, Expr::value(new_id))
            .filter(suggestion::Column::EmailId.eq(old_id))
            .exec(&txn)
            .await?;

        TaskSync::update_many()
            .col_expr(task_sync::Column::EmailId, Expr::value(new_id))
            .filter(task_sync::Column::EmailId.eq(old_id))
            .exec(&txn)
            .await?;

        WaitingFor::update_many()
            .col_expr(waiting_for::Column::EmailId, Expr::value(Some(new_id)))
            .filter(waiting_for::Column::EmailId.eq(old_id))
            .exec(&txn)
            .await?;

        Email::delete_by_id(old_id).exec(&txn).await?;

        txn.commit().await?;
        Ok(true)
    }
}
