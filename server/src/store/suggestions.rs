use chrono::{Duration, Utc};
use entity::{email, prelude::*, sea_orm_active_enums::SuggestionStatus, suggestion};
use sea_orm::{entity::*, query::*, sea_query::Expr, Condition, FromQueryResult, JoinType};

use crate::classifier::prompts::{ACTION_NEEDS_REPLY, PRIORITY_P1};
use crate::error::AppResult;

use super::Store;

/// A user correction: what the agent suggested against what the user chose.
#[derive(Debug, Clone, FromQueryResult)]
pub struct CorrectionRecord {
    pub suggested_folder: Option<String>,
    pub suggested_priority: Option<String>,
    pub suggested_action_type: Option<String>,
    pub approved_folder: Option<String>,
    pub approved_priority: Option<String>,
    pub approved_action_type: Option<String>,
    pub subject: Option<String>,
    pub sender_email: Option<String>,
}

#[derive(Debug, Clone, FromQueryResult)]
pub struct OverdueReply {
    pub email_id: String,
    pub subject: Option<String>,
    pub sender_email: Option<String>,
    pub received_at: Option<chrono::DateTime<Utc>>,
}

impl Store {
    /// Insert a pending suggestion. Callers keep the one-pending-per-email
    /// invariant by checking [`Store::get_pending_suggestion_for_email`] first.
    pub async fn create_suggestion(
        &self,
        email_id: &str,
        suggested_folder: &str,
        suggested_priority: &str,
        suggested_action_type: &str,
        confidence: f32,
        reasoning: &str,
    ) -> AppResult<i32> {
        let result = Suggestion::insert(suggestion::ActiveModel {
            id: NotSet,
            email_id: Set(email_id.to_string()),
            created_at: Set(Utc::now()),
            suggested_folder: Set(Some(suggested_folder.to_string())),
            suggested_priority: Set(Some(suggested_priority.to_string())),
            suggested_action_type: Set(Some(suggested_action_type.to_string())),
            confidence: Set(Some(confidence)),
            reasoning: Set(Some(reasoning.to_string())),
            status: Set(SuggestionStatus::Pending),
            approved_folder: Set(None),
            approved_priority: Set(None),
            approved_action_type: Set(None),
            resolved_at: Set(None),
        })
        .exec(&self.conn)
        .await?;

        Ok(result.last_insert_id)
    }

    pub async fn get_suggestion(&self, id: i32) -> AppResult<Option<suggestion::Model>> {
        Ok(Suggestion::find_by_id(id).one(&self.conn).await?)
    }

    pub async fn get_pending_suggestion_for_email(
        &self,
        email_id: &str,
    ) -> AppResult<Option<suggestion::Model>> {
        Ok(Suggestion::find()
            .filter(suggestion::Column::EmailId.eq(email_id))
            .filter(suggestion::Column::Status.eq(SuggestionStatus::Pending))
            .one(&self.conn)
            .await?)
    }

    /// CAS `pending -> approved | partial`. The approved triple defaults to
    /// the suggested triple; any divergence makes the resolution `partial`.
    /// Returns whether the transition actually happened.
    pub async fn approve_suggestion(
        &self,
        id: i32,
        approved: Option<(String, String, String)>,
    ) -> AppResult<bool> {
        let Some(current) = self.get_suggestion(id).await? else {
            return Ok(false);
        };

        let suggested = (
            current.suggested_folder.clone().unwrap_or_default(),
            current.suggested_priority.clone().unwrap_or_default(),
            current.suggested_action_type.clone().unwrap_or_default(),
        );
        let approved = approved.unwrap_or_else(|| suggested.clone());
        let status = if approved == suggested {
            SuggestionStatus::Approved
        } else {
            SuggestionStatus::Partial
        };

        let result = Suggestion::update_many()
            .col_expr(suggestion::Column::Status, Expr::value(status))
            .col_expr(
                suggestion::Column::ApprovedFolder,
                Expr::value(Some(approved.0)),
            )
            .col_expr(
                suggestion::Column::ApprovedPriority,
                Expr::value(Some(approved.1)),
            )
            .col_expr(
                suggestion::Column::ApprovedActionType,
                Expr::value(Some(approved.2)),
            )
            .col_expr(suggestion::Column::ResolvedAt, Expr::value(Some(Utc::now())))
            .filter(suggestion::Column::Id.eq(id))
            .filter(suggestion::Column::Status.eq(SuggestionStatus::Pending))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// CAS `pending -> rejected`.
    pub async fn reject_suggestion(&self, id: i32) -> AppResult<bool> {
        let result = Suggestion::update_many()
            .col_expr(
                suggestion::Column::Status,
                Expr::value(SuggestionStatus::Rejected),
            )
            .col_expr(suggestion::Column::ResolvedAt, Expr::value(Some(Utc::now())))
            .filter(suggestion::Column::Id.eq(id))
            .filter(suggestion::Column::Status.eq(SuggestionStatus::Pending))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// CAS `pending -> auto_approved`, copying the suggested triple into the
    /// approved triple.
    pub async fn mark_suggestion_auto_approved(&self, id: i32) -> AppResult<bool> {
        let Some(current) = self.get_suggestion(id).await? else {
            return Ok(false);
        };

        let result = Suggestion::update_many()
            .col_expr(
                suggestion::Column::Status,
                Expr::value(SuggestionStatus::AutoApproved),
            )
            .col_expr(
                suggestion::Column::ApprovedFolder,
                Expr::value(current.suggested_folder),
            )
            .col_expr(
                suggestion::Column::ApprovedPriority,
                Expr::value(current.suggested_priority),
            )
            .col_expr(
                suggestion::Column::ApprovedActionType,
                Expr::value(current.suggested_action_type),
            )
            .col_expr(suggestion::Column::ResolvedAt, Expr::value(Some(Utc::now())))
            .filter(suggestion::Column::Id.eq(id))
            .filter(suggestion::Column::Status.eq(SuggestionStatus::Pending))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Bulk CAS `pending -> expired` for suggestions older than `days`.
    pub async fn expire_old_suggestions(&self, days: i64) -> AppResult<u64> {
        let cutoff = Utc::now() - Duration::days(days);
        let result = Suggestion::update_many()
            .col_expr(
                suggestion::Column::Status,
                Expr::value(SuggestionStatus::Expired),
            )
            .col_expr(suggestion::Column::ResolvedAt, Expr::value(Some(Utc::now())))
            .filter(suggestion::Column::Status.eq(SuggestionStatus::Pending))
            .filter(suggestion::Column::CreatedAt.lt(cutoff))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Pending suggestions eligible for the auto-approval gate. P1 never
    /// qualifies, whatever its confidence or age.
    pub async fn get_auto_approvable_suggestions(
        &self,
        min_confidence: f32,
        min_age_hours: i64,
    ) -> AppResult<Vec<suggestion::Model>> {
        let age_cutoff = Utc::now() - Duration::hours(min_age_hours);
        Ok(Suggestion::find()
            .filter(suggestion::Column::Status.eq(SuggestionStatus::Pending))
            .filter(suggestion::Column::Confidence.gte(min_confidence))
            .filter(suggestion::Column::CreatedAt.lte(age_cutoff))
            .filter(suggestion::Column::SuggestedPriority.ne(PRIORITY_P1))
            .filter(suggestion::Column::SuggestedFolder.is_not_null())
            .order_by_asc(suggestion::Column::CreatedAt)
            .all(&self.conn)
            .await?)
    }

    pub async fn get_suggestions_by_status(
        &self,
        status: SuggestionStatus,
        limit: u64,
    ) -> AppResult<Vec<suggestion::Model>> {
        Ok(Suggestion::find()
            .filter(suggestion::Column::Status.eq(status))
            .order_by_desc(suggestion::Column::CreatedAt)
            .limit(limit)
            .all(&self.conn)
            .await?)
    }

    pub async fn count_pending_suggestions(&self) -> AppResult<u64> {
        Ok(Suggestion::find()
            .filter(suggestion::Column::Status.eq(SuggestionStatus::Pending))
            .count(&self.conn)
            .await?)
    }

    pub async fn get_correction_count_since(
        &self,
        since: chrono::DateTime<Utc>,
    ) -> AppResult<u64> {
        Ok(Suggestion::find()
            .filter(
                suggestion::Column::Status
                    .is_in([SuggestionStatus::Partial, SuggestionStatus::Rejected]),
            )
            .filter(suggestion::Column::ResolvedAt.gte(since))
            .count(&self.conn)
            .await?)
    }

    /// Recent corrections joined with the email's subject and sender, newest
    /// first, capped by `limit`.
    pub async fn get_recent_corrections(
        &self,
        lookback_days: i64,
        limit: u64,
    ) -> AppResult<Vec<CorrectionRecord>> {
        let since = Utc::now() - Duration::days(lookback_days);
        Ok(Suggestion::find()
            .filter(
                suggestion::Column::Status
                    .is_in([SuggestionStatus::Partial, SuggestionStatus::Rejected]),
            )
            .filter(suggestion::Column::ResolvedAt.gte(since))
            .join(JoinType::InnerJoin, suggestion::Relation::Email.def())
            .column_as(email::Column::Subject, "subject")
            .column_as(email::Column::SenderEmail, "sender_email")
            .order_by_desc(suggestion::Column::ResolvedAt)
            .limit(limit)
            .into_model::<CorrectionRecord>()
            .all(&self.conn)
            .await?)
    }

    /// Folder approved for the most recent earlier message in a conversation,
    /// used as the inheritance hint for newer messages in the same thread.
    pub async fn get_inherited_folder(
        &self,
        conversation_id: &str,
        before: Option<chrono::DateTime<Utc>>,
        exclude_email_id: &str,
    ) -> AppResult<Option<String>> {
        let mut query = Suggestion::find()
            .join(JoinType::InnerJoin, suggestion::Relation::Email.def())
            .filter(email::Column::ConversationId.eq(conversation_id))
            .filter(email::Column::Id.ne(exclude_email_id))
            .filter(suggestion::Column::Status.is_in([
                SuggestionStatus::Approved,
                SuggestionStatus::AutoApproved,
                SuggestionStatus::Partial,
            ]))
            .filter(suggestion::Column::ApprovedFolder.is_not_null())
            .order_by_desc(email::Column::ReceivedAt);
        if let Some(before) = before {
            query = query.filter(email::Column::ReceivedAt.lt(before));
        }
        Ok(query
            .one(&self.conn)
            .await?
            .and_then(|suggestion| suggestion.approved_folder))
    }

    /// 'Needs Reply' emails past the warning threshold that the user has not
    /// replied to yet.
    pub async fn get_overdue_replies(&self, warning_hours: i64) -> AppResult<Vec<OverdueReply>> {
        let cutoff = Utc::now() - Duration::hours(warning_hours);
        Ok(Suggestion::find()
            .filter(
                Condition::any()
                    .add(suggestion::Column::SuggestedActionType.eq(ACTION_NEEDS_REPLY))
                    .add(suggestion::Column::ApprovedActionType.eq(ACTION_NEEDS_REPLY)),
            )
            .filter(suggestion::Column::Status.is_in([
                SuggestionStatus::Pending,
                SuggestionStatus::Approved,
                SuggestionStatus::AutoApproved,
                SuggestionStatus::Partial,
            ]))
            .join(JoinType::InnerJoin, suggestion::Relation::Email.def())
            .filter(email::Column::HasUserReply.eq(false))
            .filter(email::Column::ReceivedAt.lt(cutoff))
            .select_only()
            .column_as(email::Column::Id, "email_id")
            .column_as(email::Column::Subject, "subject")
            .column_as(email::Column::SenderEmail, "sender_email")
            .column_as(email::Column::ReceivedAt, "received_at")
            .order_by_asc(email::Column::ReceivedAt)
            .into_model::<OverdueReply>()
            .all(&self.conn)
            .await?)
    }
}
