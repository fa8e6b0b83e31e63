use chrono::Utc;
use entity::{email, prelude::*, sea_orm_active_enums::SenderCategory, sender_profile, suggestion};
use sea_orm::{entity::*, query::*, FromQueryResult, JoinType};

use crate::error::AppResult;

use super::Store;

#[derive(Debug, FromQueryResult)]
struct FolderPair {
    approved_folder: Option<String>,
    suggested_folder: Option<String>,
}

impl Store {
    /// Bump the per-sender counters on every observed message.
    pub async fn record_sender_observation(
        &self,
        sender_email: &str,
        display_name: Option<&str>,
    ) -> AppResult<()> {
        let domain = sender_email.rsplit('@').next().map(|d| d.to_lowercase());
        let existing = SenderProfile::find_by_id(sender_email).one(&self.conn).await?;

        match existing {
            Some(profile) => {
                let count = profile.email_count;
                let mut active = profile.into_active_model();
                active.email_count = Set(count + 1);
                active.last_seen = Set(Some(Utc::now()));
                active.updated_at = Set(Utc::now());
                if display_name.is_some() {
                    active.display_name = Set(display_name.map(|s| s.to_string()));
                }
                active.update(&self.conn).await?;
            }
            None => {
                SenderProfile::insert(sender_profile::ActiveModel {
                    email: Set(sender_email.to_string()),
                    display_name: Set(display_name.map(|s| s.to_string())),
                    domain: Set(domain),
                    category: Set(SenderCategory::Unknown),
                    default_folder: Set(None),
                    email_count: Set(1),
                    last_seen: Set(Some(Utc::now())),
                    auto_rule_candidate: Set(false),
                    updated_at: Set(Utc::now()),
                })
                .exec(&self.conn)
                .await?;
            }
        }
        Ok(())
    }

    /// Record the routing view computed from sender history: the dominant
    /// folder and whether the sender qualifies as an auto-rule candidate.
    pub async fn set_sender_routing(
        &self,
        sender_email: &str,
        default_folder: Option<&str>,
        auto_rule_candidate: bool,
    ) -> AppResult<()> {
        let Some(profile) = SenderProfile::find_by_id(sender_email).one(&self.conn).await? else {
            return Ok(());
        };
        let mut active = profile.into_active_model();
        active.default_folder = Set(default_folder.map(|s| s.to_string()));
        active.auto_rule_candidate = Set(auto_rule_candidate);
        active.updated_at = Set(Utc::now());
        active.update(&self.conn).await?;
        Ok(())
    }

    pub async fn get_sender_profile(
        &self,
        sender_email: &str,
    ) -> AppResult<Option<sender_profile::Model>> {
        Ok(SenderProfile::find_by_id(sender_email).one(&self.conn).await?)
    }

    /// Effective folders (approved over suggested) of the sender's most
    /// recent classified emails, newest first.
    pub async fn get_sender_folder_history(
        &self,
        sender_email: &str,
        limit: u64,
    ) -> AppResult<Vec<String>> {
        let rows = Suggestion::find()
            .join(JoinType::InnerJoin, suggestion::Relation::Email.def())
            .filter(email::Column::SenderEmail.eq(sender_email))
            .order_by_desc(email::Column::ReceivedAt)
            .limit(limit)
            .select_only()
            .column(suggestion::Column::ApprovedFolder)
            .column(suggestion::Column::SuggestedFolder)
            .into_model::<FolderPair>()
            .all(&self.conn)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row.approved_folder.or(row.suggested_folder))
            .collect())
    }
}
