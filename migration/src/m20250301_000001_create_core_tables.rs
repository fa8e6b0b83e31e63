use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Emails::Table)
                    .if_not_exists()
                    .col(string(Emails::Id).primary_key())
                    .col(string_null(Emails::ConversationId))
                    .col(string_null(Emails::ConversationIndex))
                    .col(string_null(Emails::Subject))
                    .col(string_null(Emails::SenderEmail))
                    .col(string_null(Emails::SenderName))
                    .col(timestamp_with_time_zone_null(Emails::ReceivedAt))
                    .col(string_null(Emails::Snippet))
                    .col(string_null(Emails::CurrentFolder))
                    .col(string_null(Emails::WebLink))
                    .col(string(Emails::Importance).default("normal"))
                    .col(boolean(Emails::IsRead).default(false))
                    .col(string(Emails::FlagStatus).default("notFlagged"))
                    .col(boolean(Emails::HasUserReply).default(false))
                    .col(string_null(Emails::InheritedFolder))
                    .col(timestamp_with_time_zone_null(Emails::ProcessedAt))
                    .col(string_null(Emails::ClassificationJson))
                    .col(integer(Emails::ClassificationAttempts).default(0))
                    .col(string(Emails::ClassificationStatus).default("pending"))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-emails-conversation_id")
                    .table(Emails::Table)
                    .col(Emails::ConversationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-emails-sender_email")
                    .table(Emails::Table)
                    .col(Emails::SenderEmail)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-emails-received_at")
                    .table(Emails::Table)
                    .col(Emails::ReceivedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-emails-classification_status")
                    .table(Emails::Table)
                    .col(Emails::ClassificationStatus)
                    .to_owned(),
            )
            .await?;

        // Composite index for thread inheritance lookups (newest first per thread)
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-emails-thread-inheritance")
                    .table(Emails::Table)
                    .col(Emails::ConversationId)
                    .col((Emails::ReceivedAt, IndexOrder::Desc))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Suggestions::Table)
                    .if_not_exists()
                    .col(pk_auto(Suggestions::Id))
                    .col(string(Suggestions::EmailId))
                    .col(
                        timestamp_with_time_zone(Suggestions::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(string_null(Suggestions::SuggestedFolder))
                    .col(string_null(Suggestions::SuggestedPriority))
                    .col(string_null(Suggestions::SuggestedActionType))
                    .col(float_null(Suggestions::Confidence))
                    .col(string_null(Suggestions::Reasoning))
                    .col(string(Suggestions::Status).default("pending"))
                    .col(string_null(Suggestions::ApprovedFolder))
                    .col(string_null(Suggestions::ApprovedPriority))
                    .col(string_null(Suggestions::ApprovedActionType))
                    .col(timestamp_with_time_zone_null(Suggestions::ResolvedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-suggestions-email_id")
                            .from(Suggestions::Table, Suggestions::EmailId)
                            .to(Emails::Table, Emails::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-suggestions-email_id")
                    .table(Suggestions::Table)
                    .col(Suggestions::EmailId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-suggestions-status")
                    .table(Suggestions::Table)
                    .col(Suggestions::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-suggestions-email-status")
                    .table(Suggestions::Table)
                    .col(Suggestions::EmailId)
                    .col(Suggestions::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(WaitingFor::Table)
                    .if_not_exists()
                    .col(pk_auto(WaitingFor::Id))
                    .col(string_null(WaitingFor::EmailId))
                    .col(string_null(WaitingFor::ConversationId))
                    .col(
                        timestamp_with_time_zone(WaitingFor::WaitingSince)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(string_null(WaitingFor::ExpectedFrom))
                    .col(string_null(WaitingFor::Description))
                    .col(string(WaitingFor::Status).default("waiting"))
                    .col(integer(WaitingFor::NudgeAfterHours).default(48))
                    .col(timestamp_with_time_zone_null(WaitingFor::ResolvedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-waiting_for-email_id")
                            .from(WaitingFor::Table, WaitingFor::EmailId)
                            .to(Emails::Table, Emails::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-waiting_for-status")
                    .table(WaitingFor::Table)
                    .col(WaitingFor::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-waiting_for-conversation")
                    .table(WaitingFor::Table)
                    .col(WaitingFor::ConversationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AgentState::Table)
                    .if_not_exists()
                    .col(string(AgentState::Key).primary_key())
                    .col(string_null(AgentState::Value))
                    .col(
                        timestamp_with_time_zone(AgentState::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AgentState::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WaitingFor::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Suggestions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Emails::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Emails {
    Table,
    Id,
    ConversationId,
    ConversationIndex,
    Subject,
    SenderEmail,
    SenderName,
    ReceivedAt,
    Snippet,
    CurrentFolder,
    WebLink,
    Importance,
    IsRead,
    FlagStatus,
    HasUserReply,
    InheritedFolder,
    ProcessedAt,
    ClassificationJson,
    ClassificationAttempts,
    ClassificationStatus,
}

#[derive(DeriveIden)]
enum Suggestions {
    Table,
    Id,
    EmailId,
    CreatedAt,
    SuggestedFolder,
    SuggestedPriority,
    SuggestedActionType,
    Confidence,
    Reasoning,
    Status,
    ApprovedFolder,
    ApprovedPriority,
    ApprovedActionType,
    ResolvedAt,
}

#[derive(DeriveIden)]
enum WaitingFor {
    Table,
    Id,
    EmailId,
    ConversationId,
    WaitingSince,
    ExpectedFrom,
    Description,
    Status,
    NudgeAfterHours,
    ResolvedAt,
}

#[derive(DeriveIden)]
enum AgentState {
    Table,
    Key,
    Value,
    UpdatedAt,
}
