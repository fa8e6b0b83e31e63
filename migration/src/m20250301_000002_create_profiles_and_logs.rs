use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SenderProfiles::Table)
                    .if_not_exists()
                    .col(string(SenderProfiles::Email).primary_key())
                    .col(string_null(SenderProfiles::DisplayName))
                    .col(string_null(SenderProfiles::Domain))
                    .col(string(SenderProfiles::Category).default("unknown"))
                    .col(string_null(SenderProfiles::DefaultFolder))
                    .col(integer(SenderProfiles::EmailCount).default(0))
                    .col(timestamp_with_time_zone_null(SenderProfiles::LastSeen))
                    .col(boolean(SenderProfiles::AutoRuleCandidate).default(false))
                    .col(
                        timestamp_with_time_zone(SenderProfiles::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-sender_profiles-domain")
                    .table(SenderProfiles::Table)
                    .col(SenderProfiles::Domain)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-sender_profiles-category")
                    .table(SenderProfiles::Table)
                    .col(SenderProfiles::Category)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(LlmRequestLog::Table)
                    .if_not_exists()
                    .col(pk_auto(LlmRequestLog::Id))
                    .col(
                        timestamp_with_time_zone(LlmRequestLog::Timestamp)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(string(LlmRequestLog::TaskType))
                    .col(string_null(LlmRequestLog::Model))
                    .col(string_null(LlmRequestLog::EmailId))
                    .col(string_null(LlmRequestLog::TriageCycleId))
                    .col(string_null(LlmRequestLog::PromptJson))
                    .col(string_null(LlmRequestLog::ResponseJson))
                    .col(string_null(LlmRequestLog::ToolCallJson))
                    .col(big_integer_null(LlmRequestLog::InputTokens))
                    .col(big_integer_null(LlmRequestLog::OutputTokens))
                    .col(big_integer_null(LlmRequestLog::DurationMs))
                    .col(string_null(LlmRequestLog::Error))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-llm_log-timestamp")
                    .table(LlmRequestLog::Table)
                    .col(LlmRequestLog::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-llm_log-email")
                    .table(LlmRequestLog::Table)
                    .col(LlmRequestLog::EmailId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-llm_log-triage_cycle")
                    .table(LlmRequestLog::Table)
                    .col(LlmRequestLog::TriageCycleId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ActionLog::Table)
                    .if_not_exists()
                    .col(pk_auto(ActionLog::Id))
                    .col(
                        timestamp_with_time_zone(ActionLog::Timestamp)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(string(ActionLog::ActionType))
                    .col(string_null(ActionLog::EmailId))
                    .col(string_null(ActionLog::DetailsJson))
                    .col(string_null(ActionLog::TriggeredBy))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-action_log-timestamp")
                    .table(ActionLog::Table)
                    .col(ActionLog::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-action_log-email")
                    .table(ActionLog::Table)
                    .col(ActionLog::EmailId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ActionLog::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LlmRequestLog::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SenderProfiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SenderProfiles {
    Table,
    Email,
    DisplayName,
    Domain,
    Category,
    DefaultFolder,
    EmailCount,
    LastSeen,
    AutoRuleCandidate,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum LlmRequestLog {
    Table,
    Id,
    Timestamp,
    TaskType,
    Model,
    EmailId,
    TriageCycleId,
    PromptJson,
    ResponseJson,
    ToolCallJson,
    InputTokens,
    OutputTokens,
    DurationMs,
    Error,
}

#[derive(DeriveIden)]
enum ActionLog {
    Table,
    Id,
    Timestamp,
    ActionType,
    EmailId,
    DetailsJson,
    TriggeredBy,
}
