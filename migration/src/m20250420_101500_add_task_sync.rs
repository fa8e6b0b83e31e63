use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TaskSync::Table)
                    .if_not_exists()
                    .col(pk_auto(TaskSync::Id))
                    .col(string(TaskSync::EmailId))
                    .col(string(TaskSync::TaskId))
                    .col(string_null(TaskSync::TaskListId))
                    .col(string(TaskSync::Status).default("active"))
                    .col(
                        timestamp_with_time_zone(TaskSync::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(TaskSync::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-task_sync-email_id")
                            .from(TaskSync::Table, TaskSync::EmailId)
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
                    .name("idx-task_sync-email_id")
                    .table(TaskSync::Table)
                    .col(TaskSync::EmailId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-task_sync-status")
                    .table(TaskSync::Table)
                    .col(TaskSync::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TaskSync::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TaskSync {
    Table,
    Id,
    EmailId,
    TaskId,
    TaskListId,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Emails {
    Table,
    Id,
}
