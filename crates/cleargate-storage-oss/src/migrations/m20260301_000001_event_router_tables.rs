use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 1. events
        manager
            .create_table(
                Table::create()
                    .table(Events::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Events::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Events::TriggerType).string().not_null())
                    .col(ColumnDef::new(Events::Payload).json().not_null())
                    .col(ColumnDef::new(Events::SpaceId).string().not_null())
                    .col(ColumnDef::new(Events::Timestamp).timestamp().not_null())
                    .col(ColumnDef::new(Events::Status).string().not_null())
                    .col(ColumnDef::new(Events::ProcessingStartedAt).timestamp())
                    .col(ColumnDef::new(Events::CredentialType).string().not_null())
                    .col(ColumnDef::new(Events::PrincipalId).string().not_null())
                    .col(ColumnDef::new(Events::ApiKeyId).string())
                    .col(
                        ColumnDef::new(Events::Revision)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_events_status_timestamp")
                    .table(Events::Table)
                    .col(Events::Status)
                    .col(Events::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_events_trigger_type_space_id")
                    .table(Events::Table)
                    .col(Events::TriggerType)
                    .col(Events::SpaceId)
                    .to_owned(),
            )
            .await?;

        // 2. subscriptions
        manager
            .create_table(
                Table::create()
                    .table(Subscriptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Subscriptions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Subscriptions::WorkflowId).string().not_null())
                    .col(ColumnDef::new(Subscriptions::TriggerType).string().not_null())
                    .col(ColumnDef::new(Subscriptions::SpaceId).string().not_null())
                    .col(ColumnDef::new(Subscriptions::WhereClause).text())
                    .col(ColumnDef::new(Subscriptions::Enabled).boolean().not_null())
                    .col(ColumnDef::new(Subscriptions::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Subscriptions::UpdatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Subscriptions::CreatedBy).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_subscriptions_trigger_space_enabled")
                    .table(Subscriptions::Table)
                    .col(Subscriptions::TriggerType)
                    .col(Subscriptions::SpaceId)
                    .col(Subscriptions::Enabled)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_subscriptions_workflow_id")
                    .table(Subscriptions::Table)
                    .col(Subscriptions::WorkflowId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Subscriptions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Events::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Events {
    Table,
    Id,
    TriggerType,
    Payload,
    SpaceId,
    Timestamp,
    Status,
    ProcessingStartedAt,
    CredentialType,
    PrincipalId,
    ApiKeyId,
    Revision,
}

#[derive(DeriveIden)]
enum Subscriptions {
    Table,
    Id,
    WorkflowId,
    TriggerType,
    SpaceId,
    WhereClause,
    Enabled,
    CreatedAt,
    UpdatedAt,
    CreatedBy,
}
