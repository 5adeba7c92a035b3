use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WorkflowDefinitions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WorkflowDefinitions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WorkflowDefinitions::SpaceId).string().not_null())
                    .col(ColumnDef::new(WorkflowDefinitions::Name).string().not_null())
                    .col(ColumnDef::new(WorkflowDefinitions::Enabled).boolean().not_null())
                    .col(ColumnDef::new(WorkflowDefinitions::Valid).boolean().not_null())
                    .col(ColumnDef::new(WorkflowDefinitions::DeletedAt).timestamp())
                    .col(ColumnDef::new(WorkflowDefinitions::Definition).json())
                    .col(
                        ColumnDef::new(WorkflowDefinitions::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_workflow_definitions_space_id")
                    .table(WorkflowDefinitions::Table)
                    .col(WorkflowDefinitions::SpaceId)
                    .to_owned(),
            )
            .await?;

        // Sealed execution credentials, one per event.
        manager
            .create_table(
                Table::create()
                    .table(EventCredentials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EventCredentials::EventId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EventCredentials::CredentialId).string().not_null())
                    .col(ColumnDef::new(EventCredentials::PrincipalId).string().not_null())
                    .col(ColumnDef::new(EventCredentials::SealedSecret).text().not_null())
                    .col(
                        ColumnDef::new(EventCredentials::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EventCredentials::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WorkflowDefinitions::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum WorkflowDefinitions {
    Table,
    Id,
    SpaceId,
    Name,
    Enabled,
    Valid,
    DeletedAt,
    Definition,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum EventCredentials {
    Table,
    EventId,
    CredentialId,
    PrincipalId,
    SealedSecret,
    CreatedAt,
}
