//! Open-source storage layer for the ClearGate event router.
//!
//! Contains SeaORM entities, migrations, and store implementations for the
//! four event-router tables: `events`, `subscriptions`,
//! `workflow_definitions`, and `event_credentials`.

pub mod migrations;
pub mod models;
pub mod stores;

pub use stores::{
    SeaOrmCredentialVault, SeaOrmEventStore, SeaOrmSubscriptionStore, SeaOrmWorkflowSource,
};

use sea_orm::{Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;

/// Connect to a database using the given URL.
pub async fn connect(url: &str) -> Result<DatabaseConnection, DbErr> {
    Database::connect(url).await
}

/// Run the event-router migrations.
pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    migrations::Migrator::up(db, None).await
}
