pub use sea_orm_migration::prelude::*;

mod m20260301_000001_event_router_tables;
mod m20260302_000001_workflows_and_credentials;

pub use m20260301_000001_event_router_tables::Migration as EventRouterTablesMigration;
pub use m20260302_000001_workflows_and_credentials::Migration as WorkflowsAndCredentialsMigration;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_event_router_tables::Migration),
            Box::new(m20260302_000001_workflows_and_credentials::Migration),
        ]
    }
}
