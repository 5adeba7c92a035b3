use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub trigger_type: String,
    #[sea_orm(column_type = "Json")]
    pub payload: serde_json::Value,
    pub space_id: String,
    pub timestamp: DateTime,
    pub status: String,
    pub processing_started_at: Option<DateTime>,
    pub credential_type: String,
    pub principal_id: String,
    pub api_key_id: Option<String>,
    pub revision: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
