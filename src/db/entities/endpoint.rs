use crate::db::enums::EndpointStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "endpoints")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub url: String,
    pub interval_seconds: i32,
    pub is_active: bool,
    pub status: EndpointStatus,
    pub last_checked_at: Option<ChronoDateTimeUtc>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::probe_result::Entity")]
    ProbeResult,
}

impl Related<super::probe_result::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProbeResult.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
