use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::ReturnTaskKind;

pub const STATUS_OPEN: &str = "OPEN";
pub const STATUS_DONE: &str = "DONE";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "return_tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub return_id: Uuid,
    pub kind: ReturnTaskKind,
    pub status: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transaction_header::Entity",
        from = "Column::ReturnId",
        to = "super::transaction_header::Column::Id",
        on_delete = "Cascade"
    )]
    Return,
}

impl Related<super::transaction_header::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Return.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
