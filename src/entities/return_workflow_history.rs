use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::ReturnWorkflowState;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "return_workflow_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub return_id: Uuid,
    /// None for the initial INITIATED entry
    pub from_state: Option<ReturnWorkflowState>,
    pub to_state: ReturnWorkflowState,
    /// JSON list of executed workflow actions
    #[sea_orm(column_type = "Text")]
    pub actions: String,
    pub performed_by: Option<Uuid>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub created_at: DateTimeUtc,
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
