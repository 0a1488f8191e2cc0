use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::{DamageSeverity, RentalItemCondition};

/// One row per (return event, transaction line).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rental_item_inspections")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub return_event_id: Uuid,
    pub transaction_line_id: Uuid,
    pub condition: RentalItemCondition,
    pub has_damage: bool,
    pub damage_severity: Option<DamageSeverity>,
    #[sea_orm(column_type = "Text", nullable)]
    pub damage_description: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub estimated_repair_cost: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub damage_fee_assessed: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub cleaning_fee_assessed: Decimal,
    pub replacement_required: bool,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub replacement_cost: Option<Decimal>,
    pub return_to_stock: bool,
    pub requires_maintenance: bool,
    pub inspected_by: Option<Uuid>,
    pub inspection_date: DateTimeUtc,
    #[sea_orm(column_type = "Text", nullable)]
    pub inspection_notes: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::rental_return_event::Entity",
        from = "Column::ReturnEventId",
        to = "super::rental_return_event::Column::Id",
        on_delete = "Cascade"
    )]
    ReturnEvent,
}

impl Related<super::rental_return_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReturnEvent.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
