use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::{ReturnEventType, ReturnedItem};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rental_return_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub rental_lifecycle_id: Uuid,
    pub transaction_id: Uuid,
    pub event_type: ReturnEventType,
    pub event_date: Date,
    pub processed_by: Option<Uuid>,
    /// JSON list of [`ReturnedItem`]
    #[sea_orm(column_type = "Text")]
    pub items_returned: String,
    pub total_quantity_returned: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub late_fees_charged: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub damage_fees_charged: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub other_fees_charged: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub payment_collected: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub refund_issued: Decimal,
    pub new_return_date: Option<Date>,
    pub extension_reason: Option<String>,
    pub completed_at: Option<DateTimeUtc>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::rental_lifecycle::Entity",
        from = "Column::RentalLifecycleId",
        to = "super::rental_lifecycle::Column::Id",
        on_delete = "Cascade"
    )]
    Lifecycle,
    #[sea_orm(has_many = "super::rental_item_inspection::Entity")]
    Inspections,
}

impl Related<super::rental_lifecycle::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lifecycle.def()
    }
}

impl Related<super::rental_item_inspection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Inspections.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn items(&self) -> Result<Vec<ReturnedItem>, serde_json::Error> {
        serde_json::from_str(&self.items_returned)
    }
}
