use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::RentalStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rental_lifecycles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub transaction_id: Uuid,
    pub current_status: RentalStatus,
    pub last_status_change: DateTimeUtc,
    pub status_changed_by: Option<Uuid>,
    pub expected_return_date: Option<Date>,
    pub actual_return_date: Option<Date>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_late_fees: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_damage_fees: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_other_fees: Decimal,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transaction_header::Entity",
        from = "Column::TransactionId",
        to = "super::transaction_header::Column::Id",
        on_delete = "Cascade"
    )]
    Transaction,
    #[sea_orm(has_many = "super::rental_return_event::Entity")]
    ReturnEvents,
}

impl Related<super::transaction_header::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transaction.def()
    }
}

impl Related<super::rental_return_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReturnEvents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn total_fees(&self) -> Decimal {
        self.total_late_fees + self.total_damage_fees + self.total_other_fees
    }
}
