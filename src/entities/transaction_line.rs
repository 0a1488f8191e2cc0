use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::RentalStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transaction_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub line_number: i32,
    pub item_id: Uuid,
    pub inventory_unit_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub description: String,
    /// Negative on RETURN lines
    pub quantity: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub unit_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discount_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub tax_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub line_total: Decimal,
    pub rental_start_date: Option<Date>,
    pub rental_end_date: Option<Date>,
    pub rental_period: Option<i32>,
    pub rental_status: Option<RentalStatus>,
    pub returned_quantity: i32,
    pub return_condition: Option<String>,
    /// Line of the original transaction a RETURN line reverses
    pub original_line_id: Option<Uuid>,
    pub version: i32,
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
    Header,
}

impl Related<super::transaction_header::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Header.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn remaining_quantity(&self) -> i32 {
        (self.quantity - self.returned_quantity).max(0)
    }

    pub fn is_fully_returned(&self) -> bool {
        self.returned_quantity >= self.quantity
    }
}
