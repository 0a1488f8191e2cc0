use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::{InventoryUnitStatus, ReconciliationStatus};

/// A rental-return stock update that failed and is retried in the background.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_reconciliation_tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub return_id: Uuid,
    pub transaction_line_id: Uuid,
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub inventory_unit_id: Option<Uuid>,
    pub quantity: i32,
    pub target_status: InventoryUnitStatus,
    pub status: ReconciliationStatus,
    pub attempts: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
