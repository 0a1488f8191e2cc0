use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::InventoryUnitStatus;

/// A serialized, individually tracked unit of stock.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_units")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub item_id: Uuid,
    pub location_id: Option<Uuid>,
    pub serial_number: Option<String>,
    pub status: InventoryUnitStatus,
    pub condition: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
