use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Location used for stock rows when neither the line nor the header names one.
pub const DEFAULT_LOCATION_ID: Uuid = Uuid::nil();

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum InventoryUnitStatus {
    #[sea_orm(string_value = "AVAILABLE")]
    Available,
    #[sea_orm(string_value = "AVAILABLE_USED")]
    AvailableUsed,
    #[sea_orm(string_value = "ON_RENT")]
    OnRent,
    #[sea_orm(string_value = "SOLD")]
    Sold,
    #[sea_orm(string_value = "REQUIRES_INSPECTION")]
    RequiresInspection,
    #[sea_orm(string_value = "REQUIRES_CLEANING")]
    RequiresCleaning,
    #[sea_orm(string_value = "RETURNED_TO_SUPPLIER")]
    ReturnedToSupplier,
}

impl InventoryUnitStatus {
    /// Whether a unit in this status counts toward available stock.
    pub fn is_sellable(self) -> bool {
        matches!(
            self,
            InventoryUnitStatus::Available | InventoryUnitStatus::AvailableUsed
        )
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StockMovementType {
    #[sea_orm(string_value = "SALE")]
    Sale,
    #[sea_orm(string_value = "PURCHASE")]
    Purchase,
    #[sea_orm(string_value = "RENTAL_OUT")]
    RentalOut,
    #[sea_orm(string_value = "RENTAL_RETURN")]
    RentalReturn,
    #[sea_orm(string_value = "CUSTOMER_RETURN")]
    CustomerReturn,
    #[sea_orm(string_value = "SUPPLIER_RETURN")]
    SupplierReturn,
    #[sea_orm(string_value = "ADJUSTMENT")]
    Adjustment,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "RESOLVED")]
    Resolved,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_available_statuses_are_sellable() {
        assert!(InventoryUnitStatus::Available.is_sellable());
        assert!(InventoryUnitStatus::AvailableUsed.is_sellable());
        assert!(!InventoryUnitStatus::RequiresInspection.is_sellable());
        assert!(!InventoryUnitStatus::OnRent.is_sellable());
    }
}
