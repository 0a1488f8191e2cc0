// Domain enums and request / response types shared by entities, services and handlers.
pub mod inventory;
pub mod rental;
pub mod returns;
pub mod transaction;

pub use inventory::{InventoryUnitStatus, ReconciliationStatus, StockMovementType, DEFAULT_LOCATION_ID};
pub use rental::{DamageSeverity, RentalItemCondition, RentalStatus, ReturnEventType, ReturnedItem};
pub use returns::{
    CleaningLevel, CreateReturnRequest, FinancialBreakdown, PurchaseReturnDetails,
    PurchaseReturnLine, RefundMethod, RentalReturnDetails, RentalReturnLine, ReturnDetails,
    ReturnDetailsView, ReturnFinancials, ReturnMetadata, ReturnTaskKind, ReturnType,
    ReturnValidationResult, ReturnWorkflowState, SaleItemCondition, SaleReturnDetails,
    SaleReturnLine, WorkflowAction,
};
pub use transaction::{RentalPeriodUnit, TransactionStatus, TransactionType};
