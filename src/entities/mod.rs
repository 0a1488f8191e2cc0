pub mod inventory_unit;
pub mod rental_item_inspection;
pub mod rental_lifecycle;
pub mod rental_return_event;
pub mod return_task;
pub mod return_workflow_history;
pub mod stock_level;
pub mod stock_movement;
pub mod stock_reconciliation_task;
pub mod supplier_credit_memo;
pub mod transaction_header;
pub mod transaction_line;
pub mod transaction_metadata;
