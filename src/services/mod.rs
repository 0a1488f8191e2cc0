// Pure fee rules
pub mod fee_calculator;

// Stock ledger and reconciliation
pub mod inventory;

// Transaction records
pub mod transactions;

// Rentals
pub mod rental_lifecycle;

// Returns
pub mod return_processors;
pub mod return_workflow;
pub mod returns;
