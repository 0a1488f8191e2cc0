use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::rental::RentalItemCondition;
use super::transaction::money_amount;

/// The three kinds of return the unified return service understands.
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
pub enum ReturnType {
    #[sea_orm(string_value = "SALE")]
    Sale,
    #[sea_orm(string_value = "PURCHASE")]
    Purchase,
    #[sea_orm(string_value = "RENTAL")]
    Rental,
}

impl ReturnType {
    /// Tag stored in `transaction_metadata.metadata_type`.
    pub fn metadata_type(self) -> &'static str {
        match self {
            ReturnType::Sale => "RETURN_SALE",
            ReturnType::Purchase => "RETURN_PURCHASE",
            ReturnType::Rental => "RETURN_RENTAL",
        }
    }

    pub fn from_metadata_type(value: &str) -> Option<Self> {
        match value {
            "RETURN_SALE" => Some(ReturnType::Sale),
            "RETURN_PURCHASE" => Some(ReturnType::Purchase),
            "RETURN_RENTAL" => Some(ReturnType::Rental),
            _ => None,
        }
    }
}

/// States of the per-type return workflow.
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
pub enum ReturnWorkflowState {
    #[sea_orm(string_value = "INITIATED")]
    Initiated,
    #[sea_orm(string_value = "VALIDATED")]
    Validated,
    #[sea_orm(string_value = "ITEMS_RECEIVED")]
    ItemsReceived,
    #[sea_orm(string_value = "INSPECTION_PENDING")]
    InspectionPending,
    #[sea_orm(string_value = "INSPECTION_COMPLETE")]
    InspectionComplete,
    #[sea_orm(string_value = "REFUND_APPROVED")]
    RefundApproved,
    #[sea_orm(string_value = "REFUND_PROCESSED")]
    RefundProcessed,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
}

impl ReturnWorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReturnWorkflowState::Completed | ReturnWorkflowState::Cancelled
        )
    }
}

/// Follow-up work created by workflow side effects.
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
pub enum ReturnTaskKind {
    #[sea_orm(string_value = "INSPECTION")]
    Inspection,
    #[sea_orm(string_value = "REFUND")]
    Refund,
    #[sea_orm(string_value = "DEPOSIT_REFUND")]
    DepositRefund,
    #[sea_orm(string_value = "SUPPLIER_FOLLOW_UP")]
    SupplierFollowUp,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleItemCondition {
    New,
    Opened,
    Used,
    Damaged,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundMethod {
    OriginalPayment,
    StoreCredit,
    Cash,
    Exchange,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CleaningLevel {
    Minor,
    Major,
}

fn default_true() -> bool {
    true
}

/// Fields every type-specific return line exposes to common validation.
pub trait ReturnLine {
    fn original_line_id(&self) -> Uuid;
    fn return_quantity(&self) -> i32;
    /// Condition code written to `transaction_lines.return_condition`.
    fn condition_code(&self) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SaleReturnLine {
    pub original_line_id: Uuid,
    pub return_quantity: i32,
    pub condition: SaleItemCondition,
    #[serde(default = "default_true")]
    pub return_to_stock: bool,
    #[serde(default = "default_true")]
    pub original_packaging: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ReturnLine for SaleReturnLine {
    fn original_line_id(&self) -> Uuid {
        self.original_line_id
    }
    fn return_quantity(&self) -> i32 {
        self.return_quantity
    }
    fn condition_code(&self) -> Option<String> {
        Some(self.condition.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SaleReturnDetails {
    pub lines: Vec<SaleReturnLine>,
    pub refund_method: RefundMethod,
    #[serde(default)]
    pub exchange_transaction_id: Option<Uuid>,
    #[serde(default)]
    pub customer_pays_return_shipping: bool,
    #[serde(default)]
    pub return_shipping_cost: Decimal,
    #[serde(default)]
    pub quality_check_required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PurchaseReturnLine {
    pub original_line_id: Uuid,
    pub return_quantity: i32,
    #[serde(default)]
    pub defect_code: Option<String>,
    #[serde(default)]
    pub supplier_fault: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ReturnLine for PurchaseReturnLine {
    fn original_line_id(&self) -> Uuid {
        self.original_line_id
    }
    fn return_quantity(&self) -> i32 {
        self.return_quantity
    }
    fn condition_code(&self) -> Option<String> {
        self.defect_code.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PurchaseReturnDetails {
    pub lines: Vec<PurchaseReturnLine>,
    #[serde(default)]
    pub supplier_rma_number: String,
    #[serde(default)]
    pub rma_authorization_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_quality_claim: bool,
    /// Percentage (0-100) the supplier keeps as a restocking fee.
    #[serde(default)]
    pub supplier_restocking_fee_percent: Option<Decimal>,
    #[serde(default)]
    pub quality_check_required: bool,
    #[serde(default)]
    pub shipping_carrier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RentalReturnLine {
    pub original_line_id: Uuid,
    pub return_quantity: i32,
    pub condition: RentalItemCondition,
    #[serde(default)]
    pub damage_description: Option<String>,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub cleaning_required: Option<CleaningLevel>,
    #[serde(default)]
    pub beyond_normal_wear: bool,
    #[serde(default)]
    pub missing_accessories: Vec<String>,
    #[serde(default)]
    pub repair_cost_estimate: Option<Decimal>,
}

impl ReturnLine for RentalReturnLine {
    fn original_line_id(&self) -> Uuid {
        self.original_line_id
    }
    fn return_quantity(&self) -> i32 {
        self.return_quantity
    }
    fn condition_code(&self) -> Option<String> {
        Some(self.condition.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RentalReturnDetails {
    pub lines: Vec<RentalReturnLine>,
    /// Overrides the computed late fee when present.
    #[serde(default)]
    pub late_fee: Option<Decimal>,
    /// Overrides the computed cleaning fee when present.
    #[serde(default)]
    pub cleaning_fee: Option<Decimal>,
    #[serde(default)]
    pub inspector_id: Option<Uuid>,
}

/// Type-specific part of a return request; also the persisted metadata payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "return_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnDetails {
    Sale(SaleReturnDetails),
    Purchase(PurchaseReturnDetails),
    Rental(RentalReturnDetails),
}

impl ReturnDetails {
    pub fn return_type(&self) -> ReturnType {
        match self {
            ReturnDetails::Sale(_) => ReturnType::Sale,
            ReturnDetails::Purchase(_) => ReturnType::Purchase,
            ReturnDetails::Rental(_) => ReturnType::Rental,
        }
    }

    /// Quality-check flag consulted by workflow guards.
    pub fn quality_check_required(&self) -> bool {
        match self {
            ReturnDetails::Sale(d) => d.quality_check_required,
            ReturnDetails::Purchase(d) => d.quality_check_required,
            ReturnDetails::Rental(_) => true,
        }
    }

    pub fn rma_number(&self) -> Option<&str> {
        match self {
            ReturnDetails::Purchase(d) if !d.supplier_rma_number.trim().is_empty() => {
                Some(d.supplier_rma_number.as_str())
            }
            _ => None,
        }
    }

    /// Line references and quantities, independent of the return type.
    pub fn line_refs(&self) -> Vec<(Uuid, i32, Option<String>)> {
        fn collect<L: ReturnLine>(lines: &[L]) -> Vec<(Uuid, i32, Option<String>)> {
            lines
                .iter()
                .map(|l| (l.original_line_id(), l.return_quantity(), l.condition_code()))
                .collect()
        }
        match self {
            ReturnDetails::Sale(d) => collect(&d.lines),
            ReturnDetails::Purchase(d) => collect(&d.lines),
            ReturnDetails::Rental(d) => collect(&d.lines),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateReturnRequest {
    pub original_transaction_id: Uuid,
    pub return_date: NaiveDate,
    #[validate(length(min = 1, max = 64, message = "Reason code cannot be empty"))]
    pub reason_code: String,
    #[serde(default)]
    #[validate(length(max = 1000, message = "Notes too long"))]
    pub notes: Option<String>,
    #[serde(default)]
    pub processed_by: Option<Uuid>,
    pub details: ReturnDetails,
}

/// Money outcome of a return, shaped per return type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "return_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinancialBreakdown {
    Sale {
        subtotal: Decimal,
        restocking_fee: Decimal,
        shipping_deduction: Decimal,
        refund_amount: Decimal,
    },
    Purchase {
        return_value: Decimal,
        restocking_fee: Decimal,
        expected_credit: Decimal,
    },
    Rental {
        late_fee_days: i64,
        late_fee: Decimal,
        damage_fee: Decimal,
        cleaning_fee: Decimal,
        total_deductions: Decimal,
        deposit_amount: Decimal,
        deposit_refund: Decimal,
        amount_due: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReturnFinancials {
    /// Value of the returned goods at original prices.
    pub return_value: Decimal,
    pub estimated_refund: Decimal,
    pub estimated_fees: Decimal,
    pub breakdown: FinancialBreakdown,
}

/// Serialized into `transaction_metadata.metadata_content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnMetadata {
    pub reason_code: String,
    pub details: ReturnDetails,
    pub financials: ReturnFinancials,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReturnValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub estimated_refund: Option<Decimal>,
    pub estimated_fees: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReturnLineView {
    pub id: Uuid,
    pub original_line_id: Option<Uuid>,
    pub item_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub return_condition: Option<String>,
}

/// Type-specific view reconstructed from a return and its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReturnDetailsView {
    pub return_id: Uuid,
    pub transaction_number: String,
    pub original_transaction_id: Option<Uuid>,
    pub return_type: ReturnType,
    pub workflow_state: Option<ReturnWorkflowState>,
    pub return_date: DateTime<Utc>,
    pub reason_code: String,
    pub total_amount: Decimal,
    pub lines: Vec<ReturnLineView>,
    pub specific_details: ReturnDetails,
    pub financials: ReturnFinancials,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReturnSummary {
    pub id: Uuid,
    pub transaction_number: String,
    pub original_transaction_id: Option<Uuid>,
    pub return_type: Option<ReturnType>,
    pub workflow_state: Option<ReturnWorkflowState>,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ReturnListFilter {
    pub return_type: Option<ReturnType>,
    pub workflow_state: Option<ReturnWorkflowState>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct WorkflowTransitionRequest {
    pub to_state: ReturnWorkflowState,
    #[serde(default)]
    pub performed_by: Option<Uuid>,
    #[serde(default)]
    #[validate(length(max = 1000, message = "Notes too long"))]
    pub notes: Option<String>,
    /// Marks the inspection as done; guards INSPECTION_PENDING -> INSPECTION_COMPLETE.
    #[serde(default)]
    pub inspection_completed: bool,
    /// Payment / credit reference; guards REFUND_APPROVED -> REFUND_PROCESSED.
    #[serde(default)]
    pub refund_reference: Option<String>,
}

/// Side effect of a workflow transition, executed in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowAction {
    CreateTask { kind: ReturnTaskKind },
    UpdateInventory,
    SendNotification { template: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WorkflowHistoryView {
    pub from_state: Option<ReturnWorkflowState>,
    pub to_state: ReturnWorkflowState,
    pub actions: Vec<WorkflowAction>,
    pub performed_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReturnTaskView {
    pub id: Uuid,
    pub kind: ReturnTaskKind,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<crate::entities::return_task::Model> for ReturnTaskView {
    fn from(task: crate::entities::return_task::Model) -> Self {
        Self {
            id: task.id,
            kind: task.kind,
            status: task.status,
            created_at: task.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WorkflowView {
    pub return_id: Uuid,
    pub return_type: ReturnType,
    pub current_state: ReturnWorkflowState,
    pub allowed_next_states: Vec<ReturnWorkflowState>,
    pub history: Vec<WorkflowHistoryView>,
    pub tasks: Vec<ReturnTaskView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SupplierCreditRequest {
    #[validate(length(min = 1, max = 64, message = "Credit memo number cannot be empty"))]
    pub memo_number: String,
    #[validate(custom = "money_amount")]
    pub credit_amount: Decimal,
    #[serde(default)]
    pub received_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreditMemoView {
    pub id: Uuid,
    pub return_id: Uuid,
    pub memo_number: String,
    #[validate(custom = "money_amount")]
    pub credit_amount: Decimal,
    pub expected_amount: Decimal,
    /// `expected_amount - credit_amount`; positive when the supplier short-credited
    pub variance: Decimal,
    pub received_date: NaiveDate,
    pub notes: Option<String>,
}

impl From<crate::entities::supplier_credit_memo::Model> for CreditMemoView {
    fn from(memo: crate::entities::supplier_credit_memo::Model) -> Self {
        Self {
            id: memo.id,
            return_id: memo.return_id,
            variance: memo.expected_amount - memo.credit_amount,
            memo_number: memo.memo_number,
            credit_amount: memo.credit_amount,
            expected_amount: memo.expected_amount,
            received_date: memo.received_date,
            notes: memo.notes,
        }
    }
}
