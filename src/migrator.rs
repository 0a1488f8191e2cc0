use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_transaction_tables::Migration),
            Box::new(m20240301_000002_create_rental_tables::Migration),
            Box::new(m20240301_000003_create_return_workflow_tables::Migration),
            Box::new(m20240301_000004_create_inventory_tables::Migration),
        ]
    }
}

fn money<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .decimal()
        .not_null()
        .default(0)
        .to_owned()
}

mod m20240301_000001_create_transaction_tables {
    use super::money;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_transaction_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(TransactionHeaders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TransactionHeaders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransactionHeaders::TransactionNumber)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(TransactionHeaders::TransactionType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransactionHeaders::Status)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransactionHeaders::TransactionDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TransactionHeaders::CustomerId).uuid().null())
                        .col(ColumnDef::new(TransactionHeaders::SupplierId).uuid().null())
                        .col(ColumnDef::new(TransactionHeaders::LocationId).uuid().null())
                        .col(
                            ColumnDef::new(TransactionHeaders::ReferenceTransactionId)
                                .uuid()
                                .null(),
                        )
                        .col(money(TransactionHeaders::Subtotal))
                        .col(money(TransactionHeaders::DiscountAmount))
                        .col(money(TransactionHeaders::TaxAmount))
                        .col(money(TransactionHeaders::TotalAmount))
                        .col(money(TransactionHeaders::PaidAmount))
                        .col(money(TransactionHeaders::DepositAmount))
                        .col(money(TransactionHeaders::CustomerAdvanceBalance))
                        .col(ColumnDef::new(TransactionHeaders::RentalStartDate).date().null())
                        .col(ColumnDef::new(TransactionHeaders::RentalEndDate).date().null())
                        .col(ColumnDef::new(TransactionHeaders::RentalPeriod).integer().null())
                        .col(
                            ColumnDef::new(TransactionHeaders::RentalPeriodUnit)
                                .string_len(16)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(TransactionHeaders::WorkflowState)
                                .string_len(32)
                                .null(),
                        )
                        .col(ColumnDef::new(TransactionHeaders::Notes).text().null())
                        .col(
                            ColumnDef::new(TransactionHeaders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransactionHeaders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transaction_headers_type_status")
                        .table(TransactionHeaders::Table)
                        .col(TransactionHeaders::TransactionType)
                        .col(TransactionHeaders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transaction_headers_reference")
                        .table(TransactionHeaders::Table)
                        .col(TransactionHeaders::ReferenceTransactionId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(TransactionLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TransactionLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TransactionLines::TransactionId).uuid().not_null())
                        .col(ColumnDef::new(TransactionLines::LineNumber).integer().not_null())
                        .col(ColumnDef::new(TransactionLines::ItemId).uuid().not_null())
                        .col(ColumnDef::new(TransactionLines::InventoryUnitId).uuid().null())
                        .col(ColumnDef::new(TransactionLines::LocationId).uuid().null())
                        .col(
                            ColumnDef::new(TransactionLines::Description)
                                .string_len(255)
                                .not_null(),
                        )
                        .col(ColumnDef::new(TransactionLines::Quantity).integer().not_null())
                        .col(money(TransactionLines::UnitPrice))
                        .col(money(TransactionLines::DiscountAmount))
                        .col(money(TransactionLines::TaxAmount))
                        .col(money(TransactionLines::LineTotal))
                        .col(ColumnDef::new(TransactionLines::RentalStartDate).date().null())
                        .col(ColumnDef::new(TransactionLines::RentalEndDate).date().null())
                        .col(ColumnDef::new(TransactionLines::RentalPeriod).integer().null())
                        .col(
                            ColumnDef::new(TransactionLines::RentalStatus)
                                .string_len(32)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(TransactionLines::ReturnedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(TransactionLines::ReturnCondition)
                                .string_len(64)
                                .null(),
                        )
                        .col(ColumnDef::new(TransactionLines::OriginalLineId).uuid().null())
                        .col(
                            ColumnDef::new(TransactionLines::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(TransactionLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransactionLines::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_transaction_lines_header")
                                .from(TransactionLines::Table, TransactionLines::TransactionId)
                                .to(TransactionHeaders::Table, TransactionHeaders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transaction_lines_transaction")
                        .table(TransactionLines::Table)
                        .col(TransactionLines::TransactionId)
                        .col(TransactionLines::LineNumber)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(TransactionMetadata::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TransactionMetadata::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransactionMetadata::TransactionId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(TransactionMetadata::MetadataType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransactionMetadata::MetadataContent)
                                .text()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransactionMetadata::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransactionMetadata::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_transaction_metadata_header")
                                .from(TransactionMetadata::Table, TransactionMetadata::TransactionId)
                                .to(TransactionHeaders::Table, TransactionHeaders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TransactionMetadata::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(TransactionLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(TransactionHeaders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum TransactionHeaders {
        Table,
        Id,
        TransactionNumber,
        TransactionType,
        Status,
        TransactionDate,
        CustomerId,
        SupplierId,
        LocationId,
        ReferenceTransactionId,
        Subtotal,
        DiscountAmount,
        TaxAmount,
        TotalAmount,
        PaidAmount,
        DepositAmount,
        CustomerAdvanceBalance,
        RentalStartDate,
        RentalEndDate,
        RentalPeriod,
        RentalPeriodUnit,
        WorkflowState,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum TransactionLines {
        Table,
        Id,
        TransactionId,
        LineNumber,
        ItemId,
        InventoryUnitId,
        LocationId,
        Description,
        Quantity,
        UnitPrice,
        DiscountAmount,
        TaxAmount,
        LineTotal,
        RentalStartDate,
        RentalEndDate,
        RentalPeriod,
        RentalStatus,
        ReturnedQuantity,
        ReturnCondition,
        OriginalLineId,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum TransactionMetadata {
        Table,
        Id,
        TransactionId,
        MetadataType,
        MetadataContent,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_rental_tables {
    use super::m20240301_000001_create_transaction_tables::TransactionHeaders;
    use super::money;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_rental_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(RentalLifecycles::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RentalLifecycles::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RentalLifecycles::TransactionId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(RentalLifecycles::CurrentStatus)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RentalLifecycles::LastStatusChange)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RentalLifecycles::StatusChangedBy).uuid().null())
                        .col(
                            ColumnDef::new(RentalLifecycles::ExpectedReturnDate)
                                .date()
                                .null(),
                        )
                        .col(ColumnDef::new(RentalLifecycles::ActualReturnDate).date().null())
                        .col(money(RentalLifecycles::TotalLateFees))
                        .col(money(RentalLifecycles::TotalDamageFees))
                        .col(money(RentalLifecycles::TotalOtherFees))
                        .col(ColumnDef::new(RentalLifecycles::Notes).text().null())
                        .col(
                            ColumnDef::new(RentalLifecycles::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RentalLifecycles::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_rental_lifecycles_transaction")
                                .from(RentalLifecycles::Table, RentalLifecycles::TransactionId)
                                .to(TransactionHeaders::Table, TransactionHeaders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(RentalReturnEvents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RentalReturnEvents::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RentalReturnEvents::RentalLifecycleId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RentalReturnEvents::TransactionId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RentalReturnEvents::EventType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(RentalReturnEvents::EventDate).date().not_null())
                        .col(ColumnDef::new(RentalReturnEvents::ProcessedBy).uuid().null())
                        .col(
                            ColumnDef::new(RentalReturnEvents::ItemsReturned)
                                .text()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RentalReturnEvents::TotalQuantityReturned)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(money(RentalReturnEvents::LateFeesCharged))
                        .col(money(RentalReturnEvents::DamageFeesCharged))
                        .col(money(RentalReturnEvents::OtherFeesCharged))
                        .col(money(RentalReturnEvents::PaymentCollected))
                        .col(money(RentalReturnEvents::RefundIssued))
                        .col(ColumnDef::new(RentalReturnEvents::NewReturnDate).date().null())
                        .col(
                            ColumnDef::new(RentalReturnEvents::ExtensionReason)
                                .string_len(255)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(RentalReturnEvents::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(RentalReturnEvents::Notes).text().null())
                        .col(
                            ColumnDef::new(RentalReturnEvents::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_rental_return_events_lifecycle")
                                .from(
                                    RentalReturnEvents::Table,
                                    RentalReturnEvents::RentalLifecycleId,
                                )
                                .to(RentalLifecycles::Table, RentalLifecycles::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_rental_return_events_lifecycle")
                        .table(RentalReturnEvents::Table)
                        .col(RentalReturnEvents::RentalLifecycleId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(RentalItemInspections::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RentalItemInspections::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RentalItemInspections::ReturnEventId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RentalItemInspections::TransactionLineId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RentalItemInspections::Condition)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RentalItemInspections::HasDamage)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(RentalItemInspections::DamageSeverity)
                                .string_len(16)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(RentalItemInspections::DamageDescription)
                                .text()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(RentalItemInspections::EstimatedRepairCost)
                                .decimal()
                                .null(),
                        )
                        .col(money(RentalItemInspections::DamageFeeAssessed))
                        .col(money(RentalItemInspections::CleaningFeeAssessed))
                        .col(
                            ColumnDef::new(RentalItemInspections::ReplacementRequired)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(RentalItemInspections::ReplacementCost)
                                .decimal()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(RentalItemInspections::ReturnToStock)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(RentalItemInspections::RequiresMaintenance)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(RentalItemInspections::InspectedBy).uuid().null())
                        .col(
                            ColumnDef::new(RentalItemInspections::InspectionDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RentalItemInspections::InspectionNotes)
                                .text()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(RentalItemInspections::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_rental_item_inspections_event")
                                .from(
                                    RentalItemInspections::Table,
                                    RentalItemInspections::ReturnEventId,
                                )
                                .to(RentalReturnEvents::Table, RentalReturnEvents::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("uq_rental_item_inspections_event_line")
                        .table(RentalItemInspections::Table)
                        .col(RentalItemInspections::ReturnEventId)
                        .col(RentalItemInspections::TransactionLineId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(RentalItemInspections::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(RentalReturnEvents::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(RentalLifecycles::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum RentalLifecycles {
        Table,
        Id,
        TransactionId,
        CurrentStatus,
        LastStatusChange,
        StatusChangedBy,
        ExpectedReturnDate,
        ActualReturnDate,
        TotalLateFees,
        TotalDamageFees,
        TotalOtherFees,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum RentalReturnEvents {
        Table,
        Id,
        RentalLifecycleId,
        TransactionId,
        EventType,
        EventDate,
        ProcessedBy,
        ItemsReturned,
        TotalQuantityReturned,
        LateFeesCharged,
        DamageFeesCharged,
        OtherFeesCharged,
        PaymentCollected,
        RefundIssued,
        NewReturnDate,
        ExtensionReason,
        CompletedAt,
        Notes,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum RentalItemInspections {
        Table,
        Id,
        ReturnEventId,
        TransactionLineId,
        Condition,
        HasDamage,
        DamageSeverity,
        DamageDescription,
        EstimatedRepairCost,
        DamageFeeAssessed,
        CleaningFeeAssessed,
        ReplacementRequired,
        ReplacementCost,
        ReturnToStock,
        RequiresMaintenance,
        InspectedBy,
        InspectionDate,
        InspectionNotes,
        CreatedAt,
    }
}

mod m20240301_000003_create_return_workflow_tables {
    use super::m20240301_000001_create_transaction_tables::TransactionHeaders;
    use super::money;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_return_workflow_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ReturnWorkflowHistory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReturnWorkflowHistory::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReturnWorkflowHistory::ReturnId).uuid().not_null())
                        .col(
                            ColumnDef::new(ReturnWorkflowHistory::FromState)
                                .string_len(32)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ReturnWorkflowHistory::ToState)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReturnWorkflowHistory::Actions).text().not_null())
                        .col(ColumnDef::new(ReturnWorkflowHistory::PerformedBy).uuid().null())
                        .col(ColumnDef::new(ReturnWorkflowHistory::Notes).text().null())
                        .col(
                            ColumnDef::new(ReturnWorkflowHistory::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_return_workflow_history_return")
                                .from(ReturnWorkflowHistory::Table, ReturnWorkflowHistory::ReturnId)
                                .to(TransactionHeaders::Table, TransactionHeaders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_return_workflow_history_return")
                        .table(ReturnWorkflowHistory::Table)
                        .col(ReturnWorkflowHistory::ReturnId)
                        .col(ReturnWorkflowHistory::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ReturnTasks::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(ReturnTasks::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(ReturnTasks::ReturnId).uuid().not_null())
                        .col(ColumnDef::new(ReturnTasks::Kind).string_len(32).not_null())
                        .col(
                            ColumnDef::new(ReturnTasks::Status)
                                .string_len(16)
                                .not_null()
                                .default("OPEN"),
                        )
                        .col(
                            ColumnDef::new(ReturnTasks::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReturnTasks::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_return_tasks_return")
                                .from(ReturnTasks::Table, ReturnTasks::ReturnId)
                                .to(TransactionHeaders::Table, TransactionHeaders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SupplierCreditMemos::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SupplierCreditMemos::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierCreditMemos::ReturnId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(SupplierCreditMemos::MemoNumber)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(money(SupplierCreditMemos::CreditAmount))
                        .col(money(SupplierCreditMemos::ExpectedAmount))
                        .col(ColumnDef::new(SupplierCreditMemos::ReceivedDate).date().not_null())
                        .col(ColumnDef::new(SupplierCreditMemos::Notes).text().null())
                        .col(
                            ColumnDef::new(SupplierCreditMemos::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_supplier_credit_memos_return")
                                .from(SupplierCreditMemos::Table, SupplierCreditMemos::ReturnId)
                                .to(TransactionHeaders::Table, TransactionHeaders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SupplierCreditMemos::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ReturnTasks::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ReturnWorkflowHistory::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ReturnWorkflowHistory {
        Table,
        Id,
        ReturnId,
        FromState,
        ToState,
        Actions,
        PerformedBy,
        Notes,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum ReturnTasks {
        Table,
        Id,
        ReturnId,
        Kind,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum SupplierCreditMemos {
        Table,
        Id,
        ReturnId,
        MemoNumber,
        CreditAmount,
        ExpectedAmount,
        ReceivedDate,
        Notes,
        CreatedAt,
    }
}

mod m20240301_000004_create_inventory_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_inventory_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockLevels::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(StockLevels::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(StockLevels::ItemId).uuid().not_null())
                        .col(ColumnDef::new(StockLevels::LocationId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockLevels::QuantityOnHand)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockLevels::QuantityAvailable)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockLevels::QuantityOnRent)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockLevels::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(StockLevels::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("uq_stock_levels_item_location")
                        .table(StockLevels::Table)
                        .col(StockLevels::ItemId)
                        .col(StockLevels::LocationId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InventoryUnits::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryUnits::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryUnits::ItemId).uuid().not_null())
                        .col(ColumnDef::new(InventoryUnits::LocationId).uuid().null())
                        .col(
                            ColumnDef::new(InventoryUnits::SerialNumber)
                                .string_len(128)
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryUnits::Status).string_len(32).not_null())
                        .col(ColumnDef::new(InventoryUnits::Condition).string_len(32).null())
                        .col(
                            ColumnDef::new(InventoryUnits::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryUnits::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::ItemId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::LocationId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockMovements::MovementType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::Quantity).integer().not_null())
                        .col(ColumnDef::new(StockMovements::ReferenceId).uuid().null())
                        .col(ColumnDef::new(StockMovements::Notes).text().null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_item")
                        .table(StockMovements::Table)
                        .col(StockMovements::ItemId)
                        .col(StockMovements::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockReconciliationTasks::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockReconciliationTasks::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockReconciliationTasks::ReturnId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockReconciliationTasks::TransactionLineId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockReconciliationTasks::ItemId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockReconciliationTasks::LocationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockReconciliationTasks::InventoryUnitId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockReconciliationTasks::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockReconciliationTasks::TargetStatus)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockReconciliationTasks::Status)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockReconciliationTasks::Attempts)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(StockReconciliationTasks::LastError).text().null())
                        .col(
                            ColumnDef::new(StockReconciliationTasks::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockReconciliationTasks::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_reconciliation_tasks_status")
                        .table(StockReconciliationTasks::Table)
                        .col(StockReconciliationTasks::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockReconciliationTasks::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(InventoryUnits::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockLevels::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockLevels {
        Table,
        Id,
        ItemId,
        LocationId,
        QuantityOnHand,
        QuantityAvailable,
        QuantityOnRent,
        Version,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum InventoryUnits {
        Table,
        Id,
        ItemId,
        LocationId,
        SerialNumber,
        Status,
        Condition,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum StockMovements {
        Table,
        Id,
        ItemId,
        LocationId,
        MovementType,
        Quantity,
        ReferenceId,
        Notes,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum StockReconciliationTasks {
        Table,
        Id,
        ReturnId,
        TransactionLineId,
        ItemId,
        LocationId,
        InventoryUnitId,
        Quantity,
        TargetStatus,
        Status,
        Attempts,
        LastError,
        CreatedAt,
        UpdatedAt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectOptions, Database};

    #[tokio::test]
    async fn migrations_apply_on_sqlite_and_are_idempotent() {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        Migrator::up(&db, None).await.unwrap();

        let applied = Migrator::get_applied_migrations(&db).await.unwrap();
        assert_eq!(applied.len(), 4);
    }
}
