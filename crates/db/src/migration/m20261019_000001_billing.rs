//! Billing schema.
//!
//! Invoices, their ledger transactions, accounts with per-currency balances,
//! the balance adjustment journal and the period archive.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(ACCOUNTS_SQL).await?;
        db.execute_unprepared(INVOICES_SQL).await?;
        db.execute_unprepared(LEDGER_TRANSACTIONS_SQL).await?;
        db.execute_unprepared(BALANCE_ADJUSTMENTS_SQL).await?;
        db.execute_unprepared(ARCHIVE_RECORDS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(
            "DROP TABLE IF EXISTS archive_records, balance_adjustments, ledger_transactions, \
             invoices, account_balances, accounts CASCADE;",
        )
        .await?;
        Ok(())
    }
}

const ACCOUNTS_SQL: &str = r"
CREATE TABLE accounts (
    id UUID PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    kind VARCHAR(20) NOT NULL CHECK (kind IN ('cash_register', 'bank_account')),
    initial_amounts JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE account_balances (
    account_id UUID NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    currency VARCHAR(3) NOT NULL,
    balance NUMERIC(19, 4) NOT NULL DEFAULT 0,
    version BIGINT NOT NULL DEFAULT 1,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (account_id, currency)
);
";

const INVOICES_SQL: &str = r"
CREATE TABLE invoices (
    id UUID PRIMARY KEY,
    invoice_number VARCHAR(64) NOT NULL UNIQUE,
    client_id UUID,
    line_items JSONB NOT NULL DEFAULT '[]'::jsonb,
    terms JSONB NOT NULL,
    currency VARCHAR(3) NOT NULL,
    subtotal NUMERIC(19, 4) NOT NULL,
    tax_amount NUMERIC(19, 4) NOT NULL,
    discount NUMERIC(19, 4) NOT NULL,
    stamp_duty NUMERIC(19, 4) NOT NULL,
    withholding_amount NUMERIC(19, 4) NOT NULL,
    grand_total NUMERIC(19, 4) NOT NULL CHECK (grand_total >= 0),
    status VARCHAR(16) NOT NULL CHECK (status IN ('draft', 'sent', 'paid', 'cancelled')),
    pending_status VARCHAR(16) CHECK (pending_status IN ('draft', 'sent', 'cancelled')),
    issue_date DATE NOT NULL,
    due_date DATE,
    collection_account_kind VARCHAR(20),
    collection_account_id UUID,
    collection_payment_method VARCHAR(20),
    ledger_transaction_id UUID,
    notes TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_due_after_issue CHECK (due_date IS NULL OR due_date >= issue_date),
    CONSTRAINT chk_collection_complete CHECK (
        (collection_account_kind IS NULL) = (collection_account_id IS NULL)
        AND (collection_account_id IS NULL) = (collection_payment_method IS NULL)
    )
);

-- Period close scans by issue date
CREATE INDEX idx_invoices_issue_date ON invoices(issue_date);
";

const LEDGER_TRANSACTIONS_SQL: &str = r"
CREATE TABLE ledger_transactions (
    id UUID PRIMARY KEY,
    -- At most one transaction per invoice
    invoice_id UUID NOT NULL UNIQUE,
    direction VARCHAR(8) NOT NULL CHECK (direction IN ('inflow', 'outflow')),
    category VARCHAR(64) NOT NULL,
    amount NUMERIC(19, 4) NOT NULL CHECK (amount >= 0),
    currency VARCHAR(3) NOT NULL,
    payment_method VARCHAR(20) NOT NULL,
    account_kind VARCHAR(20) NOT NULL,
    account_id UUID NOT NULL REFERENCES accounts(id),
    transaction_date DATE NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
";

const BALANCE_ADJUSTMENTS_SQL: &str = r"
CREATE TABLE balance_adjustments (
    transaction_id UUID NOT NULL,
    kind VARCHAR(8) NOT NULL CHECK (kind IN ('credit', 'reversal')),
    account_id UUID NOT NULL REFERENCES accounts(id),
    currency VARCHAR(3) NOT NULL,
    delta NUMERIC(19, 4) NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (transaction_id, kind)
);
";

const ARCHIVE_RECORDS_SQL: &str = r"
CREATE TABLE archive_records (
    year INTEGER NOT NULL,
    month SMALLINT NOT NULL CHECK (month BETWEEN 1 AND 12),
    original_id UUID NOT NULL,
    kind VARCHAR(20) NOT NULL CHECK (kind IN ('invoice', 'ledger_transaction')),
    payload JSONB NOT NULL,
    archived_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (year, month, original_id)
);

CREATE INDEX idx_archive_records_original ON archive_records(original_id);
";
