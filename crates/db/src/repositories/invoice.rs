//! Invoice repository.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;
use visadesk_core::billing::{
    AccountKind, CollectionRef, Invoice, InvoiceStatus, InvoiceStore, PaymentMethod, StoreError,
    Totals,
};
use visadesk_shared::types::{AccountId, ClientId, InvoiceId, LedgerTransactionId};

use super::{corrupt, decode, store_error};
use crate::entities::invoices;

const ENTITY: &str = "invoice";

/// PostgreSQL-backed [`InvoiceStore`].
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    db: DatabaseConnection,
}

impl InvoiceRepository {
    /// Creates a new invoice repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn to_active(invoice: &Invoice) -> Result<invoices::ActiveModel, StoreError> {
        let id = invoice.id.into_inner();
        let line_items =
            serde_json::to_value(&invoice.line_items).map_err(|e| corrupt(ENTITY, id, e))?;
        let terms = serde_json::to_value(invoice.terms).map_err(|e| corrupt(ENTITY, id, e))?;
        let collection = invoice.collection;

        Ok(invoices::ActiveModel {
            id: Set(id),
            invoice_number: Set(invoice.number.clone()),
            client_id: Set(invoice.client_id.map(ClientId::into_inner)),
            line_items: Set(line_items),
            terms: Set(terms),
            currency: Set(invoice.currency().code().to_string()),
            subtotal: Set(invoice.totals.subtotal),
            tax_amount: Set(invoice.totals.tax_amount),
            discount: Set(invoice.totals.discount),
            stamp_duty: Set(invoice.totals.stamp_duty),
            withholding_amount: Set(invoice.totals.withholding_amount),
            grand_total: Set(invoice.totals.grand_total),
            status: Set(invoice.status.as_str().to_string()),
            pending_status: Set(invoice.pending_status.map(|s| s.as_str().to_string())),
            issue_date: Set(invoice.issue_date),
            due_date: Set(invoice.due_date),
            collection_account_kind: Set(collection.map(|c| c.account_kind.as_str().to_string())),
            collection_account_id: Set(collection.map(|c| c.account_id.into_inner())),
            collection_payment_method: Set(
                collection.map(|c| c.payment_method.as_str().to_string())
            ),
            ledger_transaction_id: Set(invoice.ledger_transaction_id.map(LedgerTransactionId::into_inner)),
            notes: Set(invoice.notes.clone()),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        })
    }

    fn from_model(model: invoices::Model) -> Result<Invoice, StoreError> {
        let id = model.id;
        let status = decode(ENTITY, id, "status", &model.status, InvoiceStatus::parse)?;
        let pending_status = model
            .pending_status
            .as_deref()
            .map(|raw| decode(ENTITY, id, "pending_status", raw, InvoiceStatus::parse))
            .transpose()?;

        let collection = match (
            model.collection_account_kind.as_deref(),
            model.collection_account_id,
            model.collection_payment_method.as_deref(),
        ) {
            (Some(kind), Some(account_id), Some(method)) => Some(CollectionRef {
                account_kind: decode(ENTITY, id, "account kind", kind, AccountKind::parse)?,
                account_id: AccountId::from_uuid(account_id),
                payment_method: decode(ENTITY, id, "payment method", method, PaymentMethod::parse)?,
            }),
            (None, None, None) => None,
            _ => return Err(corrupt(ENTITY, id, "partial collection reference")),
        };

        Ok(Invoice {
            id: InvoiceId::from_uuid(id),
            number: model.invoice_number,
            client_id: model.client_id.map(ClientId::from_uuid),
            line_items: serde_json::from_value(model.line_items)
                .map_err(|e| corrupt(ENTITY, id, e))?,
            terms: serde_json::from_value(model.terms).map_err(|e| corrupt(ENTITY, id, e))?,
            totals: Totals {
                subtotal: model.subtotal,
                tax_amount: model.tax_amount,
                discount: model.discount,
                stamp_duty: model.stamp_duty,
                withholding_amount: model.withholding_amount,
                grand_total: model.grand_total,
            },
            status,
            pending_status,
            issue_date: model.issue_date,
            due_date: model.due_date,
            collection,
            ledger_transaction_id: model.ledger_transaction_id.map(LedgerTransactionId::from_uuid),
            notes: model.notes,
        })
    }
}

#[async_trait]
impl InvoiceStore for InvoiceRepository {
    async fn get(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        invoices::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(store_error)?
            .map(Self::from_model)
            .transpose()
    }

    async fn insert(&self, invoice: &Invoice) -> Result<(), StoreError> {
        invoices::Entity::insert(Self::to_active(invoice)?)
            .exec_without_returning(&self.db)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn update(&self, invoice: &Invoice) -> Result<(), StoreError> {
        match Self::to_active(invoice)?.update(&self.db).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => Err(StoreError::NotFound {
                entity: ENTITY,
                id: invoice.id.into_inner(),
            }),
            Err(err) => Err(store_error(err)),
        }
    }

    async fn delete(&self, id: InvoiceId) -> Result<bool, StoreError> {
        let result = invoices::Entity::delete_by_id(id.into_inner())
            .exec(&self.db)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected > 0)
    }

    async fn number_exists(&self, number: &str) -> Result<bool, StoreError> {
        let count = invoices::Entity::find()
            .filter(invoices::Column::InvoiceNumber.eq(number))
            .count(&self.db)
            .await
            .map_err(store_error)?;
        Ok(count > 0)
    }

    async fn numbers_with_prefix(&self, stem: &str) -> Result<Vec<String>, StoreError> {
        invoices::Entity::find()
            .select_only()
            .column(invoices::Column::InvoiceNumber)
            .filter(invoices::Column::InvoiceNumber.starts_with(stem))
            .into_tuple::<String>()
            .all(&self.db)
            .await
            .map_err(store_error)
    }

    async fn list_ids(&self) -> Result<Vec<InvoiceId>, StoreError> {
        let ids = invoices::Entity::find()
            .select_only()
            .column(invoices::Column::Id)
            .order_by_asc(invoices::Column::Id)
            .into_tuple::<Uuid>()
            .all(&self.db)
            .await
            .map_err(store_error)?;
        Ok(ids.into_iter().map(InvoiceId::from_uuid).collect())
    }

    async fn list_issued_between(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<Invoice>, StoreError> {
        invoices::Entity::find()
            .filter(invoices::Column::IssueDate.gte(from))
            .filter(invoices::Column::IssueDate.lt(until))
            .order_by_asc(invoices::Column::IssueDate)
            .order_by_asc(invoices::Column::Id)
            .all(&self.db)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(Self::from_model)
            .collect()
    }
}
