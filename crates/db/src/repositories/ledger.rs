//! Ledger transaction repository.

use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use visadesk_core::billing::{
    AccountKind, Direction, LedgerStore, LedgerTransaction, PaymentMethod, StoreError,
};
use visadesk_shared::types::{AccountId, Currency, InvoiceId, LedgerTransactionId, Money};

use super::{decode, store_error};
use crate::entities::ledger_transactions;

const ENTITY: &str = "ledger transaction";

/// PostgreSQL-backed [`LedgerStore`].
///
/// The unique index on `invoice_id` turns a second transaction for the
/// same invoice into `StoreError::Conflict`.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    db: DatabaseConnection,
}

impl LedgerRepository {
    /// Creates a new ledger repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn from_model(model: ledger_transactions::Model) -> Result<LedgerTransaction, StoreError> {
        let id = model.id;
        Ok(LedgerTransaction {
            id: LedgerTransactionId::from_uuid(id),
            invoice_id: InvoiceId::from_uuid(model.invoice_id),
            direction: decode(ENTITY, id, "direction", &model.direction, Direction::parse)?,
            category: model.category,
            amount: Money::new(
                model.amount,
                decode(ENTITY, id, "currency", &model.currency, |s| {
                    s.parse::<Currency>().ok()
                })?,
            ),
            payment_method: decode(
                ENTITY,
                id,
                "payment method",
                &model.payment_method,
                PaymentMethod::parse,
            )?,
            account_kind: decode(ENTITY, id, "account kind", &model.account_kind, AccountKind::parse)?,
            account_id: AccountId::from_uuid(model.account_id),
            transaction_date: model.transaction_date,
        })
    }
}

#[async_trait]
impl LedgerStore for LedgerRepository {
    async fn get(&self, id: LedgerTransactionId) -> Result<Option<LedgerTransaction>, StoreError> {
        ledger_transactions::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(store_error)?
            .map(Self::from_model)
            .transpose()
    }

    async fn find_by_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Option<LedgerTransaction>, StoreError> {
        ledger_transactions::Entity::find()
            .filter(ledger_transactions::Column::InvoiceId.eq(invoice_id.into_inner()))
            .one(&self.db)
            .await
            .map_err(store_error)?
            .map(Self::from_model)
            .transpose()
    }

    async fn insert(&self, transaction: &LedgerTransaction) -> Result<(), StoreError> {
        let model = ledger_transactions::ActiveModel {
            id: Set(transaction.id.into_inner()),
            invoice_id: Set(transaction.invoice_id.into_inner()),
            direction: Set(transaction.direction.as_str().to_string()),
            category: Set(transaction.category.clone()),
            amount: Set(transaction.amount.amount),
            currency: Set(transaction.amount.currency.code().to_string()),
            payment_method: Set(transaction.payment_method.as_str().to_string()),
            account_kind: Set(transaction.account_kind.as_str().to_string()),
            account_id: Set(transaction.account_id.into_inner()),
            transaction_date: Set(transaction.transaction_date),
            ..Default::default()
        };
        ledger_transactions::Entity::insert(model)
            .exec_without_returning(&self.db)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn delete(&self, id: LedgerTransactionId) -> Result<bool, StoreError> {
        let result = ledger_transactions::Entity::delete_by_id(id.into_inner())
            .exec(&self.db)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected > 0)
    }

    async fn list(&self) -> Result<Vec<LedgerTransaction>, StoreError> {
        ledger_transactions::Entity::find()
            .order_by_asc(ledger_transactions::Column::Id)
            .all(&self.db)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(Self::from_model)
            .collect()
    }
}
