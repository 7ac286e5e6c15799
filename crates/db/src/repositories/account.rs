//! Account repository with versioned balances and the adjustment journal.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use std::collections::BTreeMap;
use uuid::Uuid;
use visadesk_core::billing::{
    Account, AccountKind, AccountStore, AdjustmentKey, BalanceApplication, StoreError,
};
use visadesk_shared::types::{AccountId, Currency};

use super::{corrupt, decode, store_error};
use crate::entities::{account_balances, accounts, balance_adjustments};

const ENTITY: &str = "account";

/// PostgreSQL-backed [`AccountStore`].
///
/// A balance application runs in one database transaction: it checks the
/// journal, bumps the `(account, currency)` row under a version check and
/// records the adjustment key. Losing the version race surfaces as
/// `StoreError::ConcurrentModification` for the caller to retry.
#[derive(Debug, Clone)]
pub struct AccountRepository {
    db: DatabaseConnection,
}

impl AccountRepository {
    /// Creates a new account repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn from_rows(
        model: accounts::Model,
        balances: Vec<account_balances::Model>,
    ) -> Result<Account, StoreError> {
        let id = model.id;
        let initial_amounts: BTreeMap<Currency, Decimal> =
            serde_json::from_value(model.initial_amounts).map_err(|e| corrupt(ENTITY, id, e))?;
        let balances = balances
            .into_iter()
            .map(|row| {
                let currency = decode(ENTITY, id, "currency", &row.currency, |s| {
                    s.parse::<Currency>().ok()
                })?;
                Ok((currency, row.balance))
            })
            .collect::<Result<BTreeMap<_, _>, StoreError>>()?;

        Ok(Account {
            id: AccountId::from_uuid(id),
            name: model.name,
            kind: decode(ENTITY, id, "kind", &model.kind, AccountKind::parse)?,
            initial_amounts,
            balances,
        })
    }
}

/// A lost race on a row another writer just created or changed.
fn lost_race(account_id: Uuid) -> impl FnOnce(sea_orm::DbErr) -> StoreError {
    move |err| match store_error(err) {
        StoreError::Conflict(_) => StoreError::ConcurrentModification(account_id),
        other => other,
    }
}

#[async_trait]
impl AccountStore for AccountRepository {
    async fn get(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let Some(model) = accounts::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(store_error)?
        else {
            return Ok(None);
        };
        let balances = account_balances::Entity::find()
            .filter(account_balances::Column::AccountId.eq(model.id))
            .all(&self.db)
            .await
            .map_err(store_error)?;
        Self::from_rows(model, balances).map(Some)
    }

    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        let id = account.id.into_inner();
        let initial_amounts =
            serde_json::to_value(&account.initial_amounts).map_err(|e| corrupt(ENTITY, id, e))?;
        let model = accounts::ActiveModel {
            id: Set(id),
            name: Set(account.name.clone()),
            kind: Set(account.kind.as_str().to_string()),
            initial_amounts: Set(initial_amounts),
            ..Default::default()
        };
        accounts::Entity::insert(model)
            .exec_without_returning(&self.db)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn apply_delta(
        &self,
        account_id: AccountId,
        currency: Currency,
        delta: Decimal,
        key: AdjustmentKey,
    ) -> Result<BalanceApplication, StoreError> {
        let account_uuid = account_id.into_inner();
        let code = currency.code().to_string();
        let now = Utc::now();
        let txn = self.db.begin().await.map_err(store_error)?;

        if accounts::Entity::find_by_id(account_uuid)
            .one(&txn)
            .await
            .map_err(store_error)?
            .is_none()
        {
            return Err(StoreError::NotFound {
                entity: ENTITY,
                id: account_uuid,
            });
        }

        let journal_key = (key.transaction_id.into_inner(), key.kind.as_str().to_string());
        if balance_adjustments::Entity::find_by_id(journal_key)
            .one(&txn)
            .await
            .map_err(store_error)?
            .is_some()
        {
            return Ok(BalanceApplication::AlreadyApplied);
        }

        let current = account_balances::Entity::find_by_id((account_uuid, code.clone()))
            .one(&txn)
            .await
            .map_err(store_error)?;

        let new_balance = match current {
            None => {
                let row = account_balances::ActiveModel {
                    account_id: Set(account_uuid),
                    currency: Set(code.clone()),
                    balance: Set(delta),
                    version: Set(1),
                    updated_at: Set(now.into()),
                };
                account_balances::Entity::insert(row)
                    .exec_without_returning(&txn)
                    .await
                    .map_err(lost_race(account_uuid))?;
                delta
            }
            Some(row) => {
                let new_balance = row.balance + delta;
                let result = account_balances::Entity::update_many()
                    .col_expr(account_balances::Column::Balance, Expr::value(new_balance))
                    .col_expr(account_balances::Column::Version, Expr::value(row.version + 1))
                    .col_expr(account_balances::Column::UpdatedAt, Expr::value(now))
                    .filter(account_balances::Column::AccountId.eq(account_uuid))
                    .filter(account_balances::Column::Currency.eq(code.clone()))
                    .filter(account_balances::Column::Version.eq(row.version))
                    .exec(&txn)
                    .await
                    .map_err(store_error)?;
                if result.rows_affected == 0 {
                    tracing::debug!(
                        account_id = %account_id,
                        currency = %currency,
                        version = row.version,
                        "Balance version moved, reporting concurrent modification"
                    );
                    return Err(StoreError::ConcurrentModification(account_uuid));
                }
                new_balance
            }
        };

        let adjustment = balance_adjustments::ActiveModel {
            transaction_id: Set(key.transaction_id.into_inner()),
            kind: Set(key.kind.as_str().to_string()),
            account_id: Set(account_uuid),
            currency: Set(code),
            delta: Set(delta),
            applied_at: Set(now.into()),
        };
        balance_adjustments::Entity::insert(adjustment)
            .exec_without_returning(&txn)
            .await
            .map_err(lost_race(account_uuid))?;

        txn.commit().await.map_err(store_error)?;
        Ok(BalanceApplication::Applied { new_balance })
    }

    async fn has_adjustment(&self, key: AdjustmentKey) -> Result<bool, StoreError> {
        let found = balance_adjustments::Entity::find_by_id((
            key.transaction_id.into_inner(),
            key.kind.as_str().to_string(),
        ))
        .one(&self.db)
        .await
        .map_err(store_error)?;
        Ok(found.is_some())
    }
}
