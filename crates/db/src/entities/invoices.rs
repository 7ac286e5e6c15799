//! `SeaORM` Entity for invoices table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub invoice_number: String,
    pub client_id: Option<Uuid>,
    #[sea_orm(column_type = "JsonBinary")]
    pub line_items: Json,
    #[sea_orm(column_type = "JsonBinary")]
    pub terms: Json,
    pub currency: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub tax_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub stamp_duty: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub withholding_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub grand_total: Decimal,
    pub status: String,
    pub pending_status: Option<String>,
    pub issue_date: Date,
    pub due_date: Option<Date>,
    pub collection_account_kind: Option<String>,
    pub collection_account_id: Option<Uuid>,
    pub collection_payment_method: Option<String>,
    pub ledger_transaction_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
