//! Archive record repository.

use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;
use visadesk_core::billing::{ArchiveKind, ArchiveRecord, ArchiveStore, StoreError};

use super::{corrupt, decode, store_error};
use crate::entities::archive_records;

const ENTITY: &str = "archive record";

/// PostgreSQL-backed [`ArchiveStore`]. Records are write-once.
#[derive(Debug, Clone)]
pub struct ArchiveRepository {
    db: DatabaseConnection,
}

impl ArchiveRepository {
    /// Creates a new archive repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn month_column(month: u32) -> Result<i16, StoreError> {
        i16::try_from(month).map_err(|_| StoreError::Backend(format!("month out of range: {month}")))
    }

    fn from_model(model: archive_records::Model) -> Result<ArchiveRecord, StoreError> {
        let id = model.original_id;
        Ok(ArchiveRecord {
            year: model.year,
            month: u32::try_from(model.month).map_err(|e| corrupt(ENTITY, id, e))?,
            original_id: id,
            kind: decode(ENTITY, id, "kind", &model.kind, ArchiveKind::parse)?,
            payload: model.payload,
            archived_at: model.archived_at.into(),
        })
    }
}

#[async_trait]
impl ArchiveStore for ArchiveRepository {
    async fn insert(&self, record: &ArchiveRecord) -> Result<(), StoreError> {
        let model = archive_records::ActiveModel {
            year: Set(record.year),
            month: Set(Self::month_column(record.month)?),
            original_id: Set(record.original_id),
            kind: Set(record.kind.as_str().to_string()),
            payload: Set(record.payload.clone()),
            archived_at: Set(record.archived_at.into()),
        };
        archive_records::Entity::insert(model)
            .exec_without_returning(&self.db)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn contains(&self, original_id: Uuid) -> Result<bool, StoreError> {
        let count = archive_records::Entity::find()
            .filter(archive_records::Column::OriginalId.eq(original_id))
            .count(&self.db)
            .await
            .map_err(store_error)?;
        Ok(count > 0)
    }

    async fn list(&self, year: i32, month: u32) -> Result<Vec<ArchiveRecord>, StoreError> {
        archive_records::Entity::find()
            .filter(archive_records::Column::Year.eq(year))
            .filter(archive_records::Column::Month.eq(Self::month_column(month)?))
            .order_by_asc(archive_records::Column::OriginalId)
            .all(&self.db)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(Self::from_model)
            .collect()
    }
}
