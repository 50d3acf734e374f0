use sea_orm::{DbErr, SqlErr};

pub(crate) use picshare_domain::storage::StorageError;

/// Unique-constraint violations become `Conflict` so services can report
/// "slug taken" or "already liked" instead of a generic failure.
pub(crate) fn map_db_err(err: DbErr) -> StorageError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => StorageError::Conflict(detail),
        _ => StorageError::from_source(err),
    }
}
