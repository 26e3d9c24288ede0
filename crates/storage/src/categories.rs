use bankfeed_core::{Category, ValidationError};
use sqlx::SqliteConnection;

use crate::error::{StorageError, StorageResult};

pub async fn insert_category(conn: &mut SqliteConnection, name: &str) -> Result<i64, CategoryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingField("name").into());
    }

    let result = sqlx::query("INSERT INTO categories (name) VALUES (?)")
        .bind(name)
        .execute(&mut *conn)
        .await
        .map_err(|e| StorageError::classify(e, "category"))?;

    Ok(result.last_insert_rowid())
}

pub async fn list_categories(conn: &mut SqliteConnection) -> StorageResult<Vec<Category>> {
    let rows = sqlx::query_as::<_, (i64, String)>("SELECT id, name FROM categories ORDER BY name")
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(id, name)| Category { id: Some(id), name })
        .collect())
}

/// Fails with a constraint error while transactions or rule sets still use it.
pub async fn delete_category(conn: &mut SqliteConnection, id: i64) -> StorageResult<()> {
    let result = sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| StorageError::classify(e, "category"))?;

    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound {
            entity: "category",
            id,
        });
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum CategoryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CategoryError {
    pub fn cause(&self) -> bankfeed_core::ErrorCause {
        match self {
            CategoryError::Validation(e) => e.cause(),
            CategoryError::Storage(e) => e.cause(),
        }
    }
}
