use anyhow::{Context, Result};
use chrono::Utc;
use shared::domain::{CollectionPath, Fields, Record, RecordId};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{fs, path::Path, str::FromStr};
use uuid::Uuid;

/// SQLite-backed document table keyed by `(path, id)`.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url: {database_url}"))?
            .create_if_missing(true);
        // Every connection to `sqlite::memory:` is its own database.
        let max_connections = if is_in_memory(database_url) { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        let storage = Self { pool };
        storage.ensure_documents_table().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_documents_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                path       TEXT NOT NULL,
                id         TEXT NOT NULL,
                fields     TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (path, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure documents table exists")?;
        Ok(())
    }

    pub async fn insert_document(&self, path: &CollectionPath, fields: &Fields) -> Result<RecordId> {
        let id = Uuid::new_v4().simple().to_string();
        let encoded = serde_json::to_string(fields).context("failed to encode document fields")?;
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO documents (path, id, fields, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(path.as_str())
        .bind(&id)
        .bind(encoded)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert document into {path}"))?;
        Ok(RecordId(id))
    }

    /// Shallow-merges `patch` into the stored fields. Returns `false` when the document is absent.
    pub async fn patch_document(
        &self,
        path: &CollectionPath,
        id: &RecordId,
        patch: &Fields,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT fields FROM documents WHERE path = ? AND id = ?")
            .bind(path.as_str())
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(false);
        };

        let raw: String = row.try_get("fields")?;
        let mut fields: Fields = serde_json::from_str(&raw)
            .with_context(|| format!("corrupt fields for document {id} in {path}"))?;
        for (key, value) in patch {
            fields.insert(key.clone(), value.clone());
        }

        sqlx::query("UPDATE documents SET fields = ?, updated_at = ? WHERE path = ? AND id = ?")
            .bind(serde_json::to_string(&fields)?)
            .bind(Utc::now().to_rfc3339())
            .bind(path.as_str())
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Returns `false` when the document is absent.
    pub async fn delete_document(&self, path: &CollectionPath, id: &RecordId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE path = ? AND id = ?")
            .bind(path.as_str())
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete document {id} from {path}"))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_documents(&self, path: &CollectionPath) -> Result<Vec<Record>> {
        let rows = sqlx::query("SELECT id, fields FROM documents WHERE path = ? ORDER BY id")
            .bind(path.as_str())
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to list documents in {path}"))?;

        rows.into_iter()
            .map(|row| -> Result<Record> {
                let id: String = row.try_get("id")?;
                let raw: String = row.try_get("fields")?;
                let fields: Fields = serde_json::from_str(&raw)
                    .with_context(|| format!("corrupt fields for document {id} in {path}"))?;
                Ok(Record {
                    id: RecordId(id),
                    fields,
                })
            })
            .collect()
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    if is_in_memory(database_url) || !database_url.starts_with("sqlite:") {
        return Ok(());
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if path.is_empty() {
        return Ok(());
    }

    let Some(parent) = Path::new(path).parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
