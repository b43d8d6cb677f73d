use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::{VireError, VireResult};

/// Binary file sub-store (spec section 3/4.2). Filing PDFs are shared
/// market data; chart images and other per-user artifacts live in the
/// portfolio namespace. `category` decides which pool a given file lands
/// in; the byte payload itself is written to disk, never to the database,
/// per the memory discipline in spec section 9.
#[derive(Clone)]
pub struct FileStore {
    market_pool: SqlitePool,
    portfolio_pool: Option<SqlitePool>,
    root_dir: std::path::PathBuf,
}

/// Categories that are shared market data rather than per-user.
const MARKET_CATEGORIES: &[&str] = &["filing_pdf"];

impl FileStore {
    pub(super) fn new(market_pool: SqlitePool, portfolio_pool: Option<SqlitePool>) -> Self {
        Self {
            market_pool,
            portfolio_pool,
            root_dir: std::env::var("FILE_STORAGE_DIR")
                .unwrap_or_else(|_| "data/files".to_string())
                .into(),
        }
    }

    fn pool_for(&self, category: &str) -> VireResult<&SqlitePool> {
        if MARKET_CATEGORIES.contains(&category) {
            Ok(&self.market_pool)
        } else {
            self.portfolio_pool
                .as_ref()
                .ok_or_else(|| VireError::InvalidInput(format!("category {category} requires portfolio storage")))
        }
    }

    fn path_for(&self, category: &str, key: &str) -> std::path::PathBuf {
        self.root_dir.join(category).join(key)
    }

    pub async fn save(&self, category: &str, key: &str, bytes: &[u8], content_type: &str) -> VireResult<()> {
        let path = self.path_for(category, key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| VireError::StorageUnavailable(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| VireError::StorageUnavailable(e.to_string()))?;

        let pool = self.pool_for(category)?;
        sqlx::query(
            "INSERT INTO files (category, key, content_type, byte_len, path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(category, key) DO UPDATE SET
                content_type = excluded.content_type, byte_len = excluded.byte_len,
                path = excluded.path, created_at = excluded.created_at",
        )
        .bind(category)
        .bind(key)
        .bind(content_type)
        .bind(bytes.len() as i64)
        .bind(path.to_string_lossy().to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Stream a file from `reader` directly to disk, never materializing
    /// the full payload on the heap (spec section 9 memory discipline).
    /// Returns the number of bytes written.
    pub async fn save_streamed<R>(
        &self,
        category: &str,
        key: &str,
        content_type: &str,
        mut reader: R,
    ) -> VireResult<u64>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        use tokio::io::AsyncWriteExt;

        let path = self.path_for(category, key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| VireError::StorageUnavailable(e.to_string()))?;
        }
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| VireError::StorageUnavailable(e.to_string()))?;
        let byte_len = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| VireError::StorageUnavailable(e.to_string()))?;
        file.flush().await.map_err(|e| VireError::StorageUnavailable(e.to_string()))?;

        let pool = self.pool_for(category)?;
        sqlx::query(
            "INSERT INTO files (category, key, content_type, byte_len, path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(category, key) DO UPDATE SET
                content_type = excluded.content_type, byte_len = excluded.byte_len,
                path = excluded.path, created_at = excluded.created_at",
        )
        .bind(category)
        .bind(key)
        .bind(content_type)
        .bind(byte_len as i64)
        .bind(path.to_string_lossy().to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;
        Ok(byte_len)
    }

    pub async fn get(&self, category: &str, key: &str) -> VireResult<(Vec<u8>, String)> {
        let pool = self.pool_for(category)?;
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT path, content_type FROM files WHERE category = ?1 AND key = ?2",
        )
        .bind(category)
        .bind(key)
        .fetch_optional(pool)
        .await?;

        let Some((path, content_type)) = row else {
            return Err(VireError::NotFound(format!("file {category}/{key}")));
        };
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| VireError::StorageUnavailable(e.to_string()))?;
        Ok((bytes, content_type))
    }

    pub async fn delete(&self, category: &str, key: &str) -> VireResult<()> {
        let pool = self.pool_for(category)?;
        let row: Option<(String,)> = sqlx::query_as("SELECT path FROM files WHERE category = ?1 AND key = ?2")
            .bind(category)
            .bind(key)
            .fetch_optional(pool)
            .await?;
        sqlx::query("DELETE FROM files WHERE category = ?1 AND key = ?2")
            .bind(category)
            .bind(key)
            .execute(pool)
            .await?;
        if let Some((path,)) = row {
            let _ = tokio::fs::remove_file(path).await;
        }
        Ok(())
    }

    pub async fn has(&self, category: &str, key: &str) -> VireResult<bool> {
        let pool = self.pool_for(category)?;
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT byte_len FROM files WHERE category = ?1 AND key = ?2",
        )
        .bind(category)
        .bind(key)
        .fetch_optional(pool)
        .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("migrations/market").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("FILE_STORAGE_DIR", dir.path());
        let pool = test_pool().await;
        let store = FileStore::new(pool, None);

        store.save("filing_pdf", "AAPL/10-K-2026", b"pdf bytes", "application/pdf").await.unwrap();
        let (bytes, content_type) = store.get("filing_pdf", "AAPL/10-K-2026").await.unwrap();
        assert_eq!(bytes, b"pdf bytes");
        assert_eq!(content_type, "application/pdf");
        assert!(store.has("filing_pdf", "AAPL/10-K-2026").await.unwrap());
    }

    #[tokio::test]
    async fn get_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("FILE_STORAGE_DIR", dir.path());
        let pool = test_pool().await;
        let store = FileStore::new(pool, None);
        let err = store.get("filing_pdf", "missing").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
