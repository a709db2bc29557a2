use std::path::Path;

use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::db::models::{CaptureRow, CaptureSummary};
use crate::error::CaptureError;

/// Handle on the local record store. Opened for one operation group and
/// closed again; never held across provider calls.
pub struct CaptureStore {
    pool: SqlitePool,
}

fn sqlite_url(db_path: &Path) -> String {
    format!("sqlite://{}?mode=rwc", db_path.display())
}

impl CaptureStore {
    pub async fn connect(db_path: &Path) -> Result<Self, CaptureError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    CaptureError::Store(sqlx::Error::Io(err))
                })?;
            }
        }
        Self::connect_url(&sqlite_url(db_path)).await
    }

    pub async fn connect_url(database_url: &str) -> Result<Self, CaptureError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;

        ensure_schema(&pool).await?;

        Ok(CaptureStore { pool })
    }

    /// One parameterized insert; the timestamp is assigned here, never by
    /// the caller. Returns the rowid of the new capture.
    pub async fn insert_capture(
        &self,
        original: &[u8],
        edited: &[u8],
        description: &str,
    ) -> Result<i64, CaptureError> {
        let result = sqlx::query(
            "INSERT INTO Captures (Timestamp, ImageData, Description, EditedImage) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(Utc::now().timestamp())
        .bind(original)
        .bind(description)
        .bind(edited)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn fetch_capture(&self, id: i64) -> Result<Option<CaptureRow>, CaptureError> {
        let row = sqlx::query_as::<_, CaptureRow>(
            "SELECT Id, Timestamp, ImageData, Description, EditedImage \
             FROM Captures WHERE Id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_captures(&self, limit: i64) -> Result<Vec<CaptureSummary>, CaptureError> {
        let rows = sqlx::query_as::<_, CaptureSummary>(
            "SELECT Id, Timestamp, \
                    LENGTH(ImageData) AS OriginalBytes, \
                    LENGTH(EditedImage) AS EditedBytes, \
                    Description \
             FROM Captures ORDER BY Id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn count_captures(&self) -> Result<i64, CaptureError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM Captures")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")?)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

async fn ensure_schema(pool: &SqlitePool) -> Result<(), CaptureError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS Captures (\
            Id INTEGER PRIMARY KEY AUTOINCREMENT,\
            Timestamp INTEGER NOT NULL,\
            ImageData BLOB NOT NULL,\
            Description TEXT NOT NULL DEFAULT '',\
            EditedImage BLOB NOT NULL\
        );",
    )
    .execute(pool)
    .await?;

    migrate_legacy_columns(pool).await?;

    Ok(())
}

/// Early stores were created without Description/EditedImage; bring such a
/// table up to the current shape in place.
async fn migrate_legacy_columns(pool: &SqlitePool) -> Result<(), CaptureError> {
    let columns = sqlx::query("PRAGMA table_info(Captures);")
        .fetch_all(pool)
        .await?;

    let mut has_description = false;
    let mut has_edited_image = false;
    for column in &columns {
        let name: String = column.try_get("name")?;
        if name.eq_ignore_ascii_case("Description") {
            has_description = true;
        }
        if name.eq_ignore_ascii_case("EditedImage") {
            has_edited_image = true;
        }
    }

    if !has_description {
        info!("Migrating Captures table: adding Description column");
        sqlx::query("ALTER TABLE Captures ADD COLUMN Description TEXT NOT NULL DEFAULT '';")
            .execute(pool)
            .await?;
    }

    if !has_edited_image {
        info!("Migrating Captures table: adding EditedImage column");
        sqlx::query("ALTER TABLE Captures ADD COLUMN EditedImage BLOB NOT NULL DEFAULT x'';")
            .execute(pool)
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> CaptureStore {
        CaptureStore::connect_url("sqlite::memory:")
            .await
            .expect("in-memory store should open")
    }

    #[tokio::test]
    async fn round_trip_preserves_blobs_and_description() {
        let store = memory_store().await;
        let original = vec![0u8; 1024];
        let edited: Vec<u8> = (0..=255u8).cycle().take(512).collect();

        let id = store
            .insert_capture(&original, &edited, "You lived as a blacksmith...")
            .await
            .unwrap();

        let row = store.fetch_capture(id).await.unwrap().expect("row exists");
        assert_eq!(row.id, id);
        assert_eq!(row.original_image, original);
        assert_eq!(row.edited_image, edited);
        assert_eq!(row.description, "You lived as a blacksmith...");
        assert!(row.timestamp > 0, "store must assign the timestamp");
    }

    #[tokio::test]
    async fn ids_are_strictly_increasing() {
        let store = memory_store().await;
        let first = store.insert_capture(b"a", b"b", "one").await.unwrap();
        let second = store.insert_capture(b"c", b"d", "two").await.unwrap();
        let third = store.insert_capture(b"e", b"f", "").await.unwrap();
        assert!(second > first);
        assert!(third > second);
    }

    #[tokio::test]
    async fn empty_description_is_allowed() {
        let store = memory_store().await;
        let id = store.insert_capture(b"orig", b"edit", "").await.unwrap();
        let row = store.fetch_capture(id).await.unwrap().unwrap();
        assert_eq!(row.description, "");
    }

    #[tokio::test]
    async fn fetch_of_unknown_id_is_none() {
        let store = memory_store().await;
        assert!(store.fetch_capture(12345).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_insert_leaves_row_count_unchanged() {
        let store = memory_store().await;
        store.insert_capture(b"orig", b"edit", "kept").await.unwrap();
        assert_eq!(store.count_captures().await.unwrap(), 1);

        // Simulate a broken store mid-run: the insert must be all-or-nothing.
        sqlx::query("DROP TABLE Captures")
            .execute(&store.pool)
            .await
            .unwrap();
        let result = store.insert_capture(b"x", b"y", "lost").await;
        assert!(result.is_err());

        ensure_schema(&store.pool).await.unwrap();
        assert_eq!(store.count_captures().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn legacy_table_gains_missing_columns() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE Captures (\
                Id INTEGER PRIMARY KEY AUTOINCREMENT,\
                Timestamp INTEGER NOT NULL,\
                ImageData BLOB NOT NULL\
            );",
        )
        .execute(&pool)
        .await
        .unwrap();

        ensure_schema(&pool).await.unwrap();

        let store = CaptureStore { pool };
        let id = store.insert_capture(b"o", b"e", "migrated").await.unwrap();
        let row = store.fetch_capture(id).await.unwrap().unwrap();
        assert_eq!(row.description, "migrated");
        assert_eq!(row.edited_image, b"e");
    }

    #[tokio::test]
    async fn list_reports_sizes_without_blobs() {
        let store = memory_store().await;
        store.insert_capture(&[1u8; 10], &[2u8; 20], "first").await.unwrap();
        store.insert_capture(&[3u8; 30], &[4u8; 40], "second").await.unwrap();

        let summaries = store.list_captures(10).await.unwrap();
        assert_eq!(summaries.len(), 2);
        // Newest first.
        assert_eq!(summaries[0].description, "second");
        assert_eq!(summaries[0].original_bytes, 30);
        assert_eq!(summaries[0].edited_bytes, 40);
        assert_eq!(summaries[1].original_bytes, 10);
    }
}
