use serde::Serialize;
use sqlx::FromRow;

/// One persisted capture, column names matching the `Captures` table.
#[derive(Debug, Clone, FromRow)]
pub struct CaptureRow {
    #[sqlx(rename = "Id")]
    pub id: i64,
    #[sqlx(rename = "Timestamp")]
    pub timestamp: i64,
    #[sqlx(rename = "ImageData")]
    pub original_image: Vec<u8>,
    #[sqlx(rename = "Description")]
    pub description: String,
    #[sqlx(rename = "EditedImage")]
    pub edited_image: Vec<u8>,
}

/// Listing row for the gallery view; blob lengths instead of blob payloads
/// so browsing a store never transfers image data.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CaptureSummary {
    #[sqlx(rename = "Id")]
    pub id: i64,
    #[sqlx(rename = "Timestamp")]
    pub timestamp: i64,
    #[sqlx(rename = "OriginalBytes")]
    pub original_bytes: i64,
    #[sqlx(rename = "EditedBytes")]
    pub edited_bytes: i64,
    #[sqlx(rename = "Description")]
    pub description: String,
}
