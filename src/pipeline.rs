use std::path::PathBuf;

use tracing::info;

use crate::db::CaptureStore;
use crate::error::CaptureError;
use crate::providers::{NarrativeClient, StabilityClient};

/// Inputs for one booth run, as collected at the command surface.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub image_path: PathBuf,
    pub profession: String,
    pub age: i64,
    pub db_path: PathBuf,
}

/// Runs one capture end to end: narrative, then image transform, then a
/// single atomic insert. Strictly sequential; the store is only opened once
/// both provider calls have succeeded, so no partial record can exist.
pub async fn run_capture(
    narrative: &NarrativeClient,
    transformer: &StabilityClient,
    request: &CaptureRequest,
) -> Result<i64, CaptureError> {
    let original = tokio::fs::read(&request.image_path)
        .await
        .map_err(|source| CaptureError::Input {
            path: request.image_path.clone(),
            source,
        })?;

    info!(
        profession = %request.profession,
        age = request.age,
        original_bytes = original.len(),
        "starting capture"
    );

    let description = narrative
        .generate(&request.profession, request.age)
        .await?;
    info!(description_chars = description.chars().count(), "narrative generated");

    let edited = transformer
        .transform(&request.image_path, &request.profession, request.age)
        .await?;
    info!(edited_bytes = edited.len(), "image transformed");

    let store = CaptureStore::connect(&request.db_path).await?;
    let id = store.insert_capture(&original, &edited, &description).await?;
    store.close().await;

    info!(capture_id = id, "capture persisted");
    Ok(id)
}
