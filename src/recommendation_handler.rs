use axum::{
    body::Bytes,
    extract::{Multipart, State},
    Json,
};
use tracing::{info, instrument};

use crate::database::blocking;
use crate::error::{AppError, Result};
use crate::face::Recommendation;
use crate::state::AppState;

pub const UPLOAD_FIELD: &str = "face_image";
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// POST /recommendation classifies the uploaded face and suggests hairstyles.
#[instrument(skip_all)]
pub async fn recommendation_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Recommendation>> {
    let mut upload: Option<Bytes> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed upload: {e}")))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Malformed upload: {e}")))?;
            upload = Some(bytes);
            break;
        }
    }

    let image = upload.filter(|b| !b.is_empty()).ok_or_else(|| {
        AppError::BadRequest("No face image uploaded. Please upload a valid image.".to_string())
    })?;
    info!("Received face image of {} bytes", image.len());

    let faces = state.faces.clone();
    let recommendation = blocking(move || {
        faces
            .recommend_bytes(&image)
            .map_err(|e| AppError::BadRequest(format!("Error processing face image: {e:#}")))
    })
    .await?;

    info!("Face shape: {}", recommendation.face_shape);
    Ok(Json(recommendation))
}
