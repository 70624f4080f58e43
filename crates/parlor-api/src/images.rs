use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use parlor_types::api::Claims;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiResult;

/// GET /images/{image_id}: type and base64 payload.
pub async fn get_image(
    State(state): State<AppState>,
    Path(image_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let image = blocking(&state, move |chat| chat.get_image(image_id)).await?;
    Ok(Json(image))
}
