use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parlor_types::api::{Claims, CreateGroupRequest, ImageUpload};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiResult;

/// POST /groups: the caller becomes the creator.
pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> ApiResult<impl IntoResponse> {
    let created = blocking(&state, move |chat| chat.create_group(claims.sub, req)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let group = blocking(&state, move |chat| chat.get_group_info(group_id)).await?;
    Ok(Json(group))
}

pub async fn delete_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let report = blocking(&state, move |chat| chat.delete_group(claims.sub, group_id)).await?;
    Ok(Json(report))
}

pub async fn set_group_image(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(upload): Json<ImageUpload>,
) -> ApiResult<impl IntoResponse> {
    let image = blocking(&state, move |chat| chat.set_group_image(claims.sub, group_id, upload)).await?;
    Ok(Json(image))
}

/// POST /groups/{group_id}/participants/{user_id}: add or remove.
pub async fn toggle_participant(
    State(state): State<AppState>,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let result = blocking(&state, move |chat| {
        chat.toggle_participant(claims.sub, group_id, user_id)
    })
    .await?;
    let status = if result.role.is_some() { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(result)))
}

/// POST /groups/{group_id}/moderators/{user_id}: grant or revoke.
pub async fn toggle_moderator(
    State(state): State<AppState>,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let result = blocking(&state, move |chat| {
        chat.toggle_moderator(claims.sub, group_id, user_id)
    })
    .await?;
    Ok(Json(result))
}
