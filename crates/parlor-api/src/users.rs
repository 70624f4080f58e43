use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use parlor_types::api::{Claims, ImageUpload, SetPasswordRequest, SetStatusRequest, SetUsernameRequest};

use crate::auth::AppState;
use crate::blocking;
use crate::error::{ApiError, ApiResult};
use crate::policy;

/// GET /users/{user_id}: own profile, contacts and groups.
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    if !policy::authorize_client(user_id, claims.sub) {
        warn!("{} asked for the profile of {}", claims.sub, user_id);
        return Err(ApiError::Authentication);
    }
    let user = blocking(&state, move |chat| chat.get_user(user_id)).await?;
    Ok(Json(user))
}

pub async fn set_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let status = req.status.clone();
    let changed = blocking(&state, move |chat| chat.set_status(claims.sub, &req.status)).await?;
    Ok(changed_or_no_content(changed, json!({ "status": status })))
}

pub async fn set_username(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetUsernameRequest>,
) -> ApiResult<impl IntoResponse> {
    let username = req.username.clone();
    let changed = blocking(&state, move |chat| chat.set_username(claims.sub, &req.username)).await?;
    Ok(changed_or_no_content(changed, json!({ "username": username })))
}

pub async fn set_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    blocking(&state, move |chat| {
        chat.set_password(claims.sub, &req.current_password, &req.new_password)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_image(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(upload): Json<ImageUpload>,
) -> ApiResult<impl IntoResponse> {
    let image = blocking(&state, move |chat| chat.set_user_image(claims.sub, upload)).await?;
    Ok(Json(image))
}

pub async fn delete_image(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    blocking(&state, move |chat| chat.delete_user_image(claims.sub)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    blocking(&state, move |chat| chat.delete_account(claims.sub)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_contact(
    State(state): State<AppState>,
    Path(contact_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let result = blocking(&state, move |chat| chat.toggle_contact(claims.sub, contact_id)).await?;
    let status = if result.added { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(result)))
}

fn changed_or_no_content(changed: bool, body: serde_json::Value) -> axum::response::Response {
    if changed {
        Json(body).into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}
