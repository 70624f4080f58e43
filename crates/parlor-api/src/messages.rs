use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parlor_types::api::{Claims, HistoryQuery, SendMessageRequest};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiResult;

pub async fn send_message(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = blocking(&state, move |chat| chat.send_message(claims.sub, group_id, req)).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /groups/{group_id}/messages/unread: everything since the last visit.
pub async fn get_unread(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let messages = blocking(&state, move |chat| chat.incremental_sync(claims.sub, group_id)).await?;
    Ok(Json(messages))
}

/// GET /groups/{group_id}/messages?skip=&limit=: scroll-back pages.
pub async fn get_history(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let messages = blocking(&state, move |chat| {
        chat.paged_history(claims.sub, group_id, query.skip, query.limit)
    })
    .await?;
    Ok(Json(messages))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let message = blocking(&state, move |chat| chat.delete_message(claims.sub, message_id)).await?;
    Ok(Json(message))
}
