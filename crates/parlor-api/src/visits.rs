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

pub async fn touch_visit(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let visit = blocking(&state, move |chat| chat.touch_visit(claims.sub, group_id)).await?;
    Ok(Json(visit))
}

pub async fn list_visits(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let visits = blocking(&state, move |chat| chat.list_visits(group_id)).await?;
    Ok(Json(visits))
}
