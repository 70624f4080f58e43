use axum::{
    Json, Router, middleware,
    routing::{delete, get, post, put},
};
use serde_json::{Value, json};

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{groups, images, messages, users, visits};

/// All API routes. Transport layers (CORS, tracing, body limits) are added
/// by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/users/{user_id}", get(users::get_user))
        .route("/users/me", delete(users::delete_account))
        .route("/users/me/status", put(users::set_status))
        .route("/users/me/username", put(users::set_username))
        .route("/users/me/password", put(users::set_password))
        .route("/users/me/image", put(users::set_image).delete(users::delete_image))
        .route("/users/me/contacts/{user_id}", post(users::toggle_contact))
        .route("/groups", post(groups::create_group))
        .route("/groups/{group_id}", get(groups::get_group).delete(groups::delete_group))
        .route("/groups/{group_id}/image", put(groups::set_group_image))
        .route("/groups/{group_id}/participants/{user_id}", post(groups::toggle_participant))
        .route("/groups/{group_id}/moderators/{user_id}", post(groups::toggle_moderator))
        .route(
            "/groups/{group_id}/messages",
            get(messages::get_history).post(messages::send_message),
        )
        .route("/groups/{group_id}/messages/unread", get(messages::get_unread))
        .route("/groups/{group_id}/visits", get(visits::list_visits).post(visits::touch_visit))
        .route("/messages/{message_id}", delete(messages::delete_message))
        .route("/images/{image_id}", get(images::get_image))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
