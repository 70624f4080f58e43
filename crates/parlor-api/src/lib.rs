pub mod auth;
pub mod error;
pub mod groups;
pub mod images;
pub mod messages;
pub mod middleware;
pub mod policy;
pub mod routes;
pub mod service;
pub mod users;
pub mod visits;

use tracing::error;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::service::ChatService;

/// Run a service call off the async runtime; rusqlite and argon2 block.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&ChatService) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.chat))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Store(anyhow::anyhow!("worker task failed"))
        })?
}
