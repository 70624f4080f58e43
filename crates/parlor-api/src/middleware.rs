use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use parlor_types::api::Claims;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

/// Extract and validate the JWT from the Authorization header, and check
/// the account it names still exists.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Authentication)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Authentication)?;

    // A deleted account's unexpired tokens die with it.
    let user_id = token_data.claims.sub;
    blocking(&state, move |chat| chat.require_account(user_id)).await?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}
