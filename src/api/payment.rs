use crate::api::error::ApiError;
use crate::api::extractors::AuthenticatedUser;
use crate::api::AppState;
use crate::error::AppError;
use crate::payments::types::{CheckoutKeyResponse, VerifyPaymentRequest, VerifyPaymentResponse};
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use tracing::debug;

/// POST /api/v1/payment/verify
pub async fn verify_payment(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> Result<Json<VerifyPaymentResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| AppError::invalid_request(e.body_text()))?;
    debug!(user_id = %caller.user_id, "Direct payment verification requested");

    let response = state.verifier.verify(request, &caller).await?;
    Ok(Json(response))
}

/// GET /api/v1/payment/key
pub async fn checkout_key(State(state): State<AppState>) -> Json<CheckoutKeyResponse> {
    Json(CheckoutKeyResponse {
        key_id: state.key_id.to_string(),
    })
}
