use crate::api::error::ApiError;
use crate::api::AppState;
use crate::payments::webhook::SIGNATURE_HEADER;
use axum::{body::Bytes, extract::State, Json};
use http::HeaderMap;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

/// POST /api/v1/payment/webhook
///
/// Takes the body as raw bytes: the signature covers them exactly as sent.
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state.webhooks.handle(&body, signature).await?;
    Ok(Json(WebhookAck {
        status: outcome.as_str(),
    }))
}
