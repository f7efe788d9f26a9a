use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::core::errors::ApiError;

/// Unwraps a JSON body, turning axum's rejection into a 400 with our error shape.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(format!("Invalid request: {}", rejection.body_text())))
}
