use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::sessions::default_session_title;
use super::utils::json_body;
use crate::core::config::defaults::role_system_prompt;
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, ChatRequest};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatPayload {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub session_id: String,
}

/// Plain multi-turn chat backed by the session history.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatPayload>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let payload = json_body(payload)?;
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("message is required".to_string()));
    }

    let session_id = match payload.session_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => {
            if state.history.get_session(&id).await?.is_none() {
                return Err(ApiError::NotFound("Session not found".to_string()));
            }
            id
        }
        None => state.history.create_session(&default_session_title()).await?.id,
    };

    let history = state.history.get_history(&session_id, 0).await?;
    let mut messages = Vec::with_capacity(history.len() + 2);
    if history.is_empty() {
        let role = payload.role.as_deref().unwrap_or_default();
        messages.push(ChatMessage::system(role_system_prompt(role)));
    }
    messages.extend(
        history
            .into_iter()
            .map(|m| ChatMessage::new(m.role, m.content)),
    );
    messages.push(ChatMessage::user(message));

    state.history.add_message(&session_id, "user", message).await?;

    let reply = state
        .llm
        .chat(ChatRequest::new(messages))
        .await
        .map_err(|err| {
            tracing::error!(session_id = %session_id, provider = state.llm.name(), error = %err, "Chat completion failed");
            ApiError::BadGateway(format!("AI service call failed: {}", err))
        })?;

    state
        .history
        .add_message(&session_id, "assistant", &reply)
        .await?;

    tracing::info!(session_id = %session_id, "Chat answered");
    Ok(Json(ChatReply { reply, session_id }))
}
