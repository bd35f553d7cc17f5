// Conversation message endpoints
//
// Reading a conversation requires a session; appending does not.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use tracing::{debug, info};

use super::auth::SessionUser;
use super::error::ApiError;
use super::validation::validate_role;
use crate::db::{CreateMessageRequest, Message, MessageResponse};
use crate::AppState;

/// List the messages of a conversation, oldest first
///
/// GET /conversations/:id/messages
pub async fn list_messages(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<i64>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let messages = Message::list_for_conversation(&state.db, conversation_id).await?;

    debug!(
        conversation_id,
        count = messages.len(),
        user = %session.username,
        "Listed messages"
    );

    Ok(Json(messages.into_iter().map(MessageResponse::from).collect()))
}

/// Append a message, creating the conversation if needed
///
/// POST /conversations/:id/messages
pub async fn append_message(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<i64>,
    Json(request): Json<CreateMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    validate_role(&request.role).map_err(|e| ApiError::validation_field("role", e))?;

    let message =
        Message::append(&state.db, conversation_id, &request.role, &request.content).await?;

    info!(
        conversation_id,
        message_id = message.id,
        role = %message.role,
        "Message appended"
    );

    Ok(Json(message))
}
