use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use tracing::{debug, error, warn};
use uuid::Uuid;

use collaborator_core::{ApplicationError, DomainError, InterfaceError};
use collaborator_teams::events::{DispatchError, EventHandlerError};
use collaborator_teams::{Activity, EventContext, EventDispatcher, HandlerResult, TeamsEventType};

#[derive(Clone)]
pub struct MessagesState {
    dispatcher: Arc<EventDispatcher>,
}

pub fn router(dispatcher: Arc<EventDispatcher>) -> Router {
    Router::new().route("/api/messages", post(receive)).with_state(MessagesState { dispatcher })
}

/// Bot Framework messaging endpoint. Replies are sent through the connector
/// while the request is open, so the HTTP response only acknowledges.
pub async fn receive(State(state): State<MessagesState>, body: Bytes) -> Response {
    let activity = match Activity::parse(&body) {
        Ok(activity) => activity,
        Err(error) => return rejected(error.to_string(), Uuid::new_v4().to_string()),
    };
    let correlation_id = activity.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
    let event = match activity.to_event() {
        Ok(event) => event,
        Err(error) => return rejected(error.to_string(), correlation_id),
    };
    let is_invoke = event.event_type() == TeamsEventType::FeedbackSubmit;
    let ctx = EventContext { correlation_id };

    match state.dispatcher.dispatch(&event, &ctx).await {
        Ok(result) => {
            debug!(
                event_name = "server.messages.dispatched",
                correlation_id = %ctx.correlation_id,
                activity_type = %activity.kind,
                outcome = outcome_label(&result),
                "activity handled"
            );
            if is_invoke {
                (StatusCode::OK, Json(json!({ "status": 200 }))).into_response()
            } else {
                StatusCode::ACCEPTED.into_response()
            }
        }
        Err(dispatch_error) => {
            error!(
                event_name = "server.messages.failed",
                correlation_id = %ctx.correlation_id,
                activity_type = %activity.kind,
                error = %dispatch_error,
                "activity handler failed"
            );
            error_response(classify(dispatch_error).into_interface(ctx.correlation_id))
        }
    }
}

fn classify(error: DispatchError) -> ApplicationError {
    match error {
        DispatchError::Handler(EventHandlerError::Message(message)) => {
            ApplicationError::Integration(message)
        }
        DispatchError::Handler(EventHandlerError::Feedback(message)) => {
            ApplicationError::Persistence(message)
        }
    }
}

fn outcome_label(result: &HandlerResult) -> &'static str {
    match result {
        HandlerResult::Responded(_) => "responded",
        HandlerResult::Processed => "processed",
        HandlerResult::Ignored => "ignored",
    }
}

fn rejected(detail: String, correlation_id: String) -> Response {
    warn!(
        event_name = "server.messages.rejected",
        correlation_id = %correlation_id,
        error = %detail,
        "rejecting activity payload"
    );
    let error = ApplicationError::from(DomainError::InvariantViolation(detail));
    error_response(error.into_interface(correlation_id))
}

fn error_response(error: InterfaceError) -> Response {
    let (status, detail) = match &error {
        InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, message),
        InterfaceError::ServiceUnavailable { message, .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, message)
        }
        InterfaceError::Internal { message, .. } => (StatusCode::INTERNAL_SERVER_ERROR, message),
    };
    let body = json!({
        "error": error.user_message(),
        "detail": detail,
        "correlation_id": error.correlation_id(),
    });
    (status, Json(body)).into_response()
}
