//! `POST /chat/stream`, `POST /chat/stop` (spec §6, §4.5, §4.6).

use crate::error::ServerError;
use crate::state::AppState;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::post;
use axum::{Json, Router};
use futures::Stream;
use serde::{Deserialize, Serialize};
use slab_stream::{request_stop, DrainEvent, StreamConsumer};
use slab_types::StreamFrame;
use std::convert::Infallible;
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatStreamRequest {
    pub session_id: String,
    pub message: String,
    /// Accepted for wire compatibility with stateless clients; the session
    /// cache (spec §4.7) is the authoritative history source, so this is
    /// not read by the orchestrator.
    #[serde(default)]
    pub history: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatStopRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatStopResponse {
    pub status: &'static str,
}

#[derive(OpenApi)]
#[openapi(paths(chat_stream, chat_stop))]
pub struct ChatApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/chat/stream", post(chat_stream)).route("/chat/stop", post(chat_stop))
}

fn frame_to_event(frame: StreamFrame) -> Option<Event> {
    match frame {
        StreamFrame::Docs(json) => Some(Event::default().data(format!("DOCS_DATA:{json}"))),
        StreamFrame::Text(token) => Some(Event::default().data(format!("TEXT_DATA:{token}"))),
        StreamFrame::Stopped => Some(Event::default().data("STOPPED_DATA:".to_string())),
        StreamFrame::Error(message) => Some(Event::default().data(format!("ERROR_DATA:{message}"))),
        // Swallowed: no terminal frame is ever forwarded on the wire, the
        // stream simply ends (spec §6 "no terminal DONE frame on the wire").
        StreamFrame::Done => None,
    }
}

/// Starts a chat turn and bridges its token stream to the client as
/// Server-Sent Events. Frames are `DOCS_DATA:`/`TEXT_DATA:`/`STOPPED_DATA:`/
/// `ERROR_DATA:`; the connection simply closes on natural completion.
#[utoipa::path(post, path = "/chat/stream", request_body = ChatStreamRequest, responses((status = 200, description = "text/event-stream of chat frames")))]
async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatStreamRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    if req.session_id.trim().is_empty() {
        return Err(ServerError::BadRequest("session_id must not be empty".to_string()));
    }
    if req.message.trim().is_empty() {
        return Err(ServerError::BadRequest("message must not be empty".to_string()));
    }

    state.orchestrator.start_turn(req.session_id.clone(), req.message.clone());
    let consumer = StreamConsumer::new(state.kv.clone(), req.session_id.clone());

    let stream = futures::stream::unfold(Some(consumer), |state| async move {
        let consumer = state?;
        match consumer.next().await {
            Ok(DrainEvent::Frame(frame)) => {
                let terminal = frame.is_terminal();
                match frame_to_event(frame) {
                    Some(event) => {
                        let next = if terminal { None } else { Some(consumer) };
                        Some((Ok(event), next))
                    }
                    // `Done` is always terminal; swallowing it ends the stream.
                    None => None,
                }
            }
            Ok(DrainEvent::Idle) => None,
            Err(e) => Some((Ok(Event::default().data(format!("ERROR_DATA:{e}"))), None)),
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Requests cancellation of an in-flight turn (spec §4.5 "Cancellation").
/// Not an error if no turn is in flight; the flag is simply consumed, if
/// ever set, by the next token check.
#[utoipa::path(post, path = "/chat/stop", request_body = ChatStopRequest, responses((status = 200, body = ChatStopResponse)))]
async fn chat_stop(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatStopRequest>,
) -> Result<Json<ChatStopResponse>, ServerError> {
    if req.session_id.trim().is_empty() {
        return Err(ServerError::BadRequest("session_id must not be empty".to_string()));
    }
    request_stop(state.kv.as_ref(), &req.session_id).await?;
    Ok(Json(ChatStopResponse { status: "stopped" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_frame_produces_no_event() {
        assert!(frame_to_event(StreamFrame::Done).is_none());
    }

    #[test]
    fn every_non_done_frame_produces_an_event() {
        assert!(frame_to_event(StreamFrame::Text("hi".into())).is_some());
        assert!(frame_to_event(StreamFrame::Stopped).is_some());
        assert!(frame_to_event(StreamFrame::Error("boom".into())).is_some());
        assert!(frame_to_event(StreamFrame::Docs(serde_json::json!([]))).is_some());
    }
}
