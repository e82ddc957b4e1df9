//! The session-oriented tool endpoint.
//!
//! `POST` without a session header opens a session and returns its id in the
//! `mcp-session-id` response header. `GET` opens a server-sent event stream
//! for an existing session and `DELETE` closes it. A `GET` or `DELETE` without
//! a session id is a bad request; an unknown id is not found.

use std::convert::Infallible;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::{
    StreamExt,
    future::join_all,
    stream::{self, Stream},
};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{
    application::{sessions::Session, state::BridgeState},
    rpc::{
        dispatcher::dispatch_request,
        jsonrpc::{
            BAD_REQUEST, Incoming, JsonRpcError, PARSE_ERROR, SESSION_NOT_FOUND, parse_body,
            response_error,
        },
    },
};

pub const SESSION_HEADER: HeaderName = HeaderName::from_static("mcp-session-id");

pub async fn post_handler(
    State(state): State<BridgeState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(raw_payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return rpc_error(
                StatusCode::BAD_REQUEST,
                JsonRpcError::new(PARSE_ERROR, format!("parse error: {}", rejection.body_text())),
            );
        }
    };

    let body = match parse_body(raw_payload) {
        Ok(body) => body,
        Err(error) => return rpc_error(StatusCode::BAD_REQUEST, error),
    };

    let session = match session_id(&headers) {
        Some(id) => match state.sessions().get(id).await {
            Some(session) => session,
            None => return session_not_found(id),
        },
        None => state.sessions().open().await,
    };

    let responses = join_all(body.messages.into_iter().map(|message| {
        let state = &state;
        let session_id = session.id.as_str();
        async move {
            match message {
                Incoming::Request(request) => dispatch_request(state, session_id, request).await,
                Incoming::ClientResponse => None,
                Incoming::Invalid(response) => Some(response),
            }
        }
    }))
    .await
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();

    let mut response = if responses.is_empty() {
        StatusCode::ACCEPTED.into_response()
    } else if body.batch {
        (StatusCode::OK, Json(responses)).into_response()
    } else {
        let mut responses = responses;
        match responses.pop() {
            Some(single) => (StatusCode::OK, Json(single)).into_response(),
            None => StatusCode::ACCEPTED.into_response(),
        }
    };
    attach_session_header(&mut response, &session);
    response
}

pub async fn get_handler(State(state): State<BridgeState>, headers: HeaderMap) -> Response {
    let session = match require_session(&state, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    debug!("event stream opened session={}", session.id);
    let mut response = Sse::new(session_events(&session))
        .keep_alive(KeepAlive::default())
        .into_response();
    attach_session_header(&mut response, &session);
    response
}

pub async fn delete_handler(State(state): State<BridgeState>, headers: HeaderMap) -> Response {
    let session = match require_session(&state, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    if state.sessions().close(&session.id).await {
        StatusCode::OK.into_response()
    } else {
        session_not_found(&session.id)
    }
}

/// Open until the session closes; the bridge has no server-initiated messages,
/// so the stream only carries keep-alives.
fn session_events(session: &Session) -> impl Stream<Item = Result<Event, Infallible>> + use<> {
    stream::pending().take_until(session.closed().cancelled_owned())
}

async fn require_session(state: &BridgeState, headers: &HeaderMap) -> Result<Session, Response> {
    let Some(id) = session_id(headers) else {
        return Err(rpc_error(
            StatusCode::BAD_REQUEST,
            JsonRpcError::new(BAD_REQUEST, "bad request: no valid session id provided"),
        ));
    };

    state
        .sessions()
        .get(id)
        .await
        .ok_or_else(|| session_not_found(id))
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn attach_session_header(response: &mut Response, session: &Session) {
    match HeaderValue::from_str(&session.id) {
        Ok(value) => {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
        Err(error) => warn!("session id is not a valid header value: {error}"),
    }
}

fn session_not_found(id: &str) -> Response {
    rpc_error(
        StatusCode::NOT_FOUND,
        JsonRpcError::new(SESSION_NOT_FOUND, format!("session not found: {id}"))
            .with_data(json!({ "sessionId": id })),
    )
}

pub(crate) fn rpc_error(status: StatusCode, error: JsonRpcError) -> Response {
    (status, Json(response_error(Value::Null, error))).into_response()
}
