use std::future::Future;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, header, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info};

use crate::{
    application::state::BridgeState,
    domain::error::BridgeError,
    interfaces::mcp::{self, SESSION_HEADER, rpc_error},
    rpc::jsonrpc::{FORBIDDEN, JsonRpcError, UNAUTHORIZED},
    security::{
        auth::{self, auth_failure_message},
        origin::OriginPolicy,
    },
};

pub const MCP_PATH: &str = "/mcp";

pub fn build_router(state: BridgeState) -> Router {
    let mcp_routes = Router::new()
        .route(
            MCP_PATH,
            get(mcp::get_handler)
                .post(mcp::post_handler)
                .delete(mcp::delete_handler),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_access));

    Router::new()
        .route("/healthz", get(healthz_handler))
        .merge(mcp_routes)
        .layer(DefaultBodyLimit::max(state.config().max_body_bytes))
        .layer(cors_layer(OriginPolicy::from_origins(&state.config().cors_origins)))
        .with_state(state)
}

pub async fn serve(
    listener: TcpListener,
    state: BridgeState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), BridgeError> {
    let local_addr = listener.local_addr().map_err(|error| {
        BridgeError::Unavailable(format!("failed to read listener address: {error}"))
    })?;

    info!(
        "tab-bridge listening on http://{}:{}{MCP_PATH}, auth_mode={}",
        local_addr.ip(),
        local_addr.port(),
        state.auth_mode_label(),
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|error| BridgeError::Unavailable(format!("server runtime error: {error}")))
}

/// Origin and bearer-token checks for the tool endpoint. Preflight requests
/// are answered by the CORS layer and never reach this point.
async fn require_access(
    State(state): State<BridgeState>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    if let Some(origin) = request.headers().get(header::ORIGIN) {
        let policy = OriginPolicy::from_origins(&state.config().cors_origins);
        let allowed = origin.to_str().is_ok_and(|origin| policy.allows(origin));
        if !allowed {
            debug!("rejecting request from disallowed origin {origin:?}");
            return rpc_error(
                StatusCode::FORBIDDEN,
                JsonRpcError::new(FORBIDDEN, "forbidden: origin not allowed"),
            );
        }
    }

    if let Err(reason) = auth::authorize(&state.config().auth_mode, request.headers()) {
        debug!("rejecting unauthenticated request: {reason:?}");
        let mut response = rpc_error(
            StatusCode::UNAUTHORIZED,
            JsonRpcError::new(UNAUTHORIZED, auth_failure_message(reason)),
        );
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        return response;
    }

    next.run(request).await
}

fn cors_layer(policy: OriginPolicy) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin.to_str().is_ok_and(|origin| policy.allows(origin))
            },
        ))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            SESSION_HEADER,
            HeaderName::from_static("mcp-protocol-version"),
            HeaderName::from_static("last-event-id"),
        ])
        .expose_headers([SESSION_HEADER])
}

async fn healthz_handler(State(state): State<BridgeState>) -> impl IntoResponse {
    let payload = state.health_payload().await;
    let status = if payload["ok"] == true {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(payload))
}
