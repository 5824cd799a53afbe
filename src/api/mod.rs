use crate::api::handlers::{apps, auth, health};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, post},
    Extension, Router,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub(crate) mod handlers;
mod maintenance;
// OpenAPI document wiring lives in openapi.rs.
mod openapi;

pub use handlers::auth::{AuthConfig, AuthState};
pub use maintenance::spawn_sweeper;
pub use openapi::{openapi, ApiDoc};

pub const DEFAULT_BASE_PATH: &str = "/api";

/// Normalize a user supplied base path to `""` or `/segment[/segment]`.
#[must_use]
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn service_routes() -> Router {
    Router::new()
        .route("/auth/login", post(auth::login::login))
        .route("/auth/session/verify", post(auth::session::verify))
        .route("/auth/session/revoke", post(auth::session::revoke))
        .route("/auth/register", post(apps::register::register))
        .route("/auth/apps", get(apps::admin::list_apps))
        .route("/auth/apps/:app_id", get(apps::admin::get_app))
        .route("/auth/apps/:app_id/approve", post(apps::admin::approve_app))
        .route("/auth/apps/:app_id/reject", post(apps::admin::reject_app))
        .route("/auth/apps/:app_id/suspend", post(apps::admin::suspend_app))
}

/// Build the application router: service routes under `base_path`, `/health`
/// at the root (and under `base_path`), and Swagger UI at `/docs`.
#[must_use]
pub fn router(auth_state: Arc<AuthState>, base_path: &str) -> Router {
    let base_path = normalize_base_path(base_path);
    let health_route = get(health::health).options(health::health);

    let app = if base_path.is_empty() {
        service_routes().route("/health", health_route)
    } else {
        Router::new()
            .route("/health", health_route.clone())
            .nest(&base_path, service_routes().route("/health", health_route))
    };

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_origin(Any);

    app.merge(SwaggerUi::new("/docs").url("/openapi.json", openapi(&base_path)))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_state)),
        )
}

/// Start the server
/// # Errors
/// Return error if the verifier cannot be built or the listener fails
pub async fn new(
    port: u16,
    base_path: &str,
    sweep_interval: Duration,
    auth_config: AuthConfig,
) -> Result<()> {
    let auth_state = Arc::new(AuthState::from_config(auth_config)?);

    let sweeper = spawn_sweeper(auth_state.service().clone(), sweep_interval);

    let app = router(auth_state, base_path);

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    info!("Gracefully shutdown");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
