use std::any::Any;
use std::sync::Arc;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::map_response;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, routing::post, Json, Router};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{info, warn};

use super::models::ErrorResponse;
use super::services;
use super::state::AppState;
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::observability::Metrics;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Assembles the API router. Only the supported methods are registered per
/// route, so anything else gets 405 from the router itself.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(services::health))
        .route("/admin/drain", post(services::drain))
        .route("/admin/resume", post(services::resume))
        .route(
            "/tasks",
            post(services::create_task).get(services::list_tasks),
        )
        .route("/tasks/{*id}", get(services::get_task))
        .with_state(state)
        // A panicking handler must take down one request, not the process.
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(map_response(with_json_charset))
}

/// JSON responses advertise their charset explicitly.
async fn with_json_charset(mut response: Response) -> Response {
    let is_bare_json = response
        .headers()
        .get(CONTENT_TYPE)
        .is_some_and(|v| v.as_bytes() == b"application/json");
    if is_bare_json {
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
    }
    response
}

/// Builds the pipeline, serves HTTP until SIGINT/SIGTERM, then runs the
/// shutdown sequence: stop accepting requests, drain connections for at
/// most `shutdown_wait`, close the coordinator (dispatcher → workers →
/// journal).
pub async fn run(config: Config) -> Result<(), AnyError> {
    let config = Arc::new(config);
    let metrics = Arc::new(Metrics::new());

    let coordinator = Coordinator::new(Arc::clone(&config), metrics).await?;
    let app = router(AppState::new(Arc::clone(&config), Arc::clone(&coordinator)));

    let listener = TcpListener::bind(config.server.bind_addr).await?;
    info!(addr = %config.server.bind_addr, "fetchd API listening");

    let (close_tx, close_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = close_rx.await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            // Server ended on its own: surface the error before shutdown.
            coordinator.close().await;
            result??;
            return Ok(());
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    let _ = close_tx.send(());
    if tokio::time::timeout(config.server.shutdown_wait(), &mut server)
        .await
        .is_err()
    {
        warn!("graceful connection drain timed out");
        server.abort();
    }

    coordinator.close().await;
    Ok(())
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "handler panicked".to_string()
    };

    let body = ErrorResponse {
        code: "INTERNAL_ERROR",
        message: detail,
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                warn!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
