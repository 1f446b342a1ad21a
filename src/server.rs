//! HTTP surface for the model listing and the model files themselves.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};

use crate::{
    config::ServerConfig,
    listing::{self, ListingError, ModelDescriptor, LISTING_ROUTE, MODELS_ROUTE},
};

pub struct ServerState {
    pub models_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
}

impl IntoResponse for ListingError {
    fn into_response(self) -> Response {
        log::error!("Listing models failed: {}", self);

        let body = ErrorBody {
            error: "Failed to load models",
        };

        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    let models = ServeDir::new(&state.models_dir);

    Router::new()
        .route(LISTING_ROUTE, get(list_models_handler))
        .nest_service(MODELS_ROUTE, models)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn list_models_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Vec<ModelDescriptor>>, ListingError> {
    let dir = state.models_dir.clone();

    let models = match tokio::task::spawn_blocking(move || listing::list_models(&dir)).await {
        Ok(result) => result?,
        Err(join_error) => {
            // The scan itself panicked, report it like an unreadable directory
            return Err(ListingError::ReadDir {
                dir: state.models_dir.clone(),
                source: std::io::Error::other(join_error),
            });
        }
    };

    log::debug!("Returning {} models", models.len());

    Ok(Json(models))
}

pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let state = Arc::new(ServerState {
        models_dir: config.models_dir.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;

    log::info!(
        "Serving models from {} on http://{}",
        config.models_dir.display(),
        listener.local_addr()?
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    log::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for ctrl-c: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use std::future::IntoFuture;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;

    fn app(models_dir: PathBuf) -> Router {
        router(Arc::new(ServerState { models_dir }))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn lists_glb_files_as_json() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.glb", "b.glb", "c.glb", "notes.md", "texture.png"] {
            std::fs::write(dir.path().join(name), b"data").unwrap();
        }

        let (status, body) = get(app(dir.path().to_path_buf()), "/api/models").await;

        assert_eq!(status, StatusCode::OK);
        let mut models: Vec<ModelDescriptor> = serde_json::from_slice(&body).unwrap();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
        let paths: Vec<_> = models.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(paths, ["/models/a.glb", "/models/b.glb", "/models/c.glb"]);
    }

    #[tokio::test]
    async fn empty_directory_returns_empty_array() {
        let dir = tempfile::tempdir().unwrap();

        let (status, body) = get(app(dir.path().to_path_buf()), "/api/models").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"[]");
    }

    #[tokio::test]
    async fn missing_directory_returns_error_body() {
        let dir = tempfile::tempdir().unwrap();

        let (status, body) = get(app(dir.path().join("gone")), "/api/models").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "Failed to load models" }));
    }

    #[tokio::test]
    async fn serves_model_files_under_models_route() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("duck.glb"), b"glTF-binary").unwrap();

        let (status, body) = get(app(dir.path().to_path_buf()), "/models/duck.glb").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"glTF-binary");
    }

    #[tokio::test]
    async fn listing_client_reads_a_running_server() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("duck.glb"), b"glTF").unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let server = tokio::spawn(axum::serve(listener, app(dir.path().to_path_buf())).into_future());

        let models = listing::fetch_models(&reqwest::Client::new(), &format!("http://{}", address))
            .await
            .unwrap();

        assert_eq!(models, vec![ModelDescriptor::from_file_name("duck.glb").unwrap()]);
        server.abort();
    }

    #[tokio::test]
    async fn listing_client_reports_server_errors() {
        let dir = tempfile::tempdir().unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let server =
            tokio::spawn(axum::serve(listener, app(dir.path().join("gone"))).into_future());

        let result =
            listing::fetch_models(&reqwest::Client::new(), &format!("http://{}", address)).await;

        assert!(result.is_err());
        server.abort();
    }
}
