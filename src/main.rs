use std::{path::PathBuf, sync::Arc};

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Response, StatusCode},
    routing::{get, post},
    Router,
};
use cards::PackCatalog;
use sim::{handlers, server::SessionHandle, SimulatorConfig};
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};

mod cards;
mod sim;

pub type Res<T> = Result<T, String>;

pub fn err<T, S: ToString>(message: S) -> Res<T> {
    Err(message.to_string())
}

#[derive(serde::Serialize)]
struct Resp {
    message: String,
    success: bool,
}

impl Resp {
    fn axum<S: ToString>(message: S, status: StatusCode) -> Response<String> {
        Self::body(
            &Self {
                message: message.to_string(),
                success: status == StatusCode::OK,
            },
            status,
        )
    }

    fn body<T: serde::Serialize>(value: &T, status: StatusCode) -> Response<String> {
        match serde_json::ser::to_string(value) {
            Ok(body) => {
                let mut resp = Response::new(body);
                *resp.status_mut() = status;
                resp.headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                resp
            }
            Err(e) => {
                let mut resp = Response::new(format!("Failed to JSON encode response: {e}"));
                *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                resp
            }
        }
    }

    fn json<T: serde::Serialize>(value: &T) -> Response<String> {
        Self::body(value, StatusCode::OK)
    }

    fn ok<S: ToString>(message: S) -> Response<String> {
        Self::axum(message, StatusCode::OK)
    }

    fn e404<S: ToString>(message: S) -> Response<String> {
        Self::axum(message, StatusCode::NOT_FOUND)
    }

    fn e500<S: ToString>(message: S) -> Response<String> {
        Self::axum(message, StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn e422<S: ToString>(message: S) -> Response<String> {
        Self::axum(message, StatusCode::UNPROCESSABLE_ENTITY)
    }
}

#[derive(Clone)]
pub struct AppState {
    catalog: Arc<PackCatalog>,
    sessions: SessionHandle,
}

async fn load_pack_catalog(data: &std::path::Path, endpoint: Option<&str>) -> Res<PackCatalog> {
    let packs = cards::graphql::load_packs(data, endpoint).await?;
    tracing::debug!("Inserting pack data to pack catalog.");
    let mut catalog = PackCatalog::new();
    for pack in packs {
        if pack.entries.is_empty() {
            tracing::warn!("Pack {} has no usable card entries.", pack.id);
        }
        catalog.add(pack);
    }
    if catalog.size() == 0 {
        return err("Pack data contained no packs.");
    }
    tracing::debug!(
        "Succesfully populated pack catalog with {} packs.",
        catalog.size()
    );
    Ok(catalog)
}

#[tokio::main]
async fn main() {
    const USAGE: &str = "Usage: tcgwiki <static path> <data path> <port> [content endpoint]";

    let content = std::env::args().nth(1).expect(USAGE);
    let data = PathBuf::from(std::env::args().nth(2).expect(USAGE));
    let port = std::env::args()
        .nth(3)
        .map(|s| {
            s.parse::<u16>()
                .unwrap_or_else(|_| panic!("Invalid port number: {s}"))
        })
        .expect(USAGE);
    let endpoint = std::env::args().nth(4);

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let catalog = match load_pack_catalog(&data, endpoint.as_deref()).await {
        Ok(catalog) => catalog,
        Err(e) => panic!("Failed to load pack data: {e}"),
    };
    let config = match SimulatorConfig::load(&data).await {
        Ok(config) => config,
        Err(e) => panic!("Failed to load simulator config: {e}"),
    };

    let state = AppState {
        catalog: Arc::new(catalog),
        sessions: SessionHandle::spawn(config),
    };

    let app = Router::new()
        .fallback_service(ServeDir::new(content).append_index_html_on_directories(true))
        .route("/api/packs", get(handlers::handle_list_packs))
        .route("/api/packs/:id/rates", get(handlers::handle_pack_rates))
        .route("/api/sessions", post(handlers::handle_create_session))
        .route(
            "/api/sessions/:id",
            axum::routing::delete(handlers::handle_close),
        )
        .route("/api/sessions/:id/open", post(handlers::handle_open))
        .route("/api/sessions/:id/reset", post(handlers::handle_reset))
        .route("/api/sessions/:id/stats", get(handlers::handle_stats))
        .route("/api/sessions/:id/totals", get(handlers::handle_totals))
        .route("/api/sessions/:id/pull", get(handlers::handle_current_pull))
        .route("/api/sessions/:id/history", get(handlers::handle_history))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .unwrap_or_else(|e| panic!("Failed to open port {port}: {e}"));

    tracing::info!("Listening on port {port}.");
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Closed due to error: {e}");
    }
}
