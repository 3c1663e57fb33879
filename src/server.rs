use crate::config::AppConfig;
use crate::render::{render_page, PageMeta};
use crate::selection::Selection;
use crate::view::{build_view, to_feature_collection, DashboardView, Stores};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct AppState {
    pub stores: Stores,
    pub meta: PageMeta,
    pub table_rows: usize,
}

impl AppState {
    pub fn new(config: &AppConfig, stores: Stores) -> Self {
        Self {
            stores,
            meta: PageMeta::from_config(config),
            table_rows: config.display.table_rows,
        }
    }

    fn view(&self, params: &CityParams) -> DashboardView {
        let selection = Selection::from_param(params.city.as_deref());
        build_view(&self.stores, &selection, self.table_rows)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CityParams {
    city: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(page_handler))
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/cities", get(cities_handler))
        .route("/api/view", get(view_handler))
        .route("/api/geometry/:code", get(geometry_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

pub async fn start_server(config: AppConfig, stores: Stores) -> Result<()> {
    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid server host: {}", config.server.host))?;
    let addr = SocketAddr::new(host, config.server.port);

    let app = build_router(AppState::new(&config, stores));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Starting server on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn page_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CityParams>,
) -> Html<String> {
    let view = state.view(&params);
    Html(render_page(&view, &state.meta))
}

async fn cities_handler(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.stores.attributes.list_names().to_vec())
}

async fn view_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CityParams>,
) -> Json<DashboardView> {
    Json(state.view(&params))
}

async fn geometry_handler(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Response {
    match state.stores.geometry.get_by_code(&code) {
        Some(found) => Json(to_feature_collection(found, None)).into_response(),
        None => (StatusCode::NOT_FOUND, "geometry not found").into_response(),
    }
}
