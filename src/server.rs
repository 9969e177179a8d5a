use crate::host::{LayerState, MapHost};
use crate::types::SelectedFeature;
use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use geojson::{Feature as GeoFeature, FeatureCollection, GeoJson};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

// Fallback hit tolerance in map degrees when the frontend sends none.
const DEFAULT_TOLERANCE: f64 = 0.05;

#[derive(Serialize)]
struct ViewportResponse {
    tile_url: String,
    center: [f64; 2],
    zoom: u8,
}

#[derive(Serialize)]
struct LayerStatus {
    name: String,
    state: &'static str,
    count: Option<usize>,
    error: Option<String>,
    popup_trigger: Option<&'static str>,
}

#[derive(Deserialize)]
struct QueryParams {
    lon: f64,
    lat: f64,
    tolerance: Option<f64>,
}

pub fn router(host: Arc<MapHost>) -> Router {
    let static_dir = host.config.server.static_dir.clone();
    Router::new()
        .route("/api/viewport", get(viewport_handler))
        .route("/api/layers", get(layers_handler))
        .route("/api/layers/:name/features", get(features_handler))
        .route("/api/query", get(query_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(host)
}

pub async fn start_server(host: Arc<MapHost>) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], host.config.server.port));
    tracing::info!("Starting server on http://{}", addr);

    let app = router(Arc::clone(&host));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    host.unmount();
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn viewport_handler(State(host): State<Arc<MapHost>>) -> Json<ViewportResponse> {
    let viewport = &host.config.viewport;
    Json(ViewportResponse {
        tile_url: viewport.tile_url.clone(),
        center: viewport.center,
        zoom: viewport.zoom,
    })
}

/// Per-layer load state, so the frontend can show a "layer failed to load"
/// indicator instead of silently missing data.
async fn layers_handler(State(host): State<Arc<MapHost>>) -> Json<Vec<LayerStatus>> {
    let statuses = host
        .layers()
        .iter()
        .map(|slot| {
            let state = slot.state.read().unwrap();
            let (count, error) = match &*state {
                LayerState::Pending => (None, None),
                LayerState::Ready(layer) => (Some(layer.features.len()), None),
                LayerState::Failed(message) => (None, Some(message.clone())),
            };
            LayerStatus {
                name: slot.config.name.clone(),
                state: state.label(),
                count,
                error,
                popup_trigger: slot.config.popup.as_ref().map(|p| p.trigger.as_str()),
            }
        })
        .collect();
    Json(statuses)
}

/// The layer's features as a GeoJSON FeatureCollection with the computed
/// style merged into each feature's properties.
async fn features_handler(
    State(host): State<Arc<MapHost>>,
    Path(name): Path<String>,
) -> Response {
    let Some(slot) = host.layer(&name) else {
        return (StatusCode::NOT_FOUND, format!("No layer named '{}'", name)).into_response();
    };

    let state = slot.state.read().unwrap();
    match &*state {
        LayerState::Pending => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        LayerState::Failed(message) => (StatusCode::BAD_GATEWAY, message.clone()).into_response(),
        LayerState::Ready(layer) => {
            let features = layer
                .features
                .iter()
                .zip(&layer.styles)
                .map(|(feature, style)| {
                    let mut properties = feature.attributes.clone();
                    properties.insert(
                        "style".to_string(),
                        serde_json::to_value(style).unwrap_or_default(),
                    );
                    GeoFeature {
                        bbox: None,
                        geometry: Some(geojson::Geometry::new(geojson::Value::from(
                            &feature.geometry,
                        ))),
                        id: None,
                        properties: Some(properties),
                        foreign_members: None,
                    }
                })
                .collect();
            let collection = FeatureCollection {
                bbox: None,
                features,
                foreign_members: None,
            };
            Json(GeoJson::from(collection)).into_response()
        }
    }
}

async fn query_handler(
    State(host): State<Arc<MapHost>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<SelectedFeature>> {
    let tolerance = params.tolerance.unwrap_or(DEFAULT_TOLERANCE);
    Json(host.query(params.lon, params.lat, tolerance))
}
