use crate::config::{AppConfig, LayerConfig};
use crate::interact::{self, FeatureIndex};
use crate::source;
use crate::style::StyleSpec;
use crate::types::{Feature, SelectedFeature};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// A resolved layer: the features, their precomputed styles, and the spatial
/// index the interaction handler queries.
pub struct LoadedLayer {
    pub features: Vec<Feature>,
    pub styles: Vec<StyleSpec>,
    pub index: FeatureIndex,
}

/// Data acquisition is separate from rendering: each layer moves through this
/// container independently, and the rest of the map never waits on it.
pub enum LayerState {
    Pending,
    Ready(LoadedLayer),
    Failed(String),
}

impl LayerState {
    pub fn label(&self) -> &'static str {
        match self {
            LayerState::Pending => "pending",
            LayerState::Ready(_) => "ready",
            LayerState::Failed(_) => "failed",
        }
    }
}

pub struct LayerSlot {
    pub config: LayerConfig,
    pub state: RwLock<LayerState>,
}

/// Owns the viewport lifecycle. Layer loads are spawned on mount; a load that
/// resolves after `unmount` must not touch the slots.
pub struct MapHost {
    pub config: AppConfig,
    mounted: AtomicBool,
    layers: Vec<LayerSlot>,
}

impl MapHost {
    pub fn mount(config: AppConfig) -> Arc<Self> {
        let layers = config
            .layers
            .iter()
            .cloned()
            .map(|config| LayerSlot {
                config,
                state: RwLock::new(LayerState::Pending),
            })
            .collect();

        let host = Arc::new(MapHost {
            config,
            mounted: AtomicBool::new(true),
            layers,
        });

        for slot_index in 0..host.layers.len() {
            let host = Arc::clone(&host);
            tokio::spawn(async move { host.load_slot(slot_index).await });
        }

        host
    }

    async fn load_slot(&self, slot_index: usize) {
        let slot = &self.layers[slot_index];
        let result = source::load_layer(&slot.config, &self.config.viewport).await;

        // Mounted check before the write keeps a late resolution from
        // mutating a disposed viewport.
        if !self.mounted.load(Ordering::SeqCst) {
            tracing::debug!(layer = %slot.config.name, "Load resolved after unmount; discarding");
            return;
        }

        let mut state = slot.state.write().unwrap();
        match result {
            Ok(features) => {
                let styles = features.iter().map(|f| slot.config.style.style(f)).collect();
                let index = FeatureIndex::build(&features);
                tracing::info!(layer = %slot.config.name, count = features.len(), "Layer ready");
                *state = LayerState::Ready(LoadedLayer {
                    features,
                    styles,
                    index,
                });
            }
            Err(e) => {
                let message = format!("{:#}", e);
                tracing::error!(layer = %slot.config.name, error = %message, "Layer failed to load");
                *state = LayerState::Failed(message);
            }
        }
    }

    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    pub fn layers(&self) -> &[LayerSlot] {
        &self.layers
    }

    pub fn layer(&self, name: &str) -> Option<&LayerSlot> {
        self.layers.iter().find(|slot| slot.config.name == name)
    }

    /// Hit-test every ready layer that has a popup, in configured order. A
    /// hit feature missing a required attribute is the same as a miss.
    pub fn query(&self, lon: f64, lat: f64, tolerance: f64) -> Option<SelectedFeature> {
        for slot in &self.layers {
            let Some(popup) = &slot.config.popup else {
                continue;
            };
            let state = slot.state.read().unwrap();
            let LayerState::Ready(layer) = &*state else {
                continue;
            };
            if let Some(feature) = layer.index.hit_test(&layer.features, lon, lat, tolerance) {
                if let Some(selected) =
                    interact::select(&slot.config.name, feature, &popup.required)
                {
                    return Some(selected);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PopupConfig, PopupTrigger, ServerConfig, ViewportConfig};
    use crate::source::fixtures::SHELTERS;
    use crate::style::StylePolicy;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use std::path::PathBuf;
    use std::time::Duration;

    fn app_config(layer: LayerConfig) -> AppConfig {
        AppConfig {
            viewport: ViewportConfig {
                tile_url: "https://tiles.example.com/{z}/{x}/{y}.png".to_string(),
                center: [10.74, 59.91],
                zoom: 5,
                extent: None,
            },
            layers: vec![layer],
            server: ServerConfig {
                port: 0,
                static_dir: PathBuf::from("static"),
            },
        }
    }

    fn shelter_layer(url: String) -> LayerConfig {
        LayerConfig {
            name: "shelters".to_string(),
            url: Some(url),
            path: None,
            token_env: None,
            style: StylePolicy::Capacity {
                attribute: "plasser".to_string(),
                high: 500.0,
                low: 200.0,
                scaled: false,
            },
            popup: Some(PopupConfig {
                trigger: PopupTrigger::Click,
                required: vec![
                    "romnr".to_string(),
                    "plasser".to_string(),
                    "adresse".to_string(),
                ],
            }),
        }
    }

    async fn spawn_endpoint(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/query", addr)
    }

    async fn wait_for_settled(host: &MapHost) {
        for _ in 0..100 {
            if !matches!(
                *host.layers()[0].state.read().unwrap(),
                LayerState::Pending
            ) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("layer never left pending state");
    }

    #[tokio::test]
    async fn successful_load_styles_every_feature() {
        let url = spawn_endpoint(Router::new().route("/query", get(|| async { SHELTERS }))).await;
        let host = MapHost::mount(app_config(shelter_layer(url)));
        wait_for_settled(&host).await;

        let state = host.layers()[0].state.read().unwrap();
        let LayerState::Ready(layer) = &*state else {
            panic!("layer should be ready");
        };
        assert_eq!(layer.features.len(), 3);
        assert_eq!(layer.styles.len(), 3);
        assert_eq!(layer.styles[0].fill, "green");
        assert_eq!(layer.styles[1].fill, "yellow");
        assert_eq!(layer.styles[2].fill, "red");
    }

    #[tokio::test]
    async fn server_error_leaves_layer_failed_and_host_alive() {
        let url = spawn_endpoint(Router::new().route(
            "/query",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        ))
        .await;
        let host = MapHost::mount(app_config(shelter_layer(url)));
        wait_for_settled(&host).await;

        let state = host.layers()[0].state.read().unwrap();
        assert!(matches!(&*state, LayerState::Failed(_)));
        drop(state);

        // The rest of the host keeps serving; a query simply finds nothing.
        assert!(host.query(10.75, 59.91, 0.05).is_none());
    }

    #[tokio::test]
    async fn malformed_body_leaves_layer_failed() {
        let url =
            spawn_endpoint(Router::new().route("/query", get(|| async { "not geojson" }))).await;
        let host = MapHost::mount(app_config(shelter_layer(url)));
        wait_for_settled(&host).await;

        let state = host.layers()[0].state.read().unwrap();
        assert!(matches!(&*state, LayerState::Failed(_)));
    }

    #[tokio::test]
    async fn unmount_discards_in_flight_load() {
        let url = spawn_endpoint(Router::new().route(
            "/query",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(150)).await;
                SHELTERS
            }),
        ))
        .await;
        let host = MapHost::mount(app_config(shelter_layer(url)));
        host.unmount();

        tokio::time::sleep(Duration::from_millis(400)).await;

        // The fetch resolved long ago, but the slot must be untouched.
        let state = host.layers()[0].state.read().unwrap();
        assert!(matches!(&*state, LayerState::Pending));
    }

    #[tokio::test]
    async fn query_requires_all_popup_attributes() {
        let url = spawn_endpoint(Router::new().route("/query", get(|| async { SHELTERS }))).await;
        let host = MapHost::mount(app_config(shelter_layer(url)));
        wait_for_settled(&host).await;

        // First shelter has all required attributes.
        let selected = host.query(10.75, 59.91, 0.01).unwrap();
        assert_eq!(selected.attributes["romnr"], "A-101");

        // Second shelter is missing `adresse`; hitting it selects nothing.
        assert!(host.query(10.40, 59.90, 0.01).is_none());

        // Empty water.
        assert!(host.query(4.0, 58.0, 0.01).is_none());
    }
}
