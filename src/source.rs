use crate::config::{LayerConfig, ViewportConfig};
use crate::types::Feature;
use anyhow::{anyhow, Context, Result};
use geo::{BoundingRect, Coord, Intersects, Rect};
use geojson::GeoJson;
use std::fs;

/// Obtain a layer's features from its configured source. One attempt, no
/// retry, no caching; callers decide what a failure means for the map.
pub async fn load_layer(layer: &LayerConfig, viewport: &ViewportConfig) -> Result<Vec<Feature>> {
    let body = match (&layer.url, &layer.path) {
        (Some(url), _) => fetch_remote(url, layer.token_env.as_deref()).await?,
        (_, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read feature file: {:?}", path))?,
        _ => return Err(anyhow!("Layer '{}' has no source", layer.name)),
    };

    let mut features = parse_feature_collection(&body)
        .with_context(|| format!("Layer '{}' returned an invalid feature collection", layer.name))?;

    if let Some(extent) = viewport.extent {
        let bounds = extent_rect(extent);
        let before = features.len();
        features.retain(|f| {
            f.geometry
                .bounding_rect()
                .map_or(false, |r| r.intersects(&bounds))
        });
        if features.len() < before {
            tracing::debug!(
                layer = %layer.name,
                dropped = before - features.len(),
                "Dropped features outside the viewport extent"
            );
        }
    }

    Ok(features)
}

async fn fetch_remote(url: &str, token_env: Option<&str>) -> Result<String> {
    let client = reqwest::Client::new();
    let mut request = client.get(url);
    if let Some(var) = token_env {
        let token = std::env::var(var)
            .with_context(|| format!("Token environment variable '{}' is not set", var))?;
        request = request.bearer_auth(token);
    }
    let response = request
        .send()
        .await
        .with_context(|| format!("Request to {} failed", url))?
        .error_for_status()
        .with_context(|| format!("Feature endpoint {} returned an error status", url))?;
    response.text().await.context("Failed to read response body")
}

/// Parse a GeoJSON FeatureCollection body. Features without geometry are
/// skipped; attribute maps are taken as-is, missing properties and all.
pub fn parse_feature_collection(body: &str) -> Result<Vec<Feature>> {
    let geojson: GeoJson = body.parse().context("Failed to parse GeoJSON")?;
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut features = Vec::with_capacity(collection.features.len());
    for feature in collection.features {
        let geometry = match feature.geometry {
            Some(geometry) => geo::Geometry::<f64>::try_from(geometry.value)
                .map_err(|e| anyhow!("Failed to convert geometry: {:?}", e))?,
            None => continue,
        };
        features.push(Feature {
            geometry,
            attributes: feature.properties.unwrap_or_default(),
        });
    }
    Ok(features)
}

fn extent_rect(extent: [f64; 4]) -> Rect<f64> {
    Rect::new(
        Coord {
            x: extent[0],
            y: extent[1],
        },
        Coord {
            x: extent[2],
            y: extent[3],
        },
    )
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Three shelters around Oslo; the second is missing `adresse`.
    pub const SHELTERS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [10.75, 59.91]},
                "properties": {"romnr": "A-101", "plasser": 620, "adresse": "Storgata 1"}
            },
            {
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [10.40, 59.90]},
                "properties": {"romnr": "B-7", "plasser": 340}
            },
            {
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [10.20, 59.74]},
                "properties": {"romnr": "C-2", "plasser": 80, "adresse": "Havnegata 12"}
            }
        ]
    }"#;
}
