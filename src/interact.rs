use crate::types::{Feature, SelectedFeature};
use geo::{BoundingRect, Centroid, Contains, EuclideanDistance, Point};
use rstar::{RTree, RTreeObject, AABB};
use serde_json::Map;

// Wrapper for RTree indexing
struct FeatureBounds {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for FeatureBounds {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Spatial index over one layer's features, built once when the layer
/// resolves.
pub struct FeatureIndex {
    tree: RTree<FeatureBounds>,
}

impl FeatureIndex {
    pub fn build(features: &[Feature]) -> Self {
        let items = features
            .iter()
            .enumerate()
            .filter_map(|(index, feature)| {
                let rect = feature.geometry.bounding_rect()?;
                Some(FeatureBounds {
                    index,
                    aabb: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();
        FeatureIndex {
            tree: RTree::bulk_load(items),
        }
    }

    /// Hit-test at a map position. Polygons hit by containment, points by
    /// distance within `tolerance` (map degrees, supplied by the frontend
    /// which knows the zoom). At most one feature is returned; the closest
    /// point wins over farther ones.
    pub fn hit_test<'a>(
        &self,
        features: &'a [Feature],
        lon: f64,
        lat: f64,
        tolerance: f64,
    ) -> Option<&'a Feature> {
        let probe = Point::new(lon, lat);
        let envelope = AABB::from_corners(
            [lon - tolerance, lat - tolerance],
            [lon + tolerance, lat + tolerance],
        );

        let mut best: Option<(f64, &Feature)> = None;
        for candidate in self.tree.locate_in_envelope_intersecting(&envelope) {
            let feature = &features[candidate.index];
            match &feature.geometry {
                geo::Geometry::Point(point) => {
                    let distance = point.euclidean_distance(&probe);
                    if distance <= tolerance
                        && best.as_ref().map_or(true, |(d, _)| distance < *d)
                    {
                        best = Some((distance, feature));
                    }
                }
                geo::Geometry::Polygon(polygon) => {
                    if polygon.contains(&probe) {
                        return Some(feature);
                    }
                }
                geo::Geometry::MultiPolygon(polygons) => {
                    if polygons.contains(&probe) {
                        return Some(feature);
                    }
                }
                _ => {}
            }
        }
        best.map(|(_, feature)| feature)
    }
}

/// Project a hit feature into popup state. Every required attribute must be
/// present and non-null; a feature missing one behaves exactly like a miss.
pub fn select(layer: &str, feature: &Feature, required: &[String]) -> Option<SelectedFeature> {
    let mut attributes = Map::new();
    for name in required {
        let value = feature.attr(name)?;
        attributes.insert(name.clone(), value.clone());
    }
    let anchor = anchor_point(&feature.geometry)?;
    Some(SelectedFeature {
        layer: layer.to_string(),
        position: [anchor.x(), anchor.y()],
        attributes,
    })
}

fn anchor_point(geometry: &geo::Geometry<f64>) -> Option<Point<f64>> {
    match geometry {
        geo::Geometry::Point(point) => Some(*point),
        other => other.centroid(),
    }
}
