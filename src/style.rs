use crate::types::Feature;
use serde::{Deserialize, Serialize};

// Scaled marker radii are clamped so a tiny shelter stays visible and a huge
// one does not swallow the map.
const RADIUS_MIN: f32 = 4.0;
const RADIUS_MAX: f32 = 16.0;

/// One styling policy per layer, chosen in configuration. Policies are never
/// combined.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum StylePolicy {
    /// Capacity thresholds on a numeric attribute (shelter `plasser`).
    Capacity {
        #[serde(default = "default_capacity_attribute")]
        attribute: String,
        #[serde(default = "default_high_threshold")]
        high: f64,
        #[serde(default = "default_low_threshold")]
        low: f64,
        /// Derive marker radius from the attribute instead of per-bucket sizes.
        #[serde(default)]
        scaled: bool,
    },
    /// "Open"/"Closed" status coloring, fixed radius.
    Status {
        #[serde(default = "default_status_attribute")]
        attribute: String,
    },
    /// Exact string match on one attribute.
    Category { attribute: String, match_value: String },
    /// One fill/stroke for every feature; used for polygon layers.
    Fixed {
        fill: String,
        stroke: String,
        #[serde(default = "default_stroke_width")]
        stroke_width: f32,
    },
}

fn default_capacity_attribute() -> String {
    "plasser".to_string()
}

fn default_status_attribute() -> String {
    "status".to_string()
}

fn default_high_threshold() -> f64 {
    500.0
}

fn default_low_threshold() -> f64 {
    200.0
}

fn default_stroke_width() -> f32 {
    2.0
}

/// Per-feature visual style, computed at load time and attached to the
/// features the API serves. Colors are CSS color strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyleSpec {
    pub fill: String,
    pub stroke: String,
    pub stroke_width: f32,
    /// Marker radius in pixels; `None` for polygon styles.
    pub radius: Option<f32>,
}

impl StylePolicy {
    /// Pure mapping from a feature's attributes to its style. A missing or
    /// non-numeric attribute falls into the lowest bucket (capacity) or the
    /// "otherwise" arm (categorical policies).
    pub fn style(&self, feature: &Feature) -> StyleSpec {
        match self {
            StylePolicy::Capacity {
                attribute,
                high,
                low,
                scaled,
            } => {
                let capacity = feature.attr_f64(attribute).unwrap_or(0.0);
                let (fill, bucket_radius) = if capacity > *high {
                    ("green", 10.0)
                } else if capacity > *low {
                    ("yellow", 8.0)
                } else {
                    ("red", 6.0)
                };
                let radius = if *scaled {
                    ((capacity / 100.0) as f32).clamp(RADIUS_MIN, RADIUS_MAX)
                } else {
                    bucket_radius
                };
                marker(fill, radius)
            }
            StylePolicy::Status { attribute } => {
                let fill = match feature.attr(attribute).and_then(|v| v.as_str()) {
                    Some("Open") => "green",
                    Some("Closed") => "red",
                    _ => "grey",
                };
                marker(fill, 7.0)
            }
            StylePolicy::Category {
                attribute,
                match_value,
            } => {
                let matched = feature.attr(attribute).and_then(|v| v.as_str())
                    == Some(match_value.as_str());
                marker(if matched { "green" } else { "red" }, 7.0)
            }
            StylePolicy::Fixed {
                fill,
                stroke,
                stroke_width,
            } => StyleSpec {
                fill: fill.clone(),
                stroke: stroke.clone(),
                stroke_width: *stroke_width,
                radius: None,
            },
        }
    }
}

fn marker(fill: &str, radius: f32) -> StyleSpec {
    StyleSpec {
        fill: fill.to_string(),
        stroke: "white".to_string(),
        stroke_width: 2.0,
        radius: Some(radius),
    }
}
