use geo::Geometry;
use serde::Serialize;
use serde_json::{Map, Value};

/// A single geographic entity: a geometry plus a free-form attribute map.
/// No schema is enforced; lookups on missing attributes return `None`.
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub attributes: Map<String, Value>,
}

impl Feature {
    /// Attribute lookup treating JSON null the same as absent.
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name).filter(|v| !v.is_null())
    }

    /// Numeric attribute lookup, tolerating numbers encoded as strings
    /// (ArcGIS endpoints do this for some fields).
    pub fn attr_f64(&self, name: &str) -> Option<f64> {
        match self.attr(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Projection of the one active feature for the info panel. `None` upstream
/// means no selection and a hidden panel.
#[derive(Debug, Clone, Serialize)]
pub struct SelectedFeature {
    pub layer: String,
    /// Overlay anchor, lon/lat.
    pub position: [f64; 2],
    pub attributes: Map<String, Value>,
}
