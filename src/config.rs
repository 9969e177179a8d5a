use crate::style::StylePolicy;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub viewport: ViewportConfig,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ViewportConfig {
    /// Raster tile URL template with {z}/{x}/{y} placeholders.
    pub tile_url: String,
    /// Initial center, lon/lat.
    pub center: [f64; 2],
    pub zoom: u8,
    /// Optional lon/lat box [min_lon, min_lat, max_lon, max_lat] restricting
    /// the vector layers.
    pub extent: Option<[f64; 4]>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LayerConfig {
    pub name: String,
    /// Remote feature query endpoint. Exactly one of `url`/`path`.
    pub url: Option<String>,
    /// Static GeoJSON file.
    pub path: Option<PathBuf>,
    /// Name of an environment variable holding a bearer token, for endpoints
    /// that need one. The token itself never lives in this file.
    pub token_env: Option<String>,
    pub style: StylePolicy,
    pub popup: Option<PopupConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PopupConfig {
    #[serde(default)]
    pub trigger: PopupTrigger,
    /// Attributes that must all be present for a hit to become a selection.
    pub required: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PopupTrigger {
    #[default]
    Click,
    Hover,
}

impl PopupTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            PopupTrigger::Click => "click",
            PopupTrigger::Hover => "hover",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for layer in &self.layers {
            if !seen.insert(layer.name.as_str()) {
                return Err(anyhow!("Duplicate layer name '{}'", layer.name));
            }
            match (&layer.url, &layer.path) {
                (Some(_), Some(_)) => {
                    return Err(anyhow!("Layer '{}' has both url and path", layer.name))
                }
                (None, None) => {
                    return Err(anyhow!("Layer '{}' has neither url nor path", layer.name))
                }
                _ => {}
            }
        }
        Ok(())
    }
}
