use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_MODELS_DIR: &str = "public/models";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub viewer: ViewerConfig,
}

impl AppConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&source)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(source: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(source)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub models_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Base URL of a running listing server. When unset, the viewer scans
    /// `models_dir` directly and loads models from disk.
    pub server_url: Option<String>,
    pub models_dir: PathBuf,
    /// Height of the viewer area in physical pixels. Width follows the window.
    pub viewer_height: u32,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Seconds the animation mixer advances per rendered frame.
    pub frame_step: f32,
    pub debug_mode: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
            viewer_height: 400,
            fov_degrees: 75.0,
            near: 0.1,
            far: 1000.0,
            frame_step: 0.016,
            debug_mode: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();

        assert_eq!(config.server.bind, SocketAddr::from(([127, 0, 0, 1], 3000)));
        assert_eq!(config.server.models_dir, PathBuf::from("public/models"));
        assert_eq!(config.viewer.viewer_height, 400);
        assert_eq!(config.viewer.fov_degrees, 75.0);
        assert!(!config.viewer.debug_mode);
        assert!(config.viewer.server_url.is_none());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [server]
            bind = "0.0.0.0:8080"

            [viewer]
            server_url = "http://localhost:8080"
            debug_mode = true
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind.port(), 8080);
        assert_eq!(config.server.models_dir, PathBuf::from("public/models"));
        assert_eq!(
            config.viewer.server_url.as_deref(),
            Some("http://localhost:8080")
        );
        assert!(config.viewer.debug_mode);
        assert_eq!(config.viewer.far, 1000.0);
    }

    #[test]
    fn rejects_unparseable_bind_address() {
        let result = AppConfig::from_toml("[server]\nbind = \"not an address\"\n");
        assert!(result.is_err());
    }
}
