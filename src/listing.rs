use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MODEL_EXTENSION: &str = ".glb";
pub const MODELS_ROUTE: &str = "/models";
pub const LISTING_ROUTE: &str = "/api/models";

/// A loadable model as exposed to the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub path: String,
}

impl ModelDescriptor {
    /// Builds a descriptor from a directory entry's file name, or `None` if the
    /// name does not carry the model extension.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let name = file_name.strip_suffix(MODEL_EXTENSION)?;

        Some(Self {
            name: name.to_string(),
            path: format!("{}/{}", MODELS_ROUTE, file_name),
        })
    }
}

#[derive(Error, Debug)]
pub enum ListingError {
    #[error("Failed to read models directory {dir}: {source}")]
    ReadDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read entry in models directory {dir}: {source}")]
    Entry {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lists the model files in `dir` in directory enumeration order.
pub fn list_models(dir: &Path) -> Result<Vec<ModelDescriptor>, ListingError> {
    log::debug!("Looking for models in {}", dir.display());

    let entries = std::fs::read_dir(dir).map_err(|source| ListingError::ReadDir {
        dir: dir.to_path_buf(),
        source,
    })?;

    let mut models = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|source| ListingError::Entry {
            dir: dir.to_path_buf(),
            source,
        })?;

        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            log::warn!("Skipping non UTF-8 file name {:?}", file_name);
            continue;
        };

        let Some(descriptor) = ModelDescriptor::from_file_name(file_name) else {
            continue;
        };

        // Follows symlinks, a dangling link is simply not a model
        let is_file = std::fs::metadata(entry.path())
            .map(|metadata| metadata.is_file())
            .unwrap_or(false);

        if !is_file {
            log::debug!("Skipping {}, not a regular file", file_name);
            continue;
        }

        models.push(descriptor);
    }

    log::debug!("Found {} models", models.len());

    Ok(models)
}

/// Asks a listing server for its models.
pub async fn fetch_models(
    client: &reqwest::Client,
    server_url: &str,
) -> anyhow::Result<Vec<ModelDescriptor>> {
    let url = reqwest::Url::parse(server_url)
        .and_then(|base| base.join(LISTING_ROUTE))
        .with_context(|| format!("Invalid server URL {}", server_url))?;

    log::debug!("Fetching model list from {}", url);

    let models = client
        .get(url.clone())
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .with_context(|| format!("Failed to fetch {}", url))?
        .json::<Vec<ModelDescriptor>>()
        .await
        .with_context(|| format!("Invalid model list from {}", url))?;

    Ok(models)
}
