use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::Url;
use tokio::{runtime::Handle, task::JoinHandle};

use crate::{
    asset::{AssetError, LoadedAsset},
    listing::MODELS_ROUTE,
    viewer::SessionId,
};

/// Upper bound for the buffer reserved from a Content-Length header; larger
/// bodies grow as chunks arrive.
const MAX_PREALLOCATION: u64 = 16 << 20;

/// Where the bytes of a model come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetLocation {
    Remote(Url),
    Local(PathBuf),
}

impl AssetLocation {
    /// Resolves a viewer URL. Root relative URLs such as `/models/duck.glb` go to
    /// the listing server when one is configured, otherwise to `models_dir`.
    pub fn resolve(
        url: &str,
        server_url: Option<&str>,
        models_dir: &Path,
    ) -> Result<Self, AssetError> {
        let invalid = |message: String| AssetError::InvalidUrl {
            url: url.to_string(),
            message,
        };

        if url.starts_with("http://") || url.starts_with("https://") {
            return Url::parse(url)
                .map(AssetLocation::Remote)
                .map_err(|e| invalid(e.to_string()));
        }

        if url.starts_with('/') {
            if let Some(server_url) = server_url {
                let base = Url::parse(server_url)
                    .map_err(|e| invalid(format!("bad server URL {}: {}", server_url, e)))?;
                return base
                    .join(url)
                    .map(AssetLocation::Remote)
                    .map_err(|e| invalid(e.to_string()));
            }

            let models_prefix = format!("{}/", MODELS_ROUTE);
            if let Some(file_name) = url.strip_prefix(&models_prefix) {
                return Ok(AssetLocation::Local(models_dir.join(file_name)));
            }
        }

        Ok(AssetLocation::Local(PathBuf::from(url)))
    }

    /// File name without extension, used to name the spawned asset.
    pub fn display_name(&self) -> String {
        let file_name = match self {
            AssetLocation::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .unwrap_or_default()
                .to_string(),
            AssetLocation::Local(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        match file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => file_name,
        }
    }
}

impl std::fmt::Display for AssetLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetLocation::Remote(url) => write!(f, "{}", url),
            AssetLocation::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug)]
pub enum LoadEventKind {
    /// Advisory only. `total` is unknown when the server sends no length.
    Progress { loaded: u64, total: Option<u64> },
    Loaded(Box<LoadedAsset>),
    Failed(String),
}

#[derive(Debug)]
pub struct LoadEvent {
    pub session: SessionId,
    pub kind: LoadEventKind,
}

impl LoadEvent {
    pub fn percent(loaded: u64, total: Option<u64>) -> Option<f64> {
        total
            .filter(|&total| total > 0)
            .map(|total| loaded as f64 / total as f64 * 100.0)
    }
}

/// An in flight load. Aborting it guarantees no further events are sent for it.
pub struct LoadTask(JoinHandle<()>);

impl LoadTask {
    pub fn abort(&self) {
        self.0.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

/// Fetches and parses models on a tokio runtime, reporting through a sink that
/// is called from the loading task.
pub struct AssetLoader {
    runtime: Handle,
    client: reqwest::Client,
}

impl AssetLoader {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            client: reqwest::Client::new(),
        }
    }

    pub fn load<F>(&self, session: SessionId, location: AssetLocation, mut sink: F) -> LoadTask
    where
        F: FnMut(LoadEvent) + Send + 'static,
    {
        let client = self.client.clone();

        let handle = self.runtime.spawn(async move {
            log::debug!("Loading {} for session {:?}", location, session);

            let mut progress = |loaded, total| {
                sink(LoadEvent {
                    session,
                    kind: LoadEventKind::Progress { loaded, total },
                })
            };

            let kind = match load_asset(&client, &location, &mut progress).await {
                Ok(asset) => LoadEventKind::Loaded(Box::new(asset)),
                Err(e) => LoadEventKind::Failed(e.to_string()),
            };

            sink(LoadEvent { session, kind });
        });

        LoadTask(handle)
    }
}

async fn load_asset(
    client: &reqwest::Client,
    location: &AssetLocation,
    progress: &mut impl FnMut(u64, Option<u64>),
) -> Result<LoadedAsset, AssetError> {
    let bytes = match location {
        AssetLocation::Remote(url) => fetch_remote(client, url, progress).await?,
        AssetLocation::Local(path) => {
            let bytes = tokio::fs::read(path).await.map_err(|source| AssetError::Read {
                path: path.display().to_string(),
                source,
            })?;
            progress(bytes.len() as u64, Some(bytes.len() as u64));
            bytes
        }
    };

    let name = location.display_name();

    tokio::task::spawn_blocking(move || LoadedAsset::from_slice(name, &bytes))
        .await
        .map_err(|e| AssetError::Task(e.to_string()))?
}

async fn fetch_remote(
    client: &reqwest::Client,
    url: &Url,
    progress: &mut impl FnMut(u64, Option<u64>),
) -> Result<Vec<u8>, AssetError> {
    let fetch_error = |source| AssetError::Fetch {
        url: url.to_string(),
        source,
    };

    let response = client
        .get(url.clone())
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(fetch_error)?;

    let total = response.content_length();
    let mut bytes = Vec::with_capacity(total.unwrap_or(0).min(MAX_PREALLOCATION) as usize);
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        bytes.extend_from_slice(&chunk.map_err(fetch_error)?);
        progress(bytes.len() as u64, total);
    }

    Ok(bytes)
}
