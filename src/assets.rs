// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Retrieval of static assets (sample manifests, layouts) by path.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
};

use futures_util::{future::BoxFuture, FutureExt};
use tracing::debug;

/// A failed asset retrieval.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{path}: status {status}")]
    Status { path: String, status: u16 },

    #[error("{path}: {source}")]
    Transport {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    /// The path of the asset that failed.
    pub fn path(&self) -> &str {
        match self {
            FetchError::Status { path, .. } => path,
            FetchError::Transport { path, .. } => path,
        }
    }
}

/// Something assets can be fetched from.
pub trait AssetSource: Send + Sync {
    /// Fetches the asset at the given path.
    fn fetch(&self, path: &str) -> BoxFuture<'static, Result<Vec<u8>, FetchError>>;
}

/// Serves assets from a directory on disk.
pub struct FileAssetSource {
    root: PathBuf,
}

impl FileAssetSource {
    /// Creates a new file asset source rooted at the given directory.
    pub fn new(root: impl AsRef<Path>) -> FileAssetSource {
        FileAssetSource {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl AssetSource for FileAssetSource {
    fn fetch(&self, path: &str) -> BoxFuture<'static, Result<Vec<u8>, FetchError>> {
        let full_path = self.root.join(path.trim_start_matches('/'));
        let path = path.to_string();
        async move {
            debug!(path = ?full_path, "Fetching asset");
            tokio::fs::read(&full_path).await.map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => FetchError::Status { path, status: 404 },
                io::ErrorKind::PermissionDenied => FetchError::Status { path, status: 403 },
                _ => FetchError::Transport { path, source: e },
            })
        }
        .boxed()
    }
}

/// Serves assets from memory. Unknown paths are not found.
#[derive(Default)]
pub struct MemoryAssetSource {
    assets: HashMap<String, Vec<u8>>,
}

impl MemoryAssetSource {
    /// Creates an empty memory asset source.
    pub fn new() -> MemoryAssetSource {
        MemoryAssetSource::default()
    }

    /// Adds an asset.
    pub fn with(mut self, path: &str, contents: impl Into<Vec<u8>>) -> MemoryAssetSource {
        self.assets.insert(path.to_string(), contents.into());
        self
    }
}

impl AssetSource for MemoryAssetSource {
    fn fetch(&self, path: &str) -> BoxFuture<'static, Result<Vec<u8>, FetchError>> {
        let result = self
            .assets
            .get(path)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                path: path.to_string(),
                status: 404,
            });
        async move { result }.boxed()
    }
}
