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

//! Keyboard layouts and the key code to note mapping derived from them.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::info;

use crate::assets::{AssetSource, FetchError};

/// Errors loading a layout asset.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("Failed to fetch layout: {0}")]
    Fetch(#[from] FetchError),

    #[error("Layout {path} is malformed: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A layout asset: rows of `[keyCode, note]` pairs, in keyboard order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Layout {
    rows: Vec<Vec<(String, String)>>,
}

impl Layout {
    /// Returns the asset path of the named layout.
    pub fn path(layouts_dir: &str, name: &str) -> String {
        format!("{}/{}.json", layouts_dir.trim_end_matches('/'), name)
    }

    /// Parses a layout asset.
    pub fn parse(path: &str, bytes: &[u8]) -> Result<Layout, LayoutError> {
        serde_json::from_slice(bytes).map_err(|source| LayoutError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Fetches and parses a layout asset.
    pub async fn fetch(assets: &dyn AssetSource, path: &str) -> Result<Layout, LayoutError> {
        let bytes = assets.fetch(path).await?;
        let layout = Layout::parse(path, &bytes)?;
        info!(
            path,
            rows = layout.rows.len(),
            keys = layout.rows.iter().map(Vec::len).sum::<usize>(),
            "Layout loaded"
        );
        Ok(layout)
    }

    /// Returns the rows of the layout.
    pub fn rows(&self) -> &[Vec<(String, String)>] {
        &self.rows
    }
}

/// Maps key codes to notes. A new layout replaces the mapping wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteMapping {
    notes: HashMap<String, String>,
}

impl NoteMapping {
    /// Returns the note mapped to a key code.
    pub fn get(&self, code: &str) -> Option<&str> {
        self.notes.get(code).map(String::as_str)
    }

    /// Returns the number of mapped keys.
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    /// Returns true if no keys are mapped.
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

impl From<&Layout> for NoteMapping {
    /// Later entries for the same key code win.
    fn from(layout: &Layout) -> NoteMapping {
        NoteMapping {
            notes: layout.rows.iter().flatten().cloned().collect(),
        }
    }
}

impl<const N: usize> From<[(&str, &str); N]> for NoteMapping {
    fn from(pairs: [(&str, &str); N]) -> NoteMapping {
        NoteMapping {
            notes: pairs
                .into_iter()
                .map(|(code, note)| (code.to_string(), note.to_string()))
                .collect(),
        }
    }
}
