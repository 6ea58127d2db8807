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
use crate::assets::FetchError;
use crate::audio::DecodeError;

/// Why the sample bank failed to load. Every variant names the asset that failed.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to fetch {0}")]
    Fetch(#[from] FetchError),

    #[error("Manifest {path} is not a note-to-sample map: {source}")]
    Manifest {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode sample for note {note}: {source}")]
    Decode {
        note: String,
        #[source]
        source: DecodeError,
    },
}
