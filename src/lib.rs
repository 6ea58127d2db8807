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

//! A sampled piano played from the computer keyboard.
//!
//! Samples ship as a manifest of data-URI encoded audio. The first user gesture
//! opens the audio context and decodes the whole manifest; after that every
//! mapped key press starts a voice and appends the note to a persisted log.

pub mod assets;
pub mod audio;
pub mod codec;
pub mod config;
pub mod controller;
pub mod instrument;
pub mod keys;
pub mod layout;
pub mod notelog;
pub mod samples;
pub mod storage;
pub mod verify;
