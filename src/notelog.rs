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

//! The log of played notes.
//!
//! The log is a sequence of tokens: rendered notes, spaces and newlines. It is
//! persisted as a JSON array of strings under [`LOG_KEY`] and restored verbatim.

use std::{error::Error, fmt, ops::RangeInclusive, str::FromStr};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::storage::{Storage, StorageError};

/// The storage key the log is persisted under.
pub const LOG_KEY: &str = "typiano.log";

const SPACE: &str = " ";
const NEWLINE: &str = "\n";

/// Octaves numbered notation is written for. Notes outside are logged verbatim.
const OCTAVES: RangeInclusive<i32> = -1..=10;

/// How notes are written to the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Numbered notation: scale degrees 1-7 with `#` for sharps, `'` per octave
    /// above the fourth and `,` per octave below.
    #[default]
    Digit,
    /// The note identifier itself.
    Symbolic,
}

impl OutputMode {
    /// Renders a note identifier. Identifiers that don't parse as a pitch are
    /// written as they are.
    pub fn render(&self, note: &str) -> String {
        match self {
            OutputMode::Digit => numbered(note).unwrap_or_else(|| note.to_string()),
            OutputMode::Symbolic => note.to_string(),
        }
    }
}

impl FromStr for OutputMode {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "digit" => Ok(OutputMode::Digit),
            "symbolic" => Ok(OutputMode::Symbolic),
            _ => Err(format!("unknown output mode {}", s).into()),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Digit => write!(f, "digit"),
            OutputMode::Symbolic => write!(f, "symbolic"),
        }
    }
}

/// Renders a note identifier such as `C4`, `F#5` or `Bb3` in numbered notation.
fn numbered(note: &str) -> Option<String> {
    let mut chars = note.chars();
    let mut semitone: i32 = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let rest = chars.as_str();
    let rest = if let Some(rest) = rest.strip_prefix('#') {
        semitone += 1;
        rest
    } else if let Some(rest) = rest.strip_prefix('b') {
        semitone -= 1;
        rest
    } else {
        rest
    };
    let octave = rest
        .parse::<i32>()
        .ok()?
        .checked_add(semitone.div_euclid(12))
        .filter(|octave| OCTAVES.contains(octave))?;
    let (degree, sharp) = match semitone.rem_euclid(12) {
        0 => (1, false),
        1 => (1, true),
        2 => (2, false),
        3 => (2, true),
        4 => (3, false),
        5 => (4, false),
        6 => (4, true),
        7 => (5, false),
        8 => (5, true),
        9 => (6, false),
        10 => (6, true),
        _ => (7, false),
    };

    let shift = octave - 4;
    let marks = if shift >= 0 {
        "'".repeat(shift as usize)
    } else {
        ",".repeat(shift.unsigned_abs() as usize)
    };
    Some(format!("{}{}{}", if sharp { "#" } else { "" }, degree, marks))
}

/// The sequence of logged tokens.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteLog {
    tokens: Vec<String>,
}

impl NoteLog {
    /// Creates an empty log.
    pub fn new() -> NoteLog {
        NoteLog::default()
    }

    /// Restores the log persisted in storage. A missing or unreadable log starts
    /// empty.
    pub fn restore(storage: &dyn Storage) -> NoteLog {
        let blob = match storage.get(LOG_KEY) {
            Ok(Some(blob)) => blob,
            Ok(None) => return NoteLog::new(),
            Err(e) => {
                warn!(error = %e, "Unable to read the note log, starting empty");
                return NoteLog::new();
            }
        };
        match serde_json::from_str::<Vec<String>>(&blob) {
            Ok(tokens) => {
                debug!(tokens = tokens.len(), "Restored note log");
                NoteLog { tokens }
            }
            Err(e) => {
                warn!(error = %e, "Stored note log is malformed, starting empty");
                NoteLog::new()
            }
        }
    }

    /// Appends a note rendered in the given mode, returning the rendered token.
    pub fn push_note(&mut self, note: &str, mode: OutputMode) -> &str {
        self.tokens.push(mode.render(note));
        self.tokens.last().map(String::as_str).unwrap_or_default()
    }

    /// Appends a space.
    pub fn push_space(&mut self) {
        self.tokens.push(SPACE.to_string());
    }

    /// Appends a newline.
    pub fn push_newline(&mut self) {
        self.tokens.push(NEWLINE.to_string());
    }

    /// Removes the last token.
    pub fn backspace(&mut self) -> Option<String> {
        self.tokens.pop()
    }

    /// Removes every token.
    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    /// Returns the tokens.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Returns the number of tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Returns the log as a single text blob.
    pub fn export(&self) -> String {
        self.tokens.concat()
    }

    /// Returns the persisted form of the log.
    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.tokens)
    }

    /// Writes the log to storage.
    pub fn persist(&self, storage: &mut dyn Storage) -> Result<(), StorageError> {
        let value = self.serialize().map_err(|source| StorageError::Encode {
            key: LOG_KEY.to_string(),
            source,
        })?;
        storage.set(LOG_KEY, &value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_numbered_notation() {
        let mode = OutputMode::Digit;
        assert_eq!(mode.render("C4"), "1");
        assert_eq!(mode.render("B4"), "7");
        assert_eq!(mode.render("F#4"), "#4");
        assert_eq!(mode.render("Db4"), "#1");
        assert_eq!(mode.render("C5"), "1'");
        assert_eq!(mode.render("G6"), "5''");
        assert_eq!(mode.render("A3"), "6,");
        assert_eq!(mode.render("Cb4"), "7,");
        assert_eq!(mode.render("B#3"), "1");
        assert_eq!(mode.render("c4"), "1");
    }

    #[test]
    fn test_unparseable_notes_render_verbatim() {
        assert_eq!(OutputMode::Digit.render("kick"), "kick");
        assert_eq!(OutputMode::Digit.render("C"), "C");
        assert_eq!(OutputMode::Digit.render(""), "");
    }

    #[test]
    fn test_out_of_range_octaves_render_verbatim() {
        assert_eq!(OutputMode::Digit.render("B#2147483647"), "B#2147483647");
        assert_eq!(OutputMode::Digit.render("Cb-2147483648"), "Cb-2147483648");
        assert_eq!(OutputMode::Digit.render("C99"), "C99");
        assert_eq!(OutputMode::Digit.render("C10"), "1");
        assert_eq!(OutputMode::Digit.render("C-1"), "1,,,,,");
    }

    #[test]
    fn test_symbolic() {
        assert_eq!(OutputMode::Symbolic.render("F#5"), "F#5");
    }

    #[test]
    fn test_output_mode_from_str() {
        assert_eq!("digit".parse::<OutputMode>().unwrap(), OutputMode::Digit);
        assert_eq!(" Symbolic ".parse::<OutputMode>().unwrap(), OutputMode::Symbolic);
        assert!("roman".parse::<OutputMode>().is_err());
    }

    #[test]
    fn test_log_editing() {
        let mut log = NoteLog::new();
        assert_eq!(log.push_note("C4", OutputMode::Digit), "1");
        log.push_note("E4", OutputMode::Digit);
        log.push_space();
        log.push_note("G4", OutputMode::Symbolic);
        log.push_newline();
        assert_eq!(log.export(), "13 G4\n");

        assert_eq!(log.backspace().as_deref(), Some("\n"));
        assert_eq!(log.len(), 4);
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_persist_and_restore() {
        let mut storage = MemoryStorage::new();
        assert!(NoteLog::restore(&storage).is_empty());

        let mut log = NoteLog::new();
        log.push_note("C4", OutputMode::Digit);
        log.push_space();
        log.push_note("D4", OutputMode::Digit);
        assert_eq!(log.serialize().unwrap(), r#"["1"," ","2"]"#);
        log.persist(&mut storage).unwrap();
        assert_eq!(
            storage.get(LOG_KEY).unwrap().as_deref(),
            Some(r#"["1"," ","2"]"#)
        );

        assert_eq!(NoteLog::restore(&storage), log);
    }

    #[test]
    fn test_restore_malformed() {
        let mut storage = MemoryStorage::new();
        storage.set(LOG_KEY, "{not an array").unwrap();
        assert!(NoteLog::restore(&storage).is_empty());
    }
}
