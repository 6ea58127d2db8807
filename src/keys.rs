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
use std::collections::HashMap;

/// The set of physically held keys. Each held key remembers the note it was
/// pressed as, so a layout change mid-press doesn't change what it releases.
#[derive(Debug, Default)]
pub struct KeyState {
    held: HashMap<String, String>,
}

impl KeyState {
    /// Creates an empty key state.
    pub fn new() -> KeyState {
        KeyState::default()
    }

    /// Marks the key as held. Returns false, changing nothing, if it already was.
    pub fn press(&mut self, code: &str, note: &str) -> bool {
        if self.held.contains_key(code) {
            return false;
        }
        self.held.insert(code.to_string(), note.to_string());
        true
    }

    /// Releases the key, returning the note it was pressed as. Releasing a key
    /// that isn't held does nothing.
    pub fn release(&mut self, code: &str) -> Option<String> {
        self.held.remove(code)
    }

    /// Releases every held key, returning the released key codes.
    pub fn release_all(&mut self) -> Vec<String> {
        self.held.drain().map(|(code, _)| code).collect()
    }

    /// Returns true if the key is held.
    pub fn is_held(&self, code: &str) -> bool {
        self.held.contains_key(code)
    }

    /// Returns the note a held key was pressed as.
    pub fn note(&self, code: &str) -> Option<&str> {
        self.held.get(code).map(String::as_str)
    }

    /// Returns the number of held keys.
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// Returns true if no key is held.
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_is_idempotent() {
        let mut keys = KeyState::new();
        assert!(keys.press("KeyA", "C4"));
        assert!(!keys.press("KeyA", "C4"));
        assert_eq!(keys.len(), 1);
        assert!(keys.is_held("KeyA"));
    }

    #[test]
    fn test_release() {
        let mut keys = KeyState::new();
        assert_eq!(keys.release("KeyA"), None);

        keys.press("KeyA", "C4");
        assert_eq!(keys.release("KeyA"), Some("C4".to_string()));
        assert_eq!(keys.release("KeyA"), None);
        assert!(keys.is_empty());
    }

    #[test]
    fn test_release_all() {
        let mut keys = KeyState::new();
        keys.press("KeyA", "C4");
        keys.press("KeyS", "D4");

        let mut released = keys.release_all();
        released.sort();
        assert_eq!(released, vec!["KeyA", "KeyS"]);
        assert!(!keys.is_held("KeyA"));
        assert!(!keys.is_held("KeyS"));
        assert!(keys.is_empty());
    }

    #[test]
    fn test_note_survives_until_release() {
        let mut keys = KeyState::new();
        keys.press("KeyA", "C4");
        assert!(!keys.press("KeyA", "C5"));
        assert_eq!(keys.note("KeyA"), Some("C4"));
    }
}
