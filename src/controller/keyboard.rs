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
use std::io;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;

const DOWN: &str = "down";
const UP: &str = "up";
const REPEAT: &str = "repeat";
const START: &str = "start";
const HIDE: &str = "hide";
const SHOW: &str = "show";
const LAYOUT: &str = "layout";
const MODE: &str = "mode";
const SPACE: &str = "space";
const NEWLINE: &str = "newline";
const BACKSPACE: &str = "backspace";
const CLEAR: &str = "clear";

/// A driver that reads key events as line commands from the terminal.
pub struct Driver {}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Parses one command line. Key codes are case sensitive, commands aren't.
    fn parse(line: &str) -> Option<Event> {
        let mut words = line.split_whitespace();
        let command = words.next()?.to_lowercase();
        let argument = words.next();
        let flag = words.next();
        if words.next().is_some() {
            return None;
        }

        let event = match (command.as_str(), argument, flag) {
            (DOWN, Some(code), None) => Event::KeyDown {
                code: code.to_string(),
                repeat: false,
            },
            (DOWN, Some(code), Some(flag)) if flag.eq_ignore_ascii_case(REPEAT) => {
                Event::KeyDown {
                    code: code.to_string(),
                    repeat: true,
                }
            }
            (UP, Some(code), None) => Event::KeyUp {
                code: code.to_string(),
                repeat: false,
            },
            (START, None, None) => Event::Gesture,
            (HIDE, None, None) => Event::Visibility { hidden: true },
            (SHOW, None, None) => Event::Visibility { hidden: false },
            (LAYOUT, Some(name), None) => Event::Layout(name.to_string()),
            (MODE, Some(mode), None) => Event::OutputMode(mode.parse().ok()?),
            (SPACE, None, None) => Event::Space,
            (NEWLINE, None, None) => Event::Newline,
            (BACKSPACE, None, None) => Event::Backspace,
            (CLEAR, None, None) => Event::Clear,
            _ => return None,
        };
        Some(event)
    }

    /// Reads one command. Returns false once the input is exhausted.
    fn monitor_io<R, W>(events_tx: &Sender<Event>, mut reader: R, mut writer: W) -> io::Result<bool>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({} <code> [{}], {} <code>, {}, {}, {}, {} <name>, {} digit|symbolic, {}, {}, {}, {}): ",
            DOWN, REPEAT, UP, START, HIDE, SHOW, LAYOUT, MODE, SPACE, NEWLINE, BACKSPACE, CLEAR,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }
        if input.trim().is_empty() {
            return Ok(true);
        }

        match Self::parse(&input) {
            Some(event) => events_tx
                .blocking_send(event)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?,
            None => warn!(input = input.trim(), "Unrecognized input"),
        }
        Ok(true)
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}

            info!("Keyboard input closed.");
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, BufReader, BufWriter};

    use tokio::sync::mpsc;

    use super::Driver;
    use crate::{controller::Event, notelog::OutputMode};

    fn get_event(event: &str) -> Result<Option<Event>, io::Error> {
        let (sender, mut receiver) = mpsc::channel::<Event>(1);

        let reader = BufReader::new(event.as_bytes());
        let writer = BufWriter::new(Vec::new());
        assert!(Driver::monitor_io(&sender, reader, writer)?);

        // Force the sender to close.
        drop(sender);
        Ok(receiver.blocking_recv())
    }

    fn key_down(code: &str, repeat: bool) -> Event {
        Event::KeyDown {
            code: code.to_string(),
            repeat,
        }
    }

    #[test]
    fn test_keyboard_events() -> Result<(), io::Error> {
        assert_eq!(Some(key_down("KeyA", false)), get_event("down KeyA\n")?);
        assert_eq!(Some(key_down("KeyA", true)), get_event("DOWN KeyA repeat")?);
        assert_eq!(
            Some(Event::KeyUp {
                code: "Semicolon".to_string(),
                repeat: false
            }),
            get_event("up Semicolon")?
        );
        assert_eq!(Some(Event::Gesture), get_event("start")?);
        assert_eq!(
            Some(Event::Visibility { hidden: true }),
            get_event("hide")?
        );
        assert_eq!(
            Some(Event::Visibility { hidden: false }),
            get_event("show")?
        );
        assert_eq!(
            Some(Event::Layout("azerty".to_string())),
            get_event("layout azerty")?
        );
        assert_eq!(
            Some(Event::OutputMode(OutputMode::Symbolic)),
            get_event("mode symbolic")?
        );
        assert_eq!(Some(Event::Space), get_event("space")?);
        assert_eq!(Some(Event::Newline), get_event("newline")?);
        assert_eq!(Some(Event::Backspace), get_event("backspace")?);
        assert_eq!(Some(Event::Clear), get_event("clear")?);
        Ok(())
    }

    #[test]
    fn test_unrecognized_input() -> Result<(), io::Error> {
        assert_eq!(None, get_event("unrecognized")?);
        assert_eq!(None, get_event("down")?);
        assert_eq!(None, get_event("down KeyA twice")?);
        assert_eq!(None, get_event("up KeyA repeat")?);
        assert_eq!(None, get_event("mode roman")?);
        assert_eq!(None, get_event("start now")?);
        assert_eq!(None, get_event("   ")?);
        Ok(())
    }

    #[test]
    fn test_end_of_input() -> Result<(), io::Error> {
        let (sender, _receiver) = mpsc::channel::<Event>(1);
        let reader = BufReader::new("".as_bytes());
        assert!(!Driver::monitor_io(&sender, reader, io::sink())?);
        Ok(())
    }
}
