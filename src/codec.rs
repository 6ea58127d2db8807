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

//! Lenient radix-64 text decoding for embedded note samples.
//!
//! Characters outside the alphabet are stripped, trailing padding is trimmed and
//! the remaining symbols are decoded in groups of four. Malformed input is never
//! rejected: it decodes to whatever bytes the surviving symbols describe. The
//! 3rd and 4th symbols of a group are checked for padding independently, so an
//! interior `=` drops only the byte it would have completed. Use [`validate`]
//! where a strict check is wanted.

use base64::{engine::general_purpose::STANDARD, DecodeError, Engine};

/// The padding symbol.
const PAD: u8 = b'=';

/// Length of the data-URI header (`data:audio/mp3;base64,`) that prefixes every
/// manifest entry.
pub const DATA_URI_HEADER_LEN: usize = 22;

/// Maps an alphabet symbol to its 6-bit value.
fn sextet(symbol: u8) -> Option<u8> {
    match symbol {
        b'A'..=b'Z' => Some(symbol - b'A'),
        b'a'..=b'z' => Some(symbol - b'a' + 26),
        b'0'..=b'9' => Some(symbol - b'0' + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

/// Strips the fixed-length data-URI header from a manifest entry. Entries shorter
/// than the header (or whose header ends inside a multi-byte character) yield an
/// empty payload.
pub fn strip_header(entry: &str) -> &str {
    entry.get(DATA_URI_HEADER_LEN..).unwrap_or("")
}

/// Decodes radix-64 text into bytes.
pub fn decode(text: &str) -> Vec<u8> {
    // Keep only alphabet and padding symbols; `None` marks padding.
    let mut symbols: Vec<Option<u8>> = text
        .bytes()
        .filter_map(|b| match b {
            PAD => Some(None),
            _ => sextet(b).map(Some),
        })
        .collect();

    while symbols.last() == Some(&None) {
        symbols.pop();
    }

    let mut output = Vec::with_capacity(symbols.len() / 4 * 3 + 3);
    for group in symbols.chunks(4) {
        let e1 = group[0].unwrap_or(0);
        let e2 = group.get(1).copied().flatten().unwrap_or(0);
        let e3 = group.get(2).copied().flatten();
        let e4 = group.get(3).copied().flatten();

        output.push((e1 << 2) | (e2 >> 4));
        if let Some(e3) = e3 {
            output.push(((e2 & 0x0f) << 4) | (e3 >> 2));
        }
        if let Some(e4) = e4 {
            output.push(((e3.unwrap_or(0) & 0x03) << 6) | e4);
        }
    }

    output
}

/// Decodes radix-64 text, completing no earlier than the next scheduling turn.
///
/// The decode itself runs on the calling task once it is resumed; nothing is
/// moved to another thread.
pub async fn decode_async(text: impl AsRef<str>) -> Vec<u8> {
    tokio::task::yield_now().await;
    decode(text.as_ref())
}

/// Reasons a payload fails strict validation.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum MalformedInput {
    #[error("invalid symbol {symbol:?} at offset {offset}")]
    InvalidSymbol { symbol: char, offset: usize },

    #[error("length {0} is not a valid encoded length")]
    Length(usize),

    #[error("padding is missing or not canonical")]
    Padding,

    #[error("last symbol {symbol:?} at offset {offset} has nonzero trailing bits")]
    LastSymbol { symbol: char, offset: usize },
}

impl From<DecodeError> for MalformedInput {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::InvalidByte(offset, byte) => MalformedInput::InvalidSymbol {
                symbol: byte as char,
                offset,
            },
            DecodeError::InvalidLength(len) => MalformedInput::Length(len),
            DecodeError::InvalidLastSymbol(offset, byte) => MalformedInput::LastSymbol {
                symbol: byte as char,
                offset,
            },
            DecodeError::InvalidPadding => MalformedInput::Padding,
        }
    }
}

/// Strictly checks a payload against canonical padded radix-64. [`decode`]
/// accepts everything this rejects, so this is only used for reporting.
pub fn validate(text: &str) -> Result<(), MalformedInput> {
    STANDARD.decode(text)?;
    Ok(())
}
