//! Cursor: position token into one stream key's entries.
//!
//! Wire form is a string so clients can echo back whatever they last saw:
//! `"0"` is the start, `"$"` the current tail, `"end"` a drained bounded
//! resource, anything else a decimal entry position.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CursorParseError;

pub const START_TOKEN: &str = "0";
pub const LATEST_TOKEN: &str = "$";
pub const ENDED_TOKEN: &str = "end";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cursor {
    /// Before the first entry.
    #[default]
    Start,
    /// Only entries appended after the read is issued.
    Latest,
    /// Bounded resource closed and fully read. Terminal.
    Ended,
    /// Position of a delivered entry (positions start at 1).
    At(u64),
}

impl Cursor {
    /// Empty or missing cursors mean "from the beginning".
    pub fn parse_or_start(raw: Option<&str>) -> Result<Self, CursorParseError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Cursor::Start),
            Some(s) => s.parse(),
        }
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, Cursor::Ended)
    }

    /// Concrete position, with `Start` mapped to 0. `Latest` and `Ended`
    /// have no position until resolved against a log.
    pub fn position(&self) -> Option<u64> {
        match self {
            Cursor::Start => Some(0),
            Cursor::At(pos) => Some(*pos),
            Cursor::Latest | Cursor::Ended => None,
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::Start => f.write_str(START_TOKEN),
            Cursor::Latest => f.write_str(LATEST_TOKEN),
            Cursor::Ended => f.write_str(ENDED_TOKEN),
            Cursor::At(pos) => write!(f, "{}", pos),
        }
    }
}

impl FromStr for Cursor {
    type Err = CursorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            START_TOKEN => Ok(Cursor::Start),
            LATEST_TOKEN => Ok(Cursor::Latest),
            ENDED_TOKEN => Ok(Cursor::Ended),
            other => other
                .parse::<u64>()
                .map(|pos| if pos == 0 { Cursor::Start } else { Cursor::At(pos) })
                .map_err(|_| CursorParseError(other.to_string())),
        }
    }
}

impl Serialize for Cursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
