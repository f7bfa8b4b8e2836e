//! Slash-separated resource locations (e.g. `jobflows/f1/plan.json`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Location {
    segments: Vec<String>,
}

impl Location {
    pub const SEPARATOR: char = '/';

    /// Parses a path; empty segments are dropped. At least one segment is required.
    pub fn of(path: &str) -> Result<Self> {
        Self::of_with(path, Self::SEPARATOR)
    }

    pub fn of_with(path: &str, separator: char) -> Result<Self> {
        let segments: Vec<String> = path
            .split(separator)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() {
            return Err(Error::InvalidArgument(format!("empty location: {path:?}")));
        }
        Ok(Self { segments })
    }

    /// A single-segment location.
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    pub fn name(&self) -> &str {
        // never empty by construction
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn parent(&self) -> Option<Location> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Location {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn append(&self, name: impl Into<String>) -> Location {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        Location { segments }
    }

    pub fn append_location(&self, suffix: &Location) -> Location {
        let mut segments = self.segments.clone();
        segments.extend(suffix.segments.iter().cloned());
        Location { segments }
    }

    pub fn is_prefix_of(&self, other: &Location) -> bool {
        other.segments.starts_with(&self.segments)
    }

    pub fn to_path(&self) -> String {
        self.to_path_with(Self::SEPARATOR)
    }

    pub fn to_path_with(&self, separator: char) -> String {
        self.segments.join(&separator.to_string())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_path())
    }
}

impl TryFrom<String> for Location {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Location::of(&value)
    }
}

impl From<Location> for String {
    fn from(value: Location) -> Self {
        value.to_path()
    }
}
