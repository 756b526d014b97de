use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::validate::NucError;

/// A hierarchical command namespace, e.g. `nil/db/data/read`.
///
/// Commands form a tree: a token whose command is a prefix of another covers
/// it. Delegation may only narrow (append segments), never widen.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Command {
    segments: Vec<String>,
}

impl Command {
    /// Build from raw segments. Empty segments are rejected.
    ///
    /// # Errors
    /// Fails when any segment is empty.
    pub fn new<I, S>(segments: I) -> Result<Self, NucError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.iter().any(String::is_empty) {
            return Err(NucError::MalformedCommand(segments.join("/")));
        }
        Ok(Self { segments })
    }

    /// The root command covering the entire namespace.
    #[must_use]
    pub fn root() -> Self {
        Self { segments: vec![] }
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether `self` covers `other`: every segment of `self` matches the
    /// corresponding leading segment of `other`.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Command) -> bool {
        other.segments.len() >= self.segments.len()
            && self.segments.iter().zip(&other.segments).all(|(a, b)| a == b)
    }
}

impl FromStr for Command {
    type Err = NucError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix('/').unwrap_or(s);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        Self::new(trimmed.split('/'))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({self})")
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(s: &str) -> Command {
        s.parse().unwrap()
    }

    #[test]
    fn parses_with_and_without_leading_slash() {
        assert_eq!(cmd("/nil/db/data/read"), cmd("nil/db/data/read"));
        assert_eq!(cmd("/nil/db/data/read").to_string(), "/nil/db/data/read");
    }

    #[test]
    fn prefix_relation() {
        assert!(cmd("nil/db").is_prefix_of(&cmd("nil/db/data/read")));
        assert!(cmd("nil/db/data/read").is_prefix_of(&cmd("nil/db/data/read")));
        assert!(Command::root().is_prefix_of(&cmd("nil/db")));
        assert!(!cmd("nil/db/queries").is_prefix_of(&cmd("nil/db/data/read")));
        assert!(!cmd("nil/db/data/read").is_prefix_of(&cmd("nil/db/data")));
    }

    #[test]
    fn rejects_empty_segments() {
        assert!("nil//db".parse::<Command>().is_err());
    }
}
