//! Probe match patterns.
//!
//! A pattern is a `:`-separated list of segments, e.g. `hello*:::you` or
//! `mod:*`. Each segment is parsed once into a tagged [`Segment`] so matching
//! never interprets glob text at event time.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::config::MatchStrictness;

/// Segment separator for patterns and event identifiers.
pub const SEPARATOR: char = ':';

/// One segment of a match pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the event segment.
    Literal(String),
    /// Matches any event segment starting with the prefix (`foo*`).
    Prefix(String),
    /// Matches any single event segment (`*` or empty).
    Wildcard,
    /// Last segment wildcard; may absorb the rest of the event identifier.
    TrailingWildcard,
}

impl Segment {
    fn matches(&self, event_segment: &str) -> bool {
        match self {
            Self::Literal(lit) => lit == event_segment,
            Self::Prefix(prefix) => event_segment.starts_with(prefix.as_str()),
            Self::Wildcard | Self::TrailingWildcard => true,
        }
    }

    /// Literal text usable as an index key.
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(lit) => Some(lit),
            _ => None,
        }
    }
}

/// Error types for pattern parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// Pattern text is empty.
    Empty,
    /// A `*` appears somewhere other than the end of a segment.
    MisplacedWildcard { segment: usize },
}

impl core::fmt::Display for PatternError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty probe pattern"),
            Self::MisplacedWildcard { segment } => {
                write!(f, "Wildcard must end segment {}", segment)
            }
        }
    }
}

impl core::error::Error for PatternError {}

/// A parsed probe match pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    text: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parse a pattern such as `provider:module:function:name`.
    pub fn parse(text: &str) -> Result<Self, PatternError> {
        if text.is_empty() {
            return Err(PatternError::Empty);
        }

        let raw: Vec<&str> = text.split(SEPARATOR).collect();
        let last = raw.len() - 1;
        let mut segments = Vec::with_capacity(raw.len());

        for (idx, part) in raw.iter().enumerate() {
            let segment = match *part {
                "" | "*" if idx == last => Segment::TrailingWildcard,
                "" | "*" => Segment::Wildcard,
                part => match part.find('*') {
                    None => Segment::Literal(part.to_string()),
                    Some(pos) if pos == part.len() - 1 => {
                        Segment::Prefix(part[..pos].to_string())
                    }
                    Some(_) => return Err(PatternError::MisplacedWildcard { segment: idx }),
                },
            };
            segments.push(segment);
        }

        Ok(Self {
            text: text.to_string(),
            segments,
        })
    }

    /// Pattern text as written.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Parsed segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Literal first segment, if any.
    pub fn index_key(&self) -> Option<&str> {
        self.segments.first().and_then(Segment::as_literal)
    }

    /// Check an event identifier against this pattern.
    pub fn matches(&self, event_id: &str, strictness: MatchStrictness) -> bool {
        let mut event = event_id.split(SEPARATOR);

        for segment in &self.segments {
            let Some(event_segment) = event.next() else {
                return false;
            };
            if !segment.matches(event_segment) {
                return false;
            }
            if *segment == Segment::TrailingWildcard
                && strictness == MatchStrictness::WildcardTrailing
            {
                return true;
            }
        }

        event.next().is_none()
    }
}

impl core::fmt::Display for Pattern {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.text)
    }
}

impl core::str::FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
