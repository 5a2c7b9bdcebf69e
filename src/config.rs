//! Session configuration.
//!
//! Recognized once, at session construction. Options can also be applied from
//! textual `key=value` pairs the way tracer front ends pass `-x` options.

use alloc::string::{String, ToString};

/// Default per-copy ceiling in bytes.
pub const DEFAULT_COPY_CEILING: usize = 4096;

/// Target byte order used to decode integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    Little,
    Big,
    /// Same order as the tracer.
    #[default]
    Native,
}

impl ByteOrder {
    /// Resolve `Native` to the concrete order of the tracer.
    pub fn resolve(self) -> Self {
        match self {
            Self::Native if cfg!(target_endian = "big") => Self::Big,
            Self::Native => Self::Little,
            other => other,
        }
    }
}

/// How trailing wildcards in match patterns behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchStrictness {
    /// Every pattern segment matches exactly one event segment.
    Exact,
    /// A trailing wildcard absorbs any remaining event segments.
    #[default]
    WildcardTrailing,
}

/// Error types for configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Option name not recognized.
    UnknownOption(String),
    /// Option value could not be parsed.
    InvalidValue { option: String, value: String },
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnknownOption(name) => write!(f, "Unknown option: {}", name),
            Self::InvalidValue { option, value } => {
                write!(f, "Invalid value for {}: {}", option, value)
            }
        }
    }
}

impl core::error::Error for ConfigError {}

/// Configuration of a trace session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Byte order of the traced target.
    pub byte_order: ByteOrder,
    /// Maximum number of bytes a single foreign copy may request.
    pub copy_ceiling: usize,
    /// Pattern matching mode.
    pub match_strictness: MatchStrictness,
    /// Log every firing in addition to writing to the sink.
    pub verbose: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::Native,
            copy_ceiling: DEFAULT_COPY_CEILING,
            match_strictness: MatchStrictness::WildcardTrailing,
            verbose: false,
        }
    }
}

impl SessionConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target byte order.
    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// Set the per-copy ceiling.
    pub fn with_copy_ceiling(mut self, copy_ceiling: usize) -> Self {
        self.copy_ceiling = copy_ceiling;
        self
    }

    /// Set the matching mode.
    pub fn with_match_strictness(mut self, strictness: MatchStrictness) -> Self {
        self.match_strictness = strictness;
        self
    }

    /// Enable or disable verbose firing logs.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Apply one textual option.
    ///
    /// Recognized keys: `byteorder`, `copyceiling`, `matchstrictness`, `verbose`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            option: key.to_string(),
            value: value.to_string(),
        };

        match key.trim() {
            "byteorder" => {
                self.byte_order = match value.trim() {
                    "little" | "le" => ByteOrder::Little,
                    "big" | "be" => ByteOrder::Big,
                    "native" => ByteOrder::Native,
                    _ => return Err(invalid()),
                }
            }
            "copyceiling" => {
                self.copy_ceiling = parse_size(value.trim()).ok_or_else(invalid)?;
            }
            "matchstrictness" => {
                self.match_strictness = match value.trim() {
                    "exact" => MatchStrictness::Exact,
                    "wildcard-trailing" => MatchStrictness::WildcardTrailing,
                    _ => return Err(invalid()),
                }
            }
            "verbose" => {
                self.verbose = match value.trim() {
                    "true" | "1" | "on" => true,
                    "false" | "0" | "off" => false,
                    _ => return Err(invalid()),
                }
            }
            other => return Err(ConfigError::UnknownOption(other.to_string())),
        }

        log::debug!("session option {}={}", key, value);
        Ok(())
    }

    /// Apply a `key=value` option string.
    pub fn apply(&mut self, option: &str) -> Result<(), ConfigError> {
        match option.split_once('=') {
            Some((key, value)) => self.set(key, value),
            None => Err(ConfigError::InvalidValue {
                option: option.to_string(),
                value: String::new(),
            }),
        }
    }
}

/// Parse a size with an optional `k`/`m` suffix.
fn parse_size(value: &str) -> Option<usize> {
    let (digits, scale) = match value.as_bytes().last()? {
        b'k' | b'K' => (&value[..value.len() - 1], 1024),
        b'm' | b'M' => (&value[..value.len() - 1], 1024 * 1024),
        _ => (value, 1),
    };
    digits.parse::<usize>().ok()?.checked_mul(scale)
}
