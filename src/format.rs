//! printf-style format strings for `Print` actions.
//!
//! Formats are parsed at load time so that a conversion/argument count
//! mismatch is caught before the session starts.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use crate::codec::Value;

/// One conversion directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// `%s`
    Str,
    /// `%d` / `%i`
    Signed,
    /// `%u`
    Unsigned,
    /// `%x` / `%X`
    Hex { upper: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Conv(Conversion),
}

/// Error types for format parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Unsupported conversion character.
    UnknownConversion(char),
    /// `%` at the end of the format.
    Dangling,
    /// A string given to an integer conversion.
    NotAnInteger { position: usize },
}

impl core::fmt::Display for FormatError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnknownConversion(c) => write!(f, "Unknown conversion %{}", c),
            Self::Dangling => write!(f, "Format ends with a bare %"),
            Self::NotAnInteger { position } => {
                write!(f, "Argument {} is a string, integer conversion expected", position)
            }
        }
    }
}

impl core::error::Error for FormatError {}

/// A parsed format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatString {
    pieces: Vec<Piece>,
}

impl FormatString {
    /// Parse `text`. Length modifiers (`h`, `l`, `ll`, `z`) are accepted and ignored.
    pub fn parse(text: &str) -> Result<Self, FormatError> {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut chars = text.chars();

        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }

            let mut spec = chars.next().ok_or(FormatError::Dangling)?;
            while matches!(spec, 'h' | 'l' | 'z') {
                spec = chars.next().ok_or(FormatError::Dangling)?;
            }

            let conv = match spec {
                '%' => {
                    literal.push('%');
                    continue;
                }
                's' => Conversion::Str,
                'd' | 'i' => Conversion::Signed,
                'u' => Conversion::Unsigned,
                'x' => Conversion::Hex { upper: false },
                'X' => Conversion::Hex { upper: true },
                other => return Err(FormatError::UnknownConversion(other)),
            };

            if !literal.is_empty() {
                pieces.push(Piece::Text(core::mem::take(&mut literal)));
            }
            pieces.push(Piece::Conv(conv));
        }

        if !literal.is_empty() {
            pieces.push(Piece::Text(literal));
        }

        Ok(Self { pieces })
    }

    /// Number of conversions, i.e. arguments the format consumes.
    pub fn conversion_count(&self) -> usize {
        self.pieces
            .iter()
            .filter(|p| matches!(p, Piece::Conv(_)))
            .count()
    }

    /// Substitute `values` positionally.
    ///
    /// Callers validate the count at load time; missing values render empty.
    /// `%s` renders any value; integer conversions reject strings.
    pub fn render(&self, values: &[Value]) -> Result<String, FormatError> {
        let mut out = String::new();
        let mut values = values.iter().enumerate();

        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Conv(conv) => {
                    if let Some((position, value)) = values.next() {
                        render_one(&mut out, *conv, value)
                            .ok_or(FormatError::NotAnInteger { position })?;
                    }
                }
            }
        }

        Ok(out)
    }
}

/// Render one value; `None` on a conversion/value type mismatch.
fn render_one(out: &mut String, conv: Conversion, value: &Value) -> Option<()> {
    let raw = match (conv, value) {
        (Conversion::Str, v) => return write!(out, "{}", v).ok(),
        (_, Value::Str(_)) => return None,
        (_, v) => v.as_u64()?,
    };

    let _ = match conv {
        Conversion::Signed => write!(out, "{}", raw as i64),
        Conversion::Unsigned => write!(out, "{}", raw),
        Conversion::Hex { upper: true } => write!(out, "{:X}", raw),
        Conversion::Hex { upper: false } => write!(out, "{:x}", raw),
        Conversion::Str => Ok(()),
    };
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_conversions() {
        let f = FormatString::parse("a=%d b=%s 100%% c=%lx").unwrap();
        assert_eq!(f.conversion_count(), 3);
    }

    #[test]
    fn renders_positionally() {
        let f = FormatString::parse("%s:%u:%X%%").unwrap();
        let line = f.render(&[
            Value::Str(b"io".to_vec()),
            Value::Int(-1),
            Value::UInt(0xbeef),
        ]);
        assert_eq!(line.unwrap(), "io:18446744073709551615:BEEF%");
    }

    #[test]
    fn integer_conversion_rejects_string() {
        let f = FormatString::parse("%s=%d").unwrap();
        let values = [Value::Str(b"n".to_vec()), Value::Str(b"7".to_vec())];
        assert_eq!(f.render(&values), Err(FormatError::NotAnInteger { position: 1 }));

        let f = FormatString::parse("%s").unwrap();
        assert_eq!(f.render(&[Value::Int(-3)]).unwrap(), "-3");
    }

    #[test]
    fn rejects_unknown_conversion() {
        assert_eq!(
            FormatString::parse("%q"),
            Err(FormatError::UnknownConversion('q'))
        );
        assert_eq!(FormatString::parse("50%"), Err(FormatError::Dangling));
    }
}
