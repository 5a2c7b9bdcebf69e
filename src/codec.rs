//! Typed decoding of bytes copied out of foreign memory.
//!
//! Integers are decoded in the session byte order. Strings are kept as raw
//! bytes and only escaped when rendered, since their content is uncontrolled.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use crate::config::ByteOrder;
use crate::memory::MemoryError;

/// What a run of bytes should be decoded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    /// Bytes up to (not including) the first NUL.
    NulTerminatedString,
}

impl ValueKind {
    /// Width in bytes for integer kinds, `None` for strings.
    pub fn width(self) -> Option<usize> {
        match self {
            Self::I8 | Self::U8 => Some(1),
            Self::I16 | Self::U16 => Some(2),
            Self::I32 | Self::U32 => Some(4),
            Self::I64 | Self::U64 => Some(8),
            Self::NulTerminatedString => None,
        }
    }

    fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }
}

/// A decoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    UInt(u64),
    /// String bytes without the terminator.
    Str(Vec<u8>),
}

impl Value {
    /// Integer view of the value, if it has one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Int(v) => Some(*v as u64),
            Self::UInt(v) => Some(*v),
            Self::Str(_) => None,
        }
    }

    /// Render with non-printable string bytes escaped.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "{}", self);
        out
    }
}

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::UInt(v) => write!(f, "{}", v),
            Self::Str(bytes) => write_escaped(f, bytes),
        }
    }
}

/// Write bytes with everything outside printable ASCII escaped.
pub fn write_escaped<W: Write>(out: &mut W, bytes: &[u8]) -> core::fmt::Result {
    for &b in bytes {
        match b {
            b'\n' => out.write_str("\\n")?,
            b'\t' => out.write_str("\\t")?,
            b'\r' => out.write_str("\\r")?,
            b'\\' => out.write_str("\\\\")?,
            b'"' => out.write_str("\\\"")?,
            0 => out.write_str("\\0")?,
            0x20..=0x7e => out.write_char(b as char)?,
            _ => write!(out, "\\x{:02x}", b)?,
        }
    }
    Ok(())
}

/// Decode `buffer` as `kind`.
///
/// `order` must already be resolved or `Native`; it is resolved here.
pub fn decode(buffer: &[u8], kind: ValueKind, order: ByteOrder) -> Result<Value, MemoryError> {
    let Some(width) = kind.width() else {
        return decode_str(buffer);
    };

    if buffer.len() < width {
        return Err(MemoryError::Truncated {
            needed: width,
            available: buffer.len(),
        });
    }

    let mut raw = [0u8; 8];
    let bytes = &buffer[..width];
    let value = match order.resolve() {
        ByteOrder::Big => {
            raw[8 - width..].copy_from_slice(bytes);
            u64::from_be_bytes(raw)
        }
        _ => {
            raw[..width].copy_from_slice(bytes);
            u64::from_le_bytes(raw)
        }
    };

    if kind.is_signed() {
        let shift = 64 - (width as u32) * 8;
        Ok(Value::Int(((value << shift) as i64) >> shift))
    } else {
        Ok(Value::UInt(value))
    }
}

fn decode_str(buffer: &[u8]) -> Result<Value, MemoryError> {
    match buffer.iter().position(|&b| b == 0) {
        Some(end) => Ok(Value::Str(buffer[..end].to_vec())),
        None => Err(MemoryError::Unterminated { len: buffer.len() }),
    }
}
