//! Bounded reads from a traced target's memory.
//!
//! Probe arguments that point into the target are never dereferenced
//! directly. They are resolved through a [`ForeignMemory`] handle, and every
//! copy goes through [`MemoryBridge`], which enforces the copy ceiling, checks
//! the requested range against what the handle reports as readable, and
//! returns either the complete range or an error.

pub mod local;

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use axerrno::{AxError, AxResult};

use crate::codec::{self, Value, ValueKind};
use crate::config::ByteOrder;

pub use local::LocalProcess;

/// Shared handle to a target's address space.
pub type ProcessHandle = Arc<dyn ForeignMemory>;

/// Read-only view of a traced target's address space.
///
/// Implementations must bound every read in time: a target that stops
/// responding fails the read instead of blocking the caller.
pub trait ForeignMemory: Send + Sync {
    /// Process identifier of the target.
    fn pid(&self) -> u32;

    /// Whether the target can still be read.
    fn is_attached(&self) -> bool;

    /// Whether `[addr, addr + len)` is mapped and readable.
    fn is_readable(&self, addr: u64, len: usize) -> bool;

    /// Fill `buf` from `addr`. Partial reads must be reported as errors.
    fn read_exact(&self, addr: u64, buf: &mut [u8]) -> AxResult<()>;
}

impl core::fmt::Debug for dyn ForeignMemory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ForeignMemory")
            .field("pid", &self.pid())
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Error types for foreign memory access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The requested range is not mapped or not readable.
    OutOfBounds { addr: u64, len: usize },
    /// The requested length exceeds the copy ceiling.
    TooLarge { requested: usize, ceiling: usize },
    /// The target is gone or stopped responding.
    Detached { pid: u32 },
    /// No NUL byte within the copied range.
    Unterminated { len: usize },
    /// Fewer bytes than the decoded type needs.
    Truncated { needed: usize, available: usize },
}

impl core::fmt::Display for MemoryError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfBounds { addr, len } => {
                write!(f, "invalid address ({:#x}, {} bytes)", addr, len)
            }
            Self::TooLarge { requested, ceiling } => write!(
                f,
                "copy of {} bytes exceeds ceiling of {} bytes",
                requested, ceiling
            ),
            Self::Detached { pid } => write!(f, "process {} is no longer attached", pid),
            Self::Unterminated { len } => {
                write!(f, "string not terminated within {} bytes", len)
            }
            Self::Truncated { needed, available } => {
                write!(f, "need {} bytes, only {} available", needed, available)
            }
        }
    }
}

impl core::error::Error for MemoryError {}

/// Bounded copier from foreign memory into tracer-owned buffers.
#[derive(Debug, Clone, Copy)]
pub struct MemoryBridge {
    ceiling: usize,
}

impl MemoryBridge {
    /// Create a bridge that refuses copies larger than `ceiling` bytes.
    pub fn new(ceiling: usize) -> Self {
        Self { ceiling }
    }

    /// Maximum bytes per copy.
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Copy `len` bytes at `addr` out of `process`.
    ///
    /// Either the whole range is returned or nothing is.
    pub fn copy(
        &self,
        process: &dyn ForeignMemory,
        addr: u64,
        len: usize,
    ) -> Result<Vec<u8>, MemoryError> {
        if len > self.ceiling {
            return Err(MemoryError::TooLarge {
                requested: len,
                ceiling: self.ceiling,
            });
        }

        let pid = process.pid();
        if !process.is_attached() {
            return Err(MemoryError::Detached { pid });
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        let in_range = addr.checked_add(len as u64).is_some();
        if !in_range || !process.is_readable(addr, len) {
            return Err(MemoryError::OutOfBounds { addr, len });
        }

        let mut buf = vec![0u8; len];
        if let Err(e) = process.read_exact(addr, &mut buf) {
            log::debug!(
                "read of {} bytes at {:#x} from pid {} failed: {:?}",
                len,
                addr,
                pid,
                e
            );
            return Err(match e {
                AxError::BadAddress | AxError::NotFound => MemoryError::OutOfBounds { addr, len },
                _ => MemoryError::Detached { pid },
            });
        }

        Ok(buf)
    }

    /// Copy `len` bytes at `addr` and decode them as `kind`.
    pub fn copy_value(
        &self,
        process: &dyn ForeignMemory,
        addr: u64,
        len: usize,
        kind: ValueKind,
        order: ByteOrder,
    ) -> Result<Value, MemoryError> {
        let buf = self.copy(process, addr, len)?;
        codec::decode(&buf, kind, order)
    }

    /// Copy a NUL-terminated string of at most `len` bytes (terminator included).
    pub fn copy_str(
        &self,
        process: &dyn ForeignMemory,
        addr: u64,
        len: usize,
    ) -> Result<Value, MemoryError> {
        self.copy_value(
            process,
            addr,
            len,
            ValueKind::NulTerminatedString,
            ByteOrder::Native,
        )
    }
}

impl Default for MemoryBridge {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_COPY_CEILING)
    }
}
