//! Foreign-memory handle over the tracer's own address space.
//!
//! Buffers handed to [`LocalProcess::map`] are owned by the handle and
//! addressed by their real location in the tracer, so a probe argument can
//! carry a genuine pointer value. Reads only ever succeed inside a mapped
//! buffer; `unmap` and `detach` simulate a target that drops a mapping or
//! exits mid-trace.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use axerrno::AxResult;
use spin::Mutex;

use super::ForeignMemory;

/// A traceable view of buffers living in the tracer itself.
pub struct LocalProcess {
    pid: u32,
    attached: AtomicBool,
    /// Mapped buffers keyed by start address.
    regions: Mutex<BTreeMap<u64, Box<[u8]>>>,
}

impl LocalProcess {
    /// Create an attached, empty address space.
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            attached: AtomicBool::new(true),
            regions: Mutex::new(BTreeMap::new()),
        }
    }

    /// Take ownership of `bytes` and return the address they live at.
    ///
    /// Empty buffers are not mapped; their address is never readable.
    pub fn map(&self, bytes: impl Into<Vec<u8>>) -> u64 {
        let region = bytes.into().into_boxed_slice();
        let addr = region.as_ptr() as u64;
        if region.is_empty() {
            return addr;
        }

        log::debug!(
            "pid {}: mapped {} bytes at {:#x}",
            self.pid,
            region.len(),
            addr
        );
        self.regions.lock().insert(addr, region);
        addr
    }

    /// Drop the buffer mapped at `addr`.
    pub fn unmap(&self, addr: u64) -> bool {
        self.regions.lock().remove(&addr).is_some()
    }

    /// Mark the process as exited. All later reads fail.
    pub fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
        log::debug!("pid {}: detached", self.pid);
    }

    /// Number of mapped buffers.
    pub fn region_count(&self) -> usize {
        self.regions.lock().len()
    }
}

/// Locate `[addr, addr + len)` inside one region: (start, offset).
fn locate(regions: &BTreeMap<u64, Box<[u8]>>, addr: u64, len: usize) -> Option<(u64, usize)> {
    let (&start, region) = regions.range(..=addr).next_back()?;
    let offset = (addr - start) as usize;
    let end = offset.checked_add(len)?;
    (end <= region.len()).then_some((start, offset))
}

impl ForeignMemory for LocalProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    fn is_readable(&self, addr: u64, len: usize) -> bool {
        locate(&self.regions.lock(), addr, len).is_some()
    }

    fn read_exact(&self, addr: u64, buf: &mut [u8]) -> AxResult<()> {
        if !self.is_attached() {
            return axerrno::ax_err!(BadState, "process exited");
        }

        let regions = self.regions.lock();
        let Some((start, offset)) = locate(&regions, addr, buf.len()) else {
            return axerrno::ax_err!(BadAddress, "range not mapped");
        };
        let region = &regions[&start];
        buf.copy_from_slice(&region[offset..offset + buf.len()]);
        Ok(())
    }
}
