//! Integration tests for the foreign memory bridge.
//!
//! Tests ceiling enforcement, bounds checking, detached targets and
//! all-or-nothing copies.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axerrno::AxResult;
use axsonde::{
    ByteOrder, ForeignMemory, LocalProcess, MemoryBridge, MemoryError, Value, ValueKind,
};

/// Target whose mapping claims to be readable but faults halfway through.
struct FlakyTarget {
    reads: AtomicUsize,
    /// Fault with `BadAddress` instead of `BadState`.
    bad_address: bool,
}

impl FlakyTarget {
    fn new(bad_address: bool) -> Self {
        Self {
            reads: AtomicUsize::new(0),
            bad_address,
        }
    }
}

impl ForeignMemory for FlakyTarget {
    fn pid(&self) -> u32 {
        99
    }

    fn is_attached(&self) -> bool {
        true
    }

    fn is_readable(&self, _addr: u64, _len: usize) -> bool {
        true
    }

    fn read_exact(&self, _addr: u64, buf: &mut [u8]) -> AxResult<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let half = buf.len() / 2;
        buf[..half].fill(0xaa);
        if self.bad_address {
            axerrno::ax_err!(BadAddress, "page fault")
        } else {
            axerrno::ax_err!(BadState, "target stopped responding")
        }
    }
}

// =============================================================================
// Copy Tests
// =============================================================================

#[test]
fn test_copy_whole_range() {
    let target = LocalProcess::new(1);
    let addr = target.map(b"hello\0".to_vec());
    let bridge = MemoryBridge::default();

    assert_eq!(bridge.copy(&target, addr, 6).unwrap(), b"hello\0");
    assert_eq!(bridge.copy(&target, addr + 1, 2).unwrap(), b"el");
    assert_eq!(bridge.copy(&target, addr, 0).unwrap(), b"");
}

#[test]
fn test_copy_past_mapping_is_out_of_bounds() {
    let target = LocalProcess::new(1);
    let addr = target.map(b"abc".to_vec());
    let bridge = MemoryBridge::default();

    assert_eq!(
        bridge.copy(&target, addr, 4),
        Err(MemoryError::OutOfBounds { addr, len: 4 })
    );
    assert_eq!(
        bridge.copy(&target, 0x10, 1),
        Err(MemoryError::OutOfBounds { addr: 0x10, len: 1 })
    );
}

#[test]
fn test_address_overflow_is_out_of_bounds() {
    let target = LocalProcess::new(1);
    let bridge = MemoryBridge::default();
    assert_eq!(
        bridge.copy(&target, u64::MAX, 2),
        Err(MemoryError::OutOfBounds {
            addr: u64::MAX,
            len: 2
        })
    );
}

#[test]
fn test_ceiling_checked_before_anything_else() {
    let target = LocalProcess::new(1);
    target.detach();
    let bridge = MemoryBridge::new(8);

    assert_eq!(bridge.ceiling(), 8);
    assert_eq!(
        bridge.copy(&target, 0, 9),
        Err(MemoryError::TooLarge {
            requested: 9,
            ceiling: 8
        })
    );
}

#[test]
fn test_detached_target() {
    let target = LocalProcess::new(42);
    let addr = target.map(b"abc".to_vec());
    target.detach();

    let bridge = MemoryBridge::default();
    assert_eq!(
        bridge.copy(&target, addr, 3),
        Err(MemoryError::Detached { pid: 42 })
    );
}

#[test]
fn test_unmapped_after_map_is_out_of_bounds() {
    let target = LocalProcess::new(1);
    let addr = target.map(b"abc".to_vec());
    assert!(target.unmap(addr));
    assert!(!target.unmap(addr));

    let bridge = MemoryBridge::default();
    assert!(matches!(
        bridge.copy(&target, addr, 1),
        Err(MemoryError::OutOfBounds { .. })
    ));
}

#[test]
fn test_partial_read_returns_nothing() {
    let target = FlakyTarget::new(true);
    let bridge = MemoryBridge::default();

    let result = bridge.copy(&target, 0x1000, 16);
    assert_eq!(
        result,
        Err(MemoryError::OutOfBounds {
            addr: 0x1000,
            len: 16
        })
    );
    assert_eq!(target.reads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unresponsive_target_maps_to_detached() {
    let target = FlakyTarget::new(false);
    let bridge = MemoryBridge::default();
    assert_eq!(
        bridge.copy(&target, 0x1000, 4),
        Err(MemoryError::Detached { pid: 99 })
    );
}

// =============================================================================
// Typed Copy Tests
// =============================================================================

#[test]
fn test_copy_str() {
    let target = LocalProcess::new(1);
    let addr = target.map(b"alice\0".to_vec());
    let bridge = MemoryBridge::default();

    assert_eq!(
        bridge.copy_str(&target, addr, 6).unwrap(),
        Value::Str(b"alice".to_vec())
    );
    assert_eq!(
        bridge.copy_str(&target, addr, 3),
        Err(MemoryError::Unterminated { len: 3 })
    );
}

#[test]
fn test_copy_value_integer() {
    let target = LocalProcess::new(1);
    let addr = target.map(vec![0x01, 0x02, 0x03, 0x04]);
    let bridge = MemoryBridge::default();

    assert_eq!(
        bridge
            .copy_value(&target, addr, 4, ValueKind::U32, ByteOrder::Little)
            .unwrap(),
        Value::UInt(0x0403_0201)
    );
    assert_eq!(
        bridge
            .copy_value(&target, addr, 4, ValueKind::U32, ByteOrder::Big)
            .unwrap(),
        Value::UInt(0x0102_0304)
    );
    assert_eq!(
        bridge.copy_value(&target, addr, 2, ValueKind::U32, ByteOrder::Little),
        Err(MemoryError::Truncated {
            needed: 4,
            available: 2
        })
    );
}

#[test]
fn test_shared_handle_across_threads() {
    let target = Arc::new(LocalProcess::new(5));
    let addr = target.map(b"shared\0".to_vec());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let target = Arc::clone(&target);
            std::thread::spawn(move || MemoryBridge::default().copy_str(&*target, addr, 7))
        })
        .collect();

    for h in handles {
        assert_eq!(h.join().unwrap().unwrap(), Value::Str(b"shared".to_vec()));
    }
}
