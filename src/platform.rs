//! Platform abstraction layer for the trace clock.
//!
//! Probe events carry a monotonic firing timestamp. The instrumentation source
//! normally supplies it; when it does not, the timestamp comes from here.

use core::sync::atomic::{AtomicU64, Ordering};

/// Platform operations trait.
///
/// Abstracts over the host clock to enable mock testing.
pub trait PlatformOps {
    /// Get current monotonic time in nanoseconds.
    fn time_ns() -> u64;
}

// =============================================================================
// Real Implementation (hosted environment)
// =============================================================================

/// Host platform operations backed by `std::time::Instant`.
#[cfg(all(not(test), feature = "std"))]
pub struct StdPlatform;

#[cfg(all(not(test), feature = "std"))]
impl PlatformOps for StdPlatform {
    fn time_ns() -> u64 {
        use std::sync::OnceLock;
        use std::time::Instant;

        static EPOCH: OnceLock<Instant> = OnceLock::new();
        let epoch = EPOCH.get_or_init(Instant::now);
        epoch.elapsed().as_nanos() as u64
    }
}

// =============================================================================
// Mock Implementation (test environment or bare no_std)
// =============================================================================

/// Mock time value for testing.
static MOCK_TIME_NS: AtomicU64 = AtomicU64::new(1_000_000_000); // 1 second

/// Mock platform operations for testing.
#[cfg(any(test, not(feature = "std")))]
pub struct MockPlatform;

#[cfg(any(test, not(feature = "std")))]
impl PlatformOps for MockPlatform {
    fn time_ns() -> u64 {
        MOCK_TIME_NS.load(Ordering::Relaxed)
    }
}

/// Set mock time for testing.
pub fn set_mock_time(ns: u64) {
    MOCK_TIME_NS.store(ns, Ordering::Relaxed);
}

/// Advance mock time by given nanoseconds.
pub fn advance_mock_time(ns: u64) {
    MOCK_TIME_NS.fetch_add(ns, Ordering::Relaxed);
}

// =============================================================================
// Platform Type Alias
// =============================================================================

/// The active platform implementation.
///
/// Hosted builds: StdPlatform (monotonic `Instant`)
/// Test builds or without `std`: MockPlatform (uses an atomic counter)
#[cfg(all(not(test), feature = "std"))]
pub type Platform = StdPlatform;

#[cfg(any(test, not(feature = "std")))]
pub type Platform = MockPlatform;

/// Get current time in nanoseconds.
#[inline]
pub fn time_ns() -> u64 {
    Platform::time_ns()
}
