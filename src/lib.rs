//! axsonde: a dynamic tracing core.
//!
//! This crate holds the probe registry, the event matcher, the action
//! executor and the bounded bridge into traced processes' memory. Script
//! front ends hand it validated probe programs; instrumentation sources feed
//! it probe events; output goes to a caller-supplied sink.
//!
//! # Features
//!
//! - `std` - host clock for event timestamps (default)
//! - `provider` - USDT provider definition parser (default)
//!
//! # Quick Start
//!
//! ```ignore
//! use axsonde::{Action, Expr, ProbeEvent, ProbeRegistry, ProbeSpec};
//! use axsonde::{SessionConfig, TraceSession, VecSink};
//!
//! let specs = vec![
//!     ProbeSpec::begin().then(Action::print("Hello World", vec![])),
//!     // you(char *name, int size)
//!     ProbeSpec::matching("hello*:::you")
//!         .with_args(2)
//!         .then(Action::print("Hello %s", vec![Expr::copy_str(0, Expr::Arg(1))])),
//!     ProbeSpec::end().then(Action::print("Goodbye World", vec![])),
//! ];
//!
//! let registry = ProbeRegistry::load(specs, Default::default())?;
//! let sink = VecSink::new();
//! let mut session = TraceSession::new(SessionConfig::default(), registry, sink.clone());
//!
//! session.run(&events)?;
//! for line in sink.lines() {
//!     println!("{}", line);
//! }
//! ```

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

#[macro_use]
extern crate log;

// =============================================================================
// Platform Abstraction (for testing support)
// =============================================================================

pub mod platform;

// =============================================================================
// Configuration
// =============================================================================

pub mod config;

// =============================================================================
// Probe Model
// =============================================================================

pub mod pattern;

pub mod probe;

pub mod registry;

// =============================================================================
// Foreign Memory
// =============================================================================

pub mod codec;

pub mod memory;

// =============================================================================
// Execution
// =============================================================================

pub mod format;

pub mod executor;

pub mod output;

pub mod session;

// =============================================================================
// Providers
// =============================================================================

#[cfg(feature = "provider")]
pub mod provider;

#[cfg(feature = "provider")]
pub mod examples;

// Re-export key types for convenience
pub use codec::{Value, ValueKind};
pub use config::{ByteOrder, ConfigError, MatchStrictness, SessionConfig};
pub use executor::{ActionError, ActionExecutor, Firing};
pub use memory::{ForeignMemory, LocalProcess, MemoryBridge, MemoryError, ProcessHandle};
pub use output::{LogSink, OutputSink, VecSink};
pub use pattern::{Pattern, PatternError};
pub use probe::{Action, ArgSlot, CmpOp, Expr, Predicate, ProbeEvent, ProbeSpec, ProbeTarget};
pub use registry::{ProbeId, ProbeRegistry, ValidationError, ValidationErrorKind, ValidationErrors};
pub use session::{Error, LifecyclePhase, SessionState, SessionStats, StopSignal, TraceSession};
