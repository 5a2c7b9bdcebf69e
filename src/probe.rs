//! Probe definitions and probe events.
//!
//! A [`ProbeSpec`] is what a script front end hands to the core at load time;
//! a [`ProbeEvent`] is what the instrumentation source produces every time a
//! probe point is hit.

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::codec::ValueKind;
use crate::memory::ProcessHandle;
use crate::platform;

// =============================================================================
// Expressions
// =============================================================================

/// Value-producing expression evaluated against an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Argument slot `argN`.
    Arg(usize),
    /// Local bound by an earlier `CopyForeignBytes`.
    Local(String),
    /// Integer constant.
    Const(u64),
    /// String constant.
    Str(String),
    /// Copy `length` bytes at `source` and decode them as `kind`.
    Copy {
        source: usize,
        length: Box<Expr>,
        kind: ValueKind,
    },
    /// Firing timestamp in nanoseconds.
    Timestamp,
    /// Fully qualified event identifier.
    ProbeName,
}

impl Expr {
    /// `copy(argN, length)` decoded as a NUL-terminated string.
    pub fn copy_str(source: usize, length: Expr) -> Self {
        Self::Copy {
            source,
            length: Box::new(length),
            kind: ValueKind::NulTerminatedString,
        }
    }

    /// Shorthand for [`Expr::Local`].
    pub fn local(name: &str) -> Self {
        Self::Local(name.to_string())
    }

    /// Argument slots referenced by this expression.
    pub(crate) fn visit_args(&self, f: &mut impl FnMut(usize)) {
        match self {
            Self::Arg(idx) => f(*idx),
            Self::Copy { source, length, .. } => {
                f(*source);
                length.visit_args(f);
            }
            _ => {}
        }
    }

    /// Locals referenced by this expression.
    pub(crate) fn visit_locals<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            Self::Local(name) => f(name),
            Self::Copy { length, .. } => length.visit_locals(f),
            _ => {}
        }
    }
}

// =============================================================================
// Actions and Predicates
// =============================================================================

/// One step of a probe's action program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Format one output line.
    Print { format: String, args: Vec<Expr> },
    /// Copy foreign bytes, decode them and bind the result to `bind`.
    CopyForeignBytes {
        source: usize,
        length: Expr,
        kind: ValueKind,
        bind: String,
    },
    /// Ask the session to stop with `code`.
    Exit(i32),
}

impl Action {
    /// Build a `Print` action.
    pub fn print(format: &str, args: Vec<Expr>) -> Self {
        Self::Print {
            format: format.to_string(),
            args,
        }
    }

    /// Build a string `CopyForeignBytes` action.
    pub fn copy_str(source: usize, length: Expr, bind: &str) -> Self {
        Self::CopyForeignBytes {
            source,
            length,
            kind: ValueKind::NulTerminatedString,
            bind: bind.to_string(),
        }
    }
}

/// Comparison operator for [`Predicate::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Caller-supplied predicate over the raw event.
pub type PredicateFn = Arc<dyn Fn(&ProbeEvent) -> bool + Send + Sync>;

/// Guard deciding whether a matched probe fires.
#[derive(Clone)]
pub enum Predicate {
    /// Compare two expressions.
    Compare { lhs: Expr, op: CmpOp, rhs: Expr },
    /// Opaque boolean supplied by an external predicate evaluator.
    Custom(PredicateFn),
}

impl Predicate {
    /// Build a comparison predicate.
    pub fn compare(lhs: Expr, op: CmpOp, rhs: Expr) -> Self {
        Self::Compare { lhs, op, rhs }
    }

    /// Wrap an external predicate.
    pub fn custom(f: impl Fn(&ProbeEvent) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }
}

impl core::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Compare { lhs, op, rhs } => f
                .debug_struct("Compare")
                .field("lhs", lhs)
                .field("op", op)
                .field("rhs", rhs)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

// =============================================================================
// Probe Specs
// =============================================================================

/// Where a probe attaches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeTarget {
    /// Fires once before any event.
    Begin,
    /// Fires once after the last event.
    End,
    /// Fires for events matching the pattern text.
    Pattern(String),
}

impl core::fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Begin => f.write_str("BEGIN"),
            Self::End => f.write_str("END"),
            Self::Pattern(p) => f.write_str(p),
        }
    }
}

/// A probe clause: target, optional predicate, actions.
#[derive(Debug, Clone)]
pub struct ProbeSpec {
    target: ProbeTarget,
    predicate: Option<Predicate>,
    arity: usize,
    actions: Vec<Action>,
}

impl ProbeSpec {
    fn new(target: ProbeTarget) -> Self {
        Self {
            target,
            predicate: None,
            arity: 0,
            actions: Vec::new(),
        }
    }

    /// The BEGIN lifecycle probe.
    pub fn begin() -> Self {
        Self::new(ProbeTarget::Begin)
    }

    /// The END lifecycle probe.
    pub fn end() -> Self {
        Self::new(ProbeTarget::End)
    }

    /// A probe matching `pattern`.
    pub fn matching(pattern: &str) -> Self {
        Self::new(ProbeTarget::Pattern(pattern.to_string()))
    }

    /// Declare how many argument slots matching events carry.
    pub fn with_args(mut self, arity: usize) -> Self {
        self.arity = arity;
        self
    }

    /// Guard the probe with a predicate.
    pub fn when(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Append an action.
    pub fn then(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Replace the action list.
    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    pub fn target(&self) -> &ProbeTarget {
        &self.target
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }
}

// =============================================================================
// Probe Events
// =============================================================================

/// One argument slot of a firing.
#[derive(Debug, Clone)]
pub enum ArgSlot {
    /// Raw register-sized value.
    Scalar(u64),
    /// Address inside a target's memory.
    Foreign { addr: u64, process: ProcessHandle },
}

impl ArgSlot {
    /// Scalar view; foreign slots yield their address.
    pub fn as_u64(&self) -> u64 {
        match self {
            Self::Scalar(v) => *v,
            Self::Foreign { addr, .. } => *addr,
        }
    }
}

/// A probe firing delivered by the instrumentation source.
#[derive(Debug, Clone)]
pub struct ProbeEvent {
    /// Fully qualified probe name, e.g. `hello1234:app:main:you`.
    pub id: String,
    /// Argument slots in declaration order.
    pub args: Vec<ArgSlot>,
    /// Process the probe fired in, used for scalar pointer arguments.
    pub process: Option<ProcessHandle>,
    /// Monotonic firing timestamp in nanoseconds.
    pub timestamp_ns: u64,
}

impl ProbeEvent {
    /// Create an event stamped with the platform clock.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            args: Vec::new(),
            process: None,
            timestamp_ns: platform::time_ns(),
        }
    }

    /// Append a scalar argument.
    pub fn with_scalar(mut self, value: u64) -> Self {
        self.args.push(ArgSlot::Scalar(value));
        self
    }

    /// Append a foreign pointer argument.
    pub fn with_pointer(mut self, addr: u64, process: ProcessHandle) -> Self {
        self.args.push(ArgSlot::Foreign { addr, process });
        self
    }

    /// Set the owning process.
    pub fn in_process(mut self, process: ProcessHandle) -> Self {
        self.process = Some(process);
        self
    }

    /// Override the timestamp.
    pub fn at(mut self, timestamp_ns: u64) -> Self {
        self.timestamp_ns = timestamp_ns;
        self
    }
}
