//! Action execution for one probe firing.
//!
//! The executor evaluates a probe's predicate and actions against the event
//! that fired it. Foreign data is only reached through the memory bridge.
//! A failing step aborts the rest of that probe's actions and discards the
//! lines it produced for this firing; the caller decides how to report it.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cmp::Ordering;

use crate::codec::{Value, ValueKind};
use crate::config::{ByteOrder, SessionConfig};
use crate::format::{FormatError, FormatString};
use crate::memory::{ForeignMemory, MemoryBridge, MemoryError};
use crate::probe::{Action, ArgSlot, CmpOp, Expr, Predicate, ProbeEvent, ProbeSpec};
use crate::registry::RegisteredProbe;

/// Error types for action execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// A foreign copy or decode failed.
    Memory(MemoryError),
    /// The event carries fewer arguments than the probe declared.
    MissingArgument(usize),
    /// A scalar argument was used as a pointer but the event has no process.
    NotAPointer(usize),
    /// Local referenced before being bound.
    UnboundLocal(String),
    /// A string was used where an integer is required, or vice versa.
    TypeMismatch,
    /// Format string could not be parsed.
    Format(FormatError),
}

impl core::fmt::Display for ActionError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Memory(e) => write!(f, "{}", e),
            Self::MissingArgument(idx) => write!(f, "event has no arg{}", idx),
            Self::NotAPointer(idx) => write!(f, "arg{} is not a foreign pointer", idx),
            Self::UnboundLocal(name) => write!(f, "local '{}' is not bound", name),
            Self::TypeMismatch => write!(f, "operand type mismatch"),
            Self::Format(e) => write!(f, "{}", e),
        }
    }
}

impl core::error::Error for ActionError {}

impl From<MemoryError> for ActionError {
    fn from(e: MemoryError) -> Self {
        Self::Memory(e)
    }
}

impl From<FormatError> for ActionError {
    fn from(e: FormatError) -> Self {
        Self::Format(e)
    }
}

/// Output of one successful firing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Firing {
    /// Lines in action order.
    pub lines: Vec<String>,
    /// Exit code requested by an `Exit` action.
    pub exit: Option<i32>,
}

/// Runs action lists.
#[derive(Debug, Clone, Copy)]
pub struct ActionExecutor {
    bridge: MemoryBridge,
    order: ByteOrder,
}

impl ActionExecutor {
    /// Create an executor using `bridge` and the target byte order.
    pub fn new(bridge: MemoryBridge, order: ByteOrder) -> Self {
        Self { bridge, order }
    }

    /// Build an executor from a session configuration.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(MemoryBridge::new(config.copy_ceiling), config.byte_order)
    }

    pub fn bridge(&self) -> &MemoryBridge {
        &self.bridge
    }

    /// Run `spec` for `event` if its predicate allows it.
    ///
    /// Returns `Ok(None)` when the predicate rejects the event.
    pub fn fire(&self, spec: &ProbeSpec, event: &ProbeEvent) -> Result<Option<Firing>, ActionError> {
        self.fire_with(spec, None, event)
    }

    /// Like [`ActionExecutor::fire`], reusing the formats parsed at registration.
    pub fn fire_registered(
        &self,
        probe: &RegisteredProbe,
        event: &ProbeEvent,
    ) -> Result<Option<Firing>, ActionError> {
        self.fire_with(probe.spec(), Some(probe.formats()), event)
    }

    fn fire_with(
        &self,
        spec: &ProbeSpec,
        formats: Option<&[FormatString]>,
        event: &ProbeEvent,
    ) -> Result<Option<Firing>, ActionError> {
        if let Some(predicate) = spec.predicate() {
            if !self.test(predicate, event)? {
                return Ok(None);
            }
        }
        self.run_with(spec.actions(), formats, event).map(Some)
    }

    /// Evaluate a predicate.
    pub fn test(&self, predicate: &Predicate, event: &ProbeEvent) -> Result<bool, ActionError> {
        match predicate {
            Predicate::Custom(f) => Ok(f(event)),
            Predicate::Compare { lhs, op, rhs } => {
                let locals = BTreeMap::new();
                let lhs = self.eval(lhs, event, &locals)?;
                let rhs = self.eval(rhs, event, &locals)?;
                let ord = compare(&lhs, &rhs).ok_or(ActionError::TypeMismatch)?;
                Ok(match op {
                    CmpOp::Eq => ord == Ordering::Equal,
                    CmpOp::Ne => ord != Ordering::Equal,
                    CmpOp::Lt => ord == Ordering::Less,
                    CmpOp::Le => ord != Ordering::Greater,
                    CmpOp::Gt => ord == Ordering::Greater,
                    CmpOp::Ge => ord != Ordering::Less,
                })
            }
        }
    }

    /// Run `actions` in order against `event`, parsing formats as they come.
    pub fn run(&self, actions: &[Action], event: &ProbeEvent) -> Result<Firing, ActionError> {
        self.run_with(actions, None, event)
    }

    /// `formats` holds one parsed format per `Print`, in action order.
    fn run_with(
        &self,
        actions: &[Action],
        formats: Option<&[FormatString]>,
        event: &ProbeEvent,
    ) -> Result<Firing, ActionError> {
        let mut firing = Firing::default();
        let mut locals: BTreeMap<String, Value> = BTreeMap::new();
        let mut prints = 0;

        for action in actions {
            match action {
                Action::Print { format, args } => {
                    let parsed;
                    let format = match formats.and_then(|f| f.get(prints)) {
                        Some(prepared) => prepared,
                        None => {
                            parsed = FormatString::parse(format)?;
                            &parsed
                        }
                    };
                    prints += 1;

                    let values = args
                        .iter()
                        .map(|arg| self.eval(arg, event, &locals))
                        .collect::<Result<Vec<_>, _>>()?;
                    firing.lines.push(format.render(&values)?);
                }
                Action::CopyForeignBytes {
                    source,
                    length,
                    kind,
                    bind,
                } => {
                    let value = self.copy(*source, length, *kind, event, &locals)?;
                    locals.insert(bind.clone(), value);
                }
                Action::Exit(code) => {
                    if firing.exit.is_none() {
                        firing.exit = Some(*code);
                    }
                }
            }
        }

        Ok(firing)
    }

    fn eval(
        &self,
        expr: &Expr,
        event: &ProbeEvent,
        locals: &BTreeMap<String, Value>,
    ) -> Result<Value, ActionError> {
        match expr {
            Expr::Arg(idx) => event
                .args
                .get(*idx)
                .map(|slot| Value::UInt(slot.as_u64()))
                .ok_or(ActionError::MissingArgument(*idx)),
            Expr::Local(name) => locals
                .get(name)
                .cloned()
                .ok_or_else(|| ActionError::UnboundLocal(name.to_string())),
            Expr::Const(v) => Ok(Value::UInt(*v)),
            Expr::Str(s) => Ok(Value::Str(s.as_bytes().to_vec())),
            Expr::Copy {
                source,
                length,
                kind,
            } => self.copy(*source, length, *kind, event, locals),
            Expr::Timestamp => Ok(Value::UInt(event.timestamp_ns)),
            Expr::ProbeName => Ok(Value::Str(event.id.as_bytes().to_vec())),
        }
    }

    fn copy(
        &self,
        source: usize,
        length: &Expr,
        kind: ValueKind,
        event: &ProbeEvent,
        locals: &BTreeMap<String, Value>,
    ) -> Result<Value, ActionError> {
        let len = self
            .eval(length, event, locals)?
            .as_u64()
            .ok_or(ActionError::TypeMismatch)?;
        // Lengths beyond the address width are rejected by the ceiling check.
        let len = usize::try_from(len).unwrap_or(usize::MAX);

        let (addr, process): (u64, &dyn ForeignMemory) = match event.args.get(source) {
            Some(ArgSlot::Foreign { addr, process }) => (*addr, &**process),
            Some(ArgSlot::Scalar(addr)) => match event.process.as_ref() {
                Some(process) => (*addr, &**process),
                None => return Err(ActionError::NotAPointer(source)),
            },
            None => return Err(ActionError::MissingArgument(source)),
        };

        Ok(self.bridge.copy_value(process, addr, len, kind, self.order)?)
    }
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Str(_), _) | (_, Value::Str(_)) => None,
        (a, b) => Some(as_i128(a).cmp(&as_i128(b))),
    }
}

fn as_i128(v: &Value) -> i128 {
    match v {
        Value::Int(v) => *v as i128,
        Value::UInt(v) => *v as i128,
        Value::Str(_) => 0,
    }
}
