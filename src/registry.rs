//! Installed probes and event matching.
//!
//! The registry is filled at load time and read-only afterwards. Every probe
//! is validated when it is registered; a batch load reports the problems of
//! all probes at once so a malformed program can be fixed in one pass.

use alloc::collections::BTreeSet;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::config::MatchStrictness;
use crate::format::{FormatError, FormatString};
use crate::pattern::{Pattern, PatternError, SEPARATOR};
use crate::probe::{Action, Expr, Predicate, ProbeSpec, ProbeTarget};

/// Identifier assigned to a probe at registration, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProbeId(pub u32);

impl core::fmt::Display for ProbeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// What is wrong with a probe definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Pattern text could not be parsed.
    InvalidPattern(PatternError),
    /// A second BEGIN or END clause.
    DuplicateLifecycle,
    /// BEGIN or END declared with arguments; lifecycle firings carry none.
    LifecycleArguments { arity: usize },
    /// `argN` beyond the declared arity.
    ArgumentOutOfRange { index: usize, arity: usize },
    /// Local used before any action binds it.
    UnboundLocal(String),
    /// Format string could not be parsed.
    Format(FormatError),
    /// Conversion count differs from the argument count.
    FormatMismatch { conversions: usize, args: usize },
}

/// A validation problem tied to one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Probe label, e.g. `#2 hello*:::you`.
    pub probe: String,
    pub kind: ValidationErrorKind,
}

impl core::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "probe {}: ", self.probe)?;
        match &self.kind {
            ValidationErrorKind::InvalidPattern(e) => write!(f, "{}", e),
            ValidationErrorKind::DuplicateLifecycle => write!(f, "duplicate lifecycle probe"),
            ValidationErrorKind::LifecycleArguments { arity } => {
                write!(f, "lifecycle probe takes no arguments ({} declared)", arity)
            }
            ValidationErrorKind::ArgumentOutOfRange { index, arity } => {
                write!(f, "arg{} out of range (probe has {} arguments)", index, arity)
            }
            ValidationErrorKind::UnboundLocal(name) => write!(f, "local '{}' is not bound", name),
            ValidationErrorKind::Format(e) => write!(f, "{}", e),
            ValidationErrorKind::FormatMismatch { conversions, args } => write!(
                f,
                "format expects {} arguments, {} given",
                conversions, args
            ),
        }
    }
}

impl core::error::Error for ValidationError {}

/// Every problem found while loading a probe program.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }
}

impl core::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} validation error(s)", self.0.len())?;
        for e in &self.0 {
            write!(f, "\n  {}", e)?;
        }
        Ok(())
    }
}

impl core::error::Error for ValidationErrors {}

// =============================================================================
// Registered Probes
// =============================================================================

/// A validated probe owned by the registry.
#[derive(Debug, Clone)]
pub struct RegisteredProbe {
    id: ProbeId,
    pattern: Option<Pattern>,
    spec: ProbeSpec,
    /// Parsed format of each `Print` action, in action order.
    formats: Vec<FormatString>,
}

impl RegisteredProbe {
    pub fn id(&self) -> ProbeId {
        self.id
    }

    /// Parsed pattern; `None` for BEGIN/END.
    pub fn pattern(&self) -> Option<&Pattern> {
        self.pattern.as_ref()
    }

    pub fn spec(&self) -> &ProbeSpec {
        &self.spec
    }

    /// Formats parsed at registration, one per `Print` action.
    pub fn formats(&self) -> &[FormatString] {
        &self.formats
    }

    /// Human-readable label used in diagnostics.
    pub fn label(&self) -> String {
        format!("#{} {}", self.id, self.spec.target())
    }
}

/// Installed probes.
#[derive(Debug)]
pub struct ProbeRegistry {
    strictness: MatchStrictness,
    begin: Option<RegisteredProbe>,
    end: Option<RegisteredProbe>,
    /// Pattern probes in registration order.
    probes: Vec<RegisteredProbe>,
    /// First literal segment -> positions in `probes`.
    index: HashMap<String, Vec<usize>>,
    /// Positions of probes whose first segment is not a literal.
    unindexed: Vec<usize>,
    next_id: u32,
}

impl ProbeRegistry {
    /// Create an empty registry using trailing-wildcard matching.
    pub fn new() -> Self {
        Self::with_strictness(MatchStrictness::WildcardTrailing)
    }

    /// Create an empty registry with the given matching mode.
    pub fn with_strictness(strictness: MatchStrictness) -> Self {
        Self {
            strictness,
            begin: None,
            end: None,
            probes: Vec::new(),
            index: HashMap::new(),
            unindexed: Vec::new(),
            next_id: 1,
        }
    }

    /// Validate and register every spec, reporting all problems together.
    pub fn load(
        specs: impl IntoIterator<Item = ProbeSpec>,
        strictness: MatchStrictness,
    ) -> Result<Self, ValidationErrors> {
        let mut registry = Self::with_strictness(strictness);
        let mut problems = Vec::new();

        for spec in specs {
            if let Err(ValidationErrors(mut errs)) = registry.register(spec) {
                problems.append(&mut errs);
            }
        }

        if problems.is_empty() {
            log::debug!("loaded {} probes", registry.len());
            Ok(registry)
        } else {
            log::debug!("probe program rejected with {} problems", problems.len());
            Err(ValidationErrors(problems))
        }
    }

    /// Validate and add one probe.
    pub fn register(&mut self, spec: ProbeSpec) -> Result<ProbeId, ValidationErrors> {
        let id = ProbeId(self.next_id);
        let label = format!("#{} {}", id, spec.target());
        let is_lifecycle = matches!(spec.target(), ProbeTarget::Begin | ProbeTarget::End);
        let arity = if is_lifecycle { 0 } else { spec.arity() };

        let mut problems = Vec::new();
        if is_lifecycle && spec.arity() != 0 {
            problems.push(problem(
                &label,
                ValidationErrorKind::LifecycleArguments {
                    arity: spec.arity(),
                },
            ));
        }
        let formats = validate(&spec, arity, &label, &mut problems);

        let pattern = match spec.target() {
            ProbeTarget::Begin if self.begin.is_some() => {
                problems.push(problem(&label, ValidationErrorKind::DuplicateLifecycle));
                None
            }
            ProbeTarget::End if self.end.is_some() => {
                problems.push(problem(&label, ValidationErrorKind::DuplicateLifecycle));
                None
            }
            ProbeTarget::Begin | ProbeTarget::End => None,
            ProbeTarget::Pattern(text) => match Pattern::parse(text) {
                Ok(p) => Some(p),
                Err(e) => {
                    problems.push(problem(&label, ValidationErrorKind::InvalidPattern(e)));
                    None
                }
            },
        };

        // The id is consumed even on failure so labels stay unique in a batch.
        self.next_id += 1;
        if !problems.is_empty() {
            return Err(ValidationErrors(problems));
        }

        let probe = RegisteredProbe {
            id,
            pattern,
            spec,
            formats,
        };
        match probe.spec.target() {
            ProbeTarget::Begin => self.begin = Some(probe),
            ProbeTarget::End => self.end = Some(probe),
            ProbeTarget::Pattern(_) => {
                let pos = self.probes.len();
                match probe.pattern.as_ref().and_then(Pattern::index_key) {
                    Some(key) => self.index.entry(key.to_string()).or_default().push(pos),
                    None => self.unindexed.push(pos),
                }
                self.probes.push(probe);
            }
        }

        log::debug!("registered probe {}", label);
        Ok(id)
    }

    /// Matching mode used by [`ProbeRegistry::matches`].
    pub fn strictness(&self) -> MatchStrictness {
        self.strictness
    }

    pub(crate) fn set_strictness(&mut self, strictness: MatchStrictness) {
        self.strictness = strictness;
    }

    /// All non-lifecycle probes matching `event_id`, in registration order.
    pub fn matches(&self, event_id: &str) -> Vec<&RegisteredProbe> {
        let first = event_id.split(SEPARATOR).next().unwrap_or_default();
        let indexed = self.index.get(first).map(Vec::as_slice).unwrap_or(&[]);

        merge_sorted(indexed, &self.unindexed)
            .into_iter()
            .map(|pos| &self.probes[pos])
            .filter(|probe| {
                probe
                    .pattern
                    .as_ref()
                    .is_some_and(|p| p.matches(event_id, self.strictness))
            })
            .collect()
    }

    /// The BEGIN probe, if any.
    pub fn begin(&self) -> Option<&RegisteredProbe> {
        self.begin.as_ref()
    }

    /// The END probe, if any.
    pub fn end(&self) -> Option<&RegisteredProbe> {
        self.end.as_ref()
    }

    /// Pattern probes in registration order.
    pub fn probes(&self) -> &[RegisteredProbe] {
        &self.probes
    }

    /// Number of pattern probes (lifecycle probes excluded).
    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge two ascending position lists.
fn merge_sorted(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] < b[j] {
            out.push(a[i]);
            i += 1;
        } else {
            out.push(b[j]);
            j += 1;
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

// =============================================================================
// Validation
// =============================================================================

fn problem(label: &str, kind: ValidationErrorKind) -> ValidationError {
    ValidationError {
        probe: label.to_string(),
        kind,
    }
}

/// Check argument indices, locals and formats against the action list.
///
/// Returns the parsed format of every `Print`, in action order.
fn validate(
    spec: &ProbeSpec,
    arity: usize,
    label: &str,
    problems: &mut Vec<ValidationError>,
) -> Vec<FormatString> {
    let mut formats = Vec::new();
    let mut bound: BTreeSet<&str> = BTreeSet::new();

    let check_expr = |expr: &Expr, bound: &BTreeSet<&str>, problems: &mut Vec<ValidationError>| {
        expr.visit_args(&mut |index| {
            if index >= arity {
                problems.push(problem(
                    label,
                    ValidationErrorKind::ArgumentOutOfRange { index, arity },
                ));
            }
        });
        expr.visit_locals(&mut |name| {
            if !bound.contains(name) {
                problems.push(problem(
                    label,
                    ValidationErrorKind::UnboundLocal(name.to_string()),
                ));
            }
        });
    };

    if let Some(Predicate::Compare { lhs, rhs, .. }) = spec.predicate() {
        check_expr(lhs, &bound, &mut *problems);
        check_expr(rhs, &bound, &mut *problems);
    }

    for action in spec.actions() {
        match action {
            Action::Print { format, args } => {
                for arg in args {
                    check_expr(arg, &bound, &mut *problems);
                }
                match FormatString::parse(format) {
                    Ok(parsed) => {
                        if parsed.conversion_count() != args.len() {
                            problems.push(problem(
                                label,
                                ValidationErrorKind::FormatMismatch {
                                    conversions: parsed.conversion_count(),
                                    args: args.len(),
                                },
                            ));
                        }
                        formats.push(parsed);
                    }
                    Err(e) => problems.push(problem(label, ValidationErrorKind::Format(e))),
                }
            }
            Action::CopyForeignBytes {
                source,
                length,
                bind,
                ..
            } => {
                if *source >= arity {
                    problems.push(problem(
                        label,
                        ValidationErrorKind::ArgumentOutOfRange {
                            index: *source,
                            arity,
                        },
                    ));
                }
                check_expr(length, &bound, &mut *problems);
                bound.insert(bind.as_str());
            }
            Action::Exit(_) => {}
        }
    }

    formats
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn formats_are_kept_in_action_order() {
        let mut reg = ProbeRegistry::new();
        let spec = ProbeSpec::matching("p:::x")
            .then(Action::print("a", vec![]))
            .then(Action::Exit(0))
            .then(Action::print("%d", vec![Expr::Const(1)]));
        reg.register(spec).unwrap();
        let formats = reg.probes()[0].formats();
        assert_eq!(formats.len(), 2);
        assert_eq!(formats[1].conversion_count(), 1);
    }

    #[test]
    fn merge_keeps_order() {
        assert_eq!(merge_sorted(&[0, 3, 4], &[1, 2, 5]), [0, 1, 2, 3, 4, 5]);
        assert_eq!(merge_sorted(&[], &[2]), [2]);
    }
}
