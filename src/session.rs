//! Trace session lifecycle.
//!
//! A session owns the probe registry, the executor and the output sink, and
//! drives them through `Uninitialized -> Running -> Draining -> Terminated`.
//!
//! # Example
//!
//! ```ignore
//! use axsonde::{ProbeRegistry, ProbeSpec, SessionConfig, TraceSession, VecSink};
//!
//! let registry = ProbeRegistry::load(specs, Default::default())?;
//! let sink = VecSink::new();
//! let mut session = TraceSession::new(SessionConfig::default(), registry, sink.clone());
//!
//! session.start()?;
//! session.on_event(&event)?;
//! session.stop()?;
//! ```

use alloc::format;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::config::SessionConfig;
use crate::executor::{ActionError, ActionExecutor, Firing};
use crate::output::{DIAGNOSTIC_PREFIX, OutputSink};
use crate::probe::{ProbeEvent, ProbeSpec};
use crate::registry::{ProbeId, ProbeRegistry, RegisteredProbe, ValidationErrors};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Probes may still be registered; nothing has fired.
    Uninitialized,
    /// BEGIN has run; events are admitted.
    Running,
    /// Stop requested; no further events are admitted.
    Draining,
    /// END has run.
    Terminated,
}

/// Which lifecycle probe failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Begin,
    End,
}

/// Error types for session operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// BEGIN or END failed.
    Lifecycle {
        phase: LifecyclePhase,
        source: ActionError,
    },
    /// Event offered while the session is not running.
    NotRunning(SessionState),
    /// `start` called on a session that already left `Uninitialized`.
    AlreadyStarted(SessionState),
    /// `stop` called before `start`.
    NotStarted,
    /// Probe registration after the session left `Uninitialized`.
    RegistryFrozen,
    /// Probe definition rejected.
    Validation(ValidationErrors),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Lifecycle { phase, source } => write!(f, "{:?} probe failed: {}", phase, source),
            Self::NotRunning(state) => write!(f, "Session is not running ({:?})", state),
            Self::AlreadyStarted(state) => write!(f, "Session already started ({:?})", state),
            Self::NotStarted => write!(f, "Session was never started"),
            Self::RegistryFrozen => write!(f, "Probe registry is frozen"),
            Self::Validation(errs) => write!(f, "{}", errs),
        }
    }
}

impl core::error::Error for Error {}

impl From<ValidationErrors> for Error {
    fn from(errs: ValidationErrors) -> Self {
        Self::Validation(errs)
    }
}

/// Stop request that can be raised from any thread without the session lock.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Request the session to stop admitting events.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Events offered to `on_event`.
    pub events_seen: u64,
    /// Events refused because the session was not running.
    pub events_rejected: u64,
    /// Probe firings that produced output.
    pub firings: u64,
    /// Diagnostic lines written.
    pub diagnostics: u64,
}

/// A trace session.
pub struct TraceSession {
    config: SessionConfig,
    registry: Arc<ProbeRegistry>,
    executor: ActionExecutor,
    sink: alloc::boxed::Box<dyn OutputSink>,
    state: SessionState,
    stop: StopSignal,
    exit_status: Option<i32>,
    stats: SessionStats,
}

impl TraceSession {
    /// Create a session over a loaded registry.
    ///
    /// The registry adopts the session's matching mode.
    pub fn new(
        config: SessionConfig,
        mut registry: ProbeRegistry,
        sink: impl OutputSink + 'static,
    ) -> Self {
        registry.set_strictness(config.match_strictness);
        Self {
            config,
            registry: Arc::new(registry),
            executor: ActionExecutor::from_config(&config),
            sink: alloc::boxed::Box::new(sink),
            state: SessionState::Uninitialized,
            stop: StopSignal::default(),
            exit_status: None,
            stats: SessionStats::default(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProbeRegistry {
        &self.registry
    }

    /// Current state. A raised stop signal reads as `Draining` right away.
    pub fn state(&self) -> SessionState {
        if self.state == SessionState::Running && self.stop.is_raised() {
            SessionState::Draining
        } else {
            self.state
        }
    }

    /// Exit code requested by an `Exit` action, if any.
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Handle for requesting a stop from another thread.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Add a probe before the session starts.
    pub fn register(&mut self, spec: ProbeSpec) -> Result<ProbeId, Error> {
        if self.state != SessionState::Uninitialized {
            return Err(Error::RegistryFrozen);
        }
        let registry = Arc::get_mut(&mut self.registry).ok_or(Error::RegistryFrozen)?;
        Ok(registry.register(spec)?)
    }

    /// Run BEGIN and start admitting events.
    ///
    /// A BEGIN failure leaves the session `Uninitialized`.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.state != SessionState::Uninitialized {
            return Err(Error::AlreadyStarted(self.state));
        }

        info!(
            "starting trace session ({} probes, ceiling {} bytes)",
            self.registry.len(),
            self.config.copy_ceiling
        );

        let registry = Arc::clone(&self.registry);
        let exit = match registry.begin() {
            Some(begin) => {
                let firing = self
                    .run_lifecycle(begin, "BEGIN")
                    .map_err(|source| Error::Lifecycle {
                        phase: LifecyclePhase::Begin,
                        source,
                    })?;
                firing.exit
            }
            None => None,
        };

        self.transition(SessionState::Running);
        if let Some(code) = exit {
            self.request_exit(code);
        }
        Ok(())
    }

    /// Handle one probe firing.
    ///
    /// Per-probe failures are written as diagnostic lines and do not fail the
    /// call. The call fails only when the session does not admit events.
    pub fn on_event(&mut self, event: &ProbeEvent) -> Result<(), Error> {
        self.stats.events_seen += 1;
        self.poll_stop();

        if self.state != SessionState::Running {
            self.stats.events_rejected += 1;
            debug!("rejected event {} in state {:?}", event.id, self.state);
            return Err(Error::NotRunning(self.state));
        }

        let registry = Arc::clone(&self.registry);
        for probe in registry.matches(&event.id) {
            match self.executor.fire_registered(probe, event) {
                Ok(Some(firing)) => {
                    self.stats.firings += 1;
                    if self.config.verbose {
                        info!(
                            "probe {} fired on {} ({} lines)",
                            probe.label(),
                            event.id,
                            firing.lines.len()
                        );
                    }
                    self.emit(&firing);
                    if let Some(code) = firing.exit {
                        self.request_exit(code);
                    }
                }
                Ok(None) => {}
                Err(e) => self.diagnose(probe, &event.id, &e),
            }
        }

        Ok(())
    }

    /// Stop admitting events, run END and terminate.
    ///
    /// Stopping a terminated session is a no-op.
    pub fn stop(&mut self) -> Result<(), Error> {
        self.poll_stop();
        match self.state {
            SessionState::Terminated => return Ok(()),
            SessionState::Uninitialized => return Err(Error::NotStarted),
            SessionState::Running => self.transition(SessionState::Draining),
            SessionState::Draining => {}
        }

        let registry = Arc::clone(&self.registry);
        let result = match registry.end() {
            Some(end) => self
                .run_lifecycle(end, "END")
                .map(|firing| {
                    if let Some(code) = firing.exit {
                        self.exit_status.get_or_insert(code);
                    }
                })
                .map_err(|source| Error::Lifecycle {
                    phase: LifecyclePhase::End,
                    source,
                }),
            None => Ok(()),
        };

        self.transition(SessionState::Terminated);
        result
    }

    /// Start, feed `events` until the session stops admitting them, then stop.
    ///
    /// Returns the exit status requested by the program, if any.
    pub fn run<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a ProbeEvent>,
    ) -> Result<Option<i32>, Error> {
        self.start()?;
        for event in events {
            if self.on_event(event).is_err() {
                break;
            }
        }
        self.stop()?;
        Ok(self.exit_status)
    }

    fn run_lifecycle(&mut self, probe: &RegisteredProbe, name: &str) -> Result<Firing, ActionError> {
        let event = ProbeEvent::new(name);
        match self.executor.fire_registered(probe, &event) {
            Ok(firing) => {
                let firing = firing.unwrap_or_default();
                self.emit(&firing);
                Ok(firing)
            }
            Err(e) => {
                error!("{} probe failed: {}", name, e);
                Err(e)
            }
        }
    }

    fn emit(&mut self, firing: &Firing) {
        for line in &firing.lines {
            self.sink.append(line);
        }
    }

    fn diagnose(&mut self, probe: &RegisteredProbe, event_id: &str, e: &ActionError) {
        self.stats.diagnostics += 1;
        warn!("probe {} on {}: {}", probe.label(), event_id, e);
        let line = format!(
            "{}probe {} on {}: {}",
            DIAGNOSTIC_PREFIX,
            probe.label(),
            event_id,
            e
        );
        self.sink.append_diagnostic(&line);
    }

    /// Apply a stop signal raised from another thread.
    fn poll_stop(&mut self) {
        if self.state == SessionState::Running && self.stop.is_raised() {
            info!("stop signal received");
            self.transition(SessionState::Draining);
        }
    }

    fn request_exit(&mut self, code: i32) {
        self.exit_status.get_or_insert(code);
        if self.state == SessionState::Running {
            info!("exit({}) requested", code);
            self.transition(SessionState::Draining);
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            matches!(
                (self.state, next),
                (SessionState::Uninitialized, SessionState::Running)
                    | (SessionState::Running, SessionState::Draining)
                    | (SessionState::Draining, SessionState::Terminated)
            ),
            "invalid session transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("session: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

impl Drop for TraceSession {
    fn drop(&mut self) {
        if matches!(self.state, SessionState::Running | SessionState::Draining) {
            warn!("trace session dropped while {:?}, running END", self.state);
            if let Err(e) = self.stop() {
                error!("END failed during shutdown: {}", e);
            }
        }
    }
}
