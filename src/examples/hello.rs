//! The `hello` provider, end to end.
//!
//! An instrumented program ships:
//!
//! ```text
//! provider hello {
//!     probe you(char *, int);
//! };
//! ```
//!
//! and fires `you` with a pointer to a name and the size of the buffer it
//! lives in. The probe program greets it:
//!
//! ```text
//! BEGIN              { printf("Hello World"); }
//! hello*:::you       { printf("Hello %s", copyinstr(arg0, arg1)); }
//! END                { printf("Goodbye World"); }
//! ```

use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use crate::config::SessionConfig;
use crate::memory::LocalProcess;
use crate::output::VecSink;
use crate::probe::{Action, Expr, ProbeEvent, ProbeSpec};
use crate::provider::{self, Provider};
use crate::registry::ProbeRegistry;
use crate::session::{self, TraceSession};

/// Provider definition shipped with the instrumented program.
pub const PROVIDER_SOURCE: &str = "provider hello {\n    probe you(char *, int);\n};\n";

/// Pid used for the simulated target.
pub const HELLO_PID: u32 = 1234;

/// Error types for the example run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The provider definition did not parse.
    Provider(provider::Error),
    /// The definition lacks `hello:::you`.
    MissingProbe,
    /// Loading or running the session failed.
    Session(session::Error),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Provider(e) => write!(f, "{}", e),
            Self::MissingProbe => write!(f, "provider hello has no probe you"),
            Self::Session(e) => write!(f, "{}", e),
        }
    }
}

impl core::error::Error for Error {}

impl From<provider::Error> for Error {
    fn from(e: provider::Error) -> Self {
        Self::Provider(e)
    }
}

impl From<session::Error> for Error {
    fn from(e: session::Error) -> Self {
        Self::Session(e)
    }
}

/// The probe program, built from the `you` declaration in `provider`.
pub fn hello_program(provider: &Provider) -> Result<Vec<ProbeSpec>, Error> {
    let you = provider
        .probes
        .iter()
        .find(|p| p.name == "you")
        .ok_or(Error::MissingProbe)?;

    Ok(vec![
        ProbeSpec::begin().then(Action::print("Hello World", vec![])),
        ProbeSpec::matching(&provider.pattern_for(you))
            .with_args(you.arity())
            .then(Action::print(
                "Hello %s",
                vec![Expr::copy_str(0, Expr::Arg(1))],
            )),
        ProbeSpec::end().then(Action::print("Goodbye World", vec![])),
    ])
}

/// Fire `you` once per name and return everything the session printed.
pub fn run_hello_example(names: &[&str]) -> Result<Vec<String>, Error> {
    let script = provider::parse(PROVIDER_SOURCE)?;
    let hello = script
        .providers
        .iter()
        .find(|p| p.name == "hello")
        .ok_or(Error::MissingProbe)?;
    let specs = hello_program(hello)?;

    let target = Arc::new(LocalProcess::new(HELLO_PID));
    let event_id = format!("{}{}:hello:main:you", hello.normalized_name(), HELLO_PID);

    let events: Vec<ProbeEvent> = names
        .iter()
        .map(|name| {
            let mut bytes = name.as_bytes().to_vec();
            bytes.push(0);
            let len = bytes.len() as u64;
            let addr = target.map(bytes);
            ProbeEvent::new(&event_id)
                .with_pointer(addr, target.clone())
                .with_scalar(len)
        })
        .collect();

    let registry = ProbeRegistry::load(specs, Default::default()).map_err(session::Error::from)?;
    let sink = VecSink::new();
    let mut trace = TraceSession::new(SessionConfig::default(), registry, sink.clone());
    trace.run(&events)?;

    Ok(sink.take())
}
