//! USDT provider definitions.
//!
//! Parses the `provider` blocks of a DTrace `.d` file:
//!
//! ```text
//! provider hello {
//!     probe you(char *, int);
//! };
//! ```
//!
//! Everything outside `provider` blocks is skipped. The declarations give the
//! argument count and types a probe's events carry, which is what a probe
//! program needs to be validated against.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use nom::{
    IResult,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::map,
    error::{VerboseError, convert_error},
    multi::{many0, separated_list0},
    sequence::{delimited, preceded, terminated, tuple},
};

use crate::codec::ValueKind;

/// Error types for provider parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A `provider` block is malformed.
    Syntax(String),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Syntax(msg) => write!(f, "Provider syntax error: {}", msg),
        }
    }
}

impl core::error::Error for Error {}

/// All providers declared in one source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Script {
    pub providers: Vec<Provider>,
}

impl Script {
    /// Find a probe declaration by provider and probe name.
    pub fn find(&self, provider: &str, probe: &str) -> Option<(&Provider, &ProbeDecl)> {
        let provider = self.providers.iter().find(|p| p.name == provider)?;
        let probe = provider.probes.iter().find(|p| p.name == probe)?;
        Some((provider, probe))
    }
}

/// One `provider` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    pub name: String,
    pub probes: Vec<ProbeDecl>,
}

impl Provider {
    /// Name with `__` collapsed and lower-cased, as instrumented binaries spell it.
    pub fn normalized_name(&self) -> String {
        normalize(&self.name)
    }

    /// Pattern matching `probe` of this provider in any process.
    ///
    /// Event ids carry the pid after the provider name (`hello1234`), hence
    /// the prefix wildcard.
    pub fn pattern_for(&self, probe: &ProbeDecl) -> String {
        format!("{}*:::{}", self.normalized_name(), probe.normalized_name())
    }
}

/// One `probe` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeDecl {
    pub name: String,
    /// C argument types as written.
    pub arguments: Vec<String>,
}

impl ProbeDecl {
    /// Number of declared arguments.
    pub fn arity(&self) -> usize {
        self.arguments.len()
    }

    pub fn normalized_name(&self) -> String {
        normalize(&self.name)
    }

    /// Decoding kind for argument `idx`, from its C type.
    ///
    /// `char *` maps to a string; other pointers and unknown types map to `None`.
    pub fn argument_kind(&self, idx: usize) -> Option<ValueKind> {
        c_type_kind(self.arguments.get(idx)?)
    }
}

fn normalize(name: &str) -> String {
    name.replace("__", "_").to_lowercase()
}

/// Map a C type to a value kind.
pub fn c_type_kind(ty: &str) -> Option<ValueKind> {
    let ty: String = ty
        .split_whitespace()
        .filter(|w| *w != "const")
        .collect::<Vec<_>>()
        .join(" ");

    let kind = match ty.as_str() {
        "char *" | "char*" | "string" => ValueKind::NulTerminatedString,
        "char" | "int8_t" | "signed char" => ValueKind::I8,
        "unsigned char" | "uint8_t" => ValueKind::U8,
        "short" | "int16_t" => ValueKind::I16,
        "unsigned short" | "uint16_t" => ValueKind::U16,
        "int" | "int32_t" => ValueKind::I32,
        "unsigned" | "unsigned int" | "uint32_t" => ValueKind::U32,
        "long" | "long long" | "int64_t" | "ssize_t" | "intptr_t" => ValueKind::I64,
        "unsigned long" | "unsigned long long" | "uint64_t" | "size_t" | "uintptr_t" => {
            ValueKind::U64
        }
        _ => return None,
    };
    Some(kind)
}

// =============================================================================
// Grammar
// =============================================================================

type Res<'i, T> = IResult<&'i str, T, VerboseError<&'i str>>;

fn ident(input: &str) -> Res<'_, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-')(input)
}

fn token<'i, T>(
    inner: impl FnMut(&'i str) -> Res<'i, T>,
) -> impl FnMut(&'i str) -> Res<'i, T> {
    preceded(multispace0, inner)
}

/// Argument type: anything up to `,` or `)`.
fn c_type(input: &str) -> Res<'_, &str> {
    take_while(|c: char| c != ',' && c != ')')(input)
}

fn probe_decl(input: &str) -> Res<'_, ProbeDecl> {
    map(
        tuple((
            preceded(token(tag("probe")), token(ident)),
            delimited(
                token(char('(')),
                separated_list0(char(','), c_type),
                terminated(token(char(')')), token(char(';'))),
            ),
        )),
        |(name, args): (&str, Vec<&str>)| ProbeDecl {
            name: name.to_string(),
            arguments: args
                .into_iter()
                .map(str::trim)
                .filter(|a| !a.is_empty() && *a != "void")
                .map(ToString::to_string)
                .collect(),
        },
    )(input)
}

/// `provider NAME {`; anything else containing the keyword is not a block.
fn provider_header(input: &str) -> Res<'_, &str> {
    terminated(preceded(tag("provider"), token(ident)), token(char('{')))(input)
}

fn provider_body(input: &str) -> Res<'_, Vec<ProbeDecl>> {
    terminated(many0(probe_decl), terminated(token(char('}')), token(char(';'))))(input)
}

fn starts_word(source: &str, at: &str) -> bool {
    let offset = source.len() - at.len();
    source[..offset]
        .chars()
        .next_back()
        .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_'))
}

/// Parse every `provider` block in `source`.
pub fn parse(source: &str) -> Result<Script, Error> {
    let mut script = Script::default();
    let mut rest = source;

    while let Ok((at, _)) = take_until::<_, _, VerboseError<&str>>("provider")(rest) {
        let header = match provider_header(at) {
            Ok(found) if starts_word(source, at) => found,
            _ => {
                rest = &at["provider".len()..];
                continue;
            }
        };

        let (body, name) = header;
        match provider_body(body) {
            Ok((next, probes)) => {
                log::debug!("parsed provider {} ({} probes)", name, probes.len());
                script.providers.push(Provider {
                    name: name.to_string(),
                    probes,
                });
                rest = next;
            }
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                return Err(Error::Syntax(convert_error(source, e)));
            }
            Err(nom::Err::Incomplete(_)) => {
                return Err(Error::Syntax("unexpected end of input".to_string()));
            }
        }
    }

    Ok(script)
}
