//! Client Library Capability Surface
//!
//! A market-feed client is seen only through declared capabilities:
//!
//! ```text
//! ClientLibrary ──► ModuleHandle ──► EntryType ──construct──► ClientHandle ──invoke──► PendingCall
//! ```
//!
//! Every call is checked against the callee's declared signature before it
//! runs. A call that does not bind returns `CallError::SignatureMismatch`
//! synchronously, so callers can tell "wrong shape" apart from "ran and
//! failed" without awaiting anything.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

// =============================================================================
// Values
// =============================================================================

/// A constant exposed by a client module (venue segment, subscription kind).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    /// Integer code.
    Int(i64),
    /// Textual code.
    Text(String),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for Constant {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// One instrument subscription passed to a client constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentSpec {
    /// Venue segment constant.
    pub segment: Constant,
    /// Security identifier.
    pub security_id: String,
    /// Subscription kind constant.
    pub subscription: Constant,
}

/// Object-shaped event exposing named attributes.
pub trait AttributeSource: Send + Sync {
    /// Type name, for logging.
    fn type_name(&self) -> &str;

    /// Value of a named attribute, if present.
    fn attribute(&self, name: &str) -> Option<Value>;
}

/// An event handed to the client's message callback.
#[derive(Clone)]
pub enum InboundEvent {
    /// Text payload, usually JSON.
    Text(String),
    /// Binary payload, possibly UTF-8 JSON.
    Bytes(Vec<u8>),
    /// Already-decoded structured payload.
    Structured(Value),
    /// An object with attributes.
    Object(Arc<dyn AttributeSource>),
}

impl fmt::Debug for InboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Structured(value) => f.debug_tuple("Structured").field(value).finish(),
            Self::Object(source) => write!(f, "Object({})", source.type_name()),
        }
    }
}

/// Message callback registered with a client.
pub type EventCallback = Arc<dyn Fn(InboundEvent) + Send + Sync>;

/// One argument to a constructor or method call.
#[derive(Clone)]
pub enum ArgValue {
    /// String argument.
    Text(String),
    /// Instrument list.
    Instruments(Vec<InstrumentSpec>),
    /// Message callback.
    Callback(EventCallback),
}

impl ArgValue {
    /// Short label for the argument kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Instruments(_) => "instruments",
            Self::Callback(_) => "callback",
        }
    }
}

impl fmt::Debug for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Text arguments may carry credentials.
        match self {
            Self::Text(text) => write!(f, "Text(<{} chars>)", text.len()),
            Self::Instruments(list) => write!(f, "Instruments({})", list.len()),
            Self::Callback(_) => f.write_str("Callback"),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Arguments for one call: positionals first, then keywords.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    /// Positional arguments in order.
    pub positional: Vec<ArgValue>,
    /// Keyword arguments in order.
    pub named: Vec<(String, ArgValue)>,
}

impl CallArgs {
    /// Empty argument list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<ArgValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Append a keyword argument.
    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.named.push((name.into(), value.into()));
        self
    }

    /// Total argument count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    /// Whether no arguments are passed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Failure of a constructor or method call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// The arguments do not bind to the declared signature.
    #[error("signature mismatch: {0}")]
    SignatureMismatch(String),

    /// The client refused the requested protocol version.
    #[error("version rejected: {0}")]
    VersionRejected(String),

    /// The handle has no such member.
    #[error("no member named '{0}'")]
    MissingMember(String),

    /// The call ran and failed.
    #[error("{0}")]
    Failed(String),
}

impl CallError {
    /// Classify a free-form failure message.
    ///
    /// Messages mentioning an unsupported version become `VersionRejected`;
    /// everything else is `Failed`.
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.to_ascii_lowercase().contains("unsupported version") {
            Self::VersionRejected(message)
        } else {
            Self::Failed(message)
        }
    }

    /// Whether the call never ran because its shape was wrong.
    #[must_use]
    pub const fn is_mismatch(&self) -> bool {
        matches!(self, Self::SignatureMismatch(_) | Self::MissingMember(_))
    }
}

/// A call that has bound and is now running.
pub type PendingCall = BoxFuture<'static, Result<(), CallError>>;

// =============================================================================
// Capability Traits
// =============================================================================

/// A loadable client package.
pub trait ClientLibrary: Send + Sync {
    /// Package name.
    fn package(&self) -> &str;

    /// Root module.
    fn root(&self) -> Arc<dyn ModuleHandle>;

    /// Named submodule, if present.
    fn submodule(&self, name: &str) -> Option<Arc<dyn ModuleHandle>>;
}

/// A module exposing entry types and constants.
pub trait ModuleHandle: Send + Sync {
    /// Dotted module path.
    fn path(&self) -> String;

    /// Every member name the module exposes.
    fn member_names(&self) -> Vec<String>;

    /// Entry type by name.
    fn entry_type(&self, name: &str) -> Option<Arc<dyn EntryType>>;

    /// Constant by name.
    fn constant(&self, name: &str) -> Option<Constant>;

    /// Bind and start a module-level function call.
    ///
    /// # Errors
    ///
    /// `MissingMember` or `SignatureMismatch` when the call cannot bind.
    /// Other errors mean the call started and failed immediately.
    fn invoke(&self, function: &str, args: CallArgs) -> Result<PendingCall, CallError>;
}

/// A constructible client type.
pub trait EntryType: Send + Sync {
    /// Type name.
    fn name(&self) -> &str;

    /// Declared constructor parameter names, in order.
    fn parameter_names(&self) -> Vec<String>;

    /// Construct a live handle.
    ///
    /// # Errors
    ///
    /// `SignatureMismatch` if the arguments do not bind, `VersionRejected`
    /// if a requested version is refused, `Failed` otherwise.
    fn construct(&self, args: CallArgs) -> Result<Box<dyn ClientHandle>, CallError>;
}

/// A live client instance.
pub trait ClientHandle: Send + Sync {
    /// Type name, for diagnostics.
    fn type_name(&self) -> &str;

    /// Every member name the handle exposes.
    fn member_names(&self) -> Vec<String>;

    /// Whether a member exists.
    fn has_member(&self, name: &str) -> bool {
        self.member_names().iter().any(|member| member == name)
    }

    /// Bind and start a method call.
    ///
    /// # Errors
    ///
    /// `MissingMember` or `SignatureMismatch` when the call cannot bind.
    /// Other errors mean the call started and failed immediately.
    fn invoke(&self, method: &str, args: CallArgs) -> Result<PendingCall, CallError>;
}

// =============================================================================
// Registry
// =============================================================================

/// Client packages available to the process, by name.
#[derive(Default, Clone)]
pub struct LibraryRegistry {
    libraries: BTreeMap<String, Arc<dyn ClientLibrary>>,
}

impl LibraryRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a library under its package name.
    #[must_use]
    pub fn with(mut self, library: Arc<dyn ClientLibrary>) -> Self {
        self.libraries.insert(library.package().to_string(), library);
        self
    }

    /// Load a package.
    #[must_use]
    pub fn load(&self, package: &str) -> Option<Arc<dyn ClientLibrary>> {
        self.libraries.get(package).cloned()
    }

    /// Registered package names.
    #[must_use]
    pub fn packages(&self) -> Vec<String> {
        self.libraries.keys().cloned().collect()
    }
}

impl fmt::Debug for LibraryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryRegistry")
            .field("packages", &self.packages())
            .finish()
    }
}
