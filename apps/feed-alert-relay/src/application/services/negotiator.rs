//! Constructor Negotiator
//!
//! Produces a live client handle from an entry type whose constructor
//! signature is only known by its declared parameter names.
//!
//! For each version candidate, in order:
//!
//! 1. every keyword mapping, adding the version under a declared version
//!    keyword when the candidate names one
//! 2. a positional `(client, secret, instruments[, version])` call
//!
//! A signature mismatch moves to the next shape. A version rejection
//! abandons the candidate, including its positional fallback. When every
//! candidate is spent, one bare positional call is made before giving up.

use std::fmt;
use std::time::Duration;

use uuid::Uuid;

use super::resolver::CapabilityBinding;
use crate::application::ports::{ArgValue, CallArgs, CallError, ClientHandle};
use crate::domain::connection::{
    CLOSE_METHODS, ConstructorMapping, KeywordMapping, VERSION_CANDIDATES, VersionCandidate,
};

/// Parameter names recognized as a version keyword.
pub const VERSION_KEYWORDS: [&str; 4] = ["version", "api_version", "protocol_version", "ver"];

/// Keyword mappings tried in order.
pub const KEYWORD_MAPPINGS: [KeywordMapping; 5] = [
    KeywordMapping::new("client_id", "access_token", "instruments"),
    KeywordMapping::new("clientId", "accessToken", "instruments"),
    KeywordMapping::new("client_id", "token", "instruments"),
    KeywordMapping::new("client", "token", "instruments"),
    KeywordMapping::new("client_id", "access_token", "instrument_list"),
];

/// Largest argument count of the bare positional fallback.
const BARE_ARITY: usize = 3;

// =============================================================================
// Identity
// =============================================================================

/// Credentials and instruments passed to the client constructor.
#[derive(Clone)]
pub struct FeedIdentity {
    /// Client identifier.
    pub client_id: String,
    /// Access secret.
    pub access_token: String,
    /// Security ids to subscribe.
    pub security_ids: Vec<String>,
}

impl FeedIdentity {
    /// Create an identity.
    #[must_use]
    pub const fn new(client_id: String, access_token: String, security_ids: Vec<String>) -> Self {
        Self {
            client_id,
            access_token,
            security_ids,
        }
    }

    /// `(client, secret, instruments)` as positional arguments.
    #[must_use]
    pub fn positional_args(&self, binding: &CapabilityBinding) -> CallArgs {
        CallArgs::new()
            .arg(self.client_id.as_str())
            .arg(self.access_token.as_str())
            .arg(ArgValue::Instruments(binding.instruments(&self.security_ids)))
    }
}

impl fmt::Debug for FeedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedIdentity")
            .field("client_id", &self.client_id)
            .field("access_token", &"[REDACTED]")
            .field("security_ids", &self.security_ids)
            .finish()
    }
}

// =============================================================================
// Connection Attempt
// =============================================================================

/// A constructed client handle and how it was obtained.
pub struct ConnectionAttempt {
    /// Attempt identifier for log correlation.
    pub id: Uuid,
    /// Version the constructor accepted.
    pub version: VersionCandidate,
    /// Call shape the constructor accepted.
    pub mapping: ConstructorMapping,
    /// The live handle.
    pub handle: Box<dyn ClientHandle>,
}

impl ConnectionAttempt {
    /// Ask the handle to close, if it exposes a close method.
    ///
    /// Failures and timeouts are logged and otherwise ignored.
    pub async fn release(&self, timeout: Duration) {
        for method in CLOSE_METHODS {
            if !self.handle.has_member(method) {
                continue;
            }
            match self.handle.invoke(method, CallArgs::new()) {
                Ok(call) => {
                    match tokio::time::timeout(timeout, call).await {
                        Ok(Ok(())) => {
                            tracing::debug!(attempt_id = %self.id, method, "Released client handle");
                        }
                        Ok(Err(e)) => {
                            tracing::warn!(attempt_id = %self.id, method, error = %e, "Close call failed");
                        }
                        Err(_) => {
                            tracing::warn!(attempt_id = %self.id, method, "Close call timed out");
                        }
                    }
                    return;
                }
                Err(e) if e.is_mismatch() => {}
                Err(e) => {
                    tracing::warn!(attempt_id = %self.id, method, error = %e, "Close call failed");
                    return;
                }
            }
        }
        tracing::debug!(attempt_id = %self.id, "Client handle exposes no close method");
    }
}

impl fmt::Debug for ConnectionAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionAttempt")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("mapping", &self.mapping)
            .field("handle", &self.handle.type_name())
            .finish()
    }
}

// =============================================================================
// Errors
// =============================================================================

/// One failed constructor call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationFailure {
    /// Version offered.
    pub candidate: VersionCandidate,
    /// Call shape used.
    pub mapping: ConstructorMapping,
    /// What went wrong.
    pub error: CallError,
}

impl fmt::Display for NegotiationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}] {}", self.candidate, self.mapping, self.error)
    }
}

/// No constructor call produced a handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationError {
    /// Every candidate and fallback failed.
    #[error("constructor negotiation exhausted for {entry} after {} calls", .failures.len())]
    Exhausted {
        /// Entry type negotiated with.
        entry: String,
        /// Every failure, in call order.
        failures: Vec<NegotiationFailure>,
    },
}

impl NegotiationError {
    /// Every failure, in call order.
    #[must_use]
    pub fn failures(&self) -> &[NegotiationFailure] {
        match self {
            Self::Exhausted { failures, .. } => failures,
        }
    }
}

// =============================================================================
// Negotiator
// =============================================================================

enum Step {
    Connected(ConnectionAttempt),
    NextMapping,
    NextCandidate,
}

/// Finds a constructor call the entry type accepts.
#[derive(Debug, Clone)]
pub struct ConstructorNegotiator {
    identity: FeedIdentity,
}

impl ConstructorNegotiator {
    /// Negotiator for the given identity.
    #[must_use]
    pub const fn new(identity: FeedIdentity) -> Self {
        Self { identity }
    }

    /// Identity passed to constructors.
    #[must_use]
    pub const fn identity(&self) -> &FeedIdentity {
        &self.identity
    }

    /// Construct a live handle.
    ///
    /// # Errors
    ///
    /// Returns `NegotiationError::Exhausted` with every failure if no call
    /// shape succeeds.
    pub fn negotiate(&self, binding: &CapabilityBinding) -> Result<ConnectionAttempt, NegotiationError> {
        let declared = binding.entry.parameter_names();
        let version_keyword = VERSION_KEYWORDS
            .into_iter()
            .find(|kw| declared.iter().any(|p| p == kw));
        let instruments = ArgValue::Instruments(binding.instruments(&self.identity.security_ids));
        let mut failures = Vec::new();

        tracing::debug!(
            entry = %binding.entry_path(),
            parameters = ?declared,
            version_keyword,
            "Negotiating constructor"
        );

        'candidates: for candidate in VERSION_CANDIDATES {
            let version = candidate.as_version();

            // A named version needs somewhere to go in a keyword call.
            if version.is_none() || version_keyword.is_some() {
                for mapping in KEYWORD_MAPPINGS {
                    let keyword = version.and(version_keyword);
                    let mut args = CallArgs::new()
                        .kwarg(mapping.client, self.identity.client_id.as_str())
                        .kwarg(mapping.secret, self.identity.access_token.as_str())
                        .kwarg(mapping.instruments, instruments.clone());
                    if let (Some(kw), Some(v)) = (keyword, version) {
                        args = args.kwarg(kw, v);
                    }
                    let shape = ConstructorMapping::Keyword {
                        mapping,
                        version_keyword: keyword,
                    };
                    match Self::attempt(binding, candidate, shape, args, &mut failures) {
                        Step::Connected(attempt) => return Ok(attempt),
                        Step::NextMapping => {}
                        Step::NextCandidate => continue 'candidates,
                    }
                }
            }

            let mut args = CallArgs::new()
                .arg(self.identity.client_id.as_str())
                .arg(self.identity.access_token.as_str())
                .arg(instruments.clone());
            if let Some(v) = version {
                args = args.arg(v);
            }
            let shape = ConstructorMapping::Positional { arity: args.len() };
            if let Step::Connected(attempt) =
                Self::attempt(binding, candidate, shape, args, &mut failures)
            {
                return Ok(attempt);
            }
        }

        let arity = if declared.is_empty() {
            BARE_ARITY
        } else {
            declared.len().min(BARE_ARITY)
        };
        let bare = [
            ArgValue::from(self.identity.client_id.as_str()),
            ArgValue::from(self.identity.access_token.as_str()),
            instruments,
        ];
        let args = bare
            .into_iter()
            .take(arity)
            .fold(CallArgs::new(), |args, value| args.arg(value));
        let shape = ConstructorMapping::BarePositional { arity };
        if let Step::Connected(attempt) = Self::attempt(
            binding,
            VersionCandidate::Unspecified,
            shape,
            args,
            &mut failures,
        ) {
            return Ok(attempt);
        }

        Err(NegotiationError::Exhausted {
            entry: binding.entry_path(),
            failures,
        })
    }

    fn attempt(
        binding: &CapabilityBinding,
        candidate: VersionCandidate,
        mapping: ConstructorMapping,
        args: CallArgs,
        failures: &mut Vec<NegotiationFailure>,
    ) -> Step {
        match binding.entry.construct(args) {
            Ok(handle) => {
                let attempt = ConnectionAttempt {
                    id: Uuid::new_v4(),
                    version: candidate,
                    mapping,
                    handle,
                };
                tracing::info!(
                    attempt_id = %attempt.id,
                    version = %candidate,
                    mapping = %mapping,
                    handle = attempt.handle.type_name(),
                    "Constructed feed client"
                );
                Step::Connected(attempt)
            }
            Err(error) => {
                let step = match &error {
                    CallError::SignatureMismatch(_) | CallError::MissingMember(_) => {
                        tracing::debug!(version = %candidate, %mapping, %error, "Constructor shape rejected");
                        Step::NextMapping
                    }
                    CallError::VersionRejected(_) => {
                        tracing::info!(version = %candidate, %error, "Version rejected by client");
                        Step::NextCandidate
                    }
                    CallError::Failed(_) => {
                        tracing::warn!(version = %candidate, %mapping, %error, "Constructor failed");
                        Step::NextCandidate
                    }
                };
                failures.push(NegotiationFailure {
                    candidate,
                    mapping,
                    error,
                });
                step
            }
        }
    }
}
