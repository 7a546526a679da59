//! Connection Vocabulary
//!
//! Version candidates tried during negotiation, the argument-name mappings
//! used to call an unknown constructor, and the supervisor lifecycle states.

use std::fmt;

// =============================================================================
// Version Candidates
// =============================================================================

/// A protocol version to offer the client constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionCandidate {
    /// Let the client pick its default version.
    Unspecified,
    /// Pass this version explicitly.
    Named(&'static str),
}

impl VersionCandidate {
    /// Version string, if one is passed.
    #[must_use]
    pub const fn as_version(&self) -> Option<&'static str> {
        match self {
            Self::Unspecified => None,
            Self::Named(v) => Some(v),
        }
    }
}

impl fmt::Display for VersionCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unspecified => f.write_str("<default>"),
            Self::Named(v) => f.write_str(v),
        }
    }
}

/// Versions tried in order.
pub const VERSION_CANDIDATES: [VersionCandidate; 5] = [
    VersionCandidate::Unspecified,
    VersionCandidate::Named("1"),
    VersionCandidate::Named("v1"),
    VersionCandidate::Named("2.0"),
    VersionCandidate::Named("v2"),
];

// =============================================================================
// Constructor Mappings
// =============================================================================

/// Parameter names for the three constructor inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordMapping {
    /// Name of the client identifier parameter.
    pub client: &'static str,
    /// Name of the access secret parameter.
    pub secret: &'static str,
    /// Name of the instrument list parameter.
    pub instruments: &'static str,
}

impl KeywordMapping {
    /// Create a mapping.
    #[must_use]
    pub const fn new(client: &'static str, secret: &'static str, instruments: &'static str) -> Self {
        Self {
            client,
            secret,
            instruments,
        }
    }
}

impl fmt::Display for KeywordMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.client, self.secret, self.instruments)
    }
}

/// How a constructor call was shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructorMapping {
    /// Named arguments, with the version under `version_keyword` if any.
    Keyword {
        /// Names used for the three inputs.
        mapping: KeywordMapping,
        /// Keyword carrying the version.
        version_keyword: Option<&'static str>,
    },
    /// Positional `(client, secret, instruments[, version])`.
    Positional {
        /// Number of arguments passed.
        arity: usize,
    },
    /// Positional call trimmed to the declared parameter count.
    BarePositional {
        /// Number of arguments passed.
        arity: usize,
    },
}

impl fmt::Display for ConstructorMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyword {
                mapping,
                version_keyword: Some(kw),
            } => write!(f, "keyword {mapping} + {kw}"),
            Self::Keyword { mapping, .. } => write!(f, "keyword {mapping}"),
            Self::Positional { arity } => write!(f, "positional/{arity}"),
            Self::BarePositional { arity } => write!(f, "bare-positional/{arity}"),
        }
    }
}

/// Method names tried, in order, to release a client handle.
pub const CLOSE_METHODS: [&str; 2] = ["disconnect", "close_connection"];

// =============================================================================
// Supervisor State
// =============================================================================

/// Lifecycle state of the reconnection supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SupervisorState {
    /// Not started yet.
    #[default]
    Idle,
    /// Looking up the client entry type.
    Discovering,
    /// Trying constructor candidates.
    Negotiating,
    /// Looking for a run method on the new handle.
    Probing,
    /// The run call is in progress.
    Streaming,
    /// Waiting before the next attempt.
    BackingOff,
    /// Stopped for good.
    Terminated,
}

impl SupervisorState {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Negotiating => "negotiating",
            Self::Probing => "probing",
            Self::Streaming => "streaming",
            Self::BackingOff => "backoff",
            Self::Terminated => "terminated",
        }
    }

    /// Numeric value exported on the state gauge.
    #[must_use]
    pub const fn gauge_value(&self) -> f64 {
        match self {
            Self::Idle => 0.0,
            Self::Discovering => 1.0,
            Self::Negotiating => 2.0,
            Self::Probing => 3.0,
            Self::Streaming => 4.0,
            Self::BackingOff => 5.0,
            Self::Terminated => 6.0,
        }
    }

    /// Whether a stream is live.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_version_is_tried_first() {
        assert_eq!(VERSION_CANDIDATES[0], VersionCandidate::Unspecified);
        assert_eq!(VERSION_CANDIDATES[4].as_version(), Some("v2"));
    }

    #[test]
    fn mapping_display_names_parameters() {
        let mapping = ConstructorMapping::Keyword {
            mapping: KeywordMapping::new("client_id", "access_token", "instruments"),
            version_keyword: Some("version"),
        };
        assert_eq!(
            mapping.to_string(),
            "keyword (client_id, access_token, instruments) + version"
        );
    }

    #[test]
    fn only_streaming_is_streaming() {
        assert!(SupervisorState::Streaming.is_streaming());
        assert!(!SupervisorState::Negotiating.is_streaming());
        assert_eq!(SupervisorState::BackingOff.as_str(), "backoff");
        assert_eq!(SupervisorState::default(), SupervisorState::Idle);
    }
}
