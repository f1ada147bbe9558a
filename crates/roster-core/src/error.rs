use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::{PoolKind, ReferenceId};

/// Machine-readable error codes shared by every roster error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigReadFailed,
    ConfigParseError,
    ConfigInvalid,
    InvalidPagination,
    ReferencePoolNotLoaded,
    ReferenceUnknown,
    ReferenceInactive,
    ReferenceParentMismatch,
    ApiTransport,
    ApiRejected,
    ApiDecode,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigReadFailed => "E1001",
            Self::ConfigParseError => "E1002",
            Self::ConfigInvalid => "E1003",
            Self::InvalidPagination => "E2001",
            Self::ReferencePoolNotLoaded => "E3001",
            Self::ReferenceUnknown => "E3002",
            Self::ReferenceInactive => "E3003",
            Self::ReferenceParentMismatch => "E3004",
            Self::ApiTransport => "E4001",
            Self::ApiRejected => "E4002",
            Self::ApiDecode => "E4003",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and status bars.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigReadFailed => "Config file could not be read",
            Self::ConfigParseError => "Config file parse error",
            Self::ConfigInvalid => "Config value out of range",
            Self::InvalidPagination => "Invalid page or page size",
            Self::ReferencePoolNotLoaded => "Lookup list not loaded",
            Self::ReferenceUnknown => "Unknown lookup value",
            Self::ReferenceInactive => "Lookup value is inactive",
            Self::ReferenceParentMismatch => "Lookup value belongs to another parent",
            Self::ApiTransport => "Network request failed",
            Self::ApiRejected => "Request rejected by server",
            Self::ApiDecode => "Malformed server response",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced next to the message.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigReadFailed => Some("Check that roster.toml exists and is readable."),
            Self::ConfigParseError => Some("Fix the TOML syntax in roster.toml and retry."),
            Self::ConfigInvalid => {
                Some("Keep fetch.default_page_size between 1 and fetch.max_page_size.")
            }
            Self::InvalidPagination => Some("Pages and page sizes start at 1."),
            Self::ReferencePoolNotLoaded => {
                Some("Load the lookup list before validating against it.")
            }
            Self::ReferenceUnknown | Self::ReferenceParentMismatch => {
                Some("The parent selection changed; pick the value again.")
            }
            Self::ReferenceInactive => Some("Choose an active value."),
            Self::ApiTransport => Some("Check connectivity to the API and retry."),
            Self::ApiRejected => None,
            Self::ApiDecode => Some("Client and server versions may disagree; report a bug."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ---------------------------------------------------------------------------
// Domain errors
// ---------------------------------------------------------------------------

/// Invalid input to the query builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("invalid pagination: page={page} page_size={page_size}, both must be at least 1")]
    InvalidPagination { page: u32, page_size: u32 },
    #[error("page size {page_size} exceeds the maximum of {max}")]
    PageSizeTooLarge { page_size: u32, max: u32 },
}

impl QueryError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidPagination { .. } | Self::PageSizeTooLarge { .. } => {
                ErrorCode::InvalidPagination
            }
        }
    }
}

/// Failure reported by a remote collaborator.
///
/// Carries owned strings rather than transport error types so outcomes that
/// embed it stay `Clone` and comparable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Transport(_) => ErrorCode::ApiTransport,
            Self::Rejected { .. } => ErrorCode::ApiRejected,
            Self::Decode(_) => ErrorCode::ApiDecode,
        }
    }
}

/// A form references a lookup value that is no longer valid in context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("{kind} list has not been loaded")]
    NotLoaded { kind: PoolKind },
    #[error("{kind} {id} is not in the current list")]
    Unknown { kind: PoolKind, id: ReferenceId },
    #[error("{kind} {id} is inactive")]
    Inactive { kind: PoolKind, id: ReferenceId },
    #[error("{kind} {id} does not belong to {expected}")]
    ParentMismatch {
        kind: PoolKind,
        id: ReferenceId,
        expected: ReferenceId,
        actual: Option<ReferenceId>,
    },
}

impl ReferenceError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotLoaded { .. } => ErrorCode::ReferencePoolNotLoaded,
            Self::Unknown { .. } => ErrorCode::ReferenceUnknown,
            Self::Inactive { .. } => ErrorCode::ReferenceInactive,
            Self::ParentMismatch { .. } => ErrorCode::ReferenceParentMismatch,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } => ErrorCode::ConfigReadFailed,
            Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::Invalid(_) => ErrorCode::ConfigInvalid,
        }
    }
}
