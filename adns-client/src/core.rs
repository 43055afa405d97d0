use std::error;
use std::fmt;
use std::io;
use std::time::Duration;

/// Category of a `ResolveError`.
///
/// Kinds are split between local problems (bad input, bad configuration, bugs),
/// problems with what came back over the network, and outcomes reported by a
/// nameserver on purpose (NXDOMAIN, SERVFAIL, etc.).
#[derive(Debug, PartialOrd, PartialEq, Eq, Hash, Copy, Clone)]
pub enum ErrorKind {
    InvalidName,
    MalformedMessage,
    Mismatch,
    Timeout,
    NXDomain,
    ServFail,
    Refused,
    Remote,
    Canceled,
    SystemFailure,
    UnknownQuery,
    Configuration,
    IO,
    Internal,
}

impl ErrorKind {
    /// Short, stable abbreviation for this kind of error suitable for status output.
    pub fn abbrev(&self) -> &'static str {
        match self {
            Self::InvalidName => "invalidname",
            Self::MalformedMessage => "malformed",
            Self::Mismatch => "mismatch",
            Self::Timeout => "timeout",
            Self::NXDomain => "nxdomain",
            Self::ServFail => "servfail",
            Self::Refused => "refused",
            Self::Remote => "remotefail",
            Self::Canceled => "canceled",
            Self::SystemFailure => "systemfail",
            Self::UnknownQuery => "unknownquery",
            Self::Configuration => "config",
            Self::IO => "io",
            Self::Internal => "internal",
        }
    }

    /// True if this error was reported by a nameserver rather than detected locally.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::NXDomain | Self::ServFail | Self::Refused | Self::Remote)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName => write!(f, "invalid domain name"),
            Self::MalformedMessage => write!(f, "malformed DNS message"),
            Self::Mismatch => write!(f, "response does not match any pending query"),
            Self::Timeout => write!(f, "query timed out"),
            Self::NXDomain => write!(f, "no such domain"),
            Self::ServFail => write!(f, "nameserver failure"),
            Self::Refused => write!(f, "query refused"),
            Self::Remote => write!(f, "nameserver reported an error"),
            Self::Canceled => write!(f, "query canceled"),
            Self::SystemFailure => write!(f, "system failure"),
            Self::UnknownQuery => write!(f, "unknown query"),
            Self::Configuration => write!(f, "configuration error"),
            Self::IO => write!(f, "io error"),
            Self::Internal => write!(f, "internal error"),
        }
    }
}

#[derive(Debug)]
enum ErrorRepr {
    Kind,
    Message(String),
    Cause(Box<dyn error::Error + Send + Sync + 'static>),
    MessageCause(String, Box<dyn error::Error + Send + Sync + 'static>),
}

#[derive(Debug)]
pub struct ResolveError {
    kind: ErrorKind,
    repr: ErrorRepr,
}

impl ResolveError {
    /// Create an error of the given kind with no additional context.
    pub fn from_kind(kind: ErrorKind) -> ResolveError {
        ResolveError {
            kind,
            repr: ErrorRepr::Kind,
        }
    }

    pub fn new<S>(kind: ErrorKind, msg: S) -> ResolveError
    where
        S: Into<String>,
    {
        ResolveError {
            kind,
            repr: ErrorRepr::Message(msg.into()),
        }
    }

    pub fn new_cause<S, E>(kind: ErrorKind, msg: S, e: E) -> ResolveError
    where
        S: Into<String>,
        E: error::Error + Send + Sync + 'static,
    {
        ResolveError {
            kind,
            repr: ErrorRepr::MessageCause(msg.into(), Box::new(e)),
        }
    }

    pub fn internal<S>(msg: S) -> ResolveError
    where
        S: Into<String>,
    {
        Self::new(ErrorKind::Internal, msg)
    }

    pub fn invalid_name<S>(msg: S) -> ResolveError
    where
        S: Into<String>,
    {
        Self::new(ErrorKind::InvalidName, msg)
    }

    pub fn malformed<S>(msg: S) -> ResolveError
    where
        S: Into<String>,
    {
        Self::new(ErrorKind::MalformedMessage, msg)
    }

    pub fn malformed_cause<S, E>(msg: S, e: E) -> ResolveError
    where
        S: Into<String>,
        E: error::Error + Send + Sync + 'static,
    {
        Self::new_cause(ErrorKind::MalformedMessage, msg, e)
    }

    pub fn mismatch<S>(msg: S) -> ResolveError
    where
        S: Into<String>,
    {
        Self::new(ErrorKind::Mismatch, msg)
    }

    pub fn configuration<S>(msg: S) -> ResolveError
    where
        S: Into<String>,
    {
        Self::new(ErrorKind::Configuration, msg)
    }

    pub fn configuration_cause<S, E>(msg: S, e: E) -> ResolveError
    where
        S: Into<String>,
        E: error::Error + Send + Sync + 'static,
    {
        Self::new_cause(ErrorKind::Configuration, msg, e)
    }

    pub fn timeout<S>(t: Duration, operation: S) -> ResolveError
    where
        S: Into<String>,
    {
        Self::new(ErrorKind::Timeout, format!("{} after {:?}", operation.into(), t))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Re-label errors produced while reading bytes off the wire. Short reads and
    /// other I/O failures while decoding an in-memory buffer mean the message itself
    /// was truncated or corrupt, not that a socket failed.
    pub(crate) fn into_malformed(self) -> ResolveError {
        match self.kind {
            ErrorKind::IO | ErrorKind::InvalidName => ResolveError {
                kind: ErrorKind::MalformedMessage,
                repr: self.repr,
            },
            _ => self,
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Kind => write!(f, "{}", self.kind),
            ErrorRepr::Message(msg) => write!(f, "{}: {}", self.kind, msg),
            ErrorRepr::Cause(e) => write!(f, "{}: {}", self.kind, e),
            ErrorRepr::MessageCause(msg, e) => write!(f, "{}: {}: {}", self.kind, msg, e),
        }
    }
}

impl error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Kind => None,
            ErrorRepr::Message(_) => None,
            ErrorRepr::Cause(e) => Some(e.as_ref()),
            ErrorRepr::MessageCause(_, e) => Some(e.as_ref()),
        }
    }
}

impl From<io::Error> for ResolveError {
    fn from(e: io::Error) -> Self {
        ResolveError {
            kind: ErrorKind::IO,
            repr: ErrorRepr::Cause(Box::new(e)),
        }
    }
}

impl From<ErrorKind> for ResolveError {
    fn from(kind: ErrorKind) -> Self {
        Self::from_kind(kind)
    }
}

#[cfg(test)]
mod test {
    use super::{ErrorKind, ResolveError};
    use std::error::Error;
    use std::io;

    #[test]
    fn test_error_display_kind_only() {
        let e = ResolveError::from_kind(ErrorKind::NXDomain);
        assert_eq!("no such domain", e.to_string());
    }

    #[test]
    fn test_error_display_message() {
        let e = ResolveError::invalid_name("label too long");
        assert_eq!("invalid domain name: label too long", e.to_string());
    }

    #[test]
    fn test_error_source_io() {
        let e = ResolveError::from(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert_eq!(ErrorKind::IO, e.kind());
        assert!(e.source().is_some());
    }

    #[test]
    fn test_error_into_malformed() {
        let e = ResolveError::from(io::Error::new(io::ErrorKind::UnexpectedEof, "eof")).into_malformed();
        assert_eq!(ErrorKind::MalformedMessage, e.kind());

        let e = ResolveError::from_kind(ErrorKind::Timeout).into_malformed();
        assert_eq!(ErrorKind::Timeout, e.kind());
    }

    #[test]
    fn test_error_kind_is_remote() {
        assert!(ErrorKind::NXDomain.is_remote());
        assert!(ErrorKind::ServFail.is_remote());
        assert!(!ErrorKind::Timeout.is_remote());
        assert!(!ErrorKind::Canceled.is_remote());
    }
}
