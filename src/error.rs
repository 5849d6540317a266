use std::fmt;

use crate::status::Status;

/// Local, programmer-facing errors distinct from gRPC `Status`.
///
/// A `Status` is something the *protocol* can carry end to end; an
/// `RpcError` is a contract violation on this side of the wire (calling into
/// a disposed channel, issuing a second concurrent read, building a channel
/// with an invalid address, ...). See §7 of the design for the split.
#[derive(Debug)]
pub enum RpcError {
    /// The channel (or call) has already been disposed.
    AlreadyDisposed,

    /// A second `move_next` call overlapped with one still in progress.
    ConcurrentRead,

    /// A second `write` call overlapped with one still in progress.
    ConcurrentWrite,

    /// The call has not reached a terminal, successful state yet.
    NotTerminal(&'static str),

    /// The supplied address does not parse into a usable channel target.
    InvalidAddress(String),

    /// A channel/call option combination is contradictory (e.g. composing
    /// call credentials with insecure channel credentials).
    Configuration(String),

    /// Wraps an I/O error (reading PEM files, etc).
    Io(std::io::Error),

    /// Any other boxed cause, for the long tail.
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::AlreadyDisposed => write!(f, "the call or channel has already been disposed"),
            RpcError::ConcurrentRead => write!(
                f,
                "Can't read the next message because the previous read is still in progress."
            ),
            RpcError::ConcurrentWrite => {
                write!(f, "Can't write the next message because a write is already in progress.")
            }
            RpcError::NotTerminal(msg) => write!(f, "{msg}"),
            RpcError::InvalidAddress(msg) => write!(f, "{msg}"),
            RpcError::Configuration(msg) => write!(f, "{msg}"),
            RpcError::Io(err) => write!(f, "I/O error: {err}"),
            RpcError::Other(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RpcError::Io(err) => Some(err),
            RpcError::Other(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Io(err)
    }
}

/// The error returned when a call resolves: either a terminal gRPC `Status`
/// that is non-OK, or a local contract violation that never got far enough
/// to produce one.
#[derive(Debug)]
pub enum CallError {
    Status(Status),
    Local(RpcError),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Status(status) => status.fmt(f),
            CallError::Local(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CallError::Status(status) => Some(status),
            CallError::Local(err) => Some(err),
        }
    }
}

impl From<Status> for CallError {
    fn from(status: Status) -> Self {
        CallError::Status(status)
    }
}

impl From<RpcError> for CallError {
    fn from(err: RpcError) -> Self {
        CallError::Local(err)
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
