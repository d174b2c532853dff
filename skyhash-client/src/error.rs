use skyhash_proto::{ProtocolError, ServerError};
use thiserror::Error;

/// Errors surfaced by the client.
///
/// Typed server statuses arrive through [`Error::Protocol`]; everything
/// else is a client-side condition (pool exhaustion, deadlines, batch
/// shape mismatches). The whole tree is `Clone` and `PartialEq` so a
/// batch failure can be fanned out to every queued command and the nil
/// sentinel can be compared structurally.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Any operation on a closed client.
    #[error("skyhash: client is closed")]
    Closed,

    /// No free connection within the pool wait bound.
    #[error("skyhash: connection pool timeout")]
    PoolTimeout,

    /// The dedicated connection is already checked out by another call.
    #[error("skyhash: connection already in use")]
    ConnBusy,

    /// A client-side deadline (`dial`, `read` or `write`) expired.
    #[error("skyhash: {0} deadline exceeded")]
    Timeout(&'static str),

    /// A reply metaframe announced a different element count than the
    /// request carried.
    #[error("skyhash: expected {expected} replies, got {got}")]
    CountMismatch { expected: usize, got: usize },

    /// The configured limiter rejected the operation.
    #[error("skyhash: rate limited: {0}")]
    RateLimited(String),
}

impl From<ServerError> for Error {
    fn from(err: ServerError) -> Error {
        Error::Protocol(ProtocolError::Server(err))
    }
}

impl Error {
    /// True for the nil sentinel (server status 1, "no such object").
    pub fn is_nil(&self) -> bool {
        self.server_error().is_some_and(|err| err.is_nil())
    }

    /// The typed server error behind this error, if any.
    pub fn server_error(&self) -> Option<ServerError> {
        match self {
            Error::Protocol(err) => err.server_error(),
            _ => None,
        }
    }

    /// True when some deadline expired: a client-side one, the pool wait
    /// bound, or an I/O timeout reported by the socket.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout(_) | Error::PoolTimeout => true,
            Error::Protocol(err) => err.is_io_timeout(),
            _ => false,
        }
    }

    pub(crate) fn dial_io(err: std::io::Error) -> Error {
        Error::Protocol(ProtocolError::Io {
            context: "failed to dial",
            kind: err.kind(),
            message: err.to_string(),
        })
    }
}

/// Whether a failed attempt is worth repeating on a fresh connection.
///
/// EOFs and connection-level I/O faults retry; typed server errors never
/// do. Deadline expiries retry only when `retry_timeout` is set, i.e. the
/// write went through whole and no part of the reply was consumed.
pub(crate) fn should_retry(err: &Error, retry_timeout: bool) -> bool {
    match err {
        Error::Protocol(proto) => {
            if proto.server_error().is_some() {
                return false;
            }
            if proto.is_eof() {
                return true;
            }
            if proto.is_io_timeout() {
                return retry_timeout;
            }
            // Framing and length errors are not transient.
            matches!(proto, ProtocolError::Io { .. })
        }
        Error::Timeout(_) => retry_timeout,
        Error::PoolTimeout => true,
        Error::Closed
        | Error::ConnBusy
        | Error::CountMismatch { .. }
        | Error::RateLimited(_) => false,
    }
}

/// Whether the connection that produced `err` is in an unknown state and
/// must be evicted rather than returned to the pool.
pub(crate) fn is_bad_conn(err: &Error, allow_timeout: bool, addr: &str) -> bool {
    match err {
        Error::Protocol(proto) => {
            if proto.server_error().is_some() {
                // The server replied coherently, so the stream is intact.
                // READONLY and MOVED redirections are the exception: they
                // signal the peer is no longer the server we dialed.
                return is_read_only(err) || is_moved_same_addr(err, addr);
            }
            if allow_timeout && proto.is_io_timeout() {
                return false;
            }
            true
        }
        Error::Timeout(_) => true,
        Error::CountMismatch { .. } => true,
        Error::Closed
        | Error::ConnBusy
        | Error::PoolTimeout
        | Error::RateLimited(_) => false,
    }
}

fn is_read_only(err: &Error) -> bool {
    err.to_string().starts_with("READONLY ")
}

fn is_moved_same_addr(err: &Error, addr: &str) -> bool {
    let text = err.to_string();
    text.starts_with("MOVED ") && text.ends_with(&format!(" {addr}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn io_err(kind: io::ErrorKind) -> Error {
        Error::Protocol(ProtocolError::Io {
            context: "test",
            kind,
            message: "boom".to_owned(),
        })
    }

    #[test]
    fn server_errors_never_retry() {
        assert!(!should_retry(&ServerError::Nil.into(), true));
        assert!(!should_retry(&ServerError::Server.into(), true));
    }

    #[test]
    fn eof_and_resets_retry() {
        assert!(should_retry(&io_err(io::ErrorKind::UnexpectedEof), false));
        assert!(should_retry(&io_err(io::ErrorKind::ConnectionReset), false));
    }

    #[test]
    fn timeouts_retry_only_when_allowed() {
        assert!(should_retry(&Error::Timeout("read"), true));
        assert!(!should_retry(&Error::Timeout("read"), false));
        assert!(should_retry(&io_err(io::ErrorKind::TimedOut), true));
        assert!(!should_retry(&io_err(io::ErrorKind::TimedOut), false));
    }

    #[test]
    fn server_errors_keep_the_connection() {
        assert!(!is_bad_conn(&ServerError::Overwrite.into(), false, "x:1"));
        assert!(is_bad_conn(&io_err(io::ErrorKind::BrokenPipe), false, "x:1"));
        assert!(is_bad_conn(&Error::Timeout("read"), false, "x:1"));
        assert!(!is_bad_conn(&Error::PoolTimeout, false, "x:1"));
    }

    #[test]
    fn nil_sentinel_compares_structurally() {
        let err: Error = ServerError::Nil.into();
        assert!(err.is_nil());
        assert_eq!(err, Error::from(ServerError::Nil));
        assert!(!Error::from(ServerError::Overwrite).is_nil());
    }
}
