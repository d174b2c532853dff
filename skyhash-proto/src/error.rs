use crate::status::ServerError;
use std::io;
use thiserror::Error;

/// Errors raised while encoding or parsing Skyhash frames.
///
/// I/O failures keep their [`io::ErrorKind`] so callers can classify them
/// (EOF vs timeout vs reset) without holding on to the unclonable
/// [`io::Error`] itself. Typed server statuses travel through the same
/// channel as [`ProtocolError::Server`] so that a reply element can yield
/// either a value or an error from one read call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("skyhash: {context}: {message}")]
    Io {
        context: &'static str,
        kind: io::ErrorKind,
        message: String,
    },

    /// The stream contained bytes that are not a valid reply line. Quotes
    /// at most the first 100 bytes of the offending input.
    #[error("skyhash: invalid reply: {0:?}")]
    InvalidReply(String),

    /// A frame boundary did not start with `*<count>\n`.
    #[error("skyhash: invalid meta frame: {0:?}")]
    InvalidMetaFrame(String),

    /// A length header exceeded [`crate::MAX_PAYLOAD_SIZE`].
    #[error("skyhash: payload length {length} exceeds maximum {max}")]
    PayloadTooLarge { length: usize, max: usize },

    /// The reply was well-formed but not of the type the caller asked for.
    #[error("skyhash: can't parse reply {snippet:?} as {expected}")]
    UnexpectedType {
        expected: &'static str,
        snippet: String,
    },

    #[error(transparent)]
    Server(#[from] ServerError),
}

impl ProtocolError {
    pub(crate) fn io(context: &'static str, err: io::Error) -> ProtocolError {
        ProtocolError::Io {
            context,
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// The typed server error, if this is one.
    pub fn server_error(&self) -> Option<ServerError> {
        match self {
            ProtocolError::Server(err) => Some(*err),
            _ => None,
        }
    }

    /// True when the underlying stream ended mid-frame.
    pub fn is_eof(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io {
                kind: io::ErrorKind::UnexpectedEof,
                ..
            }
        )
    }

    /// True for I/O deadline expiry reported by the socket itself.
    pub fn is_io_timeout(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io {
                kind: io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock,
                ..
            }
        )
    }
}

/// Attaches a short context string to an [`io::Error`], in the spirit of
/// `Result::context` but without pulling in a full error-report crate.
pub trait IoErrorContext<T> {
    fn io_context(self, context: &'static str) -> Result<T, ProtocolError>;
}

impl<T> IoErrorContext<T> for Result<T, io::Error> {
    fn io_context(self, context: &'static str) -> Result<T, ProtocolError> {
        self.map_err(|err| ProtocolError::io(context, err))
    }
}
