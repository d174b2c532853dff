//! The server status-code table.
//!
//! A status reply (`!<len>\n<code>\n`) carries a decimal code. Code 0 means
//! success and never surfaces as an error; codes 1 through 11 map to the
//! typed errors below; anything else is carried opaquely.

use thiserror::Error;

/// A typed error reported by the server as a status code.
///
/// `ServerError::Nil` (status 1) is the nil sentinel: it signals "no such
/// object" and is routinely compared against rather than treated as a
/// failure. It does not abort pipelines and does not evict connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ServerError {
    /// Status 1, the client asked for a non-existent object.
    #[error("skyhash: nil")]
    Nil,
    /// Status 2, the client tried to overwrite existing data.
    #[error("skyhash: overwrite error")]
    Overwrite,
    /// Status 3, the action was malformed.
    #[error("skyhash: action error")]
    Action,
    /// Status 4, the packet was malformed.
    #[error("skyhash: packet error")]
    Packet,
    /// Status 5, an error occurred on the server side.
    #[error("skyhash: server error")]
    Server,
    /// Status 6, some other error.
    #[error("skyhash: other error")]
    Other,
    /// Status 7, an action was run against the wrong data type.
    #[error("skyhash: wrong type error")]
    WrongType,
    /// Status 8, the server did not understand the data type.
    #[error("skyhash: unknown data type")]
    UnknownDataType,
    /// Status 9, the server could not encode or decode a value.
    #[error("skyhash: encoding error")]
    Encoding,
    /// Status 10, the authn credentials are invalid.
    #[error("skyhash: bad credentials")]
    BadCredentials,
    /// Status 11, the current user is not allowed to perform the action.
    #[error("skyhash: authn realm error")]
    AuthnRealm,
    /// Any status code the client does not know about (12 and up).
    #[error("skyhash: unknown status {0}")]
    Unknown(i64),
}

impl ServerError {
    /// Maps a status code to its typed error. Code 0 is success and maps
    /// to `None`.
    pub fn from_code(code: i64) -> Option<ServerError> {
        Some(match code {
            0 => return None,
            1 => ServerError::Nil,
            2 => ServerError::Overwrite,
            3 => ServerError::Action,
            4 => ServerError::Packet,
            5 => ServerError::Server,
            6 => ServerError::Other,
            7 => ServerError::WrongType,
            8 => ServerError::UnknownDataType,
            9 => ServerError::Encoding,
            10 => ServerError::BadCredentials,
            11 => ServerError::AuthnRealm,
            other => ServerError::Unknown(other),
        })
    }

    /// The numeric status code this error was parsed from.
    pub fn code(&self) -> i64 {
        match self {
            ServerError::Nil => 1,
            ServerError::Overwrite => 2,
            ServerError::Action => 3,
            ServerError::Packet => 4,
            ServerError::Server => 5,
            ServerError::Other => 6,
            ServerError::WrongType => 7,
            ServerError::UnknownDataType => 8,
            ServerError::Encoding => 9,
            ServerError::BadCredentials => 10,
            ServerError::AuthnRealm => 11,
            ServerError::Unknown(code) => *code,
        }
    }

    /// True for the nil sentinel (status 1).
    pub fn is_nil(&self) -> bool {
        matches!(self, ServerError::Nil)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_mapping_round_trips() {
        for code in 1..=11 {
            let err = ServerError::from_code(code).unwrap();
            assert_eq!(err.code(), code);
        }
        assert_eq!(ServerError::from_code(0), None);
        assert_eq!(ServerError::from_code(42), Some(ServerError::Unknown(42)));
    }
}
