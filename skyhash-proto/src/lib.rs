//! Streaming codec for the Skyhash wire protocol.
//!
//! Skyhash is a line-oriented framing over TCP. Every frame starts with a
//! metaframe `*<N>\n` announcing the number of elements that follow. A
//! request element is a typed argument array (`~<K>\n` followed by
//! length-prefixed arguments); a reply element is a single typed value
//! dispatched on its lead byte.
//!
//! The codec is split in two halves that never see each other:
//! [`Writer`] encodes argument arrays into an owned byte buffer, and
//! [`Reader`] parses one reply element at a time from a buffered byte
//! stream. Interpretation of replies (e.g. status 0 is success, status 1
//! is the nil sentinel) is left entirely to the caller.

pub mod arg;
pub mod error;
pub mod reader;
pub mod status;
pub mod value;
pub mod writer;

#[cfg(test)]
mod tests;

pub use arg::Arg;
pub use error::{IoErrorContext, ProtocolError};
pub use reader::Reader;
pub use status::ServerError;
pub use value::Value;
pub use writer::Writer;

/// Lead byte of a string reply: `+<len>\n<bytes>\n`.
pub const LEAD_STRING: u8 = b'+';
/// Lead byte of an array reply: `&<count>\n` followed by `count` elements.
pub const LEAD_ARRAY: u8 = b'&';
/// Lead byte of an any-array reply, parsed exactly like [`LEAD_ARRAY`].
pub const LEAD_ANY_ARRAY: u8 = b'~';
/// Lead byte of an integer reply: `:<len>\n<decimal>\n`.
pub const LEAD_INT: u8 = b':';
/// Lead byte of a float reply: `%<len>\n<decimal>\n`.
pub const LEAD_FLOAT: u8 = b'%';
/// Lead byte of a binary string reply: `?<len>\n<bytes>\n`.
pub const LEAD_BLOB: u8 = b'?';
/// Lead byte of a status reply: `!<len>\n<code>\n`.
pub const LEAD_STATUS: u8 = b'!';
/// Lead byte of a metaframe: `*<count>\n`. Only valid at frame boundaries.
pub const LEAD_METAFRAME: u8 = b'*';

/// How many bytes of a malformed line are quoted back in errors.
pub(crate) const ERR_SNIPPET_LEN: usize = 100;

/// Upper bound on a single length-prefixed payload (16 MiB). A length
/// header past this is treated as corrupt framing rather than an
/// allocation request.
pub const MAX_PAYLOAD_SIZE: usize = 0x0100_0000;
