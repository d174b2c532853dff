use crate::conn::Stream;
use crate::error::Error;
use skyhash_proto::{Arg, Reader, Value};
use std::time::Duration;

/// How a command's single reply element is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReplyKind {
    /// `!` status; code 0 is success, anything else the typed error.
    Status,
    /// `:` integer.
    Int,
    /// `%` float.
    Float,
    /// `+` string or `?` binary string.
    Text,
    /// `&`/`~` array of strings.
    TextSlice,
    /// `&`/`~` array of arbitrary values, errors kept in their slots.
    Slice,
    /// Whatever the server sends, as a raw [`Value`].
    Any,
}

/// One command: its serialised argument list, a reply-decoding strategy,
/// and slots for the typed result and error. Single-use; create a fresh
/// command per call.
#[derive(Debug, Clone)]
pub struct Cmd {
    args: Vec<Arg>,
    kind: ReplyKind,
    read_timeout: Option<Duration>,
    val: Value,
    err: Option<Error>,
}

impl Cmd {
    /// A raw command decoding its reply as a generic [`Value`]. This is
    /// the escape hatch for actions the typed catalogue does not cover.
    pub fn new(args: Vec<Arg>) -> Cmd {
        Cmd::with_kind(ReplyKind::Any, args)
    }

    pub(crate) fn with_kind(kind: ReplyKind, args: Vec<Arg>) -> Cmd {
        Cmd {
            args,
            kind,
            read_timeout: None,
            val: Value::Nil,
            err: None,
        }
    }

    /// A command whose reply is a bare status.
    pub fn new_status(args: Vec<Arg>) -> Cmd {
        Cmd::with_kind(ReplyKind::Status, args)
    }

    /// A command whose reply is an integer.
    pub fn new_int(args: Vec<Arg>) -> Cmd {
        Cmd::with_kind(ReplyKind::Int, args)
    }

    /// A command whose reply is a float.
    pub fn new_float(args: Vec<Arg>) -> Cmd {
        Cmd::with_kind(ReplyKind::Float, args)
    }

    /// A command whose reply is a string or binary string.
    pub fn new_text(args: Vec<Arg>) -> Cmd {
        Cmd::with_kind(ReplyKind::Text, args)
    }

    /// A command whose reply is a flat array of strings.
    pub fn new_text_slice(args: Vec<Arg>) -> Cmd {
        Cmd::with_kind(ReplyKind::TextSlice, args)
    }

    /// A command whose reply is an array of arbitrary values.
    pub fn new_slice(args: Vec<Arg>) -> Cmd {
        Cmd::with_kind(ReplyKind::Slice, args)
    }

    /// Overrides the read deadline for this command only. Zero disables
    /// the deadline.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Cmd {
        self.read_timeout = Some(timeout);
        self
    }

    pub(crate) fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// The command name (its first argument), for diagnostics.
    pub fn name(&self) -> String {
        self.args
            .first()
            .map(|arg| arg.display_text())
            .unwrap_or_default()
    }

    /// The error recorded for this command, if any. [`Error::is_nil`]
    /// distinguishes the nil sentinel from real failures.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Records an error; the latest value wins.
    pub fn set_err(&mut self, err: Error) {
        self.err = Some(err);
    }

    /// The decoded reply value. [`Value::Nil`] until a reply arrives.
    pub fn value(&self) -> &Value {
        &self.val
    }

    /// The reply value, or the recorded error.
    pub fn result(&self) -> Result<Value, Error> {
        match &self.err {
            Some(err) => Err(err.clone()),
            None => Ok(self.val.clone()),
        }
    }

    /// Status commands: `Ok` on status 0, the recorded error otherwise.
    pub fn status(&self) -> Result<(), Error> {
        match &self.err {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// The reply as text. Binary replies are decoded lossily; use
    /// [`Cmd::bytes`] when exact bytes matter.
    pub fn text(&self) -> Result<String, Error> {
        let value = self.result()?;
        value.as_text().ok_or_else(|| unexpected("string", &value))
    }

    /// The reply's raw bytes.
    pub fn bytes(&self) -> Result<Vec<u8>, Error> {
        let value = self.result()?;
        value
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| unexpected("bytes", &value))
    }

    pub fn int64(&self) -> Result<i64, Error> {
        let value = self.result()?;
        value.as_int().ok_or_else(|| unexpected("integer", &value))
    }

    pub fn float(&self) -> Result<f32, Error> {
        let value = self.result()?;
        value.as_float().ok_or_else(|| unexpected("float", &value))
    }

    /// The reply as a list of strings.
    pub fn strings(&self) -> Result<Vec<String>, Error> {
        let value = self.result()?;
        match &value {
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_text()
                        .ok_or_else(|| unexpected("string", item))
                })
                .collect(),
            _ => Err(unexpected("string array", &value)),
        }
    }

    /// The reply as a list of raw values, per-element errors included.
    pub fn values(&self) -> Result<Vec<Value>, Error> {
        let value = self.result()?;
        match value {
            Value::Array(items) => Ok(items),
            other => Err(unexpected("array", &other)),
        }
    }

    /// Decodes exactly one reply element off `rd` according to this
    /// command's kind and stores it. The caller records any error on the
    /// command.
    pub(crate) async fn read_reply(&mut self, rd: &mut Reader<Stream>) -> Result<(), Error> {
        let value = match self.kind {
            ReplyKind::Status => rd.read_status().await.map(|()| Value::Nil),
            ReplyKind::Int => rd.read_int().await.map(Value::Int),
            ReplyKind::Float => rd.read_float().await.map(Value::Float),
            ReplyKind::Text => rd.read_text().await,
            ReplyKind::TextSlice => rd
                .read_string_slice()
                .await
                .map(|items| Value::Array(items.into_iter().map(Value::Str).collect())),
            ReplyKind::Slice => rd.read_slice().await.map(Value::Array),
            ReplyKind::Any => rd.read_value().await,
        };
        match value {
            Ok(value) => {
                self.val = value;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn unexpected(expected: &'static str, value: &Value) -> Error {
    Error::Protocol(skyhash_proto::ProtocolError::UnexpectedType {
        expected,
        snippet: format!("{value:?}"),
    })
}

/// The first error recorded across a batch, the way a pipeline reports
/// its aggregate outcome.
pub fn first_command_error(cmds: &[Cmd]) -> Result<(), Error> {
    for cmd in cmds {
        if let Some(err) = cmd.err() {
            return Err(err.clone());
        }
    }
    Ok(())
}

/// Stamps every command in a batch with the same error.
pub(crate) fn set_cmds_err(cmds: &mut [Cmd], err: &Error) {
    for cmd in cmds {
        cmd.set_err(err.clone());
    }
}
