use crate::error::{IoErrorContext, ProtocolError};
use crate::status::ServerError;
use crate::value::Value;
use crate::{
    ERR_SNIPPET_LEN, LEAD_ANY_ARRAY, LEAD_ARRAY, LEAD_BLOB, LEAD_FLOAT, LEAD_INT, LEAD_METAFRAME,
    LEAD_STATUS, LEAD_STRING,
};
use std::future::Future;
use std::io;
use std::pin::Pin;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

/// Parses reply frames from a buffered byte stream.
///
/// One call consumes exactly one reply element (or one metaframe). The
/// reader holds no command context: it hands back raw values and typed
/// status errors and leaves their interpretation to the caller.
#[derive(Debug)]
pub struct Reader<R> {
    rd: BufReader<R>,
    line: Vec<u8>,
}

impl<R: AsyncRead + Unpin> Reader<R> {
    pub fn new(inner: R) -> Reader<R> {
        Reader {
            rd: BufReader::new(inner),
            line: Vec::with_capacity(64),
        }
    }

    /// A reader with a custom internal buffer size. Lines longer than the
    /// buffer still parse; the line accumulator grows as needed.
    pub fn with_capacity(capacity: usize, inner: R) -> Reader<R> {
        Reader {
            rd: BufReader::with_capacity(capacity, inner),
            line: Vec::with_capacity(64),
        }
    }

    /// The underlying stream, for writes that share the socket.
    pub fn get_mut(&mut self) -> &mut R {
        self.rd.get_mut()
    }

    pub fn into_inner(self) -> R {
        self.rd.into_inner()
    }

    /// Reads the metaframe `*<count>\n` that opens a reply frame.
    pub async fn read_meta_frame(&mut self) -> Result<usize, ProtocolError> {
        self.read_line().await?;
        if self.line[0] != LEAD_METAFRAME {
            return Err(ProtocolError::InvalidMetaFrame(self.snippet()));
        }
        parse_usize(&self.line[1..]).ok_or_else(|| ProtocolError::InvalidMetaFrame(self.snippet()))
    }

    /// Consumes one status element. Code 0 maps to `Ok(())`, everything
    /// else to the typed error.
    pub async fn read_status(&mut self) -> Result<(), ProtocolError> {
        self.read_line().await?;
        if self.line[0] != LEAD_STATUS {
            return Err(self.unexpected("status"));
        }
        match self.read_status_body().await? {
            None => Ok(()),
            Some(err) => Err(err.into()),
        }
    }

    /// Consumes one integer element.
    pub async fn read_int(&mut self) -> Result<i64, ProtocolError> {
        self.read_line().await?;
        match self.line[0] {
            LEAD_STATUS => Err(self.status_as_type_error("integer").await?),
            LEAD_INT => {
                let payload = self.read_sized_payload().await?;
                parse_i64(&payload).ok_or_else(|| ProtocolError::InvalidReply(snippet_of(&payload)))
            }
            _ => Err(self.unexpected("integer")),
        }
    }

    /// Consumes one float element. `inf` and `-inf` parse to the infinities.
    pub async fn read_float(&mut self) -> Result<f32, ProtocolError> {
        self.read_line().await?;
        match self.line[0] {
            LEAD_STATUS => Err(self.status_as_type_error("float").await?),
            LEAD_FLOAT => {
                let payload = self.read_sized_payload().await?;
                parse_f32(&payload).ok_or_else(|| ProtocolError::InvalidReply(snippet_of(&payload)))
            }
            _ => Err(self.unexpected("float")),
        }
    }

    /// Consumes one string (`+`) or binary string (`?`) element. Both are
    /// length-prefixed, so payloads may contain any byte including `\n`.
    pub async fn read_text(&mut self) -> Result<Value, ProtocolError> {
        self.read_line().await?;
        match self.line[0] {
            LEAD_STATUS => Err(self.status_as_type_error("string").await?),
            LEAD_STRING => {
                let payload = self.read_sized_payload().await?;
                Ok(match String::from_utf8(payload) {
                    Ok(s) => Value::Str(s),
                    Err(err) => Value::Bin(err.into_bytes()),
                })
            }
            LEAD_BLOB => Ok(Value::Bin(self.read_sized_payload().await?)),
            _ => Err(self.unexpected("string")),
        }
    }

    /// Consumes one array element whose items are strings. A nil sentinel
    /// in a slot becomes an empty string; any other typed error aborts.
    pub async fn read_string_slice(&mut self) -> Result<Vec<String>, ProtocolError>
    where
        R: Send,
    {
        self.read_line().await?;
        match self.line[0] {
            LEAD_STATUS => Err(self.status_as_type_error("string array").await?),
            LEAD_ARRAY | LEAD_ANY_ARRAY => {
                let count = self.reply_len()?;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    match self.read_value().await {
                        Ok(Value::Str(s)) => items.push(s),
                        Ok(Value::Bin(b)) => items.push(String::from_utf8_lossy(&b).into_owned()),
                        Ok(Value::Nil) | Err(ProtocolError::Server(ServerError::Nil)) => {
                            items.push(String::new())
                        }
                        Ok(other) => {
                            return Err(ProtocolError::UnexpectedType {
                                expected: "string",
                                snippet: format!("{other:?}"),
                            });
                        }
                        Err(err) => return Err(err),
                    }
                }
                Ok(items)
            }
            _ => Err(self.unexpected("string array")),
        }
    }

    /// Consumes one array element with heterogeneous items. Typed status
    /// errors land in their slot instead of aborting the parse.
    pub async fn read_slice(&mut self) -> Result<Vec<Value>, ProtocolError>
    where
        R: Send,
    {
        self.read_line().await?;
        match self.line[0] {
            LEAD_STATUS => Err(self.status_as_type_error("array").await?),
            LEAD_ARRAY | LEAD_ANY_ARRAY => {
                let count = self.reply_len()?;
                self.read_array_items(count).await
            }
            _ => Err(self.unexpected("array")),
        }
    }

    /// Consumes one element of any type. Status code 0 reads as
    /// `Value::Int(0)`; non-zero statuses surface as the typed error.
    pub fn read_value(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ProtocolError>> + Send + '_>>
    where
        R: Send,
    {
        Box::pin(async move {
            self.read_line().await?;
            match self.line[0] {
                LEAD_STATUS => match self.read_status_body().await? {
                    None => Ok(Value::Int(0)),
                    Some(err) => Err(err.into()),
                },
                LEAD_INT => {
                    let payload = self.read_sized_payload().await?;
                    parse_i64(&payload)
                        .map(Value::Int)
                        .ok_or_else(|| ProtocolError::InvalidReply(snippet_of(&payload)))
                }
                LEAD_FLOAT => {
                    let payload = self.read_sized_payload().await?;
                    parse_f32(&payload)
                        .map(Value::Float)
                        .ok_or_else(|| ProtocolError::InvalidReply(snippet_of(&payload)))
                }
                LEAD_STRING => {
                    let payload = self.read_sized_payload().await?;
                    Ok(match String::from_utf8(payload) {
                        Ok(s) => Value::Str(s),
                        Err(err) => Value::Bin(err.into_bytes()),
                    })
                }
                LEAD_BLOB => Ok(Value::Bin(self.read_sized_payload().await?)),
                LEAD_ARRAY | LEAD_ANY_ARRAY => {
                    let count = self.reply_len()?;
                    self.read_array_items(count).await.map(Value::Array)
                }
                _ => Err(ProtocolError::InvalidReply(self.snippet())),
            }
        })
    }

    async fn read_array_items(&mut self, count: usize) -> Result<Vec<Value>, ProtocolError>
    where
        R: Send,
    {
        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            match self.read_value().await {
                Ok(value) => items.push(value),
                Err(ProtocolError::Server(err)) => items.push(Value::from(err)),
                Err(err) => return Err(err),
            }
        }
        Ok(items)
    }

    /// Reads bytes up to the next `\n` into the line accumulator, growing
    /// past the internal buffer if needed. The terminator is stripped.
    async fn read_line(&mut self) -> Result<(), ProtocolError> {
        self.line.clear();
        let n = self
            .rd
            .read_until(b'\n', &mut self.line)
            .await
            .io_context("failed to read reply line")?;
        if n == 0 || self.line.last() != Some(&b'\n') {
            return Err(ProtocolError::Io {
                context: "failed to read reply line",
                kind: io::ErrorKind::UnexpectedEof,
                message: "stream ended mid-frame".to_owned(),
            });
        }
        self.line.pop();
        if self.line.is_empty() {
            return Err(ProtocolError::InvalidReply(self.snippet()));
        }
        Ok(())
    }

    /// Parses the `<len>` header of the current line and reads that many
    /// payload bytes plus the trailing `\n`.
    async fn read_sized_payload(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.reply_len()?;
        if len > crate::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                length: len,
                max: crate::MAX_PAYLOAD_SIZE,
            });
        }
        let mut buf = vec![0u8; len + 1];
        self.rd
            .read_exact(&mut buf)
            .await
            .io_context("failed to read reply payload")?;
        if buf.pop() != Some(b'\n') {
            return Err(ProtocolError::InvalidReply(snippet_of(&buf)));
        }
        Ok(buf)
    }

    /// Status element body, with the `!<len>` header already in `line`.
    async fn read_status_body(&mut self) -> Result<Option<ServerError>, ProtocolError> {
        let payload = self.read_sized_payload().await?;
        let code =
            parse_i64(&payload).ok_or_else(|| ProtocolError::InvalidReply(snippet_of(&payload)))?;
        Ok(ServerError::from_code(code))
    }

    /// A status in a position where another type was expected: non-zero
    /// codes surface as the server error, code 0 as a type mismatch.
    async fn status_as_type_error(
        &mut self,
        expected: &'static str,
    ) -> Result<ProtocolError, ProtocolError> {
        let snippet = self.snippet();
        Ok(match self.read_status_body().await? {
            Some(err) => err.into(),
            None => ProtocolError::UnexpectedType { expected, snippet },
        })
    }

    fn reply_len(&self) -> Result<usize, ProtocolError> {
        parse_usize(&self.line[1..]).ok_or_else(|| ProtocolError::InvalidReply(self.snippet()))
    }

    fn unexpected(&self, expected: &'static str) -> ProtocolError {
        ProtocolError::UnexpectedType {
            expected,
            snippet: self.snippet(),
        }
    }

    fn snippet(&self) -> String {
        snippet_of(&self.line)
    }
}

fn snippet_of(bytes: &[u8]) -> String {
    let cut = bytes.len().min(ERR_SNIPPET_LEN);
    String::from_utf8_lossy(&bytes[..cut]).into_owned()
}

fn parse_usize(bytes: &[u8]) -> Option<usize> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn parse_i64(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn parse_f32(bytes: &[u8]) -> Option<f32> {
    match bytes {
        b"inf" => Some(f32::INFINITY),
        b"-inf" => Some(f32::NEG_INFINITY),
        _ => std::str::from_utf8(bytes).ok()?.parse().ok(),
    }
}
