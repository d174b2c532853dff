use crate::arg::Arg;
use crate::{LEAD_ANY_ARRAY, LEAD_METAFRAME};

/// Encodes request frames into an owned byte buffer.
///
/// The writer never touches the socket. A connection stages a whole frame
/// here (one metaframe plus its elements), then ships the buffer in a
/// single deadline-bounded write so a failed write leaves nothing half
/// sent.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Writer {
        Writer {
            buf: Vec::with_capacity(256),
        }
    }

    /// Writes the metaframe `*<count>\n` announcing `count` elements.
    pub fn write_meta_frame(&mut self, count: usize) {
        self.buf.push(LEAD_METAFRAME);
        self.put_decimal(count);
    }

    /// Writes one command element: `~<K>\n` followed by each argument as
    /// `<len>\n<payload>\n`.
    pub fn write_element(&mut self, args: &[Arg]) {
        self.buf.push(LEAD_ANY_ARRAY);
        self.put_decimal(args.len());
        for arg in args {
            let payload = arg.payload();
            self.put_decimal(payload.len());
            self.buf.extend_from_slice(&payload);
            self.buf.push(b'\n');
        }
    }

    /// The encoded frame so far.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Discards everything staged so far.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    fn put_decimal(&mut self, n: usize) {
        self.buf.extend_from_slice(n.to_string().as_bytes());
        self.buf.push(b'\n');
    }
}
