use crate::error::Error;
use skyhash_proto::{IoErrorContext, Reader, Writer};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// The byte stream under a connection: plain TCP or TLS over TCP.
pub enum Stream {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_flush(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// One pooled connection: the stream behind a buffered reply parser, a
/// staging buffer for outgoing frames, and bookkeeping for the pool's
/// staleness checks.
pub(crate) struct Conn {
    reader: Reader<Stream>,
    wbuf: Writer,
    pub(crate) inited: bool,
    created_at: Instant,
    used_at: AtomicU64,
}

impl Conn {
    pub(crate) fn new(stream: Stream) -> Conn {
        Conn {
            reader: Reader::new(stream),
            wbuf: Writer::new(),
            inited: false,
            created_at: Instant::now(),
            used_at: AtomicU64::new(now_millis()),
        }
    }

    /// Stages a frame with `encode`, then ships it in one
    /// deadline-bounded write and flush. On failure the staged bytes are
    /// discarded so nothing half-written leaks into a later attempt.
    pub(crate) async fn with_writer(
        &mut self,
        deadline: Option<Duration>,
        encode: impl FnOnce(&mut Writer),
    ) -> Result<(), Error> {
        self.wbuf.clear();
        encode(&mut self.wbuf);

        let Conn { reader, wbuf, .. } = self;
        let stream = reader.get_mut();
        let io = async {
            stream
                .write_all(wbuf.bytes())
                .await
                .io_context("failed to write command")?;
            stream
                .flush()
                .await
                .io_context("failed to flush command")?;
            Ok::<(), Error>(())
        };
        let res = with_deadline(deadline, "write", io).await;
        match res {
            Ok(()) => {
                self.wbuf.clear();
                self.touch();
                Ok(())
            }
            Err(err) => {
                self.wbuf.clear();
                Err(err)
            }
        }
    }

    /// The reply parser sharing this connection's socket. Reads are
    /// bounded by wrapping the whole scope in [`with_deadline`]; callers
    /// [`touch`](Conn::touch) on success.
    pub(crate) fn reader(&mut self) -> &mut Reader<Stream> {
        &mut self.reader
    }

    /// Records activity. `used_at` never moves backwards.
    pub(crate) fn touch(&self) {
        self.used_at.fetch_max(now_millis(), Ordering::Relaxed);
    }

    pub(crate) fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub(crate) fn idle_for(&self) -> Duration {
        let last = self.used_at.load(Ordering::Relaxed);
        Duration::from_millis(now_millis().saturating_sub(last))
    }
}

/// Runs `fut` under an optional deadline, mapping expiry to
/// [`Error::Timeout`] tagged with `op`.
pub(crate) async fn with_deadline<T>(
    deadline: Option<Duration>,
    op: &'static str,
    fut: impl Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
    match deadline {
        Some(d) if !d.is_zero() => match tokio::time::timeout(d, fut).await {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout(op)),
        },
        _ => fut.await,
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
