use crate::client::ConnClient;
use crate::conn::Stream;
use crate::error::Error;
use crate::metrics::PoolMetrics;
use futures::future::BoxFuture;
use rand::Rng;
use rustls::pki_types::ServerName;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// A rate limiter or circuit breaker consulted around every operation.
///
/// `allow` runs before a connection is acquired; when it passes, the
/// client reports the outcome of the operation through `report_result`
/// whether it succeeded or failed, so breakers can trip.
pub trait Limiter: Send + Sync {
    fn allow(&self) -> Result<(), Error>;
    fn report_result(&self, result: Result<(), &Error>);
}

/// Custom connection factory. Takes `(network, addr)` and has priority
/// over `network`, `addr` and `tls_config`.
pub type Dialer =
    Arc<dyn Fn(&str, &str) -> BoxFuture<'static, Result<Stream, Error>> + Send + Sync>;

/// Called once per connection after initialisation (auth and table
/// selection) completes.
pub type OnConnect =
    Arc<dyn for<'a> Fn(&'a ConnClient) -> BoxFuture<'a, Result<(), Error>> + Send + Sync>;

/// Supplies `(username, token)` just before each connection authenticates,
/// so credentials can rotate without rebuilding the client.
pub type CredentialsProvider = Arc<dyn Fn() -> (String, String) + Send + Sync>;

/// Client configuration.
///
/// Every `Option` field reads as: `None` means "use the default",
/// `Some(Duration::ZERO)` (or `Some(0)`) means "explicitly off". The
/// struct is normalised once by [`Client::new`](crate::Client::new) and
/// treated as immutable afterwards.
#[derive(Clone, Default)]
pub struct Options {
    /// The network type; only `tcp` is recognised. Defaults to `tcp`.
    pub network: String,
    /// `host:port` of the server. Defaults to `localhost:2003`.
    pub addr: String,

    /// Custom connection factory, overriding `network`, `addr` and
    /// `tls_config`.
    pub dialer: Option<Dialer>,

    /// Hook invoked when a new connection has been established and
    /// initialised.
    pub on_connect: Option<OnConnect>,

    /// Username sent as `AUTH <username> <token>` during connection
    /// initialisation. Authn is off when empty.
    pub username: String,
    /// Token paired with `username`.
    pub token: String,
    /// Dynamic credentials source; takes precedence over the static pair.
    pub credentials_provider: Option<CredentialsProvider>,

    /// Table selected with `USE <fqe>` after connecting. Bare names get
    /// the `default:` keyspace prefix.
    pub table: String,

    /// Retries before giving up. `None` is 3, `Some(0)` disables retries.
    pub max_retries: Option<u32>,
    /// Minimum backoff between retries. `None` is 8 ms, zero disables
    /// backoff.
    pub min_retry_backoff: Option<Duration>,
    /// Maximum backoff between retries. `None` is 512 ms, zero disables
    /// backoff.
    pub max_retry_backoff: Option<Duration>,

    /// Deadline for establishing new connections. `None` is 5 s.
    pub dial_timeout: Option<Duration>,
    /// Deadline for socket reads. `None` is 3 s, zero means no deadline.
    pub read_timeout: Option<Duration>,
    /// Deadline for socket writes. `None` mirrors `read_timeout`, zero
    /// means no deadline.
    pub write_timeout: Option<Duration>,

    /// Hand out idle connections oldest-first instead of newest-first.
    pub pool_fifo: bool,
    /// Maximum number of socket connections. `None` is 10 per CPU.
    pub pool_size: Option<usize>,
    /// Number of idle connections dialed ahead of demand.
    pub min_idle_conns: usize,
    /// Age at which a connection is retired. `None` keeps connections
    /// indefinitely.
    pub max_conn_age: Option<Duration>,
    /// How long a caller waits for a free connection when the pool is
    /// exhausted. `None` is `read_timeout + 1s`.
    pub pool_timeout: Option<Duration>,
    /// Idle age at which connections are closed. `None` is 5 minutes,
    /// zero disables the check.
    pub idle_timeout: Option<Duration>,
    /// Reaper wake-up period. `None` is 1 minute, zero disables the
    /// reaper (stale connections are still discarded on checkout).
    pub idle_check_frequency: Option<Duration>,

    /// When set, the default dialer negotiates TLS with this config.
    pub tls_config: Option<Arc<rustls::ClientConfig>>,

    /// Rate limiter or circuit breaker.
    pub limiter: Option<Arc<dyn Limiter>>,

    /// Prometheus gauges and counters updated by the connection pool.
    pub pool_metrics: Option<Arc<PoolMetrics>>,
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("network", &self.network)
            .field("addr", &self.addr)
            .field("table", &self.table)
            .field("pool_size", &self.pool_size)
            .field("pool_fifo", &self.pool_fifo)
            .field("min_idle_conns", &self.min_idle_conns)
            .field("max_retries", &self.max_retries)
            .field("tls", &self.tls_config.is_some())
            .finish_non_exhaustive()
    }
}

impl Options {
    /// Fills in every unset field. Called once; afterwards the options
    /// are shared immutably.
    pub(crate) fn init(&mut self) {
        if self.addr.is_empty() {
            self.addr = "localhost:2003".to_owned();
        }
        if self.network.is_empty() {
            self.network = "tcp".to_owned();
        }
        if !self.table.is_empty() && !self.table.contains(':') {
            self.table = format!("default:{}", self.table);
        }
        if self.dial_timeout.is_none() {
            self.dial_timeout = Some(Duration::from_secs(5));
        }
        if self.pool_size.is_none() {
            let cpus = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            self.pool_size = Some(10 * cpus);
        }
        if self.read_timeout.is_none() {
            self.read_timeout = Some(Duration::from_secs(3));
        }
        if self.write_timeout.is_none() {
            self.write_timeout = self.read_timeout;
        }
        if self.pool_timeout.is_none() {
            let read = self.read_timeout.unwrap_or_default();
            self.pool_timeout = Some(read + Duration::from_secs(1));
        }
        if self.idle_timeout.is_none() {
            self.idle_timeout = Some(Duration::from_secs(5 * 60));
        }
        if self.idle_check_frequency.is_none() {
            self.idle_check_frequency = Some(Duration::from_secs(60));
        }
        if self.max_retries.is_none() {
            self.max_retries = Some(3);
        }
        if self.min_retry_backoff.is_none() {
            self.min_retry_backoff = Some(Duration::from_millis(8));
        }
        if self.max_retry_backoff.is_none() {
            self.max_retry_backoff = Some(Duration::from_millis(512));
        }
        if self.dialer.is_none() {
            self.dialer = Some(default_dialer(
                self.dial_timeout.unwrap_or(Duration::from_secs(5)),
                self.tls_config.clone(),
            ));
        }
    }

    pub(crate) fn pool_size(&self) -> usize {
        self.pool_size.unwrap_or(1).max(1)
    }

    pub(crate) fn retries(&self) -> u32 {
        self.max_retries.unwrap_or(0)
    }

    pub(crate) fn read_deadline(&self) -> Option<Duration> {
        nonzero(self.read_timeout)
    }

    pub(crate) fn write_deadline(&self) -> Option<Duration> {
        nonzero(self.write_timeout)
    }

    pub(crate) fn pool_wait(&self) -> Duration {
        self.pool_timeout.unwrap_or(Duration::from_secs(4))
    }

    pub(crate) fn idle_deadline(&self) -> Option<Duration> {
        nonzero(self.idle_timeout)
    }

    pub(crate) fn reaper_period(&self) -> Option<Duration> {
        nonzero(self.idle_check_frequency)
    }

    pub(crate) fn conn_age_limit(&self) -> Option<Duration> {
        nonzero(self.max_conn_age)
    }

    pub(crate) fn dialer(&self) -> Dialer {
        match &self.dialer {
            Some(dialer) => dialer.clone(),
            None => default_dialer(
                self.dial_timeout.unwrap_or(Duration::from_secs(5)),
                self.tls_config.clone(),
            ),
        }
    }

    /// Exponential backoff with jitter: uniform in
    /// `[min << (attempt-1), min << attempt]`, both ends capped at
    /// `max`. Zero bounds disable sleeping.
    pub(crate) fn retry_backoff(&self, attempt: u32) -> Duration {
        retry_backoff(
            attempt,
            self.min_retry_backoff.unwrap_or_default(),
            self.max_retry_backoff.unwrap_or_default(),
        )
    }
}

fn nonzero(value: Option<Duration>) -> Option<Duration> {
    value.filter(|d| !d.is_zero())
}

fn default_dialer(dial_timeout: Duration, tls: Option<Arc<rustls::ClientConfig>>) -> Dialer {
    Arc::new(move |_network, addr| {
        let addr = addr.to_owned();
        let tls = tls.clone();
        Box::pin(async move {
            let stream = tokio::time::timeout(dial_timeout, TcpStream::connect(&addr))
                .await
                .map_err(|_| Error::Timeout("dial"))?
                .map_err(Error::dial_io)?;
            let _ = stream.set_nodelay(true);

            let Some(config) = tls else {
                return Ok(Stream::Tcp(stream));
            };

            let host = addr.rsplit_once(':').map(|(h, _)| h).unwrap_or(&addr);
            let name = ServerName::try_from(host.to_owned()).map_err(|err| {
                Error::dial_io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    err,
                ))
            })?;
            let tls_stream = TlsConnector::from(config)
                .connect(name, stream)
                .await
                .map_err(Error::dial_io)?;
            Ok(Stream::Tls(Box::new(tls_stream)))
        })
    })
}

pub(crate) fn retry_backoff(attempt: u32, min: Duration, max: Duration) -> Duration {
    if min.is_zero() && max.is_zero() {
        return Duration::ZERO;
    }
    let attempt = attempt.max(1).min(63);
    let min_n = min.as_nanos();
    let max_n = max.as_nanos();
    let lower = (min_n << (attempt - 1)).min(max_n);
    let upper = (min_n << attempt).min(max_n).max(lower);
    if upper == 0 {
        return Duration::ZERO;
    }
    let nanos = rand::rng().random_range(lower..=upper);
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_applies_documented_defaults() {
        let mut opt = Options::default();
        opt.init();
        assert_eq!(opt.addr, "localhost:2003");
        assert_eq!(opt.network, "tcp");
        assert_eq!(opt.dial_timeout, Some(Duration::from_secs(5)));
        assert_eq!(opt.read_timeout, Some(Duration::from_secs(3)));
        assert_eq!(opt.write_timeout, Some(Duration::from_secs(3)));
        assert_eq!(opt.pool_timeout, Some(Duration::from_secs(4)));
        assert_eq!(opt.idle_timeout, Some(Duration::from_secs(300)));
        assert_eq!(opt.idle_check_frequency, Some(Duration::from_secs(60)));
        assert_eq!(opt.max_retries, Some(3));
        assert_eq!(opt.min_retry_backoff, Some(Duration::from_millis(8)));
        assert_eq!(opt.max_retry_backoff, Some(Duration::from_millis(512)));
        assert!(opt.pool_size.unwrap() >= 10);
        assert!(opt.dialer.is_some());
    }

    #[test]
    fn bare_table_names_get_default_keyspace() {
        let mut opt = Options {
            table: "test".to_owned(),
            ..Options::default()
        };
        opt.init();
        assert_eq!(opt.table, "default:test");

        let mut opt = Options {
            table: "super:cyan".to_owned(),
            ..Options::default()
        };
        opt.init();
        assert_eq!(opt.table, "super:cyan");
    }

    #[test]
    fn explicit_zero_disables_deadlines() {
        let mut opt = Options {
            read_timeout: Some(Duration::ZERO),
            ..Options::default()
        };
        opt.init();
        assert_eq!(opt.read_deadline(), None);
        assert_eq!(opt.write_deadline(), None);
    }

    #[test]
    fn backoff_stays_within_bounds() {
        let min = Duration::from_millis(8);
        let max = Duration::from_millis(512);
        for attempt in 1..10 {
            let d = retry_backoff(attempt, min, max);
            assert!(d >= min, "attempt {attempt}: {d:?}");
            assert!(d <= max, "attempt {attempt}: {d:?}");
        }
        assert_eq!(
            retry_backoff(3, Duration::ZERO, Duration::ZERO),
            Duration::ZERO
        );
    }
}
