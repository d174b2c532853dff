use crate::command::{first_command_error, set_cmds_err, Cmd};
use crate::conn::with_deadline;
use crate::error::{is_bad_conn, should_retry, Error};
use crate::hooks::{process_pipeline_with_hooks, process_with_hooks, Hook};
use crate::options::Options;
use crate::pool::{ConnPool, PoolStats, Pooler, PooledConn, SingleConnPool, StickyConnPool};
use futures::future::BoxFuture;
use skyhash_proto::Arg;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The pool-facing half shared by [`Client`] and [`ConnClient`]: turns a
/// command into bytes, exchanges one frame over a checked-out connection
/// and applies the retry policy.
#[derive(Clone)]
pub(crate) struct BaseClient {
    pub(crate) opt: Arc<Options>,
    pub(crate) pool: Pooler,
}

impl BaseClient {
    pub(crate) async fn process(&self, cmd: &mut Cmd) -> Result<(), Error> {
        let retries = self.opt.retries();
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let backoff = self.opt.retry_backoff(attempt);
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
            }
            match self.attempt(cmd).await {
                Ok(()) => return Ok(()),
                Err((err, retry)) => {
                    if !retry || attempt >= retries {
                        return Err(err);
                    }
                    debug!(attempt, "retrying command after error: {err}");
                }
            }
            attempt += 1;
        }
    }

    /// One round-trip: write `*1` plus the command element, read the
    /// reply metaframe, dispatch the command's reply decoder. Returns the
    /// error paired with whether a retry makes sense.
    async fn attempt(&self, cmd: &mut Cmd) -> Result<(), (Error, bool)> {
        let mut pc = match self.get_conn().await {
            Ok(pc) => pc,
            Err(err) => {
                let retry = should_retry(&err, true);
                return Err((err, retry));
            }
        };

        let mut wrote = false;
        let mut partial = false;

        let res = {
            let write = pc
                .conn_mut()
                .with_writer(self.opt.write_deadline(), |wr| {
                    wr.write_meta_frame(1);
                    wr.write_element(cmd.args());
                })
                .await;
            match write {
                Err(err) => Err(err),
                Ok(()) => {
                    wrote = true;
                    let deadline = self.cmd_deadline(cmd);
                    let conn = pc.conn_mut();
                    let read = async {
                        let rd = conn.reader();
                        let count = rd.read_meta_frame().await?;
                        partial = true;
                        if count != 1 {
                            return Err(Error::CountMismatch {
                                expected: 1,
                                got: count,
                            });
                        }
                        cmd.read_reply(rd).await
                    };
                    let res = with_deadline(deadline, "read", read).await;
                    if res.is_ok() {
                        conn.touch();
                    }
                    res
                }
            }
        };

        self.release_conn(pc, res.as_ref().err());
        res.map_err(|err| {
            // A timed-out read is only safe to retry when the write went
            // through whole and no reply bytes were consumed.
            let retry = should_retry(&err, wrote && !partial);
            (err, retry)
        })
    }

    pub(crate) async fn process_pipeline(&self, cmds: &mut [Cmd]) -> Result<(), Error> {
        if cmds.is_empty() {
            return Ok(());
        }
        let retries = self.opt.retries();
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let backoff = self.opt.retry_backoff(attempt);
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
            }
            match self.pipeline_attempt(cmds).await {
                Ok(()) => return first_command_error(cmds),
                Err((err, retry)) => {
                    if !retry || attempt >= retries {
                        set_cmds_err(cmds, &err);
                        return Err(err);
                    }
                    debug!(attempt, "retrying pipeline after error: {err}");
                }
            }
            attempt += 1;
        }
    }

    /// One batched round-trip: `*N` plus every element, then `N` replies
    /// in request order. Typed server errors stay on their command;
    /// transport errors fail the whole batch.
    async fn pipeline_attempt(&self, cmds: &mut [Cmd]) -> Result<(), (Error, bool)> {
        let mut pc = match self.get_conn().await {
            Ok(pc) => pc,
            Err(err) => {
                let retry = should_retry(&err, true);
                return Err((err, retry));
            }
        };

        let expected = cmds.len();
        let res = {
            let write = pc
                .conn_mut()
                .with_writer(self.opt.write_deadline(), |wr| {
                    wr.write_meta_frame(expected);
                    for cmd in cmds.iter() {
                        wr.write_element(cmd.args());
                    }
                })
                .await;
            match write {
                Err(err) => Err(err),
                Ok(()) => {
                    let deadline = self.opt.read_deadline();
                    let conn = pc.conn_mut();
                    let read = async {
                        let rd = conn.reader();
                        let count = rd.read_meta_frame().await?;
                        if count != expected {
                            return Err(Error::CountMismatch {
                                expected,
                                got: count,
                            });
                        }
                        for cmd in cmds.iter_mut() {
                            if let Err(err) = cmd.read_reply(rd).await {
                                cmd.set_err(err.clone());
                                if err.server_error().is_none() {
                                    return Err(err);
                                }
                            }
                        }
                        Ok(())
                    };
                    let res = with_deadline(deadline, "read", read).await;
                    if res.is_ok() {
                        conn.touch();
                    }
                    res
                }
            }
        };

        self.release_conn(pc, res.as_ref().err());
        res.map_err(|err| {
            let retry = should_retry(&err, true);
            (err, retry)
        })
    }

    async fn get_conn(&self) -> Result<PooledConn, Error> {
        if let Some(limiter) = &self.opt.limiter {
            limiter.allow()?;
        }
        match self.checked_out_conn().await {
            Ok(pc) => Ok(pc),
            Err(err) => {
                if let Some(limiter) = &self.opt.limiter {
                    limiter.report_result(Err(&err));
                }
                Err(err)
            }
        }
    }

    async fn checked_out_conn(&self) -> Result<PooledConn, Error> {
        let pc = self.pool.get().await?;
        if pc.inited() {
            return Ok(pc);
        }
        self.init_conn(pc).await
    }

    /// First-checkout initialisation: `AUTH`, `USE`, then the user's
    /// `on_connect` hook, all through a single-connection pool so the
    /// init commands cannot recurse into the pool being initialised.
    /// Failure at any step evicts the connection.
    ///
    /// Boxed: the init commands run back through `process`, and the
    /// cycle needs type erasure to keep the futures finite.
    fn init_conn(&self, mut pc: PooledConn) -> BoxFuture<'_, Result<PooledConn, Error>> {
        Box::pin(async move {
            pc.set_inited();

            let (username, token) = match &self.opt.credentials_provider {
                Some(provider) => provider(),
                None => (self.opt.username.clone(), self.opt.token.clone()),
            };

            let single = Arc::new(SingleConnPool::new(pc));
            let init_client = ConnClient {
                base: BaseClient {
                    opt: Arc::clone(&self.opt),
                    pool: Pooler::Single(Arc::clone(&single)),
                },
                hooks: Vec::new(),
            };

            let res = async {
                if !username.is_empty() && !token.is_empty() {
                    init_client.login(&username, &token).await?;
                }
                if !self.opt.table.is_empty() {
                    init_client.use_entity(&self.opt.table).await?;
                }
                if let Some(on_connect) = &self.opt.on_connect {
                    on_connect(&init_client).await?;
                }
                Ok(())
            }
            .await;

            drop(init_client);
            match res {
                Ok(()) => single.take().ok_or(Error::ConnBusy),
                Err(err) => {
                    if let Some(pc) = single.take() {
                        self.pool.remove(pc);
                    }
                    Err(err)
                }
            }
        })
    }

    fn release_conn(&self, pc: PooledConn, err: Option<&Error>) {
        if let Some(limiter) = &self.opt.limiter {
            limiter.report_result(match err {
                Some(err) => Err(err),
                None => Ok(()),
            });
        }
        match err {
            Some(err) if is_bad_conn(err, false, &self.opt.addr) => self.pool.remove(pc),
            _ => self.pool.put(pc),
        }
    }

    /// The read deadline for one command: its override plus a 10 s grace
    /// for the server to start answering, or the configured default.
    fn cmd_deadline(&self, cmd: &Cmd) -> Option<Duration> {
        match cmd.read_timeout() {
            Some(timeout) if timeout.is_zero() => None,
            Some(timeout) => Some(timeout + Duration::from_secs(10)),
            None => self.opt.read_deadline(),
        }
    }
}

/// A Skyhash client over a pool of connections.
///
/// Cheap to clone and safe to share: clones reuse the same pool. Every
/// command flows through [`Client::process`] and the registered hooks.
///
/// # Example
///
/// ```ignore
/// let client = Client::new(Options {
///     addr: "localhost:2003".into(),
///     ..Options::default()
/// });
/// client.set("key", "value").await?;
/// let value = client.get("key").await?;
/// ```
#[derive(Clone)]
pub struct Client {
    pub(crate) base: BaseClient,
    pool: Arc<ConnPool>,
    hooks: Vec<Arc<dyn Hook>>,
}

impl Client {
    /// Builds a client from options. Must be called inside a tokio
    /// runtime: the pool starts its reaper and warm-up tasks here.
    pub fn new(mut opt: Options) -> Client {
        opt.init();
        let opt = Arc::new(opt);
        let pool = ConnPool::new(Arc::clone(&opt));
        Client {
            base: BaseClient {
                opt,
                pool: Pooler::Pool(Arc::clone(&pool)),
            },
            pool,
            hooks: Vec::new(),
        }
    }

    /// The normalised options this client was built from.
    pub fn options(&self) -> &Options {
        &self.base.opt
    }

    /// A snapshot of the connection pool counters.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Registers a hook. Requires exclusive access, so the chain is
    /// frozen before any clone can be iterating it.
    pub fn add_hook(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    /// Closes the client and its pool. Idempotent; later calls are no-ops.
    pub fn close(&self) -> Result<(), Error> {
        self.base.pool.close()
    }

    /// A clone with both socket deadlines replaced, sharing this
    /// client's pool.
    pub fn with_timeout(&self, timeout: Duration) -> Client {
        let mut opt = (*self.base.opt).clone();
        opt.read_timeout = Some(timeout);
        opt.write_timeout = Some(timeout);
        let opt = Arc::new(opt);
        Client {
            base: BaseClient {
                opt,
                pool: self.base.pool.clone(),
            },
            pool: Arc::clone(&self.pool),
            hooks: self.hooks.clone(),
        }
    }

    /// A client bound to one dedicated connection, for callers that need
    /// connection-scoped state such as `login`. Close it to release the
    /// connection back to the pool.
    pub fn conn(&self) -> ConnClient {
        let sticky = Arc::new(StickyConnPool::new(Arc::clone(&self.pool)));
        ConnClient {
            base: BaseClient {
                opt: Arc::clone(&self.base.opt),
                pool: Pooler::Sticky(sticky),
            },
            hooks: self.hooks.clone(),
        }
    }

    /// Runs one command through the hook chain and the retry loop. The
    /// outcome is also recorded on the command itself.
    pub async fn process(&self, cmd: &mut Cmd) -> Result<(), Error> {
        process_with_hooks(&self.hooks, &self.base, cmd).await
    }

    /// Builds and processes a raw command; the escape hatch for actions
    /// without a typed wrapper.
    pub async fn run(&self, args: Vec<Arg>) -> Cmd {
        let mut cmd = Cmd::new(args);
        let _ = self.process(&mut cmd).await;
        cmd
    }

    pub(crate) async fn process_pipeline(&self, cmds: &mut [Cmd]) -> Result<(), Error> {
        process_pipeline_with_hooks(&self.hooks, &self.base, cmds).await
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Skyhash<{} table:{}>",
            self.base.opt.addr, self.base.opt.table
        )
    }
}

/// A client over a single dedicated connection rather than the shared
/// pool. Prefer [`Client`] unless connection-scoped state is needed;
/// commands here serialise on the one connection.
pub struct ConnClient {
    pub(crate) base: BaseClient,
    pub(crate) hooks: Vec<Arc<dyn Hook>>,
}

impl ConnClient {
    /// Runs one command on the dedicated connection.
    pub async fn process(&self, cmd: &mut Cmd) -> Result<(), Error> {
        process_with_hooks(&self.hooks, &self.base, cmd).await
    }

    /// Builds and processes a raw command.
    pub async fn run(&self, args: Vec<Arg>) -> Cmd {
        let mut cmd = Cmd::new(args);
        let _ = self.process(&mut cmd).await;
        cmd
    }

    /// Releases the dedicated connection back to the pool. Idempotent.
    pub fn close(&self) -> Result<(), Error> {
        self.base.pool.close()
    }
}
