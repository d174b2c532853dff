use crate::client::Client;
use crate::command::Cmd;
use crate::error::Error;

/// A queue of commands executed in one client-server round-trip.
///
/// Queueing is free of I/O; [`Pipeline::exec`] writes the whole batch
/// under a single metaframe and reads the replies back in request order.
/// A pipeline is not a transaction: on a retried timeout the server may
/// execute commands more than once, so size read and write deadlines to
/// the batch.
///
/// # Example
///
/// ```ignore
/// let mut pipe = client.pipeline();
/// pipe.push(Cmd::set("a", "1")).push(Cmd::get("a"));
/// let cmds = pipe.exec().await?;
/// assert_eq!(cmds[1].text()?, "1");
/// ```
pub struct Pipeline<'a> {
    client: &'a Client,
    cmds: Vec<Cmd>,
}

impl<'a> Pipeline<'a> {
    pub(crate) fn new(client: &'a Client) -> Pipeline<'a> {
        Pipeline {
            client,
            cmds: Vec::new(),
        }
    }

    /// The number of queued commands.
    pub fn len(&self) -> usize {
        self.cmds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    /// Queues a command for the next [`Pipeline::exec`].
    pub fn push(&mut self, cmd: Cmd) -> &mut Self {
        self.cmds.push(cmd);
        self
    }

    /// Drops every queued command.
    pub fn discard(&mut self) {
        self.cmds.clear();
    }

    /// Executes the queued batch in one round-trip and hands the
    /// commands back for per-element inspection.
    ///
    /// `Err` means the batch as a whole failed (transport fault or a
    /// reply-count mismatch). Element-level server errors do not fail
    /// the batch: they sit on their command, and
    /// [`first_command_error`](crate::first_command_error) reproduces
    /// the aggregate view. The queue is cleared either way.
    pub async fn exec(&mut self) -> Result<Vec<Cmd>, Error> {
        if self.cmds.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmds = std::mem::take(&mut self.cmds);
        match self.client.process_pipeline(&mut cmds).await {
            Ok(()) => Ok(cmds),
            Err(err) if err.server_error().is_some() => Ok(cmds),
            Err(err) => Err(err),
        }
    }
}

impl Client {
    /// Starts an empty command pipeline.
    pub fn pipeline(&self) -> Pipeline<'_> {
        Pipeline::new(self)
    }

    /// Builds a pipeline with `queue`, executes it, and returns the
    /// commands for inspection.
    pub async fn pipelined<F>(&self, queue: F) -> Result<Vec<Cmd>, Error>
    where
        F: FnOnce(&mut Pipeline<'_>),
    {
        let mut pipe = self.pipeline();
        queue(&mut pipe);
        pipe.exec().await
    }
}
