use crate::client::BaseClient;
use crate::command::{set_cmds_err, Cmd};
use crate::error::Error;
use std::sync::Arc;

/// An interceptor wrapping every command and every pipelined batch.
///
/// `before_*` hooks run in registration order; `after_*` hooks run in
/// reverse, stack-style, and only for hooks whose `before_*` was entered.
/// A `before_*` error short-circuits the remaining hooks and the command
/// itself; an `after_*` error overwrites the command's recorded error.
pub trait Hook: Send + Sync {
    fn before_process(&self, _cmd: &mut Cmd) -> Result<(), Error> {
        Ok(())
    }

    fn after_process(&self, _cmd: &mut Cmd) -> Result<(), Error> {
        Ok(())
    }

    fn before_process_pipeline(&self, _cmds: &mut [Cmd]) -> Result<(), Error> {
        Ok(())
    }

    fn after_process_pipeline(&self, _cmds: &mut [Cmd]) -> Result<(), Error> {
        Ok(())
    }
}

/// Runs one command through the hook chain around the base client.
pub(crate) async fn process_with_hooks(
    hooks: &[Arc<dyn Hook>],
    base: &BaseClient,
    cmd: &mut Cmd,
) -> Result<(), Error> {
    let mut entered = 0;
    let mut ret = Ok(());

    for hook in hooks {
        match hook.before_process(cmd) {
            Ok(()) => entered += 1,
            Err(err) => {
                cmd.set_err(err.clone());
                ret = Err(err);
                break;
            }
        }
    }

    if ret.is_ok() {
        ret = base.process(cmd).await;
        if let Err(err) = &ret {
            cmd.set_err(err.clone());
        }
    }

    for hook in hooks.iter().take(entered).rev() {
        if let Err(err) = hook.after_process(cmd) {
            cmd.set_err(err.clone());
            ret = Err(err);
        }
    }

    ret
}

/// Runs a batch through the pipeline hook chain around the base client.
pub(crate) async fn process_pipeline_with_hooks(
    hooks: &[Arc<dyn Hook>],
    base: &BaseClient,
    cmds: &mut [Cmd],
) -> Result<(), Error> {
    let mut entered = 0;
    let mut ret = Ok(());

    for hook in hooks {
        match hook.before_process_pipeline(cmds) {
            Ok(()) => entered += 1,
            Err(err) => {
                set_cmds_err(cmds, &err);
                ret = Err(err);
                break;
            }
        }
    }

    if ret.is_ok() {
        ret = base.process_pipeline(cmds).await;
    }

    for hook in hooks.iter().take(entered).rev() {
        if let Err(err) = hook.after_process_pipeline(cmds) {
            set_cmds_err(cmds, &err);
            ret = Err(err);
        }
    }

    ret
}
