//! Process-group cleanup shared by the suite executor and the proposer.

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::process::Child;
use tracing::{debug, warn};

/// Kills a child's process group unless disarmed.
///
/// The child must have been spawned with `process_group(0)`, so its pid is
/// also the group id.
pub(crate) struct GroupGuard(Option<Pid>);

impl GroupGuard {
    pub(crate) fn new(child: &Child) -> Self {
        Self(
            child
                .id()
                .and_then(|pid| i32::try_from(pid).ok())
                .map(Pid::from_raw),
        )
    }

    pub(crate) fn kill(&mut self) {
        if let Some(pgid) = self.0.take() {
            match killpg(pgid, Signal::SIGKILL) {
                Ok(()) => debug!(pgid = pgid.as_raw(), "killed process group"),
                Err(nix::errno::Errno::ESRCH) => {}
                Err(e) => warn!(pgid = pgid.as_raw(), error = %e, "failed to kill process group"),
            }
        }
    }

    pub(crate) fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}
