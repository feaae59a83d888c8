use super::{Executor, ExecutorError};
use crate::{
    config::{ConfigErrors, JobConfig},
    job::Invocation,
};
use nix::{
    sys::signal::{kill, Signal},
    unistd::Pid,
};
use std::{
    io::{self, ErrorKind},
    os::unix::process::ExitStatusExt,
    path::Path,
    process::{Child, ExitStatus},
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, error, info, instrument, warn};
use wait_timeout::ChildExt;

/// time between SIGTERM and SIGKILL once the wall-clock limit is reached
const KILL_GRACE: Duration = Duration::from_secs(30);

/// How a single launch ended
#[derive(Debug)]
pub enum LaunchResult {
    Exited(ExitStatus),
    // terminated at the wall-clock limit, with the status collected afterwards
    TimedOut(ExitStatus),
    SpawnFailed(ErrorKind),
    WaitFailed(ErrorKind),
}

#[derive(Debug)]
pub struct LaunchOutcome {
    // loop counter of the launch, starting at 1
    pub index: u32,
    pub pid: Option<u32>,
    pub result: LaunchResult,
}

impl LaunchOutcome {
    /// exit code a shell would report for this launch
    pub fn exit_code(&self) -> u8 {
        match &self.result {
            LaunchResult::Exited(status) | LaunchResult::TimedOut(status) => {
                match (status.code(), status.signal()) {
                    (Some(code), _) => (code & 0xff) as u8,
                    (None, Some(signal)) => 128u8.wrapping_add(signal as u8),
                    (None, None) => 1,
                }
            }
            LaunchResult::SpawnFailed(ErrorKind::NotFound) => 127,
            LaunchResult::SpawnFailed(_) => 126,
            LaunchResult::WaitFailed(_) => 1,
        }
    }
}

/// Executor that launches the job's program on this machine
#[derive(Debug)]
pub struct LocalExecutor {
    config: JobConfig,
    time_limit: Option<Duration>,
    kill_grace: Duration,
}

impl Executor for LocalExecutor {
    fn load(config: JobConfig) -> Result<Self, ConfigErrors> {
        let enforce_time_limit = config
            .executor
            .bool_parameter("enforce_time_limit", false)?;

        let time_limit = if enforce_time_limit {
            let limit = config.directives.time_limit();
            if limit.is_none() {
                warn!("enforce_time_limit is set but no wall-clock limit is enabled, ignoring it");
            }
            limit
        } else {
            None
        };

        Ok(Self {
            config,
            time_limit,
            kill_grace: KILL_GRACE,
        })
    }

    /// launch all processes and wait for them, a failed launch never stops the others
    #[instrument(skip(self), level = "info")]
    fn execute(&mut self, workdir: &Path) -> Result<u8, ExecutorError> {
        if let Err(source) = workdir.read_dir() {
            return Err(ExecutorError::WorkdirUnavailable {
                path: workdir.to_path_buf(),
                source,
            });
        }

        let outcomes = self.launch_all(workdir);
        for outcome in outcomes.iter().filter(|outcome| outcome.exit_code() != 0) {
            warn!(
                np = outcome.index,
                pid = ?outcome.pid,
                "Launch ended with code {}",
                outcome.exit_code()
            );
        }

        info!("Done with {} launches", outcomes.len());

        Ok(self.exit_code(&outcomes))
    }
}

impl LocalExecutor {
    /// Start every launch with the configured pause in between, then wait for all of them
    /// in launch order.
    pub fn launch_all(&self, workdir: &Path) -> Vec<LaunchOutcome> {
        let launch = &self.config.launch;
        let invocation = Invocation::new(launch, workdir);
        // a limit too far out to represent is no limit at all
        let deadline = self
            .time_limit
            .and_then(|limit| Instant::now().checked_add(limit));

        let mut launched = Vec::with_capacity(launch.repeat as usize);
        for index in 1..=launch.repeat {
            match invocation.command(workdir).spawn() {
                Ok(child) => {
                    info!(np = index, pid = child.id(), "Launched {invocation}");
                    launched.push((index, Ok(child)));
                }
                Err(e) => {
                    warn!(np = index, "Failed to launch {invocation}: {e}");
                    launched.push((index, Err(e)));
                }
            }

            if launch.repeat > 1 {
                thread::sleep(launch.stagger());
            }
        }

        launched
            .into_iter()
            .map(|(index, spawned)| match spawned {
                Ok(mut child) => {
                    let pid = child.id();
                    let result = wait_for(&mut child, deadline, self.kill_grace);
                    debug!(np = index, pid, "Finished: {result:?}");

                    LaunchOutcome {
                        index,
                        pid: Some(pid),
                        result,
                    }
                }
                Err(e) => LaunchOutcome {
                    index,
                    pid: None,
                    result: LaunchResult::SpawnFailed(e.kind()),
                },
            })
            .collect()
    }

    /// A single launch hands its status on, repeated launches end like a bare `wait`
    pub fn exit_code(&self, outcomes: &[LaunchOutcome]) -> u8 {
        if self.config.launch.repeat > 1 {
            return 0;
        }

        outcomes.first().map(LaunchOutcome::exit_code).unwrap_or(0)
    }
}

fn wait_for(child: &mut Child, deadline: Option<Instant>, grace: Duration) -> LaunchResult {
    let waited = match deadline {
        None => child.wait().map(Some),
        Some(deadline) => {
            child.wait_timeout(deadline.saturating_duration_since(Instant::now()))
        }
    };

    match waited {
        Ok(Some(status)) => LaunchResult::Exited(status),
        Ok(None) => {
            warn!(pid = child.id(), "Wall-clock limit reached, terminating");
            match terminate(child, grace) {
                Ok(status) => LaunchResult::TimedOut(status),
                Err(e) => {
                    error!(pid = child.id(), "Failed to terminate: {e}");
                    LaunchResult::WaitFailed(e.kind())
                }
            }
        }
        Err(e) => {
            error!(pid = child.id(), "Failed to wait for child: {e}");
            LaunchResult::WaitFailed(e.kind())
        }
    }
}

/// SIGTERM first, SIGKILL once the grace period is over
fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Err(errno) = kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM) {
        debug!(pid = child.id(), "SIGTERM failed: {errno}");
    }

    match child.wait_timeout(grace)? {
        Some(status) => Ok(status),
        None => {
            debug!(pid = child.id(), "Still running after {grace:?}, sending SIGKILL");
            child.kill()?;
            child.wait()
        }
    }
}
