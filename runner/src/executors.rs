pub mod local;
pub mod slurm;

use crate::config::{ConfigErrors, JobConfig};
use std::{io, path::Path, path::PathBuf, process::ExitStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Working directory {} is not usable", .path.display())]
    WorkdirUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write batch script to {}", .path.display())]
    WriteScript {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to start {program}")]
    SubmitSpawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    SubmitFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("Missing job id in sbatch output\n{0}")]
    MissingJobId(String),
}

/// Something able to carry out a job from a working directory.
/// The returned value is the exit code the runner should terminate with.
pub trait Executor: Sized {
    fn load(config: JobConfig) -> Result<Self, ConfigErrors>;

    fn execute(&mut self, workdir: &Path) -> Result<u8, ExecutorError>;
}

#[derive(Debug)]
pub enum Executors {
    Local(local::LocalExecutor),
    Slurm(slurm::SlurmExecutor),
}

impl Executors {
    pub fn load(config: JobConfig) -> Result<Self, ConfigErrors> {
        match config.executor.name.as_str() {
            "local" => Ok(Self::Local(local::LocalExecutor::load(config)?)),
            "slurm" => Ok(Self::Slurm(slurm::SlurmExecutor::load(config)?)),
            _ => Err(ConfigErrors::UnsupportedExecutor(config.executor.name)),
        }
    }

    pub fn execute(&mut self, workdir: &Path) -> Result<u8, ExecutorError> {
        match self {
            Self::Local(executor) => executor.execute(workdir),
            Self::Slurm(executor) => executor.execute(workdir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_executor_by_name() {
        let mut config = JobConfig::preset("hvqe").unwrap().unwrap();
        assert!(matches!(
            Executors::load(config.clone()),
            Ok(Executors::Local(_))
        ));

        config.executor.name = "slurm".to_string();
        assert!(matches!(
            Executors::load(config.clone()),
            Ok(Executors::Slurm(_))
        ));

        config.executor.name = "pbs".to_string();
        assert!(matches!(
            Executors::load(config),
            Err(ConfigErrors::UnsupportedExecutor(name)) if name == "pbs"
        ));
    }
}
