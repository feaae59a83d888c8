use super::{Executor, ExecutorError};
use crate::{
    config::{ConfigErrors, JobConfig},
    job::render_body,
};
use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, info, instrument};

/// Render the batch script for a job: directives first, then the launch body.
/// Without an explicit `workdir` the script uses the directory it is submitted from.
pub fn render_script(config: &JobConfig, workdir: Option<&Path>) -> String {
    let mut script = String::from("#!/bin/bash\n");

    for line in config.directives.lines() {
        script.push_str(&line);
        script.push('\n');
    }

    script.push('\n');
    script.push_str(&render_body(&config.launch, workdir));

    script
}

/// Extract the job id from the output of `sbatch`
pub fn parse_job_id(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .find(|line| line.to_lowercase().starts_with("submitted batch job"))
        .and_then(|line| line.split_whitespace().nth(3))
}

/// Executor handing the job to Slurm through `sbatch`
#[derive(Debug)]
pub struct SlurmExecutor {
    config: JobConfig,
    // `sbatch`, or a replacement command given as executor.parameter.sbatch
    sbatch: String,
    sbatch_args: Vec<String>,
}

impl Executor for SlurmExecutor {
    fn load(config: JobConfig) -> Result<Self, ConfigErrors> {
        let (sbatch, sbatch_args) = config.executor.command_parameter("sbatch", "sbatch")?;

        Ok(Self {
            config,
            sbatch,
            sbatch_args,
        })
    }

    /// write the batch script into the working directory and submit it from there
    #[instrument(skip(self), level = "info")]
    fn execute(&mut self, workdir: &Path) -> Result<u8, ExecutorError> {
        let path = self.script_path(workdir);
        fs::write(&path, render_script(&self.config, None)).map_err(|source| {
            ExecutorError::WriteScript {
                path: path.clone(),
                source,
            }
        })?;
        debug!("Wrote batch script to {}", path.display());

        let job_id = self.submit(&path, workdir)?;
        info!(job_id = %job_id, "Submitted {} from {}", self.config.job_name(), workdir.display());

        Ok(0)
    }
}

impl SlurmExecutor {
    pub fn script_path(&self, workdir: &Path) -> PathBuf {
        workdir.join(format!("{}.sbatch", self.config.job_name()))
    }

    fn submit(&self, script: &Path, workdir: &Path) -> Result<String, ExecutorError> {
        let program = &self.sbatch;

        debug!("Running command `{program} {}`", script.display());
        let output = Command::new(program)
            .args(&self.sbatch_args)
            .arg(script)
            .current_dir(workdir)
            .output()
            .map_err(|source| ExecutorError::SubmitSpawn {
                program: program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("Sbatch output: {stdout}");

        if !output.status.success() {
            return Err(ExecutorError::SubmitFailed {
                program: program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_job_id(&stdout)
            .map(String::from)
            .ok_or_else(|| ExecutorError::MissingJobId(stdout.to_string()))
    }
}
