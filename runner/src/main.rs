mod config;
mod directives;
mod executors;
mod job;

use clap::{Parser, Subcommand};
use config::{ConfigErrors, JobConfig, PRESETS};
use executors::{slurm::render_script, ExecutorError, Executors};
use std::{
    env, fs, io,
    path::{Component, Path, PathBuf},
    process::ExitCode,
};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Launch HVQE and ground-state jobs locally or through Slurm
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a job with its executor: launch it here, or submit it with sbatch
    Run {
        /// preset name or path to a YAML job file
        job: String,
        /// directory passed to the program, defaults to the current directory
        #[arg(long)]
        workdir: Option<PathBuf>,
        /// override the executor selected by the job
        #[arg(long)]
        executor: Option<String>,
    },
    /// Print the Slurm batch script of a job
    Render {
        /// preset name or path to a YAML job file
        job: String,
        /// hardcode this directory instead of using $PWD at job start
        #[arg(long)]
        workdir: Option<PathBuf>,
        /// write the script to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the built-in job presets
    Presets,
}

#[derive(Error, Debug)]
enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error("Failed to determine the working directory")]
    CurrentDir(#[source] io::Error),
    #[error("Failed to write {}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// resolve relative paths against the current directory, like a job script's `$PWD`
fn resolve_workdir(workdir: Option<PathBuf>) -> Result<PathBuf, RunnerError> {
    let current = env::current_dir().map_err(RunnerError::CurrentDir)?;

    Ok(match workdir {
        Some(path) => normalize(&current.join(path)),
        None => current,
    })
}

/// Drop `.` and fold `..` components of an absolute path without touching the filesystem,
/// symlinks stay as given
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            // `..` of the root is the root
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }

    normalized
}

fn load_job(job: &str, executor: Option<String>) -> Result<JobConfig, RunnerError> {
    let mut config = JobConfig::resolve(job)?;

    if let Some(executor) = executor {
        config.executor.name = executor;
    }

    if config.preflight_checks() {
        return Err(ConfigErrors::FailedPreflight.into());
    }

    Ok(config)
}

fn run(cli: Cli) -> Result<u8, RunnerError> {
    match cli.command {
        Commands::Run {
            job,
            workdir,
            executor,
        } => {
            let config = load_job(&job, executor)?;
            let workdir = resolve_workdir(workdir)?;
            info!(
                "Running {} with the {} executor in {}",
                config.job_name(),
                config.executor.name,
                workdir.display()
            );

            let mut executor = Executors::load(config)?;
            Ok(executor.execute(&workdir)?)
        }
        Commands::Render {
            job,
            workdir,
            output,
        } => {
            let config = load_job(&job, None)?;
            let workdir = workdir.map(|path| resolve_workdir(Some(path))).transpose()?;
            let script = render_script(&config, workdir.as_deref());

            match output {
                Some(path) => write_script(&path, &script)?,
                None => print!("{script}"),
            }

            Ok(0)
        }
        Commands::Presets => {
            for (name, source) in PRESETS {
                let config = JobConfig::from_yaml(name, source)?;
                println!(
                    "{name}: {} x{}",
                    job::Invocation::new(&config.launch, Path::new("<workdir>")),
                    config.launch.repeat
                );
            }

            Ok(0)
        }
    }
}

fn write_script(path: &Path, script: &str) -> Result<(), RunnerError> {
    fs::write(path, script).map_err(|source| RunnerError::Output {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Wrote batch script to {}", path.display());

    Ok(())
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e}");
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                error!("caused by: {cause}");
                source = cause.source();
            }

            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_drops_dot_components() {
        assert_eq!(
            normalize(Path::new("/home/user/./run1")),
            PathBuf::from("/home/user/run1")
        );
        assert_eq!(
            normalize(Path::new("/home/user/sweep/../run1/.")),
            PathBuf::from("/home/user/run1")
        );
        assert_eq!(normalize(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(
            normalize(Path::new("/home/user/run1")),
            PathBuf::from("/home/user/run1")
        );
    }

    #[test]
    fn relative_workdir_is_resolved_and_normalized() {
        let current = env::current_dir().unwrap();
        let workdir = resolve_workdir(Some(PathBuf::from("./run1"))).unwrap();

        assert_eq!(workdir, normalize(&current).join("run1"));
        assert!(workdir
            .components()
            .all(|component| component != Component::CurDir));
    }

    #[test]
    fn absolute_workdir_is_kept() {
        assert_eq!(
            resolve_workdir(Some(PathBuf::from("/home/user/run1"))).unwrap(),
            PathBuf::from("/home/user/run1")
        );
    }
}
