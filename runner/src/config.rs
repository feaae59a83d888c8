use crate::{directives::ResourceDirectives, job::LaunchSpec};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Job definitions compiled into the binary, by name
pub const PRESETS: [(&str, &str); 2] = [
    ("hvqe", include_str!("../jobs/hvqe.yaml")),
    ("ground-state", include_str!("../jobs/ground_state.yaml")),
];

pub const SUPPORTED_EXECUTORS: [&str; 2] = ["local", "slurm"];

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read job file {}", .path.display())]
    ReadJob {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Job definition is invalid: {0}")]
    InvalidJob(#[from] serde_yaml::Error),
    #[error("Invalid wall time '{0}', expected [D-]HH:MM:SS, MM:SS or M")]
    InvalidWallTime(String),
    #[error("Invalid memory '{0}', expected a number with an optional K, M, G or T unit")]
    InvalidMemory(String),
    #[error("'{0}' is neither a preset nor a job file")]
    UnknownJob(String),
    #[error("Executor not supported: {0}")]
    UnsupportedExecutor(String),
    #[error("executor.parameter.{key} must be {expected}")]
    InvalidParameter { key: String, expected: &'static str },
    #[error("Job failed preflight checks")]
    FailedPreflight,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub directives: ResourceDirectives,
    pub launch: LaunchSpec,
    // preset name or job file stem, set by the loader
    #[serde(default, skip)]
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    // Name of the selected executor, see Executors::load for the selection proccess
    pub name: String,
    // parameters specific to the executor, interpreted by it on load
    #[serde(default)]
    pub parameter: BTreeMap<String, serde_yaml::Value>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            name: "local".to_string(),
            parameter: BTreeMap::new(),
        }
    }
}

impl ExecutorConfig {
    pub fn bool_parameter(&self, key: &str, default: bool) -> Result<bool, ConfigErrors> {
        match self.parameter.get(key) {
            None => Ok(default),
            Some(value) => value.as_bool().ok_or_else(|| ConfigErrors::InvalidParameter {
                key: key.to_string(),
                expected: "a boolean",
            }),
        }
    }

    /// a command given either as a single program or as a list of words, split into the
    /// program and its leading arguments
    pub fn command_parameter(
        &self,
        key: &str,
        default: &str,
    ) -> Result<(String, Vec<String>), ConfigErrors> {
        let invalid = || ConfigErrors::InvalidParameter {
            key: key.to_string(),
            expected: "a string or a non-empty list of strings",
        };

        match self.parameter.get(key) {
            None => Ok((default.to_string(), Vec::new())),
            Some(serde_yaml::Value::String(program)) => Ok((program.clone(), Vec::new())),
            Some(serde_yaml::Value::Sequence(words)) => {
                let mut words = words
                    .iter()
                    .map(|word| word.as_str().map(String::from).ok_or_else(invalid))
                    .collect::<Result<Vec<_>, _>>()?;

                if words.is_empty() {
                    return Err(invalid());
                }
                let program = words.remove(0);

                Ok((program, words))
            }
            Some(_) => Err(invalid()),
        }
    }
}

impl JobConfig {
    pub fn from_yaml(name: &str, source: &str) -> Result<Self, ConfigErrors> {
        let mut config: Self = serde_yaml::from_str(source)?;
        config.name = name.to_string();

        Ok(config)
    }

    pub fn preset(name: &str) -> Option<Result<Self, ConfigErrors>> {
        PRESETS
            .iter()
            .find(|(preset, _)| *preset == name)
            .map(|(preset, source)| Self::from_yaml(preset, source))
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigErrors> {
        let source = fs::read_to_string(path).map_err(|source| ConfigErrors::ReadJob {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "job".to_string());

        Self::from_yaml(&name, &source)
    }

    /// load a preset by name, falling back to a job file at that path
    pub fn resolve(job: &str) -> Result<Self, ConfigErrors> {
        if let Some(preset) = Self::preset(job) {
            debug!("Using preset {job}");
            return preset;
        }

        let path = Path::new(job);
        if path.is_file() {
            debug!("Loading job file {}", path.display());
            Self::from_path(path)
        } else {
            Err(ConfigErrors::UnknownJob(job.to_string()))
        }
    }

    /// name used for the job in the scheduler and for the rendered script
    pub fn job_name(&self) -> &str {
        self.directives
            .job_name
            .as_ref()
            .and_then(|setting| setting.active())
            .map(String::as_str)
            .unwrap_or(self.name.as_str())
    }

    /// Validate the job, logging every problem instead of only the first one.
    /// Returns true if any error was found.
    pub fn preflight_checks(&mut self) -> bool {
        let mut contains_error = false;

        self.executor.name = self.executor.name.to_lowercase();
        if !SUPPORTED_EXECUTORS.contains(&self.executor.name.as_str()) {
            error!(
                "executor.name ({}) is not supported, use one of: {}",
                self.executor.name,
                SUPPORTED_EXECUTORS.join(", ")
            );
            contains_error = true;
        }

        if self.launch.program.trim().is_empty() {
            error!("launch.program must not be empty");
            contains_error = true;
        }

        if self.launch.repeat == 0 {
            error!("launch.repeat cannot be 0, a job has to launch its program at least once");
            contains_error = true;
        }

        if self.launch.repeat > 1 && self.launch.stagger_ms == 0 {
            warn!(
                "launch.stagger_ms is 0, all {} launches will start at once",
                self.launch.repeat
            );
        }

        let counts = [
            ("nodes", &self.directives.nodes),
            ("ntasks", &self.directives.ntasks),
            ("gpus", &self.directives.gpus),
        ];
        for (key, setting) in counts {
            if setting.as_ref().and_then(|setting| setting.active()) == Some(&0) {
                error!("directives.{key} cannot be 0 while enabled");
                contains_error = true;
            }
        }

        if let Some(partition) = self.directives.partition.as_ref().and_then(|s| s.active()) {
            if partition.trim().is_empty() {
                error!("directives.partition must not be empty while enabled");
                contains_error = true;
            }
        }

        contains_error
    }
}
