use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    ffi::OsString,
    fmt,
    path::Path,
    process::{Command, Stdio},
    time::Duration,
};

/// Description of the external program a job launches
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LaunchSpec {
    // e.g. `python3`, the program is passed as its first argument when set
    #[serde(default)]
    pub interpreter: Option<String>,
    pub program: String,
    // fixed arguments, following the working directory
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,
}

fn default_repeat() -> u32 {
    1
}

fn default_stagger_ms() -> u64 {
    100
}

impl LaunchSpec {
    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }
}

/// A fully resolved command line: `[interpreter] program <workdir> args...`
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub interpreter: Option<String>,
    pub program: String,
    pub args: Vec<OsString>,
}

impl Invocation {
    pub fn new(spec: &LaunchSpec, workdir: &Path) -> Self {
        let args = std::iter::once(workdir.as_os_str().to_owned())
            .chain(spec.args.iter().map(OsString::from))
            .collect();

        Self {
            interpreter: spec.interpreter.clone(),
            program: spec.program.clone(),
            args,
        }
    }

    /// Command running in `workdir`, sharing stdout and stderr with the runner
    pub fn command(&self, workdir: &Path) -> Command {
        let mut command = match &self.interpreter {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(&self.program);
                command
            }
            None => Command::new(&self.program),
        };

        command
            .args(&self.args)
            .current_dir(workdir)
            .stdin(Stdio::null());

        command
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = self
            .interpreter
            .iter()
            .map(|interpreter| Cow::Borrowed(interpreter.as_str()))
            .chain(std::iter::once(Cow::Borrowed(self.program.as_str())))
            .chain(self.args.iter().map(|arg| arg.to_string_lossy()));

        write!(f, "{}", words.format(" "))
    }
}

/// quote a word for a POSIX shell, if it needs it
pub fn shell_quote(word: &str) -> Cow<'_, str> {
    let is_safe = |c: char| c.is_ascii_alphanumeric() || "_./=:,+@%-".contains(c);

    if !word.is_empty() && word.chars().all(is_safe) {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}

/// render a millisecond pause as the argument to `sleep`
fn sleep_seconds(millis: u64) -> String {
    let (seconds, fraction) = (millis / 1000, millis % 1000);

    if fraction == 0 {
        seconds.to_string()
    } else {
        format!("{seconds}.{fraction:03}")
            .trim_end_matches('0')
            .to_string()
    }
}

/// Shell rendition of a launch: a single command line, or a staggered background loop
/// followed by `wait`. Without an explicit `workdir` the script's own `$PWD` is passed.
pub fn render_body(spec: &LaunchSpec, workdir: Option<&Path>) -> String {
    let workdir = match workdir {
        Some(path) => shell_quote(&path.to_string_lossy()).into_owned(),
        None => "\"$PWD\"".to_string(),
    };
    let command = spec
        .interpreter
        .iter()
        .map(|interpreter| shell_quote(interpreter))
        .chain(std::iter::once(shell_quote(&spec.program)))
        .chain(std::iter::once(Cow::Owned(workdir)))
        .chain(spec.args.iter().map(|arg| shell_quote(arg)))
        .join(" ");

    if spec.repeat <= 1 {
        return format!("{command}\n");
    }

    let mut body = format!("for np in $(seq 1 {})\ndo\n    {command} &\n", spec.repeat);
    if spec.stagger_ms > 0 {
        body.push_str(&format!("    sleep {}\n", sleep_seconds(spec.stagger_ms)));
    }
    body.push_str("done\nwait\n");

    body
}
