use crate::config::ConfigErrors;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;

/// A single scheduler option, either written plainly (and thus active) or with an explicit
/// `enabled` toggle. Disabled options are still rendered, but commented out.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(untagged, from = "SettingRepr<T>")]
pub enum Setting<T> {
    Toggled { value: T, enabled: bool },
    Plain(T),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ToggledRepr<T> {
    value: T,
    enabled: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SettingRepr<T> {
    Toggled(ToggledRepr<T>),
    Plain(T),
}

impl<T> From<SettingRepr<T>> for Setting<T> {
    fn from(repr: SettingRepr<T>) -> Self {
        match repr {
            SettingRepr::Toggled(ToggledRepr { value, enabled }) => {
                Self::Toggled { value, enabled }
            }
            SettingRepr::Plain(value) => Self::Plain(value),
        }
    }
}

impl<T> Setting<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Toggled { value, .. } | Self::Plain(value) => value,
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Toggled { enabled, .. } => *enabled,
            Self::Plain(_) => true,
        }
    }

    /// the value, if the setting is in effect
    pub fn active(&self) -> Option<&T> {
        self.is_enabled().then(|| self.value())
    }
}

/// Resource requests handed to the batch scheduler
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResourceDirectives {
    #[serde(default)]
    pub job_name: Option<Setting<String>>,
    #[serde(default)]
    pub nodes: Option<Setting<u32>>,
    #[serde(default)]
    pub ntasks: Option<Setting<u32>>,
    #[serde(default)]
    pub time: Option<Setting<WallTime>>,
    #[serde(default)]
    pub mem: Option<Setting<Memory>>,
    #[serde(default)]
    pub partition: Option<Setting<String>>,
    #[serde(default)]
    pub gpus: Option<Setting<u32>>,
}

impl ResourceDirectives {
    /// Wall-clock limit if one is requested and enabled
    pub fn time_limit(&self) -> Option<Duration> {
        self.time
            .as_ref()
            .and_then(Setting::active)
            .map(|time| time.0)
    }

    /// `#SBATCH` lines in a fixed order, disabled directives are commented out with `##SBATCH`
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(setting) = &self.job_name {
            lines.push(line(setting, |name| format!("--job-name={name}")));
        }
        if let Some(setting) = &self.nodes {
            lines.push(line(setting, |nodes| format!("--nodes={nodes}")));
        }
        if let Some(setting) = &self.ntasks {
            lines.push(line(setting, |ntasks| format!("--ntasks={ntasks}")));
        }
        if let Some(setting) = &self.time {
            lines.push(line(setting, |time| format!("--time={time}")));
        }
        if let Some(setting) = &self.mem {
            lines.push(line(setting, |mem| format!("--mem={mem}")));
        }
        if let Some(setting) = &self.partition {
            lines.push(line(setting, |partition| format!("--partition={partition}")));
        }
        if let Some(setting) = &self.gpus {
            lines.push(line(setting, |gpus| format!("--gres=gpu:{gpus}")));
        }

        lines
    }
}

fn line<T>(setting: &Setting<T>, option: impl Fn(&T) -> String) -> String {
    let prefix = if setting.is_enabled() {
        "#SBATCH"
    } else {
        "##SBATCH"
    };

    format!("{prefix} {}", option(setting.value()))
}

/// Wall-clock limit in one of the formats accepted by `sbatch --time`
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct WallTime(pub Duration);

impl FromStr for WallTime {
    type Err = ConfigErrors;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigErrors::InvalidWallTime(input.to_string());
        let number = |part: &str| part.trim().parse::<u64>().map_err(|_| invalid());

        let (days, rest) = match input.split_once('-') {
            Some((days, rest)) => (Some(number(days)?), rest),
            None => (None, input),
        };
        let parts = rest
            .split(':')
            .map(number)
            .collect::<Result<Vec<_>, _>>()?;

        // [days, hours, minutes, seconds], absent fields count as zero
        let fields = match (days, parts.as_slice()) {
            (None, [minutes]) => [0, 0, *minutes, 0],
            (None, [minutes, seconds]) => [0, 0, *minutes, *seconds],
            (None, [hours, minutes, seconds]) => [0, *hours, *minutes, *seconds],
            (Some(days), [hours]) => [days, *hours, 0, 0],
            (Some(days), [hours, minutes]) => [days, *hours, *minutes, 0],
            (Some(days), [hours, minutes, seconds]) => [days, *hours, *minutes, *seconds],
            _ => return Err(invalid()),
        };

        let seconds = fields
            .iter()
            .zip([SECONDS_PER_DAY, SECONDS_PER_HOUR, SECONDS_PER_MINUTE, 1])
            .try_fold(0u64, |total, (field, unit)| {
                field
                    .checked_mul(unit)
                    .and_then(|field| total.checked_add(field))
            })
            .ok_or_else(invalid)?;

        Ok(Self(Duration::from_secs(seconds)))
    }
}

impl TryFrom<String> for WallTime {
    type Error = ConfigErrors;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WallTime> for String {
    fn from(value: WallTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for WallTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut seconds = self.0.as_secs();
        let days = seconds / SECONDS_PER_DAY;
        seconds %= SECONDS_PER_DAY;
        let hours = seconds / SECONDS_PER_HOUR;
        seconds %= SECONDS_PER_HOUR;
        let minutes = seconds / SECONDS_PER_MINUTE;
        seconds %= SECONDS_PER_MINUTE;

        if days > 0 {
            write!(f, "{days}-{hours:02}:{minutes:02}:{seconds:02}")
        } else {
            write!(f, "{hours:02}:{minutes:02}:{seconds:02}")
        }
    }
}

/// Memory request, a plain number is interpreted by Slurm as megabytes
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(try_from = "MemoryRepr", into = "String")]
pub struct Memory {
    pub amount: u64,
    pub unit: Option<char>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MemoryRepr {
    Number(u64),
    Text(String),
}

impl FromStr for Memory {
    type Err = ConfigErrors;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigErrors::InvalidMemory(input.to_string());
        let trimmed = input.trim();
        let (digits, unit) = match trimmed.char_indices().last() {
            Some((index, last)) if last.is_ascii_alphabetic() => {
                (&trimmed[..index], Some(last.to_ascii_uppercase()))
            }
            _ => (trimmed, None),
        };

        if let Some(unit) = unit {
            if !matches!(unit, 'K' | 'M' | 'G' | 'T') {
                return Err(invalid());
            }
        }

        let amount = digits.parse::<u64>().map_err(|_| invalid())?;

        Ok(Self { amount, unit })
    }
}

impl TryFrom<MemoryRepr> for Memory {
    type Error = ConfigErrors;

    fn try_from(value: MemoryRepr) -> Result<Self, Self::Error> {
        match value {
            MemoryRepr::Number(amount) => Ok(Self { amount, unit: None }),
            MemoryRepr::Text(text) => text.parse(),
        }
    }
}

impl From<Memory> for String {
    fn from(value: Memory) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            Some(unit) => write!(f, "{}{unit}", self.amount),
            None => write!(f, "{}", self.amount),
        }
    }
}

#[cfg(test)]
#[path = "directives_test.rs"]
mod directives_test;
