// src/config/validate.rs

use std::time::Duration;

use crate::command::{CommandLine, CommandRequest};
use crate::config::model::{ConfigFile, RawConfigFile, ReadinessSection, ServerSection};
use crate::errors::{Result, SupervisorError};
use crate::supervisor::{Markers, SupervisorOptions};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SupervisorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let command = build_command(&raw.server)?;
        let markers = build_markers(&raw.readiness)?;
        let startup_timeout = raw
            .readiness
            .startup_timeout
            .as_deref()
            .map(|s| parse_field_duration("readiness.startup_timeout", s))
            .transpose()?;

        let stop_command = build_stop_command(&raw.shutdown.stop_command)?;
        let stop_timeout = parse_field_duration("shutdown.stop_timeout", &raw.shutdown.stop_timeout)?;
        let poll_interval = parse_field_duration("commands.poll_interval", &raw.commands.poll_interval)?;
        if poll_interval.is_zero() {
            return Err(SupervisorError::ConfigError(
                "[commands].poll_interval must be greater than zero".to_string(),
            ));
        }

        Ok(ConfigFile {
            command,
            markers,
            options: SupervisorOptions {
                stop_command,
                stop_timeout,
                poll_interval,
                handle_signals: raw.shutdown.handle_signals,
            },
            startup_timeout,
        })
    }
}

fn build_command(server: &ServerSection) -> Result<CommandLine> {
    let command = match (&server.cmd, &server.program) {
        (Some(_), Some(_)) => {
            return Err(SupervisorError::ConfigError(
                "[server] must set either `cmd` or `program`, not both".to_string(),
            ));
        }
        (None, None) => {
            return Err(SupervisorError::ConfigError(
                "[server] must set `cmd` or `program` (or pass a command on the command line)"
                    .to_string(),
            ));
        }
        (Some(cmd), None) => {
            if cmd.trim().is_empty() {
                return Err(SupervisorError::ConfigError(
                    "[server].cmd must not be empty".to_string(),
                ));
            }
            if !server.args.is_empty() {
                return Err(SupervisorError::ConfigError(
                    "[server].args only applies together with `program`".to_string(),
                ));
            }
            CommandLine::shell(cmd.as_str())
        }
        (None, Some(program)) => {
            if program.trim().is_empty() {
                return Err(SupervisorError::ConfigError(
                    "[server].program must not be empty".to_string(),
                ));
            }
            CommandLine::new(program.as_str()).args(server.args.iter().cloned())
        }
    };

    let command = server
        .env
        .iter()
        .fold(command, |cmd, (key, value)| cmd.env(key.as_str(), value.as_str()));

    Ok(match &server.working_dir {
        Some(dir) => command.working_dir(dir.clone()),
        None => command,
    })
}

fn build_markers(readiness: &ReadinessSection) -> Result<Markers> {
    let ready = match readiness.ready_pattern.as_deref() {
        Some(p) if !p.is_empty() => p,
        _ => {
            return Err(SupervisorError::ConfigError(
                "[readiness].ready_pattern is required and must not be empty".to_string(),
            ));
        }
    };
    let failure = readiness.failure_pattern.as_deref().filter(|p| !p.is_empty());

    if readiness.literal {
        Markers::literal(ready, failure)
    } else {
        Markers::new(ready, failure)
    }
}

fn build_stop_command(raw: &str) -> Result<CommandRequest> {
    CommandRequest::parse(raw).ok_or_else(|| {
        SupervisorError::ConfigError("[shutdown].stop_command must not be empty".to_string())
    })
}

fn parse_field_duration(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| SupervisorError::ConfigError(format!("invalid {field} '{value}': {e}")))
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}
