// Data models for cron definitions and dispatched tasks

use crate::errors::ScheduleError;
use crate::schedule::{schedule_token_count, CronSchedule};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-definition options carried in `key:value` tokens between the schedule
/// and the command. They are opaque to the scheduler and passed through to the
/// task payload for the consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tries: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locks: Vec<String>,
}

/// One registry entry, parsed
///
/// Immutable snapshot for the duration of a scheduling pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronDefinition {
    pub name: String,
    pub schedule: CronSchedule,
    pub command: Vec<String>,
    /// Destination queue; empty means the definition is evaluated but never
    /// dispatched
    pub queue: String,
    pub options: CronOptions,
}

impl CronDefinition {
    /// Parse a registry line of the form
    /// `<schedule> [queue:q] [timeout:s] [maxtries:n] [locks:a,b] <command...>`
    pub fn parse(name: &str, line: &str) -> Result<Self, ScheduleError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let first = tokens.first().ok_or_else(|| invalid_line(line, "empty line"))?;

        let schedule_len = schedule_token_count(first);
        if tokens.len() < schedule_len {
            return Err(invalid_line(line, "incomplete schedule"));
        }
        let schedule = CronSchedule::parse(&tokens[..schedule_len].join(" "))?;

        let mut queue = String::new();
        let mut options = CronOptions::default();
        let mut rest = tokens[schedule_len..].iter().peekable();

        while let Some(token) = rest.peek() {
            let Some((key, value)) = token.split_once(':') else {
                break;
            };
            match key {
                "queue" => queue = value.to_string(),
                "timeout" => {
                    options.timeout_seconds = Some(value.parse().map_err(|_| {
                        invalid_line(line, format!("invalid timeout '{}'", value))
                    })?)
                }
                "maxtries" => {
                    options.max_tries = Some(value.parse().map_err(|_| {
                        invalid_line(line, format!("invalid maxtries '{}'", value))
                    })?)
                }
                "locks" => {
                    options.locks = value
                        .split(',')
                        .filter(|lock| !lock.is_empty())
                        .map(str::to_string)
                        .collect()
                }
                _ => break,
            }
            rest.next();
        }

        let command: Vec<String> = rest.map(|token| token.to_string()).collect();
        if command.is_empty() {
            return Err(invalid_line(line, "missing command"));
        }

        Ok(Self {
            name: name.to_string(),
            schedule,
            command,
            queue,
            options,
        })
    }

    /// Does this definition fire at the (minute-aligned) `instant`?
    pub fn matches<Tz: TimeZone>(&self, instant: &DateTime<Tz>) -> bool {
        self.schedule.matches(instant)
    }

    /// Command tokens joined for logging
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    /// Whether dispatch is configured for this definition
    pub fn has_queue(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Build the payload pushed onto the definition's pending list
    pub fn task(&self, scheduled_for: DateTime<Utc>) -> TaskPayload {
        TaskPayload {
            id: Uuid::new_v4(),
            cron_name: self.name.clone(),
            command: self.command.clone(),
            queue: self.queue.clone(),
            options: self.options.clone(),
            scheduled_for,
        }
    }
}

/// Serialized onto `<prefix>:queue:<queue>:pending` for the worker pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub id: Uuid,
    pub cron_name: String,
    pub command: Vec<String>,
    pub queue: String,
    #[serde(default)]
    pub options: CronOptions,
    /// Latest minute in the pass window at which the definition matched
    pub scheduled_for: DateTime<Utc>,
}

impl TaskPayload {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn invalid_line(line: &str, reason: impl Into<String>) -> ScheduleError {
    ScheduleError::InvalidCronLine {
        line: line.to_string(),
        reason: reason.into(),
    }
}
