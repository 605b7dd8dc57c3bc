use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::error::CoreResult;
use crate::result::{ActionMessage, ActionResult, Level};

pub const REPORT_FORMAT_VERSION: &str = "1.0";

const NO_PROBLEMS: &str = "No problems detected during the analysis!";

/// Outcome of a single action within a run.
#[derive(Debug, Clone)]
pub struct ActionReport {
    pub action_id: String,
    pub stage: String,
    pub result: ActionResult,
    pub messages: Vec<ActionMessage>,
    pub duration: Duration,
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    result: &'a ActionResult,
    messages: &'a [ActionMessage],
}

#[derive(Serialize)]
struct JsonReport<'a> {
    format_version: &'static str,
    actions: BTreeMap<&'a str, JsonEntry<'a>>,
}

/// Aggregated results of one or more runner invocations, in execution order.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub allow_overridable: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub entries: Vec<ActionReport>,
}

impl RunReport {
    pub fn new(run_id: Uuid, allow_overridable: bool) -> Self {
        Self {
            run_id,
            allow_overridable,
            started_at: Utc::now(),
            completed_at: None,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: ActionReport) {
        self.entries.push(entry);
    }

    pub fn finish(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// Append the entries of a later run, e.g. the post-PONR stage.
    pub fn extend(&mut self, later: RunReport) {
        self.entries.extend(later.entries);
        self.completed_at = later.completed_at.or(self.completed_at);
    }

    pub fn get(&self, action_id: &str) -> Option<&ActionReport> {
        self.entries.iter().find(|e| e.action_id == action_id)
    }

    pub fn level_of(&self, action_id: &str) -> Option<Level> {
        self.get(action_id).map(|e| e.result.level)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any result stops the conversion under this run's override
    /// setting.
    pub fn is_blocking(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.result.level.is_blocking(self.allow_overridable))
    }

    pub fn blocking_actions(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.result.level.is_blocking(self.allow_overridable))
            .map(|e| e.action_id.as_str())
            .collect()
    }

    /// Highest level seen across results and messages.
    pub fn max_level(&self) -> Level {
        self.entries
            .iter()
            .flat_map(|e| {
                std::iter::once(e.result.level).chain(e.messages.iter().map(|m| m.level))
            })
            .max()
            .unwrap_or(Level::Success)
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        let actions = self
            .entries
            .iter()
            .map(|e| {
                (
                    e.action_id.as_str(),
                    JsonEntry {
                        result: &e.result,
                        messages: &e.messages,
                    },
                )
            })
            .collect();
        serde_json::to_value(JsonReport {
            format_version: REPORT_FORMAT_VERSION,
            actions,
        })
    }

    pub fn write_json(&self, path: &Path) -> CoreResult<()> {
        let value = self.to_json().map_err(anyhow::Error::from)?;
        let body = serde_json::to_string_pretty(&value).map_err(anyhow::Error::from)?;
        write_report(path, &body)
    }

    /// Plain-text summary grouped by level, most severe first. Successful
    /// results are left out.
    pub fn summary(&self) -> String {
        let mut by_level: BTreeMap<Level, Vec<String>> = BTreeMap::new();
        for entry in &self.entries {
            if entry.result.level > Level::Success {
                by_level
                    .entry(entry.result.level)
                    .or_default()
                    .push(summary_line(
                        entry.result.level,
                        &entry.action_id,
                        &entry.result.id,
                        &entry.result.title,
                        &entry.result.description,
                    ));
            }
            for msg in &entry.messages {
                if msg.level > Level::Success {
                    by_level.entry(msg.level).or_default().push(summary_line(
                        msg.level,
                        &entry.action_id,
                        &msg.id,
                        &msg.title,
                        &msg.description,
                    ));
                }
            }
        }

        if by_level.is_empty() {
            return format!("{NO_PROBLEMS}\n");
        }

        let mut out = String::new();
        for (level, lines) in by_level.iter().rev() {
            out.push_str(&format!("========== {level} ==========\n"));
            for line in lines {
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }

    pub fn write_text(&self, path: &Path) -> CoreResult<()> {
        write_report(path, &self.summary())
    }
}

fn summary_line(level: Level, action_id: &str, id: &str, title: &str, description: &str) -> String {
    let head = if id.is_empty() || id == action_id {
        format!("({level}) {action_id}")
    } else {
        format!("({level}) {action_id}::{id}")
    };
    match (title.is_empty(), description.is_empty()) {
        (true, true) => format!("{head} - [No further information given]"),
        (false, true) => format!("{head} - {title}"),
        (true, false) => format!("{head} - {description}"),
        (false, false) => format!("{head} - {title}: {description}"),
    }
}

fn write_report(path: &Path, body: &str) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, body)?;
    tracing::info!(path = %path.display(), "Report written");
    Ok(())
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    if total_secs >= 60 {
        format!("{}m {}s", total_secs / 60, total_secs % 60)
    } else if d.as_millis() < 1000 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{}.{}s", total_secs, d.subsec_millis() / 100)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bar = "=".repeat(72);
        let thin = "-".repeat(72);

        writeln!(f, "\n{bar}")?;
        writeln!(f, "  CONVERSION REPORT")?;
        writeln!(f, "{bar}\n")?;

        writeln!(f, "  Run ID:   {}", self.run_id)?;
        writeln!(
            f,
            "  Started:  {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        if let Some(done) = self.completed_at {
            writeln!(f, "  Finished: {}", done.format("%Y-%m-%d %H:%M:%S UTC"))?;
        }
        let status = if self.is_blocking() { "BLOCKED" } else { "OK" };
        writeln!(f, "  Status:   {status}")?;

        writeln!(f, "\n{thin}")?;
        writeln!(f, "  ACTIONS ({})", self.entries.len())?;
        writeln!(f, "{thin}\n")?;
        if self.entries.is_empty() {
            writeln!(f, "  (none)")?;
        } else {
            writeln!(
                f,
                "  {:<4} {:<32} {:<18} {:<12} {}",
                "#", "ACTION", "STAGE", "LEVEL", "DURATION"
            )?;
            for (i, e) in self.entries.iter().enumerate() {
                writeln!(
                    f,
                    "  {:<4} {:<32} {:<18} {:<12} {}",
                    i + 1,
                    e.action_id,
                    e.stage,
                    e.result.level,
                    format_duration(e.duration)
                )?;
                if e.result.level > Level::Success && !e.result.diagnosis.is_empty() {
                    writeln!(f, "       -> {}", e.result.diagnosis)?;
                }
            }
        }

        writeln!(f, "\n{thin}")?;
        writeln!(f, "  SUMMARY")?;
        writeln!(f, "{thin}\n")?;
        for line in self.summary().lines() {
            writeln!(f, "  {line}")?;
        }

        writeln!(f, "{bar}")?;
        Ok(())
    }
}
