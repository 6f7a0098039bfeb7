use serde::Serialize;
use std::fmt;
use std::io::Write;

use taskleak_common::TaskRecord;

use crate::domain::ExportError;

/// Unexpected tasks left after the last detection attempt.
///
/// # Text output
///
/// Compact (default), one task per line:
///
/// ```text
/// Task#12 in state running, with app::worker::{{closure}} on top of the stack
/// ```
///
/// Pretty, one frame per line:
///
/// ```text
/// Task#12 [running]:
///     app::worker::{{closure}}
///     app::worker
///         at src/worker.rs:40:13
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct LeakReport {
    /// Detection attempts made, including the first one
    attempts: u32,
    tasks: Vec<TaskRecord>,
    #[serde(skip)]
    pretty: bool,
}

impl LeakReport {
    pub fn new(tasks: Vec<TaskRecord>, attempts: u32, pretty: bool) -> Self {
        Self { attempts, tasks, pretty }
    }

    pub fn tasks(&self) -> &[TaskRecord] {
        &self.tasks
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Write the report as a JSON document.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn export_json<W: Write>(&self, mut writer: W) -> Result<(), ExportError> {
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    fn fmt_pretty(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, task) in self.tasks.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{} [{}]:", task.id(), task.state())?;
            for frame in task.frames() {
                writeln!(f, "    {}", frame.function)?;
                if let Some(location) = &frame.location {
                    writeln!(f, "        at {location}")?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pretty {
            return self.fmt_pretty(f);
        }
        for (i, task) in self.tasks.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{task}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskleak_common::{Frame, TaskId};

    fn tasks() -> Vec<TaskRecord> {
        vec![
            TaskRecord::new(
                TaskId(12),
                "running",
                vec![
                    Frame::new("app::worker::{{closure}}"),
                    Frame::at("app::worker", "src/worker.rs:40:13"),
                ],
            ),
            TaskRecord::new(TaskId(13), "chan receive", vec![Frame::new("app::recv")]),
        ]
    }

    #[test]
    fn test_compact_display() {
        let report = LeakReport::new(tasks(), 3, false);
        assert_eq!(
            report.to_string(),
            "Task#12 in state running, with app::worker::{{closure}} on top of the stack\n\
             Task#13 in state chan receive, with app::recv on top of the stack"
        );
    }

    #[test]
    fn test_pretty_display() {
        let report = LeakReport::new(tasks(), 3, true);
        assert_eq!(
            report.to_string(),
            "Task#12 [running]:\n    app::worker::{{closure}}\n    app::worker\n        at src/worker.rs:40:13\n\
             \nTask#13 [chan receive]:\n    app::recv\n"
        );
    }

    #[test]
    fn test_export_json() {
        let report = LeakReport::new(tasks(), 3, true);
        let mut buffer = Vec::new();
        report.export_json(&mut buffer).unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(parsed["attempts"], 3);
        assert_eq!(parsed["tasks"][0]["id"], 12);
        assert_eq!(parsed["tasks"][0]["top_function"], "app::worker::{{closure}}");
        assert_eq!(parsed["tasks"][0]["frames"][1]["location"], "src/worker.rs:40:13");
        assert_eq!(parsed["tasks"][1]["state"], "chan receive");
        assert!(parsed.get("pretty").is_none());
    }
}
