//! Plain-text task-menu parsing.
//!
//! The input format is one task per section:
//!
//! ```text
//! Task 1:
//! Span A: 1ms
//! Span B: 0ms
//! Elasticity: 2.0
//! Modes:
//!     Period: 5ms
//!     Total Work: 4ms
//!     Work Type A: 4ms
//!     Work Type B: 0ms
//!     Total CPUs: 1
//!     CPUs Type A: 1
//!     CPUs Type B: 0
//! ```
//!
//! A section begins at a line whose first token is `Task`. `Span A` / `Span B`
//! carry the two critical-path lengths, `Elasticity` the loss weight (1.0 when
//! absent). After `Modes:`, each mode is a block of indented lines matched by
//! exact prefix after leading whitespace; the mode record is complete when
//! `CPUs Type B:` is seen. Numeric extraction keeps digits, the decimal point
//! and a leading minus sign, and skips everything else, so `12.5ms` reads as
//! `12.5`. Range tokens have the shape `[min, max]`.
//!
//! All values are milliseconds. [`timed_menu`] converts a parsed task into the
//! parallel CPU/GPU menus the scheduler context consumes: type A is the CPU
//! side, type B the GPU side, and both sides of a mode share its period.

use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::debug;

use crate::task::ModeTiming;
use crate::timespec::Timespec;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Line-level parse failures. Fatal: a partially parsed task set is never
/// handed to the scheduler.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    /// A value line held no parsable number after filtering.
    #[error("line {line}: no numeric payload in '{text}'")]
    InvalidNumber { line: usize, text: String },

    /// A range token was not of the form `[min, max]`.
    #[error("line {line}: malformed range, expected '[min, max]'")]
    InvalidRange { line: usize },

    /// A task section ended without a single complete mode.
    #[error("task {task} (ending at line {line}) declares no modes")]
    TaskWithoutModes { task: usize, line: usize },
}

// ── Raw records ───────────────────────────────────────────────────────────────

/// One mode block, verbatim in milliseconds.
///
/// The CPU counts are the generator's own estimates and are carried for
/// display only; the descriptor derives its counts from the timing values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMode {
    pub period_ms: f64,
    pub total_work_ms: f64,
    pub work_a_ms: f64,
    pub work_b_ms: f64,
    pub total_cpus: i32,
    pub cpus_a: i32,
    pub cpus_b: i32,
    pub total_work_range_ms: Option<(f64, f64)>,
    pub work_a_range_ms: Option<(f64, f64)>,
    pub work_b_range_ms: Option<(f64, f64)>,
}

/// One task section, verbatim in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTask {
    pub span_a_ms: f64,
    pub span_b_ms: f64,
    pub elasticity: f64,
    pub modes: Vec<RawMode>,
}

impl Default for RawTask {
    fn default() -> Self {
        RawTask {
            span_a_ms: 0.0,
            span_b_ms: 0.0,
            elasticity: 1.0,
            modes: Vec::new(),
        }
    }
}

// ── Extraction helpers ────────────────────────────────────────────────────────

/// Pull the number out of a line like `Period: 33.33ms`: keep digits, the
/// decimal point and minus signs, drop everything else, then parse.
fn extract_number(text: &str, line: usize) -> Result<f64, ParseError> {
    let filtered: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    filtered.parse().map_err(|_| ParseError::InvalidNumber {
        line,
        text: text.trim().to_string(),
    })
}

/// Split a `[min, max]` token on `[`, `,` and `]`.
fn extract_range(text: &str, line: usize) -> Result<(f64, f64), ParseError> {
    let start = text.find('[');
    let comma = text.find(',');
    let end = text.find(']');
    match (start, comma, end) {
        (Some(s), Some(c), Some(e)) if s < c && c < e => Ok((
            extract_number(&text[s + 1..c], line)?,
            extract_number(&text[c + 1..e], line)?,
        )),
        _ => Err(ParseError::InvalidRange { line }),
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

#[derive(PartialEq)]
enum State {
    None,
    TaskInfo,
    Modes,
}

/// Parse a task file from disk.
///
/// # Errors
/// Open failures and [`ParseError`]s, with the file path in the error chain.
pub fn parse_file(path: &Path) -> Result<Vec<RawTask>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Unable to open file: {}", path.display()))?;
    let tasks = parse_str(&content)
        .with_context(|| format!("Failed to parse task file: {}", path.display()))?;
    debug!(
        tasks = tasks.len(),
        path = %path.display(),
        "task file parsed"
    );
    Ok(tasks)
}

/// Parse task sections out of an in-memory string.
pub fn parse_str(input: &str) -> Result<Vec<RawTask>, ParseError> {
    let mut tasks: Vec<RawTask> = Vec::new();
    let mut task = RawTask::default();
    let mut mode = RawMode::default();
    let mut state = State::None;
    let mut line_no = 0;

    fn finish_task(
        tasks: &mut Vec<RawTask>,
        task: RawTask,
        line: usize,
    ) -> Result<(), ParseError> {
        if task.modes.is_empty() {
            return Err(ParseError::TaskWithoutModes {
                task: tasks.len() + 1,
                line,
            });
        }
        tasks.push(task);
        Ok(())
    }

    for raw_line in input.lines() {
        line_no += 1;
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if line.trim().is_empty() {
            continue;
        }

        if line.starts_with("Task") {
            if state != State::None {
                finish_task(&mut tasks, std::mem::take(&mut task), line_no)?;
            }
            state = State::TaskInfo;
        } else if line.starts_with("Modes:") {
            state = State::Modes;
        } else if line.starts_with("Span A") {
            task.span_a_ms = extract_number(line, line_no)?;
        } else if line.starts_with("Span B") {
            task.span_b_ms = extract_number(line, line_no)?;
        } else if line.starts_with("Elasticity") {
            task.elasticity = extract_number(line, line_no)?;
        } else if state == State::Modes {
            let body = line.trim_start();
            if body.starts_with("Period:") {
                mode.period_ms = extract_number(body, line_no)?;
            } else if body.starts_with("Total Work Range:") {
                mode.total_work_range_ms = Some(extract_range(body, line_no)?);
            } else if body.starts_with("Total Work:") {
                mode.total_work_ms = extract_number(body, line_no)?;
            } else if body.starts_with("Work Type A Range:") {
                mode.work_a_range_ms = Some(extract_range(body, line_no)?);
            } else if body.starts_with("Work Type A:") {
                mode.work_a_ms = extract_number(body, line_no)?;
            } else if body.starts_with("Work Type B Range:") {
                mode.work_b_range_ms = Some(extract_range(body, line_no)?);
            } else if body.starts_with("Work Type B:") {
                mode.work_b_ms = extract_number(body, line_no)?;
            } else if body.starts_with("Total CPUs:") {
                mode.total_cpus = extract_number(body, line_no)? as i32;
            } else if body.starts_with("CPUs Type A:") {
                mode.cpus_a = extract_number(body, line_no)? as i32;
            } else if body.starts_with("CPUs Type B:") {
                // The closing field: the mode record is complete.
                mode.cpus_b = extract_number(body, line_no)? as i32;
                task.modes.push(std::mem::take(&mut mode));
            }
            // anything else inside a mode block is ignored
        }
        // unrecognized lines outside a mode block are ignored
    }

    if state != State::None {
        finish_task(&mut tasks, task, line_no)?;
    }

    Ok(tasks)
}

// ── Menu conversion ───────────────────────────────────────────────────────────

/// Convert a parsed task into the parallel `(CPU, GPU)` menus.
///
/// Per mode: CPU side is `(Work Type A, Span A, Period)`, GPU side is
/// `(Work Type B, Span B, Period)`.
pub fn timed_menu(task: &RawTask) -> (Vec<ModeTiming>, Vec<ModeTiming>) {
    let span_a = Timespec::from_millis_f64(task.span_a_ms);
    let span_b = Timespec::from_millis_f64(task.span_b_ms);

    task.modes
        .iter()
        .map(|mode| {
            let period = Timespec::from_millis_f64(mode.period_ms);
            (
                ModeTiming::new(Timespec::from_millis_f64(mode.work_a_ms), span_a, period),
                ModeTiming::new(Timespec::from_millis_f64(mode.work_b_ms), span_b, period),
            )
        })
        .unzip()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TWO_TASKS: &str = "\
Task 1:
Span A: 1ms
Span B: 0ms
Elasticity: 2.0
Modes:
    Period: 5ms
    Total Work: 4ms
    Work Type A: 4ms
    Work Type B: 0ms
    Total CPUs: 1
    CPUs Type A: 1
    CPUs Type B: 0
    Period: 5ms
    Total Work: 10ms
    Work Type A: 10ms
    Work Type B: 0ms
    Total CPUs: 3
    CPUs Type A: 3
    CPUs Type B: 0

Task 2:
Span A: 0.5ms
Span B: 0.25ms
Modes:
    Period: 10ms
    Total Work: 8ms
    Work Type A: 6ms
    Work Type B: 2ms
    Total CPUs: 2
    CPUs Type A: 1
    CPUs Type B: 1
";

    // ── extraction helpers ────────────────────────────────────────────────────

    #[test]
    fn extract_number_skips_units_and_labels() {
        assert_eq!(extract_number("Period: 33.33ms", 1).unwrap(), 33.33);
        assert_eq!(extract_number("CPUs Type A: 2", 1).unwrap(), 2.0);
        assert_eq!(extract_number("-3.5", 1).unwrap(), -3.5);
    }

    #[test]
    fn extract_number_without_digits_is_an_error() {
        let err = extract_number("Work Type A: none", 7).unwrap_err();
        assert!(matches!(err, ParseError::InvalidNumber { line: 7, .. }));
    }

    #[test]
    fn extract_range_splits_on_brackets_and_comma() {
        assert_eq!(
            extract_range("Total Work Range: [4.0, 10.0]ms", 1).unwrap(),
            (4.0, 10.0)
        );
    }

    #[test]
    fn extract_range_without_brackets_is_an_error() {
        let err = extract_range("Total Work Range: 4.0 10.0", 3).unwrap_err();
        assert_eq!(err, ParseError::InvalidRange { line: 3 });
    }

    // ── parse_str ─────────────────────────────────────────────────────────────

    #[test]
    fn parses_two_tasks_with_their_modes() {
        let tasks = parse_str(TWO_TASKS).unwrap();
        assert_eq!(tasks.len(), 2);

        let first = &tasks[0];
        assert_eq!(first.span_a_ms, 1.0);
        assert_eq!(first.span_b_ms, 0.0);
        assert_eq!(first.elasticity, 2.0);
        assert_eq!(first.modes.len(), 2);
        assert_eq!(first.modes[0].period_ms, 5.0);
        assert_eq!(first.modes[0].work_a_ms, 4.0);
        assert_eq!(first.modes[1].work_a_ms, 10.0);
        assert_eq!(first.modes[1].total_cpus, 3);

        let second = &tasks[1];
        assert_eq!(second.span_a_ms, 0.5);
        assert_eq!(second.modes.len(), 1);
        assert_eq!(second.modes[0].work_b_ms, 2.0);
        assert_eq!(second.modes[0].cpus_b, 1);
    }

    #[test]
    fn elasticity_defaults_to_one_when_absent() {
        let tasks = parse_str(TWO_TASKS).unwrap();
        assert_eq!(tasks[1].elasticity, 1.0);
    }

    #[test]
    fn mode_is_emitted_only_on_its_closing_field() {
        // The second mode block is missing "CPUs Type B:" and must not count.
        let input = "\
Task 1:
Span A: 1ms
Span B: 0ms
Modes:
    Period: 5ms
    Work Type A: 4ms
    CPUs Type B: 0
    Period: 9ms
    Work Type A: 9ms
";
        let tasks = parse_str(input).unwrap();
        assert_eq!(tasks[0].modes.len(), 1);
        assert_eq!(tasks[0].modes[0].period_ms, 5.0);
    }

    #[test]
    fn crlf_line_endings_are_tolerated() {
        let input = TWO_TASKS.replace('\n', "\r\n");
        let tasks = parse_str(&input).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].modes.len(), 2);
    }

    #[test]
    fn range_lines_populate_the_optional_fields() {
        let input = "\
Task 1:
Span A: 1ms
Span B: 0ms
Modes:
    Period: 5ms
    Total Work: 4ms
    Total Work Range: [4.0, 10.0]ms
    Work Type A Range: [3.0, 8.0]ms
    Work Type A: 4ms
    Work Type B: 0ms
    CPUs Type B: 0
";
        let tasks = parse_str(input).unwrap();
        let mode = &tasks[0].modes[0];
        assert_eq!(mode.total_work_range_ms, Some((4.0, 10.0)));
        assert_eq!(mode.work_a_range_ms, Some((3.0, 8.0)));
        assert_eq!(mode.work_b_range_ms, None);
        assert_eq!(mode.total_work_ms, 4.0);
    }

    #[test]
    fn empty_input_yields_no_tasks() {
        assert_eq!(parse_str("").unwrap(), Vec::new());
        assert_eq!(parse_str("\n\n  \n").unwrap(), Vec::new());
    }

    #[test]
    fn task_without_modes_is_an_error() {
        let input = "Task 1:\nSpan A: 1ms\nSpan B: 0ms\n";
        let err = parse_str(input).unwrap_err();
        assert!(matches!(err, ParseError::TaskWithoutModes { task: 1, .. }));
    }

    #[test]
    fn bad_number_reports_its_line() {
        let input = "\
Task 1:
Span A: oops
";
        let err = parse_str(input).unwrap_err();
        assert!(matches!(err, ParseError::InvalidNumber { line: 2, .. }));
    }

    // ── parse_file ────────────────────────────────────────────────────────────

    #[test]
    fn parse_file_reads_from_disk() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(TWO_TASKS.as_bytes()).unwrap();
        let tasks = parse_file(f.path()).unwrap();
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn parse_file_missing_path_is_an_error() {
        assert!(parse_file(Path::new("/nonexistent/tasks.txt")).is_err());
    }

    // ── timed_menu ────────────────────────────────────────────────────────────

    #[test]
    fn timed_menu_maps_type_a_to_cpu_and_type_b_to_gpu() {
        let tasks = parse_str(TWO_TASKS).unwrap();
        let (cpu, gpu) = timed_menu(&tasks[1]);
        assert_eq!(cpu.len(), 1);
        assert_eq!(gpu.len(), 1);

        assert_eq!(cpu[0].work, Timespec::from_millis_f64(6.0));
        assert_eq!(cpu[0].span, Timespec::from_millis_f64(0.5));
        assert_eq!(cpu[0].period, Timespec::from_millis_f64(10.0));

        assert_eq!(gpu[0].work, Timespec::from_millis_f64(2.0));
        assert_eq!(gpu[0].span, Timespec::from_millis_f64(0.25));
        // both sides share the mode's period
        assert_eq!(gpu[0].period, cpu[0].period);
    }

    #[test]
    fn timed_menu_converts_milliseconds_exactly() {
        let task = RawTask {
            span_a_ms: 0.0,
            span_b_ms: 0.0,
            elasticity: 1.0,
            modes: vec![RawMode {
                period_ms: 1234.5,
                work_a_ms: 2.5,
                ..Default::default()
            }],
        };
        let (cpu, _) = timed_menu(&task);
        assert_eq!(cpu[0].period.sec(), 1);
        assert_eq!(cpu[0].period.subsec_nanos(), 234_500_000);
        assert_eq!(cpu[0].work.subsec_nanos(), 2_500_000);
    }
}
