use std::io::{self, Write};

use serde::Serialize;

use crate::app::{PlanResult, ProgressEvent, ProgressSink, VariablesResult};
use crate::convert::ConvertOutcome;
use crate::submit::{SubmissionHandle, SubmissionReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

impl OutputMode {
    pub fn from_flag(non_interactive: bool) -> Self {
        if non_interactive {
            OutputMode::NonInteractive
        } else {
            OutputMode::Interactive
        }
    }
}

/// Export report with its counters spelled out, so scripts need not recount
/// the handles.
#[derive(Serialize)]
struct ExportSummary<'a> {
    attempted: usize,
    started: usize,
    rejected: usize,
    pauses: &'a [u64],
    handles: &'a [SubmissionHandle],
}

impl<'a> From<&'a SubmissionReport> for ExportSummary<'a> {
    fn from(report: &'a SubmissionReport) -> Self {
        Self {
            attempted: report.attempted(),
            started: report.started(),
            rejected: report.rejected(),
            pauses: &report.pauses,
            handles: &report.handles,
        }
    }
}

/// Machine-readable results on stdout. As a progress sink it stays silent so
/// stdout carries exactly one JSON document.
pub struct JsonOutput;

impl JsonOutput {
    pub fn print_plan(result: &PlanResult) -> io::Result<()> {
        Self::write_json(&mut io::stdout().lock(), result)
    }

    pub fn print_variables(result: &VariablesResult) -> io::Result<()> {
        Self::write_json(&mut io::stdout().lock(), result)
    }

    pub fn print_export(report: &SubmissionReport) -> io::Result<()> {
        Self::write_export(&mut io::stdout().lock(), report)
    }

    pub fn print_convert(outcome: &ConvertOutcome) -> io::Result<()> {
        Self::write_json(&mut io::stdout().lock(), outcome)
    }

    pub fn write_export<W: Write>(writer: &mut W, report: &SubmissionReport) -> io::Result<()> {
        Self::write_json(writer, &ExportSummary::from(report))
    }

    pub fn write_json<W: Write, T: Serialize>(writer: &mut W, value: &T) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, value).map_err(io::Error::other)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}
