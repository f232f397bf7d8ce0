use serde::Serialize;
use std::fmt;
use std::io::Write;

use crate::analysis::InstructionHotspot;
use crate::domain::ExportError;
use crate::profiling::FlushStats;
use crate::snapshot::{DumpOutcome, MergeStats};

/// Final numbers of a profiling session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub unique_instructions: usize,
    pub total_executions: u64,
    /// Groups registered during the run
    pub groups: usize,
    /// The shutdown flush
    pub flush: FlushStats,
    /// Trace buffer entries drained by ended threads
    pub drained_events: u64,
    /// Thread contexts started
    pub threads: usize,
    /// Prior snapshot folded in at init
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeStats>,
    pub output: DumpOutcome,
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.output {
            DumpOutcome::Summary(summary) => writeln!(f, "{summary}")?,
            DumpOutcome::Written { path, records } => {
                writeln!(f, "saved: {} ({records} instructions)", path.display())?;
            }
        }
        write!(
            f,
            "executions: {}, groups: {}, threads: {}, drained events: {}",
            self.total_executions, self.groups, self.threads, self.drained_events
        )
    }
}

/// JSON document written by [`ReportExporter::export`]
#[derive(Serialize)]
struct ReportDocument<'a> {
    version: &'static str,
    session: &'a SessionReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    hotspots: Option<&'a [InstructionHotspot]>,
}

/// Writes a session report as JSON
pub struct ReportExporter {
    report: SessionReport,
    hotspots: Vec<InstructionHotspot>,
}

impl ReportExporter {
    #[must_use]
    pub fn new(report: SessionReport) -> Self {
        Self { report, hotspots: Vec::new() }
    }

    /// Include a ranking of the hottest instructions
    #[must_use]
    pub fn with_hotspots(mut self, hotspots: Vec<InstructionHotspot>) -> Self {
        self.hotspots = hotspots;
        self
    }

    /// Export the report to any writer (file, stdout, buffer, etc.)
    ///
    /// # Errors
    /// Serialization or I/O failures of `writer`.
    pub fn export<W: Write>(&self, mut writer: W) -> Result<(), ExportError> {
        let document = ReportDocument {
            version: env!("CARGO_PKG_VERSION"),
            session: &self.report,
            hotspots: (!self.hotspots.is_empty()).then_some(self.hotspots.as_slice()),
        };
        serde_json::to_writer_pretty(&mut writer, &document)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}
