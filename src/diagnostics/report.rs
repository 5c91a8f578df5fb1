//! The structured result of one simulation run

use super::{DiagnosticKind, Finding, Severity};
use crate::memory::heap::HeapBlock;
use serde::Serialize;
use std::fmt;

/// Findings in program order plus the end-of-run leak list.
///
/// When the run halted on a fatal finding, that finding is the last one and
/// no leak scan is made; `halted_at` holds its instruction index.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationReport {
    pub findings: Vec<Finding>,
    pub leaks: Vec<HeapBlock>,
    pub instructions_executed: usize,
    pub halted_at: Option<usize>,
}

impl SimulationReport {
    pub fn fatal_count(&self) -> usize {
        self.findings.iter().filter(|f| f.is_fatal()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
            .count()
    }

    pub fn has_fatal(&self) -> bool {
        self.findings.iter().any(Finding::is_fatal)
    }

    /// Number of findings of one kind
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.findings.iter().filter(|f| f.kind == kind).count()
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.kind == kind)
    }

    /// The last finding, which is the fatal one if the run halted
    pub fn terminal_finding(&self) -> Option<&Finding> {
        self.findings.last()
    }

    pub fn leaked_bytes(&self) -> usize {
        self.leaks.iter().map(|block| block.size).sum()
    }

    /// Findings raised by one instruction
    pub fn findings_at(&self, index: usize) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.index == index)
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for finding in &self.findings {
            if finding.kind == DiagnosticKind::MemoryLeak {
                write!(f, "end of run: ")?;
            } else {
                write!(f, "instruction {}: ", finding.index)?;
            }
            writeln!(
                f,
                "{} {}: {}",
                finding.severity, finding.kind, finding.message
            )?;
        }

        if let Some(index) = self.halted_at {
            writeln!(f, "halted at instruction {}", index)?;
        }
        write!(
            f,
            "{} instruction{} executed, {} fatal, {} warning{}",
            self.instructions_executed,
            if self.instructions_executed == 1 { "" } else { "s" },
            self.fatal_count(),
            self.warning_count(),
            if self.warning_count() == 1 { "" } else { "s" },
        )?;
        if !self.leaks.is_empty() {
            write!(
                f,
                ", {} leaked block{} ({} bytes)",
                self.leaks.len(),
                if self.leaks.len() == 1 { "" } else { "s" },
                self.leaked_bytes()
            )?;
        }
        writeln!(f)
    }
}
