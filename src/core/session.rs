// This module tracks per-runtime statistics for the hlc compilation service. SessionStats
// counts every public operation a Runtime performs: modules parsed from text or bitcode,
// optimization pipelines run, links performed, artifacts emitted and the number of bytes
// handed back to callers, plus the number of operations that failed. The Runtime keeps the
// stats behind a RefCell so read-only entry points can still record, and the driver prints
// them through the Display implementation when asked for --stats.

//! Session statistics.

use std::fmt;

use crate::llvm::OutputKind;

/// Counters for the operations a [`Runtime`](super::Runtime) has performed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Modules created from IR text.
    pub modules_parsed: usize,

    /// Modules created from bitcode.
    pub bitcode_modules_parsed: usize,

    /// Optimization pipelines that completed.
    pub optimizations_run: usize,

    /// Links that completed.
    pub links_performed: usize,

    /// Assembly artifacts emitted.
    pub assembly_emitted: usize,

    /// Object artifacts emitted.
    pub objects_emitted: usize,

    /// Total size of emitted artifacts (bytes).
    pub emitted_bytes: usize,

    /// Operations that returned an error.
    pub failures: usize,
}

impl SessionStats {
    pub fn record_parse(&mut self, bitcode: bool) {
        if bitcode {
            self.bitcode_modules_parsed += 1;
        } else {
            self.modules_parsed += 1;
        }
    }

    pub fn record_optimization(&mut self) {
        self.optimizations_run += 1;
    }

    pub fn record_link(&mut self) {
        self.links_performed += 1;
    }

    pub fn record_emit(&mut self, kind: OutputKind, size: usize) {
        match kind {
            OutputKind::Assembly => self.assembly_emitted += 1,
            OutputKind::Object => self.objects_emitted += 1,
        }
        self.emitted_bytes += size;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(
            f,
            "  Modules parsed: {} text, {} bitcode",
            self.modules_parsed, self.bitcode_modules_parsed
        )?;
        writeln!(f, "  Optimizations run: {}", self.optimizations_run)?;
        writeln!(f, "  Links performed: {}", self.links_performed)?;
        writeln!(
            f,
            "  Artifacts emitted: {} assembly, {} object ({} bytes)",
            self.assembly_emitted, self.objects_emitted, self.emitted_bytes
        )?;
        if self.failures > 0 {
            writeln!(f, "  Failed operations: {}", self.failures)?;
        }
        Ok(())
    }
}
