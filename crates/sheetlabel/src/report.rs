//! What a run did, and the console lines that announce it

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use sheetlabel_mip::AssignmentMethod;

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Absolute path of the labeled spreadsheet
    pub path: PathBuf,
    pub label_id: String,
    pub label_name: String,
    pub assignment_method: AssignmentMethod,
    /// False when the file already carried the label
    pub changed: bool,
}

pub(crate) fn spreadsheet_written<W: Write + ?Sized>(out: &mut W, path: &Path) -> io::Result<()> {
    writeln!(out, "Spreadsheet written: {}", path.display())
}

pub(crate) fn label_applied<W: Write + ?Sized>(out: &mut W, report: &RunReport) -> io::Result<()> {
    writeln!(
        out,
        "Label '{}' applied to {}",
        report.label_name,
        report.path.display()
    )
}
