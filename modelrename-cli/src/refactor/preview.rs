use serde::Serialize;
use similar::TextDiff;
use std::path::PathBuf;

use crate::core::ApplyError;

use super::planner::{FilePlan, RenamePlan};
use super::transaction::ApplyReport;

/// A single change in a file (one name token with its replacement)
#[derive(Debug, Clone, Serialize)]
pub struct PreviewChange {
    /// Line number (1-indexed)
    pub line: usize,

    /// Column where the token starts (1-indexed)
    pub column: usize,

    /// Original text
    pub original: String,

    /// Replacement text
    pub replacement: String,

    /// Full line content (for context)
    pub line_content: String,
}

/// Preview of all changes in a single file
#[derive(Debug, Clone, Serialize)]
pub struct PreviewDiff {
    /// File path, relative to the project root
    pub file_path: PathBuf,

    /// Number of changes in this file
    pub num_changes: usize,

    /// Individual changes, in document order
    pub changes: Vec<PreviewChange>,

    /// Unified diff of the whole file
    pub unified: String,
}

impl PreviewDiff {
    pub fn from_file_plan(file: &FilePlan) -> Result<Self, ApplyError> {
        let new_content = file.new_content().map_err(|source| ApplyError::Edit {
            file: file.rel_path.clone(),
            source,
        })?;

        let lines: Vec<&str> = file.original.lines().collect();
        let changes = file
            .edits
            .iter()
            .rev()
            .map(|edit| PreviewChange {
                line: edit.location.line,
                column: edit.location.column,
                original: edit.old_text.clone(),
                replacement: edit.new_text.clone(),
                line_content: lines
                    .get(edit.location.line.saturating_sub(1))
                    .map(|l| l.trim().to_string())
                    .unwrap_or_default(),
            })
            .collect::<Vec<_>>();

        let name = file.rel_path.to_string_lossy().replace('\\', "/");
        let unified = TextDiff::from_lines(file.original.as_str(), new_content.as_str())
            .unified_diff()
            .context_radius(2)
            .header(&format!("a/{}", name), &format!("b/{}", name))
            .to_string();

        Ok(Self {
            file_path: file.rel_path.clone(),
            num_changes: changes.len(),
            changes,
            unified,
        })
    }

    /// Generate a human-readable diff output
    pub fn format_diff(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("📝 {}\n", self.file_path.display()));
        output.push_str(&format!(
            "   {} change{}\n\n",
            self.num_changes,
            if self.num_changes == 1 { "" } else { "s" }
        ));

        for (i, change) in self.changes.iter().enumerate() {
            output.push_str(&format!("  {}:{}  {}\n", change.line, change.column, change.line_content));
            output.push_str(&format!("  - {}\n", change.original));
            output.push_str(&format!("  + {}\n", change.replacement));
            if i < self.changes.len() - 1 {
                output.push('\n');
            }
        }

        output
    }
}

/// What a rename would do, computed without touching the project
#[derive(Debug, Clone, Serialize)]
pub struct RenamePreview {
    pub report: ApplyReport,
    pub diffs: Vec<PreviewDiff>,
}

impl RenamePreview {
    pub fn new(plan: &RenamePlan, report: ApplyReport) -> Result<Self, ApplyError> {
        let diffs = plan
            .files
            .iter()
            .map(PreviewDiff::from_file_plan)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { report, diffs })
    }

    pub fn format(&self) -> String {
        let mut output = generate_preview(&self.diffs);
        if !self.report.flagged.is_empty() {
            output.push_str(&format!(
                "\n⚠️  {} site{} will not be updated:\n",
                self.report.flagged.len(),
                if self.report.flagged.len() == 1 { "" } else { "s" }
            ));
            for flag in &self.report.flagged {
                output.push_str(&format!(
                    "   {}:{}:{}  {}  ({})\n",
                    flag.location.file_path.display(),
                    flag.location.line,
                    flag.location.column,
                    flag.text,
                    flag.reason
                ));
            }
        }
        output
    }

    /// Concatenated unified diffs of every file
    pub fn unified(&self) -> String {
        self.diffs.iter().map(|d| d.unified.as_str()).collect()
    }
}

/// Generate preview for all files
pub fn generate_preview(diffs: &[PreviewDiff]) -> String {
    let mut output = String::new();

    let total_files = diffs.len();
    let total_changes: usize = diffs.iter().map(|d| d.num_changes).sum();

    output.push_str("========================================\n");
    output.push_str("           PREVIEW CHANGES\n");
    output.push_str("========================================\n\n");
    output.push_str(&format!(
        "📊 {} file{}, {} change{}\n\n",
        total_files,
        if total_files == 1 { "" } else { "s" },
        total_changes,
        if total_changes == 1 { "" } else { "s" }
    ));

    for (i, diff) in diffs.iter().enumerate() {
        output.push_str(&diff.format_diff());
        if i < diffs.len() - 1 {
            output.push_str("\n----------------------------------------\n\n");
        }
    }

    output.push_str("\n========================================\n");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Location, OccurrenceKind, TextSpan};
    use crate::project::FileKind;
    use crate::refactor::planner::PlannedEdit;

    fn file_plan() -> FilePlan {
        let original = "table Sales\n\n\tmeasure Total = SUM(Sales[Amount])\n".to_string();
        let edit = |start: usize, line: usize, column: usize| PlannedEdit {
            location: Location {
                file_path: PathBuf::from("tables/Sales.tmdl"),
                line,
                column,
            },
            span: TextSpan::new(start, start + 5),
            kind: OccurrenceKind::FormulaReference,
            old_text: "Sales".to_string(),
            new_text: "'Fact Sales'".to_string(),
        };
        FilePlan {
            path: PathBuf::from("/p/tables/Sales.tmdl"),
            rel_path: PathBuf::from("tables/Sales.tmdl"),
            kind: FileKind::Model,
            edits: vec![edit(34, 3, 22), edit(6, 1, 7)],
            original,
        }
    }

    #[test]
    fn test_preview_diff_from_plan() {
        let diff = PreviewDiff::from_file_plan(&file_plan()).unwrap();
        assert_eq!(diff.num_changes, 2);
        assert_eq!(diff.changes[0].line, 1);
        assert_eq!(diff.changes[1].line_content, "measure Total = SUM(Sales[Amount])");

        assert!(diff.unified.contains("--- a/tables/Sales.tmdl"));
        assert!(diff.unified.contains("-table Sales"));
        assert!(diff.unified.contains("+table 'Fact Sales'"));
        assert!(diff.unified.contains("+\tmeasure Total = SUM('Fact Sales'[Amount])"));
    }

    #[test]
    fn test_preview_diff_format() {
        let formatted = PreviewDiff::from_file_plan(&file_plan()).unwrap().format_diff();
        assert!(formatted.contains("tables/Sales.tmdl"));
        assert!(formatted.contains("3:22"));
        assert!(formatted.contains("- Sales"));
        assert!(formatted.contains("+ 'Fact Sales'"));
    }

    #[test]
    fn test_generate_preview_totals() {
        let diff = PreviewDiff::from_file_plan(&file_plan()).unwrap();
        let output = generate_preview(&[diff]);
        assert!(output.contains("PREVIEW CHANGES"));
        assert!(output.contains("1 file, 2 changes"));
    }
}
