use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

use modelrename::refactor::{BackupInfo, References};
use modelrename::{ApplyReport, ProjectSchema, RenamePreview};

#[derive(Clone, Debug)]
pub enum OutputFormat {
    Text,
    Json,
    Markdown,
}

pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(format: &crate::OutputFormat) -> Self {
        let format = match format {
            crate::OutputFormat::Text => OutputFormat::Text,
            crate::OutputFormat::Json => OutputFormat::Json,
            crate::OutputFormat::Markdown => OutputFormat::Markdown,
        };
        Self { format }
    }

    pub fn write_schema(&self, schema: &ProjectSchema) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(schema)?);
            }
            OutputFormat::Text => {
                println!("Project: {} ({})", schema.project, schema.root.display());
                println!(
                    "  {} model files, {} report files",
                    schema.model_files, schema.report_files
                );
                for table in &schema.tables {
                    println!("\nTable {}  [{}]", table.name, table.file.display());
                    for column in &table.columns {
                        println!(
                            "  column {}: {}{}{}",
                            column.name,
                            column.data_type.as_deref().unwrap_or("?"),
                            if column.is_calculated { " (calculated)" } else { "" },
                            if column.is_hidden { " (hidden)" } else { "" }
                        );
                    }
                    for measure in &table.measures {
                        println!(
                            "  measure {} = {}",
                            measure.name,
                            measure.expression.as_deref().unwrap_or("")
                        );
                    }
                }
                if !schema.relationships.is_empty() {
                    println!("\nRelationships:");
                    for rel in &schema.relationships {
                        println!(
                            "  {}: {} -> {}{}",
                            rel.name,
                            rel.from_column.as_deref().unwrap_or("?"),
                            rel.to_column.as_deref().unwrap_or("?"),
                            if rel.is_active { "" } else { " (inactive)" }
                        );
                    }
                }
            }
            OutputFormat::Markdown => {
                println!("# {}\n", schema.project);
                for table in &schema.tables {
                    println!("## {}\n", table.name);
                    println!("| Kind | Name | Detail |");
                    println!("|------|------|--------|");
                    for column in &table.columns {
                        println!(
                            "| column | {} | {} |",
                            column.name,
                            column.data_type.as_deref().unwrap_or("")
                        );
                    }
                    for measure in &table.measures {
                        println!(
                            "| measure | {} | `{}` |",
                            measure.name,
                            measure.expression.as_deref().unwrap_or("")
                        );
                    }
                    println!();
                }
                if !schema.relationships.is_empty() {
                    println!("## Relationships\n");
                    for rel in &schema.relationships {
                        println!(
                            "- **{}**: `{}` → `{}`",
                            rel.name,
                            rel.from_column.as_deref().unwrap_or("?"),
                            rel.to_column.as_deref().unwrap_or("?")
                        );
                    }
                }
            }
        }
        Ok(())
    }

    pub fn write_references(&self, references: &References) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(references)?);
            }
            OutputFormat::Text => {
                println!(
                    "{} {}: {} occurrence{}",
                    references.kind,
                    references.name,
                    references.occurrences.len(),
                    if references.occurrences.len() == 1 { "" } else { "s" }
                );
                for occurrence in &references.occurrences {
                    println!(
                        "{:?} at {}:{}:{}  {}",
                        occurrence.kind,
                        occurrence.location.file_path.display(),
                        occurrence.location.line,
                        occurrence.location.column,
                        occurrence.text
                    );
                }
                for flag in &references.flagged {
                    println!(
                        "⚠️  {}:{}:{}  {}  ({})",
                        flag.location.file_path.display(),
                        flag.location.line,
                        flag.location.column,
                        flag.text,
                        flag.reason
                    );
                }
            }
            OutputFormat::Markdown => {
                println!("# References to {} `{}`\n", references.kind, references.name);
                for occurrence in &references.occurrences {
                    println!(
                        "- **{:?}** - [{}:{}:{}]({}#L{}) `{}`",
                        occurrence.kind,
                        occurrence.location.file_path.display(),
                        occurrence.location.line,
                        occurrence.location.column,
                        occurrence.location.file_path.display(),
                        occurrence.location.line,
                        occurrence.text
                    );
                }
                if !references.flagged.is_empty() {
                    println!("\n## Needs review\n");
                    for flag in &references.flagged {
                        println!(
                            "- [{}:{}:{}]({}#L{}) `{}`: {}",
                            flag.location.file_path.display(),
                            flag.location.line,
                            flag.location.column,
                            flag.location.file_path.display(),
                            flag.location.line,
                            flag.text,
                            flag.reason
                        );
                    }
                }
            }
        }
        Ok(())
    }

    pub fn write_report(&self, report: &ApplyReport) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(report)?);
            }
            OutputFormat::Text => {
                print!("{}", report.format_summary());
            }
            OutputFormat::Markdown => {
                println!("# Rename\n");
                for rename in &report.renames {
                    println!(
                        "- {} `{}` → `{}` ({} references)",
                        rename.kind, rename.old, rename.new_name, rename.occurrences
                    );
                }
                println!("\n**{} references updated** in {} files\n", report.references_updated, report.files_changed.len());
                for file in &report.files_changed {
                    println!("- `{}`", file.display());
                }
                if let Some(backup) = &report.backup_path {
                    println!("\nBackup: `{}`", backup.display());
                }
                if !report.flagged.is_empty() {
                    println!("\n## Needs review\n");
                    for flag in &report.flagged {
                        println!(
                            "- `{}:{}:{}` `{}`: {}",
                            flag.location.file_path.display(),
                            flag.location.line,
                            flag.location.column,
                            flag.text,
                            flag.reason
                        );
                    }
                }
            }
        }
        Ok(())
    }

    pub fn write_preview(&self, preview: &RenamePreview) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(preview)?);
            }
            OutputFormat::Text => {
                println!("{}", preview.format());
                println!("\n💡 Run without --preview to apply changes");
            }
            OutputFormat::Markdown => {
                println!("# Preview\n");
                println!("```diff");
                print!("{}", preview.unified());
                println!("```");
            }
        }
        Ok(())
    }

    pub fn write_backups(&self, backups: &[BackupInfo]) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(backups)?);
            }
            OutputFormat::Text => {
                if backups.is_empty() {
                    println!("No backups found.");
                }
                for backup in backups {
                    println!(
                        "{}  {}  {} file{}",
                        backup
                            .created
                            .map(|c| c.format("%Y-%m-%d %H:%M:%S").to_string())
                            .unwrap_or_else(|| "unknown".to_string()),
                        backup.path.display(),
                        backup.files,
                        if backup.files == 1 { "" } else { "s" }
                    );
                }
            }
            OutputFormat::Markdown => {
                println!("# Backups\n");
                println!("| Created | Path | Files |");
                println!("|---------|------|-------|");
                for backup in backups {
                    println!(
                        "| {} | `{}` | {} |",
                        backup.created.map(|c| c.to_string()).unwrap_or_default(),
                        backup.path.display(),
                        backup.files
                    );
                }
            }
        }
        Ok(())
    }

    pub fn write_paths(&self, title: &str, paths: &[PathBuf]) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                #[derive(Serialize)]
                struct PathsResponse<'a> {
                    action: &'a str,
                    paths: &'a [PathBuf],
                }
                println!(
                    "{}",
                    serde_json::to_string_pretty(&PathsResponse { action: title, paths })?
                );
            }
            OutputFormat::Text => {
                println!("✓ {}: {}", title, paths.len());
                for path in paths {
                    println!("  • {}", path.display());
                }
            }
            OutputFormat::Markdown => {
                println!("# {}\n", title);
                for path in paths {
                    println!("- `{}`", path.display());
                }
            }
        }
        Ok(())
    }

    /// Report a failed command: JSON on stdout for scripts, plain text on stderr otherwise
    pub fn write_error(&self, error: &anyhow::Error) -> Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", self.format_error(error)?),
            OutputFormat::Text | OutputFormat::Markdown => eprintln!("{}", self.format_error(error)?),
        }
        Ok(())
    }

    fn format_error(&self, error: &anyhow::Error) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                #[derive(Serialize)]
                struct ErrorResponse {
                    error: String,
                    causes: Vec<String>,
                }
                Ok(serde_json::to_string_pretty(&ErrorResponse {
                    error: error.to_string(),
                    causes: error.chain().skip(1).map(|c| c.to_string()).collect(),
                })?)
            }
            OutputFormat::Text | OutputFormat::Markdown => Ok(format!("Error: {:#}", error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    fn failure() -> anyhow::Error {
        Err::<(), _>(std::io::Error::new(std::io::ErrorKind::NotFound, "no .pbip file"))
            .context("Failed to load project at ./Shop")
            .unwrap_err()
    }

    #[test]
    fn test_json_error_carries_cause_chain() {
        let output = OutputWriter::new(&crate::OutputFormat::Json);
        let json: serde_json::Value = serde_json::from_str(&output.format_error(&failure()).unwrap()).unwrap();
        assert_eq!(json["error"], "Failed to load project at ./Shop");
        assert_eq!(json["causes"][0], "no .pbip file");
    }

    #[test]
    fn test_text_error_is_one_line() {
        let output = OutputWriter::new(&crate::OutputFormat::Text);
        assert_eq!(
            output.format_error(&failure()).unwrap(),
            "Error: Failed to load project at ./Shop: no .pbip file"
        );
    }
}
