use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::RenameConfig;
use crate::core::{fold_name, EntityKind, LoadError, Location, ParseError};
use crate::model::ModelDocument;
use crate::report::{ReportDialect, ReportDocument};

use super::discovery::ProjectLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Model,
    Report(ReportDialect),
}

impl FileKind {
    pub fn label(&self) -> &'static str {
        match self {
            FileKind::Model => "model",
            FileKind::Report(ReportDialect::Legacy) => "report (legacy)",
            FileKind::Report(ReportDialect::Current) => "report",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Document {
    Model(ModelDocument),
    Report(ReportDocument),
}

/// Parse `text` with the grammar for `kind`
pub fn parse_document(kind: FileKind, text: &str, config: &RenameConfig) -> Result<Document, ParseError> {
    match kind {
        FileKind::Model => ModelDocument::parse(text).map(Document::Model),
        FileKind::Report(dialect) if config.report.parse_embedded => {
            ReportDocument::parse(text, dialect).map(Document::Report)
        }
        FileKind::Report(dialect) => ReportDocument::parse_shallow(text, dialect).map(Document::Report),
    }
}

/// One parsed file of the project
#[derive(Debug, Clone)]
pub struct ProjectFile {
    pub path: PathBuf,
    /// Path relative to the project root
    pub rel_path: PathBuf,
    pub kind: FileKind,
    pub document: Document,
}

impl ProjectFile {
    pub fn text(&self) -> &str {
        match &self.document {
            Document::Model(doc) => doc.text(),
            Document::Report(doc) => doc.text(),
        }
    }

    pub fn model(&self) -> Option<&ModelDocument> {
        match &self.document {
            Document::Model(doc) => Some(doc),
            Document::Report(_) => None,
        }
    }

    pub fn report(&self) -> Option<&ReportDocument> {
        match &self.document {
            Document::Report(doc) => Some(doc),
            Document::Model(_) => None,
        }
    }

    pub fn location(&self, offset: usize) -> Location {
        let (line, column) = match &self.document {
            Document::Model(doc) => doc.position(offset),
            Document::Report(doc) => doc.position(offset),
        };
        Location {
            file_path: self.rel_path.clone(),
            line,
            column,
        }
    }
}

/// Every parsed file of a project, sorted by relative path
#[derive(Debug, Clone)]
pub struct Project {
    pub layout: ProjectLayout,
    pub files: Vec<ProjectFile>,
}

impl Project {
    pub fn model_files(&self) -> impl Iterator<Item = (&ProjectFile, &ModelDocument)> {
        self.files.iter().filter_map(|f| f.model().map(|doc| (f, doc)))
    }

    pub fn report_files(&self) -> impl Iterator<Item = (&ProjectFile, &ReportDocument)> {
        self.files.iter().filter_map(|f| f.report().map(|doc| (f, doc)))
    }
}

pub fn load_files(layout: ProjectLayout, config: &RenameConfig) -> Result<Project, LoadError> {
    let mut sources = collect(&layout.model_definition(), "tmdl", config)
        .into_iter()
        .map(|p| (p, FileKind::Model))
        .collect::<Vec<_>>();

    if let Some(report) = layout.report.as_ref().filter(|_| config.report.enabled) {
        let legacy = report.join("report.json");
        if legacy.is_file() {
            sources.push((legacy, FileKind::Report(ReportDialect::Legacy)));
        }
        sources.extend(
            collect(&report.join("definition"), "json", config)
                .into_iter()
                .map(|p| (p, FileKind::Report(ReportDialect::Current))),
        );
    }

    tracing::debug!("Parsing {} project files", sources.len());
    let mut files = sources
        .par_iter()
        .map(|(path, kind)| load_file(&layout.root, path, *kind, config))
        .collect::<Result<Vec<_>, _>>()?;
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

    let project = Project { layout, files };
    check_duplicate_declarations(&project)?;
    Ok(project)
}

fn collect(dir: &Path, extension: &str, config: &RenameConfig) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.depth() > 0
                && config.is_ignored_dir(&e.file_name().to_string_lossy()))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| x.eq_ignore_ascii_case(extension))
        })
        .map(|e| e.into_path())
        .collect()
}

fn load_file(root: &Path, path: &Path, kind: FileKind, config: &RenameConfig) -> Result<ProjectFile, LoadError> {
    let io_err = |source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    };
    let size = fs::metadata(path).map_err(io_err)?.len();
    if size > config.scan.max_file_bytes {
        return Err(LoadError::FileTooLarge {
            file: path.to_path_buf(),
            size,
            limit: config.scan.max_file_bytes,
        });
    }
    let text = fs::read_to_string(path).map_err(io_err)?;
    let rel_path = pathdiff::diff_paths(path, root).unwrap_or_else(|| path.to_path_buf());
    let document = parse_document(kind, &text, config).map_err(|error| LoadError::Parse {
        file: rel_path.clone(),
        error,
    })?;
    Ok(ProjectFile {
        path: path.to_path_buf(),
        rel_path,
        kind,
        document,
    })
}

/// Tables and relationships must be unique across files
fn check_duplicate_declarations(project: &Project) -> Result<(), LoadError> {
    let mut seen: HashMap<(EntityKind, String), &Path> = HashMap::new();
    for (file, doc) in project.model_files() {
        for object in doc.tables().chain(doc.relationships()) {
            let (Some(kind), Some(name)) = (object.kind, object.name_str()) else {
                continue;
            };
            if let Some(first) = seen.insert((kind, fold_name(name)), &file.rel_path) {
                return Err(LoadError::DuplicateEntity {
                    kind,
                    name: name.to_string(),
                    first: first.to_path_buf(),
                    second: file.rel_path.clone(),
                });
            }
        }
    }
    Ok(())
}
