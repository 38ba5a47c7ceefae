//! Project discovery and loading.

mod discovery;
mod loader;
mod locks;
mod schema;

pub use discovery::{discover, ProjectLayout};
pub use loader::{load_files, parse_document, Document, FileKind, Project, ProjectFile};
pub use locks::ProjectLocks;
pub use schema::{ColumnSchema, MeasureSchema, ProjectSchema, RelationshipSchema, TableSchema};

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::RenameConfig;
use crate::core::LoadError;

/// A loaded project. Every engine operation goes through one of these.
#[derive(Debug)]
pub struct ProjectHandle {
    source: PathBuf,
    project: Project,
    config: RenameConfig,
    pub(crate) lock: Arc<Mutex<()>>,
}

impl ProjectHandle {
    /// Discover, configure and fully parse the project at `path`
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        let layout = discover(path)?;
        let config = RenameConfig::load(&layout.root)?;
        Self::open_with_config(path, config)
    }

    pub fn open_with_config(path: &Path, config: RenameConfig) -> Result<Self, LoadError> {
        let layout = discover(path)?;
        tracing::info!("Loading project '{}' from {}", layout.name, layout.root.display());
        let project = load_files(layout, &config)?;
        tracing::info!(
            "Loaded {} model files and {} report files",
            project.model_files().count(),
            project.report_files().count()
        );
        Ok(Self {
            source: path.to_path_buf(),
            project,
            config,
            lock: Arc::new(Mutex::new(())),
        })
    }

    /// Re-read every file from disk
    pub fn reload(&mut self) -> Result<(), LoadError> {
        let layout = discover(&self.source)?;
        self.project = load_files(layout, &self.config)?;
        tracing::debug!("Reloaded project '{}'", self.project.layout.name);
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.project.layout.root
    }

    pub fn name(&self) -> &str {
        &self.project.layout.name
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn config(&self) -> &RenameConfig {
        &self.config
    }

    pub fn schema(&self) -> ProjectSchema {
        ProjectSchema::from_project(&self.project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "Shop.pbip", "{}");
        write(
            root,
            "Shop.SemanticModel/definition/tables/Sales.tmdl",
            "table Sales\n\n\tmeasure Total = SUM(Sales[Amount])\n\t\tformatString: 0\n\n\tcolumn Amount\n\t\tdataType: decimal\n\t\tisHidden\n",
        );
        write(
            root,
            "Shop.SemanticModel/definition/relationships.tmdl",
            "relationship r1\n\tfromColumn: Sales.CustomerKey\n\ttoColumn: Customer.CustomerKey\n\tisActive: false\n",
        );
        write(root, "Shop.Report/report.json", "{\"sections\": []}");
        write(
            root,
            "Shop.Report/definition/pages/p1/page.json",
            "{\"name\": \"p1\"}",
        );
        temp
    }

    #[test]
    fn test_open_loads_model_and_report_files() {
        let temp = project();
        let handle = ProjectHandle::open(temp.path()).unwrap();
        assert_eq!(handle.name(), "Shop");

        let kinds: Vec<_> = handle
            .project()
            .files
            .iter()
            .map(|f| (f.rel_path.to_string_lossy().replace('\\', "/"), f.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (
                    "Shop.Report/definition/pages/p1/page.json".to_string(),
                    FileKind::Report(crate::report::ReportDialect::Current)
                ),
                (
                    "Shop.Report/report.json".to_string(),
                    FileKind::Report(crate::report::ReportDialect::Legacy)
                ),
                ("Shop.SemanticModel/definition/relationships.tmdl".to_string(), FileKind::Model),
                ("Shop.SemanticModel/definition/tables/Sales.tmdl".to_string(), FileKind::Model),
            ]
        );
    }

    #[test]
    fn test_schema_describes_tables_and_relationships() {
        let temp = project();
        let schema = ProjectHandle::open(temp.path()).unwrap().schema();
        assert_eq!(schema.tables.len(), 1);
        let sales = &schema.tables[0];
        assert_eq!(sales.columns[0].name, "Amount");
        assert_eq!(sales.columns[0].data_type.as_deref(), Some("decimal"));
        assert!(sales.columns[0].is_hidden);
        assert_eq!(sales.measures[0].expression.as_deref(), Some("SUM(Sales[Amount])"));
        assert_eq!(schema.relationships[0].from_column.as_deref(), Some("Sales.CustomerKey"));
        assert!(!schema.relationships[0].is_active);
        assert_eq!(schema.report_files, 2);
    }

    #[test]
    fn test_duplicate_table_across_files_fails() {
        let temp = project();
        write(
            temp.path(),
            "Shop.SemanticModel/definition/tables/Sales2.tmdl",
            "table SALES\n",
        );
        let err = ProjectHandle::open(temp.path()).unwrap_err();
        assert!(matches!(err, LoadError::DuplicateEntity { .. }));
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let temp = project();
        write(
            temp.path(),
            "Shop.SemanticModel/definition/tables/Broken.tmdl",
            "table 'Broken\n",
        );
        match ProjectHandle::open(temp.path()).unwrap_err() {
            LoadError::Parse { file, error } => {
                assert!(file.ends_with("Broken.tmdl"));
                assert_eq!(error.line, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_file_size_cap() {
        let temp = project();
        let mut config = RenameConfig::default();
        config.scan.max_file_bytes = 8;
        let err = ProjectHandle::open_with_config(temp.path(), config).unwrap_err();
        assert!(matches!(err, LoadError::FileTooLarge { .. }));
    }
}
