//! Locating the semantic model and report folders of a PBIP project.

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::LoadError;

const SEMANTIC_MODEL_SUFFIX: &str = ".SemanticModel";
const REPORT_SUFFIX: &str = ".Report";

/// Folders that make up one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    /// Directory holding the `.pbip` file and the artifact folders
    pub root: PathBuf,
    pub name: String,
    pub semantic_model: PathBuf,
    pub report: Option<PathBuf>,
}

impl ProjectLayout {
    pub fn model_definition(&self) -> PathBuf {
        self.semantic_model.join("definition")
    }
}

/// Resolve `path` (a `.pbip` file, the project folder or a `.SemanticModel`
/// folder) to its project layout.
pub fn discover(path: &Path) -> Result<ProjectLayout, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    let path = path.canonicalize().map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if path.is_file() {
        if has_extension(&path, "pbip") {
            let root = parent_of(&path)?;
            let name = file_stem(&path);
            let model = find_artifact(&root, &name, SEMANTIC_MODEL_SUFFIX)?
                .ok_or_else(|| LoadError::NotAProject(path.clone()))?;
            return layout(root, model);
        }
        return Err(LoadError::NotAProject(path));
    }

    if dir_name(&path).ends_with(SEMANTIC_MODEL_SUFFIX) {
        let root = parent_of(&path)?;
        return layout(root, path);
    }

    let pbip_files = list_dir(&path)?
        .into_iter()
        .filter(|p| p.is_file() && has_extension(p, "pbip"))
        .collect::<Vec<_>>();
    if let [pbip] = pbip_files.as_slice() {
        let name = file_stem(pbip);
        if let Some(model) = find_artifact(&path, &name, SEMANTIC_MODEL_SUFFIX)? {
            return layout(path, model);
        }
    }

    let models = list_dir(&path)?
        .into_iter()
        .filter(|p| p.is_dir() && dir_name(p).ends_with(SEMANTIC_MODEL_SUFFIX))
        .collect::<Vec<_>>();
    match models.as_slice() {
        [model] => layout(path.clone(), model.clone()),
        _ if path.join("definition").is_dir() => Ok(ProjectLayout {
            root: path.clone(),
            name: dir_name(&path),
            semantic_model: path,
            report: None,
        }),
        _ => Err(LoadError::NotAProject(path)),
    }
}

fn layout(root: PathBuf, semantic_model: PathBuf) -> Result<ProjectLayout, LoadError> {
    let folder = dir_name(&semantic_model);
    let name = folder
        .strip_suffix(SEMANTIC_MODEL_SUFFIX)
        .unwrap_or(&folder)
        .to_string();

    if !semantic_model.join("definition").is_dir() {
        if semantic_model.join("model.bim").is_file() {
            return Err(LoadError::UnsupportedFormat(semantic_model));
        }
        return Err(LoadError::NotAProject(semantic_model));
    }

    let report = find_artifact(&root, &name, REPORT_SUFFIX)?;
    tracing::debug!(
        "Discovered project '{}' (model: {}, report: {:?})",
        name,
        semantic_model.display(),
        report
    );
    Ok(ProjectLayout {
        root,
        name,
        semantic_model,
        report,
    })
}

/// `<root>/<name><suffix>`, or the only folder in `root` with that suffix
fn find_artifact(root: &Path, name: &str, suffix: &str) -> Result<Option<PathBuf>, LoadError> {
    let exact = root.join(format!("{}{}", name, suffix));
    if exact.is_dir() {
        return Ok(Some(exact));
    }
    let candidates = list_dir(root)?
        .into_iter()
        .filter(|p| p.is_dir() && dir_name(p).ends_with(suffix))
        .collect::<Vec<_>>();
    Ok(match candidates.as_slice() {
        [only] => Some(only.clone()),
        _ => None,
    })
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let io_err = |source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    paths.sort();
    Ok(paths)
}

fn parent_of(path: &Path) -> Result<PathBuf, LoadError> {
    path.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| LoadError::NotAProject(path.to_path_buf()))
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scaffold(dir: &Path) {
        fs::write(dir.join("Sales.pbip"), "{}").unwrap();
        fs::create_dir_all(dir.join("Sales.SemanticModel/definition")).unwrap();
        fs::create_dir_all(dir.join("Sales.Report")).unwrap();
    }

    #[test]
    fn test_discover_from_each_entry_point() {
        let temp = TempDir::new().unwrap();
        scaffold(temp.path());
        let root = temp.path().canonicalize().unwrap();

        for entry in [
            temp.path().to_path_buf(),
            temp.path().join("Sales.pbip"),
            temp.path().join("Sales.SemanticModel"),
        ] {
            let layout = discover(&entry).unwrap();
            assert_eq!(layout.root, root);
            assert_eq!(layout.name, "Sales");
            assert_eq!(layout.semantic_model, root.join("Sales.SemanticModel"));
            assert_eq!(layout.report, Some(root.join("Sales.Report")));
        }
    }

    #[test]
    fn test_model_bim_is_unsupported() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("Old.SemanticModel")).unwrap();
        fs::write(temp.path().join("Old.SemanticModel/model.bim"), "{}").unwrap();
        assert!(matches!(
            discover(temp.path()),
            Err(LoadError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_not_a_project() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(discover(temp.path()), Err(LoadError::NotAProject(_))));
        assert!(matches!(
            discover(&temp.path().join("missing")),
            Err(LoadError::NotFound(_))
        ));
    }
}
