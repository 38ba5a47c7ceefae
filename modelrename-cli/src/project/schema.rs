use serde::Serialize;
use std::path::PathBuf;

use crate::core::EntityKind;
use crate::model::{ModelObject, PropertyValue};

use super::loader::Project;

/// Serializable overview of a project's model
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSchema {
    pub project: String,
    pub root: PathBuf,
    pub tables: Vec<TableSchema>,
    pub relationships: Vec<RelationshipSchema>,
    pub model_files: usize,
    pub report_files: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub file: PathBuf,
    pub columns: Vec<ColumnSchema>,
    pub measures: Vec<MeasureSchema>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: Option<String>,
    pub is_calculated: bool,
    pub is_hidden: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeasureSchema {
    pub name: String,
    pub expression: Option<String>,
    pub format_string: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationshipSchema {
    pub name: String,
    pub from_column: Option<String>,
    pub to_column: Option<String>,
    pub is_active: bool,
}

impl ProjectSchema {
    pub fn from_project(project: &Project) -> Self {
        let mut tables = Vec::new();
        let mut relationships = Vec::new();

        for (file, doc) in project.model_files() {
            for table in doc.tables() {
                let Some(name) = table.name_str() else {
                    continue;
                };
                tables.push(TableSchema {
                    name: name.to_string(),
                    file: file.rel_path.clone(),
                    columns: table
                        .children
                        .iter()
                        .filter(|c| c.kind == Some(EntityKind::Column))
                        .filter_map(|c| {
                            Some(ColumnSchema {
                                name: c.name_str()?.to_string(),
                                data_type: c.property_text("dataType").map(str::to_string),
                                is_calculated: c.expression.is_some(),
                                is_hidden: c.has_flag("isHidden"),
                            })
                        })
                        .collect(),
                    measures: table
                        .children
                        .iter()
                        .filter(|c| c.kind == Some(EntityKind::Measure))
                        .filter_map(|m| {
                            Some(MeasureSchema {
                                name: m.name_str()?.to_string(),
                                expression: m
                                    .expression
                                    .as_ref()
                                    .map(|e| doc.slice(e.span).trim().to_string()),
                                format_string: m.property_text("formatString").map(str::to_string),
                            })
                        })
                        .collect(),
                });
            }

            for rel in doc.relationships() {
                let Some(name) = rel.name_str() else {
                    continue;
                };
                relationships.push(RelationshipSchema {
                    name: name.to_string(),
                    from_column: endpoint(rel, "fromColumn"),
                    to_column: endpoint(rel, "toColumn"),
                    is_active: rel.property_text("isActive") != Some("false"),
                });
            }
        }

        tables.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

        Self {
            project: project.layout.name.clone(),
            root: project.layout.root.clone(),
            tables,
            relationships,
            model_files: project.model_files().count(),
            report_files: project.report_files().count(),
        }
    }
}

fn endpoint(rel: &ModelObject, key: &str) -> Option<String> {
    match &rel.property(key)?.value {
        PropertyValue::Scalar { text, .. } => Some(text.clone()),
        _ => None,
    }
}
