//! Report templates.
//!
//! A templates file maps names to handlebars sources:
//!
//! ```yaml
//! version: "1.0"
//! templates:
//!   index:
//!     description: Project index page
//!     template: "# Projects ..."
//! ```
//!
//! Two names are used: `index` and `project`. Built-in versions of both
//! ship with the crate; a user file only needs the ones it replaces.

use crate::ReportError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const INDEX_TEMPLATE: &str = "index";
pub const PROJECT_TEMPLATE: &str = "project";

const BUILTIN_INDEX: &str = r#"---
title: "Project Index"
---

# Project Index

{{#each projects}}
## [{{this}}]({{this}}.html)
- This links to `{{this}}.qmd` rendered as HTML.

{{/each}}
"#;

const BUILTIN_PROJECT: &str = r#"---
title: "{{project}}"
format: html
---

# Project: {{project}}

{{#each folders}}
## Folder: {{name}}
{{#if subfolders}}
- Subfolders: {{join subfolders ", "}}
{{/if}}
{{#if files}}
- Files: {{join files ", "}}
{{/if}}

{{/each}}
{{#if root_files}}
## Files at project root
{{join root_files ", "}}
{{/if}}
{{#if stats}}

## Model statistics

| Scenario | Registered images | Points | Observations | Mean track length | Mean reprojection error |
|---|---|---|---|---|---|
{{#each stats}}
| {{scenario}} | {{registered_images}}/{{images}} | {{points3d}} | {{observations}} | {{mean_track_length}} | {{mean_reprojection_error}} |
{{/each}}
{{/if}}
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct TemplatesFile {
    #[serde(default = "default_version")]
    pub version: String,
    pub templates: BTreeMap<String, Template>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub description: String,
    pub template: String,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl TemplatesFile {
    pub fn builtin() -> Self {
        let templates = [
            (INDEX_TEMPLATE, "Project index page", BUILTIN_INDEX),
            (PROJECT_TEMPLATE, "Per-project page", BUILTIN_PROJECT),
        ]
        .into_iter()
        .map(|(name, description, template)| {
            (
                name.to_string(),
                Template {
                    description: description.to_string(),
                    template: template.to_string(),
                },
            )
        })
        .collect();
        Self {
            version: default_version(),
            templates,
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ReportError> {
        serde_yaml::from_str(yaml).map_err(|e| ReportError::Template(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReportError::Template(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    /// Built-in templates with every entry of `path` laid over them.
    pub fn builtin_with_overrides(path: &Path) -> Result<Self, ReportError> {
        let mut merged = Self::builtin();
        merged.templates.extend(Self::load(path)?.templates);
        Ok(merged)
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn list_templates(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }
}

impl Default for TemplatesFile {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_has_both_pages() {
        let file = TemplatesFile::builtin();
        assert_eq!(file.list_templates(), vec![INDEX_TEMPLATE, PROJECT_TEMPLATE]);
    }

    #[test]
    fn test_override_replaces_one_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.yaml");
        std::fs::write(
            &path,
            r#"
templates:
  index:
    template: "{{#each projects}}* {{this}}\n{{/each}}"
"#,
        )
        .unwrap();

        let merged = TemplatesFile::builtin_with_overrides(&path).unwrap();
        assert!(merged.get(INDEX_TEMPLATE).unwrap().template.starts_with("{{#each"));
        assert_eq!(
            merged.get(PROJECT_TEMPLATE).unwrap().template,
            BUILTIN_PROJECT
        );
    }

    #[test]
    fn test_bad_yaml() {
        assert!(matches!(
            TemplatesFile::from_yaml("templates: 3"),
            Err(ReportError::Template(_))
        ));
    }
}
