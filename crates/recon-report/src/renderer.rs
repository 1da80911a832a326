//! Handlebars rendering for report pages.
//!
//! Output is Markdown, so HTML escaping is off. Helpers:
//! - join: join an array with a separator

use crate::templates::TemplatesFile;
use crate::ReportError;
use handlebars::{handlebars_helper, no_escape, Handlebars};
use serde_json::Value;

handlebars_helper!(join: |items: array, separator: str| {
    items
        .iter()
        .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
        .collect::<Vec<_>>()
        .join(separator)
});

/// Compiled renderer with registered helpers
pub struct TemplateRenderer<'a> {
    handlebars: Handlebars<'a>,
    templates: TemplatesFile,
}

impl<'a> TemplateRenderer<'a> {
    /// Compiles every template up front; a syntax error in any of them
    /// fails here rather than at render time.
    pub fn new(templates: TemplatesFile) -> Result<Self, ReportError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(no_escape);
        handlebars.register_helper("join", Box::new(join));

        for (name, template) in &templates.templates {
            handlebars
                .register_template_string(name, &template.template)
                .map_err(|e| ReportError::Template(format!("{name}: {e}")))?;
        }
        Ok(Self {
            handlebars,
            templates,
        })
    }

    pub fn render(&self, template_name: &str, data: &Value) -> Result<String, ReportError> {
        if self.templates.get(template_name).is_none() {
            return Err(ReportError::Template(format!(
                "no template named '{template_name}'"
            )));
        }
        self.handlebars
            .render(template_name, data)
            .map_err(|e| ReportError::Render(e.to_string()))
    }

    pub fn list_templates(&self) -> Vec<&str> {
        self.templates.list_templates()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn renderer() -> TemplateRenderer<'static> {
        TemplateRenderer::new(
            TemplatesFile::from_yaml(
                r#"
templates:
  list:
    template: "Files: {{join files \", \"}}"
  raw:
    template: "{{name}}"
"#,
            )
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_join_helper() {
        let out = renderer()
            .render("list", &json!({ "files": ["a.jpg", "b.jpg"] }))
            .unwrap();
        assert_eq!(out, "Files: a.jpg, b.jpg");
    }

    #[test]
    fn test_no_html_escaping() {
        let out = renderer().render("raw", &json!({ "name": "a<b>&c" })).unwrap();
        assert_eq!(out, "a<b>&c");
    }

    #[test]
    fn test_unknown_template() {
        assert!(matches!(
            renderer().render("missing", &json!({})),
            Err(ReportError::Template(_))
        ));
    }

    #[test]
    fn test_syntax_error_fails_at_construction() {
        let file = TemplatesFile::from_yaml("templates:\n  bad:\n    template: \"{{#each x}}\"\n")
            .unwrap();
        assert!(TemplateRenderer::new(file).is_err());
    }
}
