//! Enhanced-diagnostic prompt template loading and rendering (C7, spec §4.6).
//!
//! Bundles a default template with `include_str!` and falls back to it
//! when no external YAML override is configured or readable.

use crate::utils::error::AppError;
use serde::Deserialize;
use std::collections::BTreeMap;

const DEFAULT_ENHANCED_TEMPLATE: &str = include_str!("enhanced_prompt.md");

#[derive(Debug, Deserialize)]
struct TemplateFile {
    #[serde(flatten)]
    scenarios: BTreeMap<String, String>,
}

/// Loads the `"enhanced"` template from an external YAML file if
/// `template_path` is given and readable; falls back to the bundled default
/// on any load or parse failure.
pub fn load_enhanced_template(template_path: Option<&str>) -> String {
    let Some(path) = template_path else { return DEFAULT_ENHANCED_TEMPLATE.to_string() };
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_yaml::from_str::<TemplateFile>(&content) {
            Ok(file) => match file.scenarios.get("enhanced") {
                Some(template) => template.clone(),
                None => {
                    tracing::warn!(path, "template file has no 'enhanced' key, using bundled default");
                    DEFAULT_ENHANCED_TEMPLATE.to_string()
                },
            },
            Err(err) => {
                tracing::warn!(path, %err, "failed to parse template file, using bundled default");
                DEFAULT_ENHANCED_TEMPLATE.to_string()
            },
        },
        Err(err) => {
            tracing::warn!(path, %err, "failed to read template file, using bundled default");
            DEFAULT_ENHANCED_TEMPLATE.to_string()
        },
    }
}

/// Substitutes `{{name}}` placeholders. A placeholder present in the
/// template but absent from `vars` is a configuration error (spec §4.6).
pub fn render(template: &str, vars: &BTreeMap<&str, String>) -> Result<String, AppError> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            return Err(AppError::validation("unterminated '{{' placeholder in prompt template"));
        };
        let key = after_open[..end].trim();
        let value = vars
            .get(key)
            .ok_or_else(|| AppError::validation(format!("missing placeholder value for '{key}'")))?;
        output.push_str(value);
        rest = &after_open[end + 2..];
    }
    output.push_str(rest);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_placeholders_in_bundled_template() {
        let mut vars = BTreeMap::new();
        vars.insert("n_minus_1_range", "2025-01-01_00:00~2025-01-01_01:00".to_string());
        vars.insert("n_range", "2025-01-01_01:00~2025-01-01_02:00".to_string());
        vars.insert("data_table", "peg_name | pct_change\nthroughput | 53.3".to_string());
        let rendered = render(&load_enhanced_template(None), &vars).unwrap();
        assert!(rendered.contains("throughput | 53.3"));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn missing_placeholder_value_is_a_configuration_error() {
        let vars = BTreeMap::new();
        let result = render("hello {{name}}", &vars);
        assert!(result.is_err());
    }

    #[test]
    fn unreadable_template_path_falls_back_to_bundled_default() {
        let template = load_enhanced_template(Some("/nonexistent/template.yaml"));
        assert_eq!(template, DEFAULT_ENHANCED_TEMPLATE);
    }
}
