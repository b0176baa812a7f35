//! Output templates
//!
//! A template is a name plus a format string containing exactly one
//! `{{CONTENT}}` token; rendering substitutes the assembled file blocks at
//! that point. A small built-in catalog ships with the crate and users can
//! register additional templates from a JSON file.

use serde::{Deserialize, Serialize};

use crate::error::{PickFsError, Result};

/// The single substitution token every template must contain
pub const CONTENT_TOKEN: &str = "{{CONTENT}}";

/// Name of the built-in pass-through template
pub const DEFAULT_TEMPLATE: &str = "default";

const CHATML_FORMAT: &str = "<|im_start|>system\n\
You are given the contents of selected project files.<|im_end|>\n\
<|im_start|>user\n\
{{CONTENT}}<|im_end|>\n\
<|im_start|>assistant\n";

const MARKDOWN_FORMAT: &str = "# Project files\n\n{{CONTENT}}\n";

/// Immutable output template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Lookup name
    pub name: String,
    /// Format string with exactly one [`CONTENT_TOKEN`]
    pub format: String,
}

impl Template {
    /// Create a template, validating the token count
    pub fn new(name: impl Into<String>, format: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let format = format.into();
        let occurrences = format.matches(CONTENT_TOKEN).count();
        if occurrences != 1 {
            return Err(PickFsError::Template(format!(
                "template '{}' must contain exactly one {} token, found {}",
                name, CONTENT_TOKEN, occurrences
            )));
        }
        Ok(Self { name, format })
    }

    /// Substitute the assembled content into the format string
    pub fn render(&self, content: &str) -> String {
        self.format.replacen(CONTENT_TOKEN, content, 1)
    }
}

/// Catalog of built-in plus user-defined templates
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: Vec<Template>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        let builtins = vec![
            Template {
                name: DEFAULT_TEMPLATE.to_string(),
                format: CONTENT_TOKEN.to_string(),
            },
            Template {
                name: "chatml".to_string(),
                format: CHATML_FORMAT.to_string(),
            },
            Template {
                name: "markdown".to_string(),
                format: MARKDOWN_FORMAT.to_string(),
            },
        ];
        Self {
            templates: builtins,
        }
    }
}

impl TemplateRegistry {
    /// Registry with only the built-ins
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user-defined template. A template with an existing name
    /// replaces the earlier entry.
    pub fn register(&mut self, template: Template) {
        self.templates.retain(|t| t.name != template.name);
        self.templates.push(template);
    }

    /// Load user-defined templates from a JSON array of `{name, format}`
    pub fn load_user_templates(&mut self, json: &str) -> Result<usize> {
        let entries: Vec<Template> = serde_json::from_str(json)?;
        let count = entries.len();
        for entry in entries {
            // Revalidate: serde bypasses Template::new.
            let template = Template::new(entry.name, entry.format)?;
            self.register(template);
        }
        Ok(count)
    }

    /// Look up a template by name
    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.name == name)
    }

    /// All registered templates
    pub fn templates(&self) -> &[Template] {
        &self.templates
    }
}
