use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AppResult, ValidationError};
use crate::reasoning::ContextMap;
use crate::storage::JsonStore;

/// A reusable prompt with `{variable}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    pub template: String,
    pub variables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<serde_json::Value>>,
}

impl PromptTemplate {
    /// Create a template with the given placeholders.
    pub fn new(
        name: impl Into<String>,
        template: impl Into<String>,
        variables: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            variables: variables.into_iter().map(Into::into).collect(),
            description: None,
            domain: None,
            examples: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}

/// Loads, renders and persists prompt templates.
pub struct PromptEngine {
    store: JsonStore,
    templates: HashMap<String, PromptTemplate>,
}

impl PromptEngine {
    /// Open the templates directory and load every `*.json` template in it.
    ///
    /// Files that fail to parse are skipped with a warning.
    pub fn open(templates_dir: impl Into<PathBuf>) -> AppResult<Self> {
        let store = JsonStore::open(templates_dir)?;
        let mut templates = HashMap::new();

        for name in store.list("", ".json")? {
            match store.load::<PromptTemplate>(&name) {
                Ok(template) => {
                    templates.insert(template.name.clone(), template);
                }
                Err(e) => warn!(file = %name, error = %e, "Skipping invalid prompt template"),
            }
        }

        info!(count = templates.len(), dir = %store.root().display(), "Prompt templates loaded");
        Ok(Self { store, templates })
    }

    /// Render a template, substituting every declared variable.
    ///
    /// When `context` is given it is appended as `\nContext: <json>`.
    pub fn generate_prompt(
        &self,
        template_name: &str,
        variables: &HashMap<String, String>,
        context: Option<&ContextMap>,
    ) -> Result<String, ValidationError> {
        let template =
            self.templates
                .get(template_name)
                .ok_or_else(|| ValidationError::UnknownTemplate {
                    name: template_name.to_string(),
                })?;

        let mut prompt = template.template.clone();
        for var in &template.variables {
            let value = variables
                .get(var)
                .ok_or_else(|| ValidationError::MissingVariable { name: var.clone() })?;
            prompt = prompt.replace(&format!("{{{}}}", var), value);
        }

        if let Some(context) = context.filter(|c| !c.is_empty()) {
            prompt.push_str("\nContext: ");
            prompt.push_str(&serde_json::to_string(context).unwrap_or_default());
        }

        Ok(prompt)
    }

    /// Register a template and write it to `<name>.json`.
    pub fn add_template(&mut self, template: PromptTemplate) -> AppResult<()> {
        if template.name.trim().is_empty() {
            return Err(ValidationError::field("name", "Template name cannot be empty").into());
        }
        if template.name.contains(['/', '\\']) || template.name.contains("..") {
            return Err(ValidationError::field(
                "name",
                "Template name cannot contain path separators or '..'",
            )
            .into());
        }
        self.store.save(&format!("{}.json", template.name), &template)?;
        self.templates.insert(template.name.clone(), template);
        Ok(())
    }

    /// Look up a template by name.
    pub fn get(&self, name: &str) -> Option<&PromptTemplate> {
        self.templates.get(name)
    }

    /// Names of all loaded templates, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
