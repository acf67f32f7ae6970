use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const BUILTIN_TEMPLATES: &str = include_str!("../prompts/templates.yaml");

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template file not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("read template file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("template '{name}' not found in templates file")]
    MissingKey { name: String },
    #[error("error parsing templates file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TemplateEntry {
    Text(String),
    Roles { system: String },
}

impl TemplateEntry {
    fn into_text(self) -> String {
        match self {
            TemplateEntry::Text(text) | TemplateEntry::Roles { system: text } => text,
        }
    }
}

/// Role prompts keyed by name; a mapping entry contributes its `system` text.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    templates: HashMap<String, String>,
}

impl PromptTemplates {
    pub fn builtin() -> Result<Self, TemplateError> {
        Self::from_yaml(BUILTIN_TEMPLATES)
    }

    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        if !path.exists() {
            tracing::error!(path = %path.display(), "template file not found");
            return Err(TemplateError::NotFound {
                path: path.to_owned(),
            });
        }
        let raw = std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, TemplateError> {
        let entries: HashMap<String, TemplateEntry> = serde_yaml::from_str(raw)?;
        let templates = entries
            .into_iter()
            .map(|(name, entry)| (name, entry.into_text()))
            .collect();
        Ok(Self { templates })
    }

    pub fn get(&self, name: &str) -> Result<&str, TemplateError> {
        self.templates.get(name).map(String::as_str).ok_or_else(|| {
            tracing::error!(template = name, "template not found");
            TemplateError::MissingKey {
                name: name.to_owned(),
            }
        })
    }
}
