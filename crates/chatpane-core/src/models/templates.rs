use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::conversation::generate_id;

const SNIPPET_MAX_CHARS: usize = 100;

/// A reusable prompt the composer can insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub content: String,
    pub snippet: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn snippet_of(content: &str) -> String {
    content.chars().take(SNIPPET_MAX_CHARS).collect()
}

#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: Vec<Template>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut store = Self::new();
        store.create(
            "Bug Report",
            "Describe the bug:\n\nSteps to reproduce:\n1. \n\nExpected behavior:\n\nActual behavior:\n",
        );
        store.create(
            "Code Review",
            "Please review the following code for correctness, readability and performance:\n\n",
        );
        store.create(
            "Meeting Summary",
            "Summarize these meeting notes into decisions, action items and open questions:\n\n",
        );
        store
    }

    pub fn all(&self) -> &[Template] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn create(&mut self, name: &str, content: &str) -> &Template {
        let now = Utc::now();
        self.templates.push(Template {
            id: generate_id(),
            name: name.to_string(),
            content: content.to_string(),
            snippet: snippet_of(content),
            created_at: now,
            updated_at: now,
        });
        &self.templates[self.templates.len() - 1]
    }

    pub fn update(&mut self, id: &str, name: &str, content: &str) -> Option<&Template> {
        let template = self.templates.iter_mut().find(|t| t.id == id)?;
        template.name = name.to_string();
        template.content = content.to_string();
        template.snippet = snippet_of(content);
        template.updated_at = Utc::now();
        Some(template)
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.templates.len();
        self.templates.retain(|t| t.id != id);
        self.templates.len() != before
    }
}
