//! Schema lookup.
//!
//! The codec consults an [`EventTemplateDb`] for the template of each event
//! name it decodes. Loading schemas from files is left to the embedder;
//! [`MemoryTemplateDb`] holds templates registered in code.

use dashmap::DashMap;
use std::sync::Arc;

use crate::event::Event;
use crate::template::{EventTemplate, TemplateRef};

/// Source of event templates by name.
pub trait EventTemplateDb: Send + Sync {
    fn try_get_template(&self, name: &str) -> Option<TemplateRef>;

    /// An empty event built from the named template.
    fn try_create_event(&self, name: &str) -> Option<Event> {
        self.try_get_template(name).map(Event::from_template)
    }
}

/// Templates registered at runtime, shared across threads.
#[derive(Debug, Default)]
pub struct MemoryTemplateDb {
    templates: DashMap<String, TemplateRef>,
    validate: bool,
}

impl MemoryTemplateDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events created by this db reject undeclared attributes.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Register `template`, replacing any template of the same name.
    pub fn register(&self, template: EventTemplate) -> TemplateRef {
        let template = Arc::new(template);
        self.templates
            .insert(template.name().to_string(), Arc::clone(&template));
        template
    }

    pub fn remove(&self, name: &str) -> Option<TemplateRef> {
        self.templates.remove(name).map(|(_, t)| t)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl EventTemplateDb for MemoryTemplateDb {
    fn try_get_template(&self, name: &str) -> Option<TemplateRef> {
        self.templates.get(name).map(|t| Arc::clone(t.value()))
    }

    fn try_create_event(&self, name: &str) -> Option<Event> {
        self.try_get_template(name)
            .map(|t| Event::from_template(t).with_validation(self.validate))
    }
}
